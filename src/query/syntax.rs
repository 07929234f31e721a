//! Query-string form of a task query, e.g.
//! `Tasks/request_id=5&Tasks/status.in(FAILED,ABORTED)&fields=Tasks/id,Tasks/status`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, TaskError};
use crate::query::predicate::{Constraint, ConstraintOp};
use crate::query::{Page, TaskQuery};

static IN_TERM: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(?P<prop>[^.<>=!()]+)\.in\((?P<values>.*)\)$").expect("valid regex"));
static IS_NULL_TERM: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(?P<prop>[^.<>=!()]+)\.isNull\(\)$").expect("valid regex"));
static COMPARE_TERM: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(?P<prop>[^<>=!()]+)(?P<op>>=|<=|!=|=|<|>)(?P<value>.*)$").expect("valid regex")
});

/// Builds a query from decoded query-string pairs.
///
/// Comparison terms arrive split at their first `=` (`start_time>=5` decodes
/// as `("start_time>", "5")`), so each pair is stitched back together before
/// matching.
pub fn parse_query(pairs: &[(String, String)], default_page_size: usize) -> Result<TaskQuery> {
  let mut query = TaskQuery::default();
  let mut offset = 0;
  let mut limit = default_page_size;

  for (key, value) in pairs {
    match key.as_str() {
      "fields" => query.fields.extend(split_list(value)),
      "from" => offset = parse_count("from", value)?,
      "page_size" => {
        limit = parse_count("page_size", value)?;
        if limit == 0 {
          return Err(TaskError::UnsupportedPredicate("page_size must be positive".into()));
        }
      }
      "_" => {}
      _ => {
        let term = if value.is_empty() { key.clone() } else { format!("{}={}", key, value) };
        query.constraints.push(parse_term(&term)?);
      }
    }
  }

  query.page = Some(Page { offset, limit });
  Ok(query)
}

pub fn parse_term(term: &str) -> Result<Constraint> {
  if let Some(caps) = IN_TERM.captures(term) {
    return Ok(Constraint::is_in(&caps["prop"], split_list(&caps["values"])));
  }
  if let Some(caps) = IS_NULL_TERM.captures(term) {
    return Ok(Constraint::new(&caps["prop"], ConstraintOp::IsNull));
  }
  let caps = COMPARE_TERM
    .captures(term)
    .ok_or_else(|| TaskError::UnsupportedPredicate(format!("cannot parse '{}'", term)))?;
  let value = caps["value"].to_string();
  let op = match &caps["op"] {
    "=" => ConstraintOp::Eq(value),
    ">" => ConstraintOp::Gt(value),
    ">=" => ConstraintOp::Ge(value),
    "<" => ConstraintOp::Lt(value),
    "<=" => ConstraintOp::Le(value),
    other => {
      return Err(TaskError::UnsupportedPredicate(format!("operator '{}' is not supported", other)));
    }
  };
  Ok(Constraint::new(&caps["prop"], op))
}

fn split_list(raw: &str) -> Vec<String> {
  raw.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

fn parse_count(name: &str, raw: &str) -> Result<usize> {
  raw
    .trim()
    .parse()
    .map_err(|_| TaskError::UnsupportedPredicate(format!("{} expects a non-negative integer, got '{}'", name, raw)))
}
