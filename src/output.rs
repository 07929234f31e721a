//! Best-effort decoding of the structured output a task may emit.
//!
//! Structured output is telemetry: a malformed payload must never fail the
//! query that displays it, so [`OutputParser::parse`] degrades to `None` and
//! logs a diagnostic. [`OutputParser::try_parse`] keeps the failure typed for
//! callers that want to inspect it.
//!
//! Nesting is capped at [`MAX_DEPTH`]. `Value` is dropped and serialized
//! recursively, so a deeper tree would overflow the stack of whichever thread
//! later renders or drops the view.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// Generic key/value tree decoded from a task's structured output.
pub type OutputTree = Map<String, Value>;

/// Deepest array/object nesting accepted in structured output.
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Error)]
pub enum MalformedOutput {
  #[error("invalid JSON: {0}")]
  Syntax(#[from] serde_json::Error),
  #[error("expected an object, found {0}")]
  NotAnObject(&'static str),
  #[error("nested deeper than {} levels", MAX_DEPTH)]
  TooDeep,
}

pub trait OutputParser: Send + Sync {
  fn try_parse(&self, raw: Option<&str>) -> Result<Option<OutputTree>, MalformedOutput>;

  fn parse(&self, raw: Option<&str>) -> Option<OutputTree> {
    match self.try_parse(raw) {
      Ok(tree) => tree,
      Err(err) => {
        warn!("Unable to parse task structured output: {}", err);
        None
      }
    }
  }
}

/// JSON decoder with exact numbers, bounded by [`MAX_DEPTH`].
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonOutputParser;

impl OutputParser for JsonOutputParser {
  fn try_parse(&self, raw: Option<&str>) -> Result<Option<OutputTree>, MalformedOutput> {
    let raw = match raw {
      Some(raw) if !raw.is_empty() => raw,
      _ => return Ok(None),
    };

    if exceeds_depth(raw, MAX_DEPTH) {
      return Err(MalformedOutput::TooDeep);
    }

    // serde_json's own limit is 128; the scan above already bounds the depth
    let mut de = serde_json::Deserializer::from_str(raw);
    de.disable_recursion_limit();
    let value: Value = serde::Deserialize::deserialize(&mut de)?;
    de.end()?;

    match value {
      Value::Object(tree) => Ok(Some(tree)),
      Value::Null => Err(MalformedOutput::NotAnObject("null")),
      Value::Bool(_) => Err(MalformedOutput::NotAnObject("a boolean")),
      Value::Number(_) => Err(MalformedOutput::NotAnObject("a number")),
      Value::String(_) => Err(MalformedOutput::NotAnObject("a string")),
      Value::Array(_) => Err(MalformedOutput::NotAnObject("an array")),
    }
  }
}

/// Scans brackets outside string literals without building anything.
fn exceeds_depth(raw: &str, limit: usize) -> bool {
  let mut depth = 0usize;
  let mut in_string = false;
  let mut escaped = false;
  for byte in raw.bytes() {
    if in_string {
      match byte {
        _ if escaped => escaped = false,
        b'\\' => escaped = true,
        b'"' => in_string = false,
        _ => {}
      }
      continue;
    }
    match byte {
      b'"' => in_string = true,
      b'[' | b'{' => {
        depth += 1;
        if depth > limit {
          return true;
        }
      }
      b']' | b'}' => depth = depth.saturating_sub(1),
      _ => {}
    }
  }
  false
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn absent_or_empty_input_is_none() {
    let parser = JsonOutputParser;
    assert!(parser.parse(None).is_none());
    assert!(parser.parse(Some("")).is_none());
    assert!(matches!(parser.try_parse(Some("")), Ok(None)));
  }

  #[test]
  fn nested_object_is_decoded() {
    let tree = JsonOutputParser.parse(Some(r#"{"a":1,"b":{"c":2}}"#)).unwrap();
    assert_eq!(Value::Object(tree), json!({"a": 1, "b": {"c": 2}}));
  }

  #[test]
  fn big_integers_keep_every_digit() {
    let raw = r#"{"bytes": 123456789012345678901234567890, "ratio": 0.10000000000000000000001}"#;
    let tree = JsonOutputParser.parse(Some(raw)).unwrap();
    assert_eq!(tree["bytes"].to_string(), "123456789012345678901234567890");
    assert_eq!(tree["ratio"].to_string(), "0.10000000000000000000001");
  }

  #[test]
  fn nesting_up_to_the_limit_is_accepted() {
    let depth = MAX_DEPTH - 1;
    let raw = format!("{{\"k\":{}1{}}}", "[".repeat(depth), "]".repeat(depth));
    let tree = JsonOutputParser.parse(Some(&raw)).unwrap();
    let mut node = &tree["k"];
    for _ in 0..depth {
      node = &node[0];
    }
    assert_eq!(node, &json!(1));
    assert!(serde_json::to_vec(&tree).is_ok());
  }

  #[test]
  fn runaway_nesting_is_rejected_before_decoding() {
    let depth = 100_000;
    let raw = format!("{{\"k\":{}1{}}}", "[".repeat(depth), "]".repeat(depth));
    assert!(matches!(JsonOutputParser.try_parse(Some(&raw)), Err(MalformedOutput::TooDeep)));
    assert!(JsonOutputParser.parse(Some(&raw)).is_none());
  }

  #[test]
  fn brackets_inside_strings_do_not_count() {
    let raw = format!("{{\"k\":\"{}\\\"{}\"}}", "[".repeat(MAX_DEPTH * 2), "{".repeat(MAX_DEPTH));
    let tree = JsonOutputParser.try_parse(Some(&raw)).unwrap().unwrap();
    assert!(tree["k"].as_str().unwrap().starts_with("[[["));
  }

  #[test]
  fn malformed_input_degrades_to_none() {
    let parser = JsonOutputParser;
    for raw in ["{", "not json", "{\"a\":1} trailing", "[1,2]", "42", "null", "   "] {
      assert!(parser.parse(Some(raw)).is_none(), "{raw:?} should not parse");
      assert!(parser.try_parse(Some(raw)).is_err());
    }
    assert!(matches!(
      parser.try_parse(Some("[1]")),
      Err(MalformedOutput::NotAnObject("an array"))
    ));
  }
}
