//! Client-facing task views and field projection.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, TaskError};
use crate::models::TaskRecord;
use crate::output::OutputParser;
use crate::query::predicate::TaskField;

/// Set of properties a query asked for. The primary key is always included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection(BTreeSet<TaskField>);

impl Projection {
  pub fn all() -> Self {
    Projection(TaskField::ALL.into_iter().collect())
  }

  /// An empty list, `Tasks`, `Tasks/*` or `*` select every property.
  pub fn resolve<S: AsRef<str>>(requested: &[S]) -> Result<Self> {
    let mut fields = BTreeSet::new();
    for name in requested {
      let name = name.as_ref().trim();
      if name.is_empty() {
        continue;
      }
      if matches!(name, "*" | "Tasks" | "Tasks/*") {
        return Ok(Self::all());
      }
      let field = TaskField::from_property(name)
        .ok_or_else(|| TaskError::UnsupportedPredicate(format!("unknown field '{}'", name)))?;
      fields.insert(field);
    }
    if fields.is_empty() {
      return Ok(Self::all());
    }
    fields.insert(TaskField::Id);
    Ok(Projection(fields))
  }

  pub fn contains(&self, field: TaskField) -> bool {
    self.0.contains(&field)
  }
}

/// Projected attributes of one task, keyed by property name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TaskView(Map<String, Value>);

impl TaskView {
  pub fn get(&self, property: &str) -> Option<&Value> {
    self.0.get(property)
  }

  pub fn contains(&self, property: &str) -> bool {
    self.0.contains_key(property)
  }

  pub fn properties(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  pub fn into_inner(self) -> Map<String, Value> {
    self.0
  }
}

pub struct TaskViewBuilder {
  parser: Arc<dyn OutputParser>,
}

impl TaskViewBuilder {
  pub fn new(parser: Arc<dyn OutputParser>) -> Self {
    Self { parser }
  }

  pub fn build(&self, record: &TaskRecord, cluster_name: Option<&str>, projection: &Projection) -> TaskView {
    let mut view = Map::new();
    let mut set = |field: TaskField, value: Value| {
      if projection.contains(field) {
        view.insert(field.name().to_string(), value);
      }
    };

    if let Some(cluster) = cluster_name.filter(|name| !name.is_empty()) {
      set(TaskField::ClusterName, Value::from(cluster));
    }
    set(TaskField::RequestId, Value::from(record.request_id));
    set(TaskField::Id, Value::from(record.task_id));
    set(TaskField::StageId, Value::from(record.stage_id));
    set(TaskField::HostName, Value::from(record.host_name.clone()));
    set(TaskField::Role, Value::from(record.role.clone()));
    set(TaskField::Command, Value::from(record.role_command.as_str()));
    set(TaskField::Status, Value::from(record.status.as_str()));
    set(TaskField::ExitCode, Value::from(record.exit_code));
    set(TaskField::Stderr, Value::from(record.stderr.clone()));
    set(TaskField::Stdout, Value::from(record.stdout.clone()));
    set(TaskField::OutputLog, Value::from(record.output_log.clone()));
    set(TaskField::ErrorLog, Value::from(record.error_log.clone()));
    if projection.contains(TaskField::StructuredOut) {
      let parsed = self.parser.parse(record.structured_out.as_deref());
      set(TaskField::StructuredOut, parsed.map(Value::Object).unwrap_or(Value::Null));
    }
    set(TaskField::StartTime, Value::from(record.start_time));
    set(TaskField::EndTime, Value::from(record.end_time));
    set(TaskField::AttemptCount, Value::from(record.attempt_count));
    if let Some(name) = &record.custom_command_name {
      set(TaskField::CustomCommandName, Value::from(name.clone()));
    }
    set(TaskField::CommandDetail, Value::from(record.command_detail()));

    TaskView(view)
  }
}
