//! Task properties and the predicates that filter on them.

use std::ops::Bound;

use crate::error::{ResourceKey, Result, TaskError};
use crate::models::{RoleCommand, TaskRecord};
use crate::state::TaskStatus;

const CATEGORY_PREFIX: &str = "Tasks/";

/// Every property a task view can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskField {
  ClusterName,
  Id,
  RequestId,
  StageId,
  HostName,
  Role,
  Command,
  Status,
  ExitCode,
  Stderr,
  Stdout,
  OutputLog,
  ErrorLog,
  StructuredOut,
  StartTime,
  EndTime,
  AttemptCount,
  CommandDetail,
  CustomCommandName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
  Int,
  Text,
  Status,
  Command,
}

impl TaskField {
  pub const ALL: [TaskField; 19] = [
    TaskField::ClusterName,
    TaskField::Id,
    TaskField::RequestId,
    TaskField::StageId,
    TaskField::HostName,
    TaskField::Role,
    TaskField::Command,
    TaskField::Status,
    TaskField::ExitCode,
    TaskField::Stderr,
    TaskField::Stdout,
    TaskField::OutputLog,
    TaskField::ErrorLog,
    TaskField::StructuredOut,
    TaskField::StartTime,
    TaskField::EndTime,
    TaskField::AttemptCount,
    TaskField::CommandDetail,
    TaskField::CustomCommandName,
  ];

  pub fn name(self) -> &'static str {
    match self {
      TaskField::ClusterName => "cluster_name",
      TaskField::Id => "id",
      TaskField::RequestId => "request_id",
      TaskField::StageId => "stage_id",
      TaskField::HostName => "host_name",
      TaskField::Role => "role",
      TaskField::Command => "command",
      TaskField::Status => "status",
      TaskField::ExitCode => "exit_code",
      TaskField::Stderr => "stderr",
      TaskField::Stdout => "stdout",
      TaskField::OutputLog => "output_log",
      TaskField::ErrorLog => "error_log",
      TaskField::StructuredOut => "structured_out",
      TaskField::StartTime => "start_time",
      TaskField::EndTime => "end_time",
      TaskField::AttemptCount => "attempt_cnt",
      TaskField::CommandDetail => "command_detail",
      TaskField::CustomCommandName => "custom_command_name",
    }
  }

  /// Resolves `status` or `Tasks/status`.
  pub fn from_property(property: &str) -> Option<TaskField> {
    let name = property.trim();
    let name = name.strip_prefix(CATEGORY_PREFIX).unwrap_or(name);
    TaskField::ALL.into_iter().find(|field| field.name() == name)
  }

  fn kind(self) -> FieldKind {
    match self {
      TaskField::Id
      | TaskField::RequestId
      | TaskField::StageId
      | TaskField::ExitCode
      | TaskField::StartTime
      | TaskField::EndTime
      | TaskField::AttemptCount => FieldKind::Int,
      TaskField::Status => FieldKind::Status,
      TaskField::Command => FieldKind::Command,
      _ => FieldKind::Text,
    }
  }

  pub fn is_nullable(self) -> bool {
    matches!(
      self,
      TaskField::ClusterName
        | TaskField::HostName
        | TaskField::ExitCode
        | TaskField::StructuredOut
        | TaskField::StartTime
        | TaskField::EndTime
        | TaskField::CustomCommandName
    )
  }

  fn parse_value(self, raw: &str) -> Result<FieldValue> {
    let unsupported = |reason: String| TaskError::UnsupportedPredicate(reason);
    match self.kind() {
      FieldKind::Int => parse_int(self, raw).map(FieldValue::Int),
      FieldKind::Status => raw
        .parse::<TaskStatus>()
        .map(FieldValue::Status)
        .map_err(|e| unsupported(format!("{}: {}", self.name(), e))),
      FieldKind::Command => raw
        .parse::<RoleCommand>()
        .map(FieldValue::Command)
        .map_err(|e| unsupported(format!("{}: {}", self.name(), e))),
      FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
    }
  }
}

fn parse_int(field: TaskField, raw: &str) -> Result<i64> {
  raw.trim().parse::<i64>().map_err(|_| {
    TaskError::UnsupportedPredicate(format!("{} expects an integer, got '{}'", field.name(), raw))
  })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
  Int(i64),
  Text(String),
  Status(TaskStatus),
  Command(RoleCommand),
}

/// Read `field` off a record. `None` is a null value. Cluster name is not a
/// record attribute and always reads as null.
pub fn field_value(record: &TaskRecord, field: TaskField) -> Option<FieldValue> {
  match field {
    TaskField::ClusterName => None,
    TaskField::Id => Some(FieldValue::Int(record.task_id)),
    TaskField::RequestId => Some(FieldValue::Int(record.request_id)),
    TaskField::StageId => Some(FieldValue::Int(record.stage_id)),
    TaskField::HostName => record.host_name.clone().map(FieldValue::Text),
    TaskField::Role => Some(FieldValue::Text(record.role.clone())),
    TaskField::Command => Some(FieldValue::Command(record.role_command)),
    TaskField::Status => Some(FieldValue::Status(record.status)),
    TaskField::ExitCode => record.exit_code.map(|code| FieldValue::Int(code.into())),
    TaskField::Stderr => Some(FieldValue::Text(record.stderr.clone())),
    TaskField::Stdout => Some(FieldValue::Text(record.stdout.clone())),
    TaskField::OutputLog => Some(FieldValue::Text(record.output_log.clone())),
    TaskField::ErrorLog => Some(FieldValue::Text(record.error_log.clone())),
    TaskField::StructuredOut => record.structured_out.clone().map(FieldValue::Text),
    TaskField::StartTime => record.start_time.map(FieldValue::Int),
    TaskField::EndTime => record.end_time.map(FieldValue::Int),
    TaskField::AttemptCount => Some(FieldValue::Int(record.attempt_count.into())),
    TaskField::CommandDetail => Some(FieldValue::Text(record.command_detail())),
    TaskField::CustomCommandName => record.custom_command_name.clone().map(FieldValue::Text),
  }
}

/// Operator half of a caller-supplied constraint, values still unparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintOp {
  Eq(String),
  In(Vec<String>),
  Gt(String),
  Ge(String),
  Lt(String),
  Le(String),
  IsNull,
}

/// A constraint as the caller wrote it: property name plus operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
  pub property: String,
  pub op: ConstraintOp,
}

impl Constraint {
  pub fn equals(property: impl Into<String>, value: impl Into<String>) -> Self {
    Self { property: property.into(), op: ConstraintOp::Eq(value.into()) }
  }

  pub fn is_in<I, S>(property: impl Into<String>, values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      property: property.into(),
      op: ConstraintOp::In(values.into_iter().map(Into::into).collect()),
    }
  }

  pub fn new(property: impl Into<String>, op: ConstraintOp) -> Self {
    Self { property: property.into(), op }
  }
}

/// Typed filter over task records. Conjunctive only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
  Eq(TaskField, FieldValue),
  In(TaskField, Vec<FieldValue>),
  Range {
    field: TaskField,
    lower: Bound<i64>,
    upper: Bound<i64>,
  },
  IsNull(TaskField),
  /// Empty conjunction matches everything.
  And(Vec<Predicate>),
}

impl Predicate {
  pub fn all() -> Self {
    Predicate::And(Vec::new())
  }

  pub fn matches(&self, record: &TaskRecord) -> bool {
    match self {
      Predicate::Eq(field, expected) => field_value(record, *field).as_ref() == Some(expected),
      Predicate::In(field, values) => {
        field_value(record, *field).is_some_and(|value| values.contains(&value))
      }
      Predicate::Range { field, lower, upper } => match field_value(record, *field) {
        Some(FieldValue::Int(value)) => {
          let above = match lower {
            Bound::Included(min) => value >= *min,
            Bound::Excluded(min) => value > *min,
            Bound::Unbounded => true,
          };
          let below = match upper {
            Bound::Included(max) => value <= *max,
            Bound::Excluded(max) => value < *max,
            Bound::Unbounded => true,
          };
          above && below
        }
        _ => false,
      },
      Predicate::IsNull(field) => field_value(record, *field).is_none(),
      Predicate::And(parts) => parts.iter().all(|part| part.matches(record)),
    }
  }

  /// Ids the predicate names by equality at its top level.
  pub fn addressed_keys(&self) -> Vec<ResourceKey> {
    let mut keys = Vec::new();
    self.collect_keys(&mut keys);
    keys
  }

  fn collect_keys(&self, keys: &mut Vec<ResourceKey>) {
    match self {
      Predicate::Eq(TaskField::Id, FieldValue::Int(id)) => keys.push(ResourceKey::Task(*id)),
      Predicate::Eq(TaskField::StageId, FieldValue::Int(id)) => keys.push(ResourceKey::Stage(*id)),
      Predicate::Eq(TaskField::RequestId, FieldValue::Int(id)) => {
        keys.push(ResourceKey::Request(*id))
      }
      Predicate::And(parts) => parts.iter().for_each(|part| part.collect_keys(keys)),
      _ => {}
    }
  }
}

/// Constraints resolved into a record predicate plus the request scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledConstraints {
  pub predicate: Predicate,
  pub cluster_name: Option<String>,
}

impl CompiledConstraints {
  /// Cluster name is scope, not a record filter: it is pulled out once and
  /// echoed into every view. More than one distinct cluster is rejected.
  pub fn compile(constraints: &[Constraint]) -> Result<Self> {
    let mut parts = Vec::with_capacity(constraints.len());
    let mut clusters: Vec<String> = Vec::new();

    for constraint in constraints {
      let field = TaskField::from_property(&constraint.property).ok_or_else(|| {
        TaskError::UnsupportedPredicate(format!("unknown property '{}'", constraint.property))
      })?;

      if field == TaskField::ClusterName {
        let names = match &constraint.op {
          ConstraintOp::Eq(name) => vec![name.clone()],
          ConstraintOp::In(names) => names.clone(),
          other => {
            return Err(TaskError::UnsupportedPredicate(format!(
              "cluster_name only supports equality, got {:?}",
              other
            )));
          }
        };
        for name in names {
          if !clusters.contains(&name) {
            clusters.push(name);
          }
        }
        continue;
      }

      parts.push(compile_one(field, &constraint.op)?);
    }

    if clusters.len() > 1 {
      return Err(TaskError::AmbiguousScope(clusters));
    }

    let predicate = if parts.len() == 1 {
      parts.remove(0)
    } else {
      Predicate::And(parts)
    };
    Ok(Self { predicate, cluster_name: clusters.pop().filter(|name| !name.is_empty()) })
  }
}

fn compile_one(field: TaskField, op: &ConstraintOp) -> Result<Predicate> {
  let range = |lower: Bound<&String>, upper: Bound<&String>| -> Result<Predicate> {
    if field.kind() != FieldKind::Int {
      return Err(TaskError::UnsupportedPredicate(format!(
        "{} does not support range comparison",
        field.name()
      )));
    }
    let int = |raw: &String| parse_int(field, raw);
    let lower = match lower {
      Bound::Included(raw) => Bound::Included(int(raw)?),
      Bound::Excluded(raw) => Bound::Excluded(int(raw)?),
      Bound::Unbounded => Bound::Unbounded,
    };
    let upper = match upper {
      Bound::Included(raw) => Bound::Included(int(raw)?),
      Bound::Excluded(raw) => Bound::Excluded(int(raw)?),
      Bound::Unbounded => Bound::Unbounded,
    };
    Ok(Predicate::Range { field, lower, upper })
  };

  match op {
    ConstraintOp::Eq(raw) => Ok(Predicate::Eq(field, field.parse_value(raw)?)),
    ConstraintOp::In(raws) => {
      if raws.is_empty() {
        return Err(TaskError::UnsupportedPredicate(format!("{}.in() needs values", field.name())));
      }
      let values = raws.iter().map(|raw| field.parse_value(raw)).collect::<Result<Vec<_>>>()?;
      Ok(Predicate::In(field, values))
    }
    ConstraintOp::Gt(raw) => range(Bound::Excluded(raw), Bound::Unbounded),
    ConstraintOp::Ge(raw) => range(Bound::Included(raw), Bound::Unbounded),
    ConstraintOp::Lt(raw) => range(Bound::Unbounded, Bound::Excluded(raw)),
    ConstraintOp::Le(raw) => range(Bound::Unbounded, Bound::Included(raw)),
    ConstraintOp::IsNull => {
      if !field.is_nullable() {
        return Err(TaskError::UnsupportedPredicate(format!("{} is never null", field.name())));
      }
      Ok(Predicate::IsNull(field))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(task_id: i64, status: TaskStatus) -> TaskRecord {
    let mut record = TaskRecord::pending(task_id, 1, 2, Some("c6401"), "DATANODE", RoleCommand::Install);
    record.status = status;
    record
  }

  #[test]
  fn property_names_accept_category_prefix() {
    assert_eq!(TaskField::from_property("Tasks/status"), Some(TaskField::Status));
    assert_eq!(TaskField::from_property("attempt_cnt"), Some(TaskField::AttemptCount));
    assert_eq!(TaskField::from_property("Tasks/colour"), None);
  }

  #[test]
  fn unknown_property_is_rejected() {
    let err = CompiledConstraints::compile(&[Constraint::equals("Tasks/colour", "red")]).unwrap_err();
    assert!(matches!(err, TaskError::UnsupportedPredicate(_)));
  }

  #[test]
  fn bad_values_and_operators_are_rejected() {
    for constraint in [
      Constraint::equals("Tasks/id", "seven"),
      Constraint::equals("Tasks/status", "DONE"),
      Constraint::new("Tasks/role", ConstraintOp::Gt("A".into())),
      Constraint::new("Tasks/status", ConstraintOp::IsNull),
      Constraint::is_in("Tasks/id", Vec::<String>::new()),
    ] {
      assert!(
        matches!(CompiledConstraints::compile(&[constraint.clone()]), Err(TaskError::UnsupportedPredicate(_))),
        "{:?} should be rejected",
        constraint
      );
    }
  }

  #[test]
  fn cluster_name_is_scope_not_filter() {
    let compiled = CompiledConstraints::compile(&[
      Constraint::equals("Tasks/cluster_name", "c1"),
      Constraint::equals("Tasks/request_id", "1"),
      Constraint::equals("Tasks/cluster_name", "c1"),
    ])
    .unwrap();
    assert_eq!(compiled.cluster_name.as_deref(), Some("c1"));
    assert_eq!(compiled.predicate, Predicate::Eq(TaskField::RequestId, FieldValue::Int(1)));
  }

  #[test]
  fn multiple_clusters_are_ambiguous() {
    let err = CompiledConstraints::compile(&[
      Constraint::equals("Tasks/cluster_name", "c1"),
      Constraint::equals("Tasks/cluster_name", "c2"),
    ])
    .unwrap_err();
    match err {
      TaskError::AmbiguousScope(names) => assert_eq!(names, vec!["c1", "c2"]),
      other => panic!("unexpected error {:?}", other),
    }
  }

  #[test]
  fn conjunction_of_membership_and_range() {
    let compiled = CompiledConstraints::compile(&[
      Constraint::is_in("Tasks/status", ["FAILED", "ABORTED"]),
      Constraint::new("Tasks/id", ConstraintOp::Ge("2".into())),
    ])
    .unwrap();
    assert!(!compiled.predicate.matches(&record(1, TaskStatus::Failed)));
    assert!(compiled.predicate.matches(&record(2, TaskStatus::Aborted)));
    assert!(!compiled.predicate.matches(&record(3, TaskStatus::Completed)));
  }

  #[test]
  fn is_null_and_range_skip_null_values() {
    let mut finished = record(1, TaskStatus::Completed);
    finished.end_time = Some(50);
    let running = record(2, TaskStatus::InProgress);

    let open = Predicate::IsNull(TaskField::EndTime);
    assert!(!open.matches(&finished));
    assert!(open.matches(&running));

    let early = Predicate::Range { field: TaskField::EndTime, lower: Bound::Unbounded, upper: Bound::Excluded(100) };
    assert!(early.matches(&finished));
    assert!(!early.matches(&running));
  }

  #[test]
  fn addressed_keys_come_from_top_level_equality() {
    let compiled = CompiledConstraints::compile(&[
      Constraint::equals("Tasks/request_id", "4"),
      Constraint::equals("Tasks/stage_id", "5"),
      Constraint::is_in("Tasks/id", ["6", "7"]),
    ])
    .unwrap();
    assert_eq!(
      compiled.predicate.addressed_keys(),
      vec![ResourceKey::Request(4), ResourceKey::Stage(5)]
    );
  }

  #[test]
  fn command_detail_filter_sees_derived_value() {
    let task = record(1, TaskStatus::Pending);
    assert!(Predicate::Eq(TaskField::CommandDetail, FieldValue::Text("DATANODE INSTALL".into())).matches(&task));
  }
}
