use std::ops::Bound;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::error::{ResourceKey, Result, TaskError};
use crate::models::{RoleCommand, StatusReport, TaskRecord};
use crate::query::predicate::{FieldValue, Predicate, TaskField};
use crate::state::TaskStatus;
use crate::store::{StatusSink, TaskStore};

const SELECT_TASKS: &str = "SELECT task_id, request_id, stage_id, host_name, role, role_command, status, \
  exit_code, std_out, std_error, output_log, error_log, structured_out, start_time, end_time, \
  attempt_count, custom_command_name, command_detail FROM host_role_command";

/// Row shape of `host_role_command`. Kept apart from [`TaskRecord`] so column
/// changes stay inside this module.
#[derive(Debug, FromRow)]
struct TaskRow {
  task_id: i64,
  request_id: i64,
  stage_id: i64,
  host_name: Option<String>,
  role: String,
  role_command: String,
  status: String,
  exit_code: Option<i32>,
  std_out: Option<String>,
  std_error: Option<String>,
  output_log: Option<String>,
  error_log: Option<String>,
  structured_out: Option<String>,
  start_time: Option<i64>,
  end_time: Option<i64>,
  attempt_count: i32,
  custom_command_name: Option<String>,
  command_detail: Option<String>,
}

impl TryFrom<TaskRow> for TaskRecord {
  type Error = TaskError;

  fn try_from(row: TaskRow) -> Result<Self> {
    let task_id = row.task_id;
    let corrupt = |reason: String| TaskError::CorruptRecord { task_id, reason };
    // only canonical names, so SQL comparisons on these columns agree with
    // the typed values
    let status = row
      .status
      .parse::<TaskStatus>()
      .ok()
      .filter(|status| status.as_str() == row.status)
      .ok_or_else(|| corrupt(format!("status: unknown value '{}'", row.status)))?;
    let role_command = row
      .role_command
      .parse::<RoleCommand>()
      .ok()
      .filter(|command| command.as_str() == row.role_command)
      .ok_or_else(|| corrupt(format!("role_command: unknown value '{}'", row.role_command)))?;
    Ok(TaskRecord {
      task_id,
      request_id: row.request_id,
      stage_id: row.stage_id,
      host_name: row.host_name,
      role: row.role,
      role_command,
      status,
      exit_code: row.exit_code,
      stdout: row.std_out.unwrap_or_default(),
      stderr: row.std_error.unwrap_or_default(),
      output_log: row.output_log.unwrap_or_default(),
      error_log: row.error_log.unwrap_or_default(),
      structured_out: row.structured_out,
      start_time: row.start_time,
      end_time: row.end_time,
      attempt_count: row.attempt_count,
      custom_command_name: row.custom_command_name,
      command_detail: row.command_detail,
    })
  }
}

/// SQL expression for a property. Cluster name has no column and reads as NULL;
/// the log columns read NULL as empty text, as [`TaskRecord`] does.
fn column(field: TaskField) -> &'static str {
  match field {
    TaskField::ClusterName => "NULL",
    TaskField::Id => "task_id",
    TaskField::RequestId => "request_id",
    TaskField::StageId => "stage_id",
    TaskField::HostName => "host_name",
    TaskField::Role => "role",
    TaskField::Command => "role_command",
    TaskField::Status => "status",
    TaskField::ExitCode => "exit_code",
    TaskField::Stderr => "COALESCE(std_error, '')",
    TaskField::Stdout => "COALESCE(std_out, '')",
    TaskField::OutputLog => "COALESCE(output_log, '')",
    TaskField::ErrorLog => "COALESCE(error_log, '')",
    TaskField::StructuredOut => "structured_out",
    TaskField::StartTime => "start_time",
    TaskField::EndTime => "end_time",
    TaskField::AttemptCount => "attempt_count",
    TaskField::CommandDetail => "COALESCE(command_detail, role || ' ' || role_command)",
    TaskField::CustomCommandName => "custom_command_name",
  }
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
  match value {
    FieldValue::Int(v) => qb.push_bind(*v),
    FieldValue::Text(v) => qb.push_bind(v.clone()),
    FieldValue::Status(v) => qb.push_bind(v.as_str()),
    FieldValue::Command(v) => qb.push_bind(v.as_str()),
  };
}

fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
  match predicate {
    Predicate::Eq(field, value) => {
      qb.push(column(*field)).push(" = ");
      push_value(qb, value);
    }
    Predicate::In(field, values) => {
      qb.push(column(*field)).push(" IN (");
      for (i, value) in values.iter().enumerate() {
        if i > 0 {
          qb.push(", ");
        }
        push_value(qb, value);
      }
      qb.push(")");
    }
    Predicate::Range { field, lower, upper } => {
      let mut bounds = Vec::new();
      match lower {
        Bound::Included(v) => bounds.push((">=", *v)),
        Bound::Excluded(v) => bounds.push((">", *v)),
        Bound::Unbounded => {}
      }
      match upper {
        Bound::Included(v) => bounds.push(("<=", *v)),
        Bound::Excluded(v) => bounds.push(("<", *v)),
        Bound::Unbounded => {}
      }
      if bounds.is_empty() {
        qb.push(column(*field)).push(" IS NOT NULL");
      }
      for (i, (op, v)) in bounds.into_iter().enumerate() {
        if i > 0 {
          qb.push(" AND ");
        }
        qb.push(column(*field)).push(" ").push(op).push(" ").push_bind(v);
      }
    }
    Predicate::IsNull(field) => {
      qb.push(column(*field)).push(" IS NULL");
    }
    Predicate::And(parts) if parts.is_empty() => {
      qb.push("TRUE");
    }
    Predicate::And(parts) => {
      qb.push("(");
      for (i, part) in parts.iter().enumerate() {
        if i > 0 {
          qb.push(") AND (");
        }
        push_predicate(qb, part);
      }
      qb.push(")");
    }
  }
}

/// Task store backed by the `host_role_command` table.
#[derive(Debug, Clone)]
pub struct PgTaskStore {
  pool: PgPool,
}

impl PgTaskStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl TaskStore for PgTaskStore {
  async fn find_matching(&self, predicate: &Predicate) -> Result<Vec<TaskRecord>> {
    let mut qb = QueryBuilder::<Postgres>::new(SELECT_TASKS);
    qb.push(" WHERE ");
    push_predicate(&mut qb, predicate);
    qb.push(" ORDER BY task_id");
    debug!("Task query: {}", qb.sql());

    let rows: Vec<TaskRow> = qb.build_query_as().fetch_all(&self.pool).await?;
    rows.into_iter().map(TaskRecord::try_from).collect()
  }

  async fn exists(&self, key: ResourceKey) -> Result<bool> {
    let (sql, id) = match key {
      ResourceKey::Task(id) => ("SELECT EXISTS(SELECT 1 FROM host_role_command WHERE task_id = $1)", id),
      ResourceKey::Stage(id) => ("SELECT EXISTS(SELECT 1 FROM host_role_command WHERE stage_id = $1)", id),
      ResourceKey::Request(id) => ("SELECT EXISTS(SELECT 1 FROM host_role_command WHERE request_id = $1)", id),
    };
    let found: bool = sqlx::query_scalar(sql).bind(id).fetch_one(&self.pool).await?;
    Ok(found)
  }
}

#[async_trait]
impl StatusSink for PgTaskStore {
  async fn apply(&self, report: &StatusReport) -> Result<TaskRecord> {
    let mut tx = self.pool.begin().await?;

    let row: Option<TaskRow> = sqlx::query_as(&format!("{} WHERE task_id = $1 FOR UPDATE", SELECT_TASKS))
      .bind(report.task_id)
      .fetch_optional(&mut *tx)
      .await?;
    let mut task = TaskRecord::try_from(row.ok_or(TaskError::NoSuchResource(ResourceKey::Task(report.task_id)))?)?;

    // a rejected transition drops the transaction, which rolls back the lock
    task.apply(report, Utc::now().timestamp_millis())?;

    sqlx::query(
      "UPDATE host_role_command SET status = $2, exit_code = $3, std_out = $4, std_error = $5, \
       structured_out = $6, start_time = $7, end_time = $8, attempt_count = $9 WHERE task_id = $1",
    )
    .bind(task.task_id)
    .bind(task.status.as_str())
    .bind(task.exit_code)
    .bind(&task.stdout)
    .bind(&task.stderr)
    .bind(&task.structured_out)
    .bind(task.start_time)
    .bind(task.end_time)
    .bind(task.attempt_count)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(task)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::predicate::{CompiledConstraints, Constraint, ConstraintOp};

  fn sql_for(constraints: &[Constraint]) -> String {
    let compiled = CompiledConstraints::compile(constraints).unwrap();
    let mut qb = QueryBuilder::<Postgres>::new("");
    push_predicate(&mut qb, &compiled.predicate);
    qb.sql().to_string()
  }

  #[test]
  fn empty_predicate_selects_everything() {
    assert_eq!(sql_for(&[]), "TRUE");
  }

  #[test]
  fn constraints_render_as_bound_conjunction() {
    let sql = sql_for(&[
      Constraint::equals("Tasks/request_id", "5"),
      Constraint::is_in("Tasks/status", ["FAILED", "ABORTED"]),
      Constraint::new("Tasks/start_time", ConstraintOp::Ge("100".into())),
      Constraint::new("Tasks/host_name", ConstraintOp::IsNull),
    ]);
    assert_eq!(
      sql,
      "(request_id = $1) AND (status IN ($2, $3)) AND (start_time >= $4) AND (host_name IS NULL)"
    );
  }

  #[test]
  fn command_detail_filters_on_derived_expression() {
    let sql = sql_for(&[Constraint::equals("Tasks/command_detail", "NAMENODE START")]);
    assert_eq!(sql, "COALESCE(command_detail, role || ' ' || role_command) = $1");
  }

  #[test]
  fn log_columns_compare_null_as_empty() {
    let sql = sql_for(&[Constraint::equals("Tasks/stdout", ""), Constraint::equals("Tasks/stderr", "")]);
    assert_eq!(sql, "(COALESCE(std_out, '') = $1) AND (COALESCE(std_error, '') = $2)");
  }

  fn row(status: &str, role_command: &str) -> TaskRow {
    TaskRow {
      task_id: 3,
      request_id: 1,
      stage_id: 1,
      host_name: None,
      role: "NAMENODE".into(),
      role_command: role_command.into(),
      status: status.into(),
      exit_code: None,
      std_out: None,
      std_error: None,
      output_log: None,
      error_log: None,
      structured_out: None,
      start_time: None,
      end_time: None,
      attempt_count: 0,
      custom_command_name: None,
      command_detail: None,
    }
  }

  #[test]
  fn unknown_status_is_a_corrupt_record() {
    assert!(matches!(TaskRecord::try_from(row("EXPLODED", "START")), Err(TaskError::CorruptRecord { task_id: 3, .. })));
  }

  #[test]
  fn non_canonical_names_are_corrupt_records() {
    assert!(matches!(TaskRecord::try_from(row("COMPLETED", "start")), Err(TaskError::CorruptRecord { .. })));
    assert!(matches!(TaskRecord::try_from(row("completed", "START")), Err(TaskError::CorruptRecord { .. })));

    let task = TaskRecord::try_from(row("COMPLETED", "START")).unwrap();
    assert_eq!(task.command_detail(), "NAMENODE START");
    assert_eq!(task.stdout, "");
  }
}
