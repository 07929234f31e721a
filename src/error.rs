use thiserror::Error;

use crate::state::TaskStatus;

/// Identifiers a caller can address explicitly in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
  Task(i64),
  Stage(i64),
  Request(i64),
}

impl std::fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ResourceKey::Task(id) => write!(f, "task {}", id),
      ResourceKey::Stage(id) => write!(f, "stage {}", id),
      ResourceKey::Request(id) => write!(f, "request {}", id),
    }
  }
}

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("task store unavailable: {0}")]
  StoreUnavailable(String),
  #[error("no such resource: {0}")]
  NoSuchResource(ResourceKey),
  #[error("unsupported predicate: {0}")]
  UnsupportedPredicate(String),
  #[error("operation not supported: {0}")]
  OperationNotSupported(&'static str),
  #[error("invalid state transition for task {task_id}: {from} -> {to}")]
  InvalidStateTransition {
    task_id: i64,
    from: TaskStatus,
    to: TaskStatus,
  },
  #[error("query spans more than one cluster: {}", .0.join(", "))]
  AmbiguousScope(Vec<String>),
  #[error("corrupt record for task {task_id}: {reason}")]
  CorruptRecord { task_id: i64, reason: String },
}

impl From<sqlx::Error> for TaskError {
  fn from(err: sqlx::Error) -> Self {
    TaskError::StoreUnavailable(err.to_string())
  }
}

pub type Result<T> = std::result::Result<T, TaskError>;
