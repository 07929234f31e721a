pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::{ResourceKey, Result};
use crate::models::{StatusReport, TaskRecord};
use crate::query::predicate::Predicate;

pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;

/// Read access to persisted task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
  /// Records satisfying `predicate`, ordered by task id.
  async fn find_matching(&self, predicate: &Predicate) -> Result<Vec<TaskRecord>>;

  async fn exists(&self, key: ResourceKey) -> Result<bool>;
}

/// Write side used by the dispatch collaborator to record progress.
/// Nothing on the query path holds one of these.
#[async_trait]
pub trait StatusSink: Send + Sync {
  /// Applies the report atomically and returns the updated record.
  async fn apply(&self, report: &StatusReport) -> Result<TaskRecord>;
}
