use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{ResourceKey, Result, TaskError};
use crate::models::{StatusReport, TaskRecord};
use crate::query::predicate::Predicate;
use crate::store::{StatusSink, TaskStore};

/// Task store kept in process memory, keyed by task id.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
  tasks: RwLock<BTreeMap<i64, TaskRecord>>,
}

impl MemoryTaskStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_tasks(tasks: impl IntoIterator<Item = TaskRecord>) -> Self {
    Self {
      tasks: RwLock::new(tasks.into_iter().map(|task| (task.task_id, task)).collect()),
    }
  }

  /// Seeds a record as the dispatch side would when a stage is sent out.
  pub async fn insert(&self, task: TaskRecord) {
    self.tasks.write().await.insert(task.task_id, task);
  }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
  async fn find_matching(&self, predicate: &Predicate) -> Result<Vec<TaskRecord>> {
    let tasks = self.tasks.read().await;
    Ok(tasks.values().filter(|task| predicate.matches(task)).cloned().collect())
  }

  async fn exists(&self, key: ResourceKey) -> Result<bool> {
    let tasks = self.tasks.read().await;
    Ok(match key {
      ResourceKey::Task(id) => tasks.contains_key(&id),
      ResourceKey::Stage(id) => tasks.values().any(|task| task.stage_id == id),
      ResourceKey::Request(id) => tasks.values().any(|task| task.request_id == id),
    })
  }
}

#[async_trait]
impl StatusSink for MemoryTaskStore {
  async fn apply(&self, report: &StatusReport) -> Result<TaskRecord> {
    let mut tasks = self.tasks.write().await;
    let task = tasks
      .get_mut(&report.task_id)
      .ok_or(TaskError::NoSuchResource(ResourceKey::Task(report.task_id)))?;
    task.apply(report, Utc::now().timestamp_millis())?;
    Ok(task.clone())
  }
}
