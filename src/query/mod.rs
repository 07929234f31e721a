//! Read path over the task store: constraints in, projected views out.

pub mod predicate;
pub mod syntax;
pub mod view;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, TaskError};
use crate::output::OutputParser;
use crate::store::TaskStore;
use predicate::{CompiledConstraints, Constraint};
use view::{Projection, TaskView, TaskViewBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
  pub offset: usize,
  pub limit: usize,
}

/// Constraints, requested fields and an optional page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
  pub constraints: Vec<Constraint>,
  pub fields: Vec<String>,
  pub page: Option<Page>,
}

impl TaskQuery {
  pub fn new(constraints: Vec<Constraint>) -> Self {
    Self { constraints, ..Self::default() }
  }

  pub fn fields<I, S>(mut self, fields: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.fields = fields.into_iter().map(Into::into).collect();
    self
  }

  pub fn page(mut self, offset: usize, limit: usize) -> Self {
    self.page = Some(Page { offset, limit });
    self
  }
}

pub struct TaskQueryEngine {
  store: Arc<dyn TaskStore>,
  views: TaskViewBuilder,
  store_timeout: Duration,
}

impl TaskQueryEngine {
  pub fn new(store: Arc<dyn TaskStore>, parser: Arc<dyn OutputParser>, store_timeout: Duration) -> Self {
    Self {
      store,
      views: TaskViewBuilder::new(parser),
      store_timeout,
    }
  }

  /// Views of every task satisfying all constraints, ordered by task id.
  pub async fn query(&self, query: &TaskQuery) -> Result<Vec<TaskView>> {
    let compiled = CompiledConstraints::compile(&query.constraints)?;
    let projection = Projection::resolve(query.fields.as_slice())?;

    let mut records = self.bounded(self.store.find_matching(&compiled.predicate)).await?;
    debug!("Retrieved {} tasks for {:?}", records.len(), compiled.predicate);

    if records.is_empty() {
      for key in compiled.predicate.addressed_keys() {
        if !self.bounded(self.store.exists(key)).await? {
          return Err(TaskError::NoSuchResource(key));
        }
      }
      return Ok(Vec::new());
    }

    let mut seen = HashSet::with_capacity(records.len());
    records.retain(|record| seen.insert(record.task_id));
    records.sort_by_key(|record| record.task_id);

    let (offset, limit) = match query.page {
      Some(page) => (page.offset, page.limit),
      None => (0, usize::MAX),
    };
    let cluster_name = compiled.cluster_name.as_deref();
    Ok(
      records
        .iter()
        .skip(offset)
        .take(limit)
        .map(|record| self.views.build(record, cluster_name, &projection))
        .collect(),
    )
  }

  /// Tasks are created by the dispatch side only.
  pub fn create(&self, _properties: &Map<String, Value>) -> Result<()> {
    Err(TaskError::OperationNotSupported("tasks cannot be created through the query API"))
  }

  pub fn update(&self, _properties: &Map<String, Value>, _constraints: &[Constraint]) -> Result<()> {
    Err(TaskError::OperationNotSupported("tasks cannot be updated through the query API"))
  }

  pub fn delete(&self, _constraints: &[Constraint]) -> Result<()> {
    Err(TaskError::OperationNotSupported("tasks cannot be deleted through the query API"))
  }

  async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(self.store_timeout, call)
      .await
      .map_err(|_| {
        TaskError::StoreUnavailable(format!("no answer within {} ms", self.store_timeout.as_millis()))
      })?
  }
}
