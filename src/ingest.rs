//! Entry point for status reports from the dispatch side.

use std::sync::Arc;

use futures::StreamExt;
use lapin::Consumer;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use tracing::{error, info, warn};

use crate::error::TaskError;
use crate::models::StatusReport;
use crate::store::StatusSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
  Ack,
  Requeue,
}

/// Decodes and applies one report. Only store outages are requeued; a report
/// that can never apply (malformed, unknown task, illegal transition) is
/// acknowledged so it does not loop.
pub async fn handle_delivery(sink: &dyn StatusSink, data: &[u8]) -> Disposition {
  let report: StatusReport = match serde_json::from_slice(data) {
    Ok(report) => report,
    Err(e) => {
      error!("Discarding malformed status report: {:?}", e);
      return Disposition::Ack;
    }
  };

  match sink.apply(&report).await {
    Ok(task) => {
      info!("Task {} is now {} (attempt {})", task.task_id, task.status, task.attempt_count);
      Disposition::Ack
    }
    Err(TaskError::StoreUnavailable(e)) => {
      error!("Store unavailable while applying report for task {}: {}", report.task_id, e);
      Disposition::Requeue
    }
    Err(e) => {
      warn!("Rejected status report for task {}: {}", report.task_id, e);
      Disposition::Ack
    }
  }
}

pub async fn run_consumer(mut consumer: Consumer, sink: Arc<dyn StatusSink>) {
  while let Some(delivery) = consumer.next().await {
    match delivery {
      Ok(delivery) => {
        let settled = match handle_delivery(sink.as_ref(), &delivery.data).await {
          Disposition::Ack => delivery.ack(BasicAckOptions::default()).await,
          Disposition::Requeue => {
            delivery
              .nack(BasicNackOptions { requeue: true, ..BasicNackOptions::default() })
              .await
          }
        };
        if let Err(e) = settled {
          error!("Failed to settle delivery {}: {:?}", delivery.delivery_tag, e);
        }
      }
      Err(e) => error!("Consumer error: {:?}", e),
    }
  }
  info!("Status consumer stopped");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Result;
  use crate::models::{RoleCommand, TaskRecord};
  use crate::query::predicate::Predicate;
  use crate::state::TaskStatus;
  use crate::store::{MemoryTaskStore, TaskStore};
  use async_trait::async_trait;

  struct OfflineSink;

  #[async_trait]
  impl StatusSink for OfflineSink {
    async fn apply(&self, _report: &StatusReport) -> Result<TaskRecord> {
      Err(TaskError::StoreUnavailable("connection refused".into()))
    }
  }

  fn store() -> MemoryTaskStore {
    MemoryTaskStore::with_tasks([TaskRecord::pending(1, 1, 1, Some("h1"), "KAFKA_BROKER", RoleCommand::Start)])
  }

  #[tokio::test]
  async fn applies_valid_report() {
    let store = store();
    let body = br#"{"task_id": 1, "status": "COMPLETED", "exit_code": 0, "reported_at": 99}"#;
    assert_eq!(handle_delivery(&store, body).await, Disposition::Ack);

    let tasks = store.find_matching(&Predicate::all()).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert_eq!(tasks[0].exit_code, Some(0));
    assert_eq!(tasks[0].end_time, Some(99));
  }

  #[tokio::test]
  async fn malformed_and_illegal_reports_are_dropped() {
    let store = store();
    assert_eq!(handle_delivery(&store, b"{not json").await, Disposition::Ack);
    assert_eq!(handle_delivery(&store, br#"{"task_id": 1, "status": "DONE"}"#).await, Disposition::Ack);
    assert_eq!(handle_delivery(&store, br#"{"task_id": 8, "status": "QUEUED"}"#).await, Disposition::Ack);

    handle_delivery(&store, br#"{"task_id": 1, "status": "ABORTED"}"#).await;
    assert_eq!(handle_delivery(&store, br#"{"task_id": 1, "status": "IN_PROGRESS"}"#).await, Disposition::Ack);

    let tasks = store.find_matching(&Predicate::all()).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Aborted);
  }

  #[tokio::test]
  async fn redispatch_message_resets_running_task() {
    let store = store();
    handle_delivery(&store, br#"{"task_id": 1, "status": "IN_PROGRESS", "reported_at": 5}"#).await;

    let body = br#"{"task_id": 1, "redispatch": "QUEUED"}"#;
    assert_eq!(handle_delivery(&store, body).await, Disposition::Ack);

    let tasks = store.find_matching(&Predicate::all()).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Queued);
    assert_eq!(tasks[0].attempt_count, 1);
    assert_eq!(tasks[0].start_time, None);
  }

  #[tokio::test]
  async fn store_outage_is_requeued() {
    let body = br#"{"task_id": 1, "status": "QUEUED"}"#;
    assert_eq!(handle_delivery(&OfflineSink, body).await, Disposition::Requeue);
  }
}
