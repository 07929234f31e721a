use std::sync::Arc;

use anyhow::{Context, Result};
use task_tracker::config::Config;
use task_tracker::database::setup_database;
use task_tracker::ingest::run_consumer;
use task_tracker::messaging::{create_rabbit_channel, open_consumer};
use task_tracker::store::PgTaskStore;
use task_tracker::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
  init_tracing();
  let config = Config::from_env()?;
  let db_pool = setup_database(&config.database_url, config.store_timeout).await?;

  let rabbit_channel = create_rabbit_channel(&config.rabbitmq_url)
    .await
    .context("Failed to create RabbitMQ channel")?;
  let consumer = open_consumer(&rabbit_channel, &config.status_queue, "task_tracker_ingest")
    .await
    .context("Failed to start status consumer")?;

  run_consumer(consumer, Arc::new(PgTaskStore::new(db_pool))).await;
  Ok(())
}
