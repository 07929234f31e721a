use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!();

/// Connects to the task store and brings `host_role_command` up to date.
pub async fn setup_database(database_url: &str, acquire_timeout: Duration) -> Result<Pool<Postgres>> {
  let pool = PgPoolOptions::new()
    .acquire_timeout(acquire_timeout)
    .connect(database_url)
    .await
    .context("Failed to connect to database.")?;

  MIGRATOR.run(&pool)
    .await
    .context("Failed to run database migrations.")?;
  info!("Database migrations complete");
  Ok(pool)
}
