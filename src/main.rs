use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use task_tracker::config::Config;
use task_tracker::database::setup_database;
use task_tracker::output::JsonOutputParser;
use task_tracker::query::TaskQueryEngine;
use task_tracker::routes::routes;
use task_tracker::store::PgTaskStore;
use task_tracker::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
  init_tracing();
  let config = Config::from_env()?;
  let db_pool = setup_database(&config.database_url, config.store_timeout).await?;

  let engine = Arc::new(TaskQueryEngine::new(
    Arc::new(PgTaskStore::new(db_pool)),
    Arc::new(JsonOutputParser),
    config.store_timeout,
  ));
  let api = routes(engine, config.default_page_size);

  info!("Serving task queries on port {}", config.server_port);
  warp::serve(api)
    .run(([0, 0, 0, 0], config.server_port))
    .await;
  Ok(())
}
