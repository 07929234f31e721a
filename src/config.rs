use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub rabbitmq_url: String,
  pub server_port: u16,
  pub store_timeout: Duration,
  pub default_page_size: usize,
  pub status_queue: String,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    Ok(Self {
      database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
      rabbitmq_url: env::var("RABBITMQ_URL").unwrap_or_else(|_| "amqp://127.0.0.1:5672/%2f".into()),
      server_port: parse_or("SERVER_PORT", 8080)?,
      store_timeout: Duration::from_millis(parse_or("STORE_TIMEOUT_MS", 5000)?),
      default_page_size: parse_or("DEFAULT_PAGE_SIZE", 100)?,
      status_queue: env::var("STATUS_QUEUE").unwrap_or_else(|_| "task_status".into()),
    })
  }
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
  T: std::str::FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  match env::var(name) {
    Ok(raw) => raw.parse().with_context(|| format!("{} has an invalid value '{}'", name, raw)),
    Err(_) => Ok(default),
  }
}
