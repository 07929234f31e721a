use lapin::options::{BasicConsumeOptions, BasicQosOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::info;
use anyhow::Result;

static MAX_RETRIES: usize = 5;
static DELAY: u64 = 100;

pub async fn create_rabbit_channel(rabbitmq_url: &str) -> Result<Channel> {
  let conn = Retry::spawn(ExponentialBackoff::from_millis(DELAY).take(MAX_RETRIES), || {
    Connection::connect(rabbitmq_url, ConnectionProperties::default())
  })
    .await?;
  let channel = conn.create_channel().await?;
  info!("RabbitMQ channel created");
  Ok(channel)
}

/// Declares `queue` and consumes it one message at a time, so reports for
/// the same task are applied in the order they were published.
pub async fn open_consumer(channel: &Channel, queue: &str, consumer_tag: &str) -> Result<Consumer> {
  let declare = QueueDeclareOptions { durable: true, ..QueueDeclareOptions::default() };
  Retry::spawn(ExponentialBackoff::from_millis(DELAY).take(MAX_RETRIES), || async {
    channel.queue_declare(queue, declare, FieldTable::default()).await
  })
    .await?;
  channel.basic_qos(1, BasicQosOptions::default()).await?;
  let consumer = channel
    .basic_consume(queue, consumer_tag, BasicConsumeOptions::default(), FieldTable::default())
    .await?;
  info!("Consuming status reports from {}", queue);
  Ok(consumer)
}
