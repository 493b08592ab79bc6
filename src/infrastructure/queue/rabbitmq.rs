use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{
    options::*, BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct RabbitMqService {
    url: String,
    conn: Arc<Mutex<Connection>>,
    channel: Arc<Mutex<Channel>>,
}

impl RabbitMqService {
    async fn connect(url: &str) -> Result<(Connection, Channel)> {
        info!("Connecting to RabbitMQ at {}", url);
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create channel: {}", e))?;

        info!("✅ Connected to RabbitMQ");
        Ok((conn, channel))
    }

    pub async fn new(url: &str) -> Result<Self> {
        let (conn, channel) = Self::connect(url).await?;

        Ok(Self {
            url: url.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            channel: Arc::new(Mutex::new(channel)),
        })
    }

    async fn reconnect(&self) -> Result<()> {
        warn!("RabbitMQ connection dropped, reconnecting...");
        let (conn, channel) = Self::connect(&self.url).await?;
        *self.conn.lock().await = conn;
        *self.channel.lock().await = channel;
        Ok(())
    }

    /// Spawns the consumer loop: declares the durable consume queue (dead-lettered
    /// to `dead_letter_exchange`) and forwards every delivery into `tx`. The loop
    /// reconnects and retries on broker errors and exits once `tx` is closed.
    pub fn start_consumer(
        &self,
        queue: String,
        dead_letter_exchange: String,
        consumer_tag: String,
        tx: mpsc::Sender<Delivery>,
    ) {
        let service = self.clone();

        tokio::spawn(async move {
            loop {
                let channel = service.channel.clone();
                let channel_guard = channel.lock().await;

                let mut queue_args = FieldTable::default();
                queue_args.insert(
                    "x-dead-letter-exchange".into(),
                    AMQPValue::LongString(dead_letter_exchange.clone().into()),
                );

                if let Err(e) = channel_guard
                    .queue_declare(
                        &queue,
                        QueueDeclareOptions {
                            durable: true,
                            ..QueueDeclareOptions::default()
                        },
                        queue_args,
                    )
                    .await
                {
                    error!("Failed to declare queue '{}': {}", queue, e);
                    drop(channel_guard);
                    if let Err(err) = service.reconnect().await {
                        warn!("Failed to reconnect RabbitMQ after declare error: {}", err);
                    }
                    sleep(Duration::from_secs(2)).await;
                    continue;
                }

                let mut consumer = match channel_guard
                    .basic_consume(
                        &queue,
                        &consumer_tag,
                        BasicConsumeOptions::default(),
                        FieldTable::default(),
                    )
                    .await
                {
                    Ok(consumer) => consumer,
                    Err(e) => {
                        error!("Failed to create consumer: {}", e);
                        drop(channel_guard);
                        if let Err(err) = service.reconnect().await {
                            warn!("Failed to reconnect RabbitMQ after consume error: {}", err);
                        }
                        sleep(Duration::from_secs(2)).await;
                        continue;
                    }
                };

                drop(channel_guard);

                info!("📡 Consuming from '{}'", queue);

                while let Some(delivery) = consumer.next().await {
                    match delivery {
                        Ok(delivery) => {
                            if tx.send(delivery).await.is_err() {
                                // Receiver gone: the service is shutting down.
                                return;
                            }
                        }
                        Err(e) => {
                            error!("Consumer error: {}", e);
                            break;
                        }
                    }
                }

                if tx.is_closed() {
                    return;
                }

                warn!("Consumer stopped, retrying in 2s...");
                if let Err(err) = service.reconnect().await {
                    warn!("Failed to reconnect RabbitMQ after consumer stop: {}", err);
                }
                sleep(Duration::from_secs(2)).await;
            }
        });
    }

    async fn publish_internal(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        content_type: &str,
    ) -> Result<()> {
        let channel = self.channel.lock().await;

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type(content_type.into())
                    .with_delivery_mode(2), // Persistent
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message: {}", e))?
            .await
            .map_err(|e| anyhow!("Failed to confirm publication: {}", e))?;

        Ok(())
    }

    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        content_type: &str,
    ) -> Result<()> {
        if let Err(e) = self
            .publish_internal(exchange, routing_key, payload, content_type)
            .await
        {
            warn!("RabbitMQ publish failed: {}. Retrying after reconnect.", e);
            self.reconnect().await?;
            self.publish_internal(exchange, routing_key, payload, content_type)
                .await?;
        }

        Ok(())
    }
}
