//! Broker plumbing: the topology contract and the producer side of the
//! settlement pipeline.
//!
//! One durable direct exchange (`central_operations`) carries all traffic.
//! Each service domain gets a work queue bound with the domain name as the
//! routing key, a 24 hour TTL, and a dead-letter exchange feeding the
//! domain's `failed_<domain>_updates` queue.

use std::time::Duration;

use escrow_engine::settlement::{
    dead_letter_exchange,
    dead_letter_queue,
    updates_queue,
    SettlementError,
    SettlementMessage,
    SettlementSink,
    CENTRAL_EXCHANGE,
    MESSAGE_TTL_MS,
};
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
    BasicProperties,
    Channel,
    Connection,
    ConnectionProperties,
    ExchangeKind,
};
use log::{info, warn};

use crate::errors::WorkerError;

pub async fn connect(url: &str) -> Result<Connection, WorkerError> {
    let conn = Connection::connect(url, ConnectionProperties::default()).await?;
    info!("🐇️ Connected to AMQP at {url}");
    Ok(conn)
}

/// Declares the exchange, work queue and dead-letter pair for a service
/// domain. Idempotent; every worker declares on startup.
pub async fn declare_topology(channel: &Channel, service: &str) -> Result<(), WorkerError> {
    let durable = ExchangeDeclareOptions { durable: true, ..Default::default() };
    channel.exchange_declare(CENTRAL_EXCHANGE, ExchangeKind::Direct, durable, FieldTable::default()).await?;

    let dlx = dead_letter_exchange(service);
    let dlq = dead_letter_queue(service);
    channel.exchange_declare(&dlx, ExchangeKind::Direct, durable, FieldTable::default()).await?;
    channel
        .queue_declare(&dlq, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
        .await?;
    channel.queue_bind(&dlq, &dlx, &dlq, QueueBindOptions::default(), FieldTable::default()).await?;

    let mut args = FieldTable::default();
    args.insert("x-message-ttl".into(), AMQPValue::LongUInt(MESSAGE_TTL_MS));
    args.insert("x-dead-letter-exchange".into(), AMQPValue::LongString(dlx.clone().into()));
    args.insert("x-dead-letter-routing-key".into(), AMQPValue::LongString(dlq.clone().into()));
    let queue = updates_queue(service);
    channel.queue_declare(&queue, QueueDeclareOptions { durable: true, ..Default::default() }, args).await?;
    channel.queue_bind(&queue, CENTRAL_EXCHANGE, service, QueueBindOptions::default(), FieldTable::default()).await?;

    info!("🐇️ Declared topology for {service}: {queue} (dead letters to {dlq})");
    Ok(())
}

const MAX_PUBLISH_ATTEMPTS: u64 = 3;

/// The AMQP-backed [`SettlementSink`]. Publishes persistent messages with
/// publisher confirms and a short bounded retry.
#[derive(Clone)]
pub struct AmqpProducer {
    channel: Channel,
}

impl AmqpProducer {
    pub async fn new(conn: &Connection) -> Result<Self, WorkerError> {
        let channel = conn.create_channel().await?;
        channel.confirm_select(ConfirmSelectOptions::default()).await?;
        let durable = ExchangeDeclareOptions { durable: true, ..Default::default() };
        channel.exchange_declare(CENTRAL_EXCHANGE, ExchangeKind::Direct, durable, FieldTable::default()).await?;
        Ok(Self { channel })
    }
}

impl SettlementSink for AmqpProducer {
    async fn publish(&self, message: SettlementMessage) -> Result<(), SettlementError> {
        let routing_key = message.routing_key();
        let operation = message.operation();
        let payload = message.into_envelope()?.encode()?;
        for attempt in 1..=MAX_PUBLISH_ATTEMPTS {
            let properties =
                BasicProperties::default().with_content_type("application/json".into()).with_delivery_mode(2);
            let result = self
                .channel
                .basic_publish(CENTRAL_EXCHANGE, &routing_key, BasicPublishOptions::default(), &payload, properties)
                .await;
            match result {
                Ok(confirm) => match confirm.await {
                    Ok(_) => return Ok(()),
                    Err(e) => warn!("🐇️ Publish confirm failed for {operation} (attempt {attempt}): {e}"),
                },
                Err(e) => warn!("🐇️ Publish failed for {operation} (attempt {attempt}): {e}"),
            }
            tokio::time::sleep(Duration::from_millis(100 * attempt)).await;
        }
        Err(SettlementError::Publish(format!(
            "gave up publishing {operation} to {routing_key} after {MAX_PUBLISH_ATTEMPTS} attempts"
        )))
    }
}
