//! The generic consume loop: pull deliveries off a service domain's work
//! queue, validate the envelope, and dispatch to the registered handler.
//!
//! Acking policy: handler success acks. Handler failure requeues through the
//! first [`MAX_DELIVERY_ATTEMPTS`] deliveries; once a message has failed all
//! of them it is rejected without requeue so the broker dead-letters it.
//! Poison messages (undecodable bytes, unknown operations, payloads that fail
//! typed validation) skip the retries and go straight to the dead-letter
//! queue.

use std::{collections::HashMap, sync::Arc};

use escrow_engine::settlement::{updates_queue, SettlementEnvelope, SettlementMessage};
use futures_util::{future::BoxFuture, StreamExt};
use lapin::{
    message::Delivery,
    options::{BasicConsumeOptions, BasicNackOptions, BasicQosOptions, BasicRejectOptions},
    types::{AMQPValue, FieldTable},
    Channel,
};
use log::{debug, error, info, warn};

use crate::errors::WorkerError;

/// A failing message is retried through this many deliveries before the next
/// one dead-letters it.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Requeue,
    DeadLetter,
}

/// What to do with a delivery whose handler failed, given how many times the
/// broker has delivered it.
pub fn failure_disposition(attempts: u32) -> Disposition {
    if attempts <= MAX_DELIVERY_ATTEMPTS {
        Disposition::Requeue
    } else {
        Disposition::DeadLetter
    }
}

/// Best-effort delivery attempt count. Quorum queues stamp `x-delivery-count`
/// with the number of previous deliveries. Failing that, a message that has
/// cycled through a dead-letter exchange carries `x-death` counts. Classic
/// queues without either header only give us the redelivered flag, so there a
/// redelivery counts as the second attempt and the broker's 24 h queue TTL is
/// the backstop against a message requeueing forever.
pub fn delivery_attempts(delivery: &Delivery) -> u32 {
    attempts_from(delivery.properties.headers().as_ref(), delivery.redelivered)
}

fn attempts_from(headers: Option<&FieldTable>, redelivered: bool) -> u32 {
    let header = |name: &str| headers.and_then(|h| h.inner().iter().find(|(k, _)| k.as_str() == name)).map(|(_, v)| v);
    if let Some(n) = int_header(header("x-delivery-count")) {
        return n + 1;
    }
    let deaths = match header("x-death") {
        Some(AMQPValue::FieldArray(entries)) => entries
            .as_slice()
            .iter()
            .filter_map(|entry| match entry {
                AMQPValue::FieldTable(t) => {
                    int_header(t.inner().iter().find(|(k, _)| k.as_str() == "count").map(|(_, v)| v))
                },
                _ => None,
            })
            .max(),
        _ => None,
    };
    match deaths {
        Some(n) => n + 1,
        None if redelivered => 2,
        None => 1,
    }
}

fn int_header(value: Option<&AMQPValue>) -> Option<u32> {
    match value {
        Some(AMQPValue::LongLongInt(n)) => Some(*n as u32),
        Some(AMQPValue::LongInt(n)) => Some(*n as u32),
        Some(AMQPValue::LongUInt(n)) => Some(*n),
        _ => None,
    }
}

pub type Handler = Arc<dyn Fn(SettlementMessage) -> BoxFuture<'static, Result<(), WorkerError>> + Send + Sync>;

enum ConsumeError {
    /// Never retryable: malformed or unrecognised message.
    Poison(String),
    Handler(WorkerError),
}

/// Routes validated messages to per-operation handlers.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation: &str, handler: Handler) {
        self.handlers.insert(operation.to_string(), handler);
    }

    async fn dispatch(&self, envelope: &SettlementEnvelope) -> Result<(), ConsumeError> {
        let message = envelope.message().map_err(|e| ConsumeError::Poison(e.to_string()))?;
        let handler = self
            .handlers
            .get(&envelope.operation)
            .ok_or_else(|| ConsumeError::Poison(format!("no handler registered for {}", envelope.operation)))?;
        handler(message).await.map_err(ConsumeError::Handler)
    }
}

/// Consumes a service domain's work queue until the stream closes.
pub async fn run(channel: Channel, service: &str, dispatcher: Arc<Dispatcher>, prefetch: u16) -> Result<(), WorkerError> {
    channel.basic_qos(prefetch, BasicQosOptions::default()).await?;
    let queue = updates_queue(service);
    let mut consumer = channel
        .basic_consume(&queue, &format!("{service}_worker"), BasicConsumeOptions::default(), FieldTable::default())
        .await?;
    info!("🔄️ Consuming {queue}");
    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;
        handle_delivery(&dispatcher, delivery).await?;
    }
    warn!("🔄️ Consumer stream for {queue} closed");
    Ok(())
}

async fn handle_delivery(dispatcher: &Dispatcher, delivery: Delivery) -> Result<(), WorkerError> {
    let envelope = match SettlementEnvelope::decode(&delivery.data) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!("🔄️ Dead-lettering undecodable message: {e}");
            delivery.reject(BasicRejectOptions { requeue: false }).await?;
            return Ok(());
        },
    };
    match dispatcher.dispatch(&envelope).await {
        Ok(()) => {
            debug!("🔄️ Applied {}", envelope.operation);
            delivery.ack(Default::default()).await?;
        },
        Err(ConsumeError::Poison(reason)) => {
            error!("🔄️ Dead-lettering poison message ({}): {reason}", envelope.operation);
            delivery.reject(BasicRejectOptions { requeue: false }).await?;
        },
        Err(ConsumeError::Handler(e)) => {
            let attempts = delivery_attempts(&delivery);
            match failure_disposition(attempts) {
                Disposition::Requeue => {
                    warn!("🔄️ {} failed on attempt {attempts}, requeueing: {e}", envelope.operation);
                    delivery.nack(BasicNackOptions { requeue: true, ..Default::default() }).await?;
                },
                _ => {
                    error!("🔄️ {} failed on attempt {attempts}, dead-lettering: {e}", envelope.operation);
                    delivery.reject(BasicRejectOptions { requeue: false }).await?;
                },
            }
        },
    }
    Ok(())
}
