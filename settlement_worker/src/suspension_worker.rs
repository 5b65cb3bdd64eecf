//! Periodic sweep that suspends three-strike cancellers and lifts expired
//! suspensions.

use std::time::Duration;

use escrow_engine::{OrderFlowApi, SqliteDatabase};
use log::{error, info};
use tokio::task::JoinHandle;

use crate::amqp::AmqpProducer;

pub fn spawn(api: OrderFlowApi<SqliteDatabase, AmqpProducer>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match api.sweep_suspensions().await {
                Ok((suspended, reset)) => {
                    if !suspended.is_empty() || reset > 0 {
                        info!("🚫️ Suspension sweep: {} suspended, {reset} reinstated", suspended.len());
                    }
                },
                Err(e) => error!("🚫️ Suspension sweep failed: {e}"),
            }
        }
    })
}
