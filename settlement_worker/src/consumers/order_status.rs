use std::sync::Arc;

use escrow_engine::{
    settlement::{SettlementMessage, OP_ORDER_PAYMENT_STATUS, OP_UPDATE_ORDER_STATUS},
    traits::{CacheInvalidator, Notifier, OrderFulfilmentDatabase},
    SqliteDatabase,
};
use log::info;

use crate::{
    consumer::Dispatcher,
    errors::WorkerError,
    sinks::{LogNotifier, NullCache},
};

/// Handlers for the `order_status` domain: cross-service status sync plus the
/// cache invalidation and push fan-out that ride along with it.
pub fn order_status_dispatcher(db: SqliteDatabase, cache: NullCache, notifier: LogNotifier) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();

    let sync_db = db.clone();
    dispatcher.register(
        OP_UPDATE_ORDER_STATUS,
        Arc::new(move |msg| {
            let db = sync_db.clone();
            let cache = cache.clone();
            let notifier = notifier.clone();
            Box::pin(async move {
                let SettlementMessage::UpdateOrderStatus(update) = msg else {
                    return Err(WorkerError::UnexpectedPayload(OP_UPDATE_ORDER_STATUS.to_string()));
                };
                db.sync_order_status(&update).await?;
                info!("🧾️ Order {} synced to {}", update.order_id, update.order_status);
                // The row is the source of truth; cache and push are best effort.
                cache.delete(&update.cache_keys).await;
                for n in &update.notification_data {
                    notifier.send(&n.tokens, &n.title, &n.body).await;
                }
                Ok(())
            })
        }),
    );

    dispatcher.register(
        OP_ORDER_PAYMENT_STATUS,
        Arc::new(move |msg| {
            let db = db.clone();
            Box::pin(async move {
                let SettlementMessage::OrderPaymentStatus(update) = msg else {
                    return Err(WorkerError::UnexpectedPayload(OP_ORDER_PAYMENT_STATUS.to_string()));
                };
                db.set_order_payment_status(&update.order_id, update.order_payment_status).await?;
                info!("🧾️ Order {} payment is now {}", update.order_id, update.order_payment_status);
                Ok(())
            })
        }),
    );

    dispatcher
}
