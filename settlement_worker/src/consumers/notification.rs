use std::sync::Arc;

use escrow_engine::{
    settlement::{SettlementMessage, OP_SEND_NOTIFICATION},
    traits::Notifier,
};

use crate::{consumer::Dispatcher, errors::WorkerError, sinks::LogNotifier};

/// Handlers for the `notification` domain: direct push fan-out.
pub fn notification_dispatcher(notifier: LogNotifier) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(
        OP_SEND_NOTIFICATION,
        Arc::new(move |msg| {
            let notifier = notifier.clone();
            Box::pin(async move {
                let SettlementMessage::SendNotification(data) = msg else {
                    return Err(WorkerError::UnexpectedPayload(OP_SEND_NOTIFICATION.to_string()));
                };
                notifier.send(&data.tokens, &data.title, &data.body).await;
                Ok(())
            })
        }),
    );
    dispatcher
}
