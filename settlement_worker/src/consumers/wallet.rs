use std::sync::Arc;

use escrow_engine::{
    settlement::{SettlementMessage, OP_CREATE_TRANSACTION, OP_UPDATE_TRANSACTION, OP_UPDATE_WALLET},
    traits::EscrowLedgerDatabase,
    SqliteDatabase,
};
use log::info;

use crate::{consumer::Dispatcher, errors::WorkerError};

/// Handlers for the `wallet` domain: balance adjustments and the transaction
/// audit trail.
pub fn wallet_dispatcher(db: SqliteDatabase) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();

    let wallet_db = db.clone();
    dispatcher.register(
        OP_UPDATE_WALLET,
        Arc::new(move |msg| {
            let db = wallet_db.clone();
            Box::pin(async move {
                let SettlementMessage::UpdateWallet(update) = msg else {
                    return Err(WorkerError::UnexpectedPayload(OP_UPDATE_WALLET.to_string()));
                };
                let wallet =
                    db.adjust_wallet(update.wallet_id, update.balance_change, update.escrow_change).await?;
                info!(
                    "💳️ Wallet {} adjusted by {} / {} escrow. Balance is now {}",
                    wallet.id, update.balance_change, update.escrow_change, wallet.balance
                );
                Ok(())
            })
        }),
    );

    let tx_db = db.clone();
    dispatcher.register(
        OP_CREATE_TRANSACTION,
        Arc::new(move |msg| {
            let db = tx_db.clone();
            Box::pin(async move {
                let SettlementMessage::CreateTransaction(tx) = msg else {
                    return Err(WorkerError::UnexpectedPayload(OP_CREATE_TRANSACTION.to_string()));
                };
                let record = db.insert_transaction(tx).await?;
                info!("💳️ Recorded transaction {} for {}", record.tx_ref, record.amount);
                Ok(())
            })
        }),
    );

    dispatcher.register(
        OP_UPDATE_TRANSACTION,
        Arc::new(move |msg| {
            let db = db.clone();
            Box::pin(async move {
                let SettlementMessage::UpdateTransaction(patch) = msg else {
                    return Err(WorkerError::UnexpectedPayload(OP_UPDATE_TRANSACTION.to_string()));
                };
                let record = db.apply_transaction_update(&patch).await?;
                info!("💳️ Transaction {} is now {}", record.tx_ref, record.payment_status);
                Ok(())
            })
        }),
    );

    dispatcher
}
