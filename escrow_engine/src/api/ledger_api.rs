//! Wallet-facing operations: top-ups through the payment gateway, wallet
//! payments and full-balance withdrawals through the payout rail.

use log::{info, warn};
use mse_common::Naira;
use rand::{distributions::Alphanumeric, Rng};

use crate::{
    db_types::{Order, OrderId, Wallet, WalletTransaction},
    fees::withdrawal_net,
    settlement::{
        OrderPaymentUpdate,
        SettlementMessage,
        SettlementSink,
        TransactionUpdate,
        WalletUpdate,
    },
    traits::{EscrowLedgerDatabase, LedgerError, PaymentLinkProvider, PayoutProvider},
};

/// The largest single top-up the gateway will be asked for.
pub const MAX_TOP_UP: Naira = Naira::from_naira(100_000);

fn new_tx_ref(prefix: &str) -> String {
    let nonce: String = rand::thread_rng().sample_iter(&Alphanumeric).take(12).map(char::from).collect();
    format!("{prefix}-{nonce}")
}

/// The wallet and withdrawal API. Holds the ledger store and the settlement
/// sink; external collaborators are passed per call so implementations can be
/// swapped in tests.
#[derive(Debug, Clone)]
pub struct LedgerApi<B, S> {
    db: B,
    sink: S,
}

impl<B, S> LedgerApi<B, S>
where
    B: EscrowLedgerDatabase,
    S: SettlementSink,
{
    pub fn new(db: B, sink: S) -> Self {
        Self { db, sink }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub async fn balance(&self, user_id: i64) -> Result<Wallet, LedgerError> {
        self.db.fetch_or_create_wallet(user_id).await
    }

    /// Starts a wallet top-up: records the pending transaction and returns it
    /// together with the hosted payment link.
    pub async fn top_up(
        &self,
        user_id: i64,
        amount: Naira,
        payer_email: &str,
        gateway: &impl PaymentLinkProvider,
    ) -> Result<(WalletTransaction, String), LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("top-up amount must be positive, got {amount}")));
        }
        if amount > MAX_TOP_UP {
            return Err(LedgerError::InvalidAmount(format!("top-up amount {amount} exceeds the {MAX_TOP_UP} cap")));
        }
        let tx_ref = new_tx_ref("topup");
        let record = self.db.create_pending_top_up(user_id, amount, &tx_ref).await?;
        let link = gateway.generate_payment_link(&tx_ref, amount, payer_email).await?;
        info!("💰️ Top-up {tx_ref} for user {user_id} awaiting payment");
        Ok((record, link))
    }

    /// Confirms a top-up against the gateway and hands the resulting wallet
    /// and transaction mutations to the settlement pipeline.
    pub async fn confirm_top_up(
        &self,
        tx_ref: &str,
        gateway: &impl PaymentLinkProvider,
    ) -> Result<WalletTransaction, LedgerError> {
        let record = self.db.fetch_transaction(tx_ref).await?;
        if record.payment_status.is_settled() {
            return Err(LedgerError::Conflict(format!("top-up {tx_ref} is already settled")));
        }
        let status = gateway.verify_transaction(tx_ref).await?;
        let patch = TransactionUpdate {
            tx_ref: tx_ref.to_string(),
            payment_status: status,
            is_fund_wallet: true,
            payment_method: Some("card".to_string()),
            to_user: None,
        };
        self.publish(SettlementMessage::UpdateTransaction(patch)).await?;
        if status.is_settled() {
            self.publish(SettlementMessage::UpdateWallet(WalletUpdate {
                wallet_id: record.wallet_id,
                balance_change: record.amount,
                escrow_change: Naira::default(),
            }))
            .await?;
            info!("💰️ Top-up {tx_ref} confirmed as {status}; wallet credit queued");
        } else {
            warn!("💰️ Top-up {tx_ref} came back {status}");
        }
        Ok(record)
    }

    /// Pays for a pending order from the owner's spendable balance and queues
    /// the payment-status sync for the order service.
    pub async fn pay_with_wallet(&self, order_id: &OrderId) -> Result<(Order, WalletTransaction), LedgerError> {
        let (order, record) = self.db.pay_for_order_with_wallet(order_id).await?;
        self.publish(SettlementMessage::OrderPaymentStatus(OrderPaymentUpdate {
            order_id: order.order_id.clone(),
            order_payment_status: order.order_payment_status,
        }))
        .await?;
        Ok((order, record))
    }

    /// Withdraws the user's entire spendable balance: the tiered charge and
    /// VAT are deducted and the net amount sent over the payout rail. A failed
    /// transfer leaves the wallet untouched and the transaction marked failed.
    pub async fn withdraw(&self, user_id: i64, payout: &impl PayoutProvider) -> Result<WalletTransaction, LedgerError> {
        let wallet = self.db.fetch_or_create_wallet(user_id).await?;
        let charges = self.db.fetch_charges().await?;
        let breakdown = withdrawal_net(&charges, wallet.balance)?;
        let tx_ref = new_tx_ref("wd");
        self.db.create_pending_withdrawal(user_id, &breakdown, &tx_ref).await?;
        match payout.transfer(&tx_ref, user_id, breakdown.net).await {
            Ok(()) => {
                let record = self.db.settle_withdrawal(&tx_ref, breakdown.gross, true).await?;
                info!("🏧️ Withdrawal {tx_ref} paid out {} to user {user_id}", breakdown.net);
                Ok(record)
            },
            Err(e) => {
                self.db.settle_withdrawal(&tx_ref, breakdown.gross, false).await?;
                warn!("🏧️ Payout for {tx_ref} failed: {e}");
                Err(LedgerError::ExternalDependency(format!("payout transfer for {tx_ref} failed: {e}")))
            },
        }
    }

    async fn publish(&self, message: SettlementMessage) -> Result<(), LedgerError> {
        self.sink
            .publish(message)
            .await
            .map_err(|e| LedgerError::ExternalDependency(format!("settlement publish failed: {e}")))
    }
}
