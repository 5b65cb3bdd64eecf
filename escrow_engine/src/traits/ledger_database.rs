use mse_common::Naira;
use thiserror::Error;

use crate::{
    db_types::{
        ChargeAndCommission,
        EscrowRelease,
        NewWalletTransaction,
        Order,
        OrderId,
        Wallet,
        WalletTransaction,
    },
    fees::{FeeError, WithdrawalBreakdown},
    settlement::TransactionUpdate,
};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Not found. {0}")]
    NotFound(String),
    #[error("Insufficient funds in wallet {wallet_id}: requested {requested}, available {available}")]
    InsufficientFunds { wallet_id: i64, requested: Naira, available: Naira },
    #[error("Invalid amount. {0}")]
    InvalidAmount(String),
    #[error("Conflicting update. {0}")]
    Conflict(String),
    #[error("External dependency failure. {0}")]
    ExternalDependency(String),
    #[error("Database error. {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("no matching row".to_string()),
            e => Self::DatabaseError(e.to_string()),
        }
    }
}

impl From<FeeError> for LedgerError {
    fn from(e: FeeError) -> Self {
        match e {
            FeeError::InvalidAmount(s) => Self::InvalidAmount(s),
        }
    }
}

/// The escrow ledger store. The sole writer of wallet money fields.
///
/// Every mutating operation runs inside a single database transaction with
/// the affected wallet rows locked for update. Operations that touch more
/// than one wallet acquire the rows in ascending wallet-id order.
#[allow(async_fn_in_trait)]
pub trait EscrowLedgerDatabase {
    /// The database URL for this instance.
    fn url(&self) -> &str;

    async fn fetch_wallet(&self, wallet_id: i64) -> Result<Wallet, LedgerError>;

    /// Fetches the wallet for `user_id`, creating an empty one on first use.
    async fn fetch_or_create_wallet(&self, user_id: i64) -> Result<Wallet, LedgerError>;

    /// Applies both deltas atomically, or neither. Fails with
    /// [`LedgerError::InsufficientFunds`] if either field would go negative.
    async fn adjust_wallet(&self, wallet_id: i64, balance_delta: Naira, escrow_delta: Naira)
        -> Result<Wallet, LedgerError>;

    /// Moves up to `amount` from escrow into the spendable balance. The
    /// release is clamped at the available escrow; the outcome reports any
    /// shortfall.
    async fn release_escrow(&self, wallet_id: i64, amount: Naira) -> Result<EscrowRelease, LedgerError>;

    /// Appends an audit record for a ledger movement. The amount must be
    /// strictly positive; direction carries the sign.
    async fn insert_transaction(&self, tx: NewWalletTransaction) -> Result<WalletTransaction, LedgerError>;

    async fn fetch_transaction(&self, tx_ref: &str) -> Result<WalletTransaction, LedgerError>;

    /// Advances the payment status of an existing transaction record.
    async fn apply_transaction_update(&self, patch: &TransactionUpdate) -> Result<WalletTransaction, LedgerError>;

    /// Records a pending fund-wallet credit awaiting gateway confirmation.
    async fn create_pending_top_up(&self, user_id: i64, amount: Naira, tx_ref: &str)
        -> Result<WalletTransaction, LedgerError>;

    /// Pays for a pending order from the owner's spendable balance. Debits
    /// the buyer-facing total, marks the order paid and records the
    /// transaction, all in one database transaction. Insufficient funds
    /// leave everything untouched.
    async fn pay_for_order_with_wallet(&self, order_id: &OrderId) -> Result<(Order, WalletTransaction), LedgerError>;

    /// Records a pending withdrawal for the full breakdown. No money moves yet.
    async fn create_pending_withdrawal(
        &self,
        user_id: i64,
        breakdown: &WithdrawalBreakdown,
        tx_ref: &str,
    ) -> Result<WalletTransaction, LedgerError>;

    /// Settles a pending withdrawal after the payout attempt. On success the
    /// gross amount is debited and the transaction marked paid in one
    /// transaction; on failure the wallet is left untouched and the
    /// transaction marked failed.
    async fn settle_withdrawal(&self, tx_ref: &str, gross: Naira, success: bool)
        -> Result<WalletTransaction, LedgerError>;

    /// The current fee and commission configuration.
    async fn fetch_charges(&self) -> Result<ChargeAndCommission, LedgerError>;
}
