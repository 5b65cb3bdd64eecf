//! The transaction audit trail. Rows are immutable after creation except for
//! advancing `payment_status` (and the fund-wallet completion stamps).

use sqlx::SqliteConnection;

use crate::{
    db_types::{NewWalletTransaction, WalletTransaction},
    settlement::TransactionUpdate,
    traits::LedgerError,
};

const TX_COLUMNS: &str = "id, wallet_id, tx_ref, amount, transaction_type, direction, payment_status, from_user, \
                          to_user, payment_method, created_at, updated_at";

pub async fn insert_transaction(
    conn: &mut SqliteConnection,
    tx: &NewWalletTransaction,
) -> Result<WalletTransaction, LedgerError> {
    if !tx.amount.is_positive() {
        return Err(LedgerError::InvalidAmount(format!(
            "transaction amounts must be strictly positive, got {} for {}",
            tx.amount, tx.tx_ref
        )));
    }
    sqlx::query(
        "INSERT INTO wallet_transactions (wallet_id, tx_ref, amount, transaction_type, direction, payment_status, \
         from_user, to_user, payment_method) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(tx.wallet_id)
    .bind(&tx.tx_ref)
    .bind(tx.amount)
    .bind(tx.transaction_type)
    .bind(tx.direction)
    .bind(tx.payment_status)
    .bind(&tx.from_user)
    .bind(&tx.to_user)
    .bind(&tx.payment_method)
    .execute(&mut *conn)
    .await?;
    fetch_transaction(conn, &tx.tx_ref).await
}

pub async fn fetch_transaction(conn: &mut SqliteConnection, tx_ref: &str) -> Result<WalletTransaction, LedgerError> {
    let q = format!("SELECT {TX_COLUMNS} FROM wallet_transactions WHERE tx_ref = ?");
    sqlx::query_as::<_, WalletTransaction>(&q)
        .bind(tx_ref)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("transaction {tx_ref}")))
}

/// Advances the payment status of an existing record. Fund-wallet completions
/// also stamp the payment method and mark the transfer as a self-credit.
pub async fn apply_transaction_update(
    conn: &mut SqliteConnection,
    patch: &TransactionUpdate,
) -> Result<WalletTransaction, LedgerError> {
    let to_user = match (&patch.to_user, patch.is_fund_wallet) {
        (Some(u), _) => Some(u.clone()),
        (None, true) => Some("Self".to_string()),
        (None, false) => None,
    };
    let result = sqlx::query(
        "UPDATE wallet_transactions SET payment_status = ?, payment_method = COALESCE(?, payment_method), to_user = \
         COALESCE(?, to_user), updated_at = CURRENT_TIMESTAMP WHERE tx_ref = ?",
    )
    .bind(patch.payment_status)
    .bind(&patch.payment_method)
    .bind(&to_user)
    .bind(&patch.tx_ref)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::NotFound(format!("transaction {}", patch.tx_ref)));
    }
    fetch_transaction(conn, &patch.tx_ref).await
}
