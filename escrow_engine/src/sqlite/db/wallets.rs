//! Wallet row access. This module is the only place wallet money fields are
//! written. All mutating functions must be called from inside a transaction;
//! the write transaction serialises concurrent mutations the way a
//! `SELECT ... FOR UPDATE` row lock would on a server database.

use log::warn;
use mse_common::Naira;
use sqlx::SqliteConnection;

use crate::{
    db_types::{EscrowRelease, Wallet},
    traits::LedgerError,
};

const WALLET_COLUMNS: &str = "id, user_id, balance, escrow_balance, created_at, updated_at";

pub async fn fetch_wallet(conn: &mut SqliteConnection, wallet_id: i64) -> Result<Wallet, LedgerError> {
    let q = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = ?");
    sqlx::query_as::<_, Wallet>(&q)
        .bind(wallet_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("wallet {wallet_id}")))
}

pub async fn fetch_wallet_for_user(conn: &mut SqliteConnection, user_id: i64) -> Result<Option<Wallet>, LedgerError> {
    let q = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = ?");
    Ok(sqlx::query_as::<_, Wallet>(&q).bind(user_id).fetch_optional(conn).await?)
}

/// Fetches the wallet for `user_id`, creating an empty one on first use.
pub async fn fetch_or_create_wallet(conn: &mut SqliteConnection, user_id: i64) -> Result<Wallet, LedgerError> {
    if let Some(wallet) = fetch_wallet_for_user(conn, user_id).await? {
        return Ok(wallet);
    }
    sqlx::query("INSERT OR IGNORE INTO wallets (user_id) VALUES (?)").bind(user_id).execute(&mut *conn).await?;
    fetch_wallet_for_user(conn, user_id)
        .await?
        .ok_or_else(|| LedgerError::DatabaseError(format!("could not create wallet for user {user_id}")))
}

/// Applies both deltas, or neither. Any result that would take a field
/// negative fails with `InsufficientFunds` and leaves the row unchanged.
pub async fn adjust_balances(
    conn: &mut SqliteConnection,
    wallet_id: i64,
    balance_delta: Naira,
    escrow_delta: Naira,
) -> Result<Wallet, LedgerError> {
    let wallet = fetch_wallet(&mut *conn, wallet_id).await?;
    let new_balance = wallet.balance + balance_delta;
    let new_escrow = wallet.escrow_balance + escrow_delta;
    if new_balance.is_negative() {
        return Err(LedgerError::InsufficientFunds {
            wallet_id,
            requested: -balance_delta,
            available: wallet.balance,
        });
    }
    if new_escrow.is_negative() {
        return Err(LedgerError::InsufficientFunds {
            wallet_id,
            requested: -escrow_delta,
            available: wallet.escrow_balance,
        });
    }
    write_balances(conn, wallet_id, new_balance, new_escrow).await
}

/// Moves up to `amount` from escrow into the spendable balance. Clamped at
/// the available escrow; the shortfall is reported, not swallowed.
pub async fn release_escrow_to_balance(
    conn: &mut SqliteConnection,
    wallet_id: i64,
    amount: Naira,
) -> Result<EscrowRelease, LedgerError> {
    let wallet = fetch_wallet(&mut *conn, wallet_id).await?;
    let (new_escrow, shortfall) = wallet.escrow_balance.saturating_sub(amount);
    let released = amount - shortfall;
    if shortfall.is_positive() {
        warn!("⚖️ Partial escrow release on wallet {wallet_id}: requested {amount}, released {released}");
    }
    write_balances(conn, wallet_id, wallet.balance + released, new_escrow).await?;
    Ok(EscrowRelease { wallet_id, requested: amount, released, shortfall })
}

/// Removes up to `amount` from escrow without crediting the balance (the hold
/// is spent, not refunded). Clamped at the available escrow.
pub async fn forfeit_escrow(
    conn: &mut SqliteConnection,
    wallet_id: i64,
    amount: Naira,
) -> Result<EscrowRelease, LedgerError> {
    let wallet = fetch_wallet(&mut *conn, wallet_id).await?;
    let (new_escrow, shortfall) = wallet.escrow_balance.saturating_sub(amount);
    let released = amount - shortfall;
    if shortfall.is_positive() {
        warn!("⚖️ Partial escrow forfeit on wallet {wallet_id}: requested {amount}, released {released}");
    }
    write_balances(conn, wallet_id, wallet.balance, new_escrow).await?;
    Ok(EscrowRelease { wallet_id, requested: amount, released, shortfall })
}

async fn write_balances(
    conn: &mut SqliteConnection,
    wallet_id: i64,
    balance: Naira,
    escrow: Naira,
) -> Result<Wallet, LedgerError> {
    sqlx::query("UPDATE wallets SET balance = ?, escrow_balance = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(balance)
        .bind(escrow)
        .bind(wallet_id)
        .execute(&mut *conn)
        .await?;
    fetch_wallet(conn, wallet_id).await
}
