//! Helpers for integration tests: database setup, seed data and in-memory
//! stand-ins for the broker and the external collaborators.

mod mocks;
mod prepare_env;

pub use mocks::{MemorySink, MockGateway, MockPayout};
pub use prepare_env::{prepare_test_env, random_db_url};

use mse_common::Naira;

use crate::{
    db_types::{Role, UserAccount, Wallet},
    sqlite::db::{users, wallets},
    SqliteDatabase,
};

/// Creates a user row directly. Test-only; the engine itself never creates
/// accounts.
pub async fn seed_user(db: &SqliteDatabase, username: &str, role: Role, dispatch_id: Option<i64>) -> UserAccount {
    let mut conn = db.pool().acquire().await.expect("could not acquire a connection");
    users::create_user(&mut conn, username, role, dispatch_id).await.expect("could not create user")
}

/// Gives a user a wallet with the given spendable balance.
pub async fn fund_wallet(db: &SqliteDatabase, user_id: i64, balance: Naira) -> Wallet {
    let mut tx = db.pool().begin().await.expect("could not start a transaction");
    let wallet = wallets::fetch_or_create_wallet(&mut tx, user_id).await.expect("could not create wallet");
    let wallet = wallets::adjust_balances(&mut tx, wallet.id, balance, Naira::default())
        .await
        .expect("could not fund wallet");
    tx.commit().await.expect("could not commit");
    wallet
}
