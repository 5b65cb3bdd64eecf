//! # Marketplace escrow engine
//!
//! The engine is the single writer of wallet money fields. It is organised
//! around three pieces:
//!
//! * The **escrow ledger** ([`traits::EscrowLedgerDatabase`]): atomic wallet
//!   mutations with non-negative balance and escrow invariants, plus the
//!   transaction audit trail.
//! * The **fulfilment state machine** ([`OrderFlowApi`]): role-gated order and
//!   delivery status transitions. Every transition commits its ledger effects
//!   in the same database transaction as the status change.
//! * The **settlement pipeline** ([`settlement`]): typed messages that carry
//!   ledger and status mutations through the broker for out-of-band
//!   processing by the worker-side consumers.
//!
//! Storage is SQLite via `sqlx`. All low-level query functions take a
//! `&mut SqliteConnection` so that high-level operations can compose them
//! inside a single transaction.

pub mod db_types;
pub mod fees;
pub mod settlement;
pub mod transitions;
pub mod traits;

mod api;
mod sqlite;

#[cfg(feature = "test_utils")]
pub mod test_utils;

pub use api::{DeliveryRoute, LedgerApi, NewOrderRequest, OrderFlowApi, MAX_TOP_UP, SUSPENSION_DAYS};
pub use sqlite::SqliteDatabase;
