//! Narrow interfaces over external collaborators. The real payment gateway,
//! payout rail, cache and push fan-out live outside this repository; these
//! traits are the entire surface the engine consumes.

use mse_common::Naira;

use crate::{db_types::PaymentStatus, traits::LedgerError};

/// A payment-gateway client used for wallet top-ups.
#[allow(async_fn_in_trait)]
pub trait PaymentLinkProvider: Send + Sync {
    /// Creates a hosted payment link for the given reference and amount.
    async fn generate_payment_link(&self, tx_ref: &str, amount: Naira, payer_email: &str)
        -> Result<String, LedgerError>;

    /// Queries the gateway for the settlement status of a reference.
    async fn verify_transaction(&self, tx_ref: &str) -> Result<PaymentStatus, LedgerError>;
}

/// A payout rail that moves withdrawn funds to the user's bank.
#[allow(async_fn_in_trait)]
pub trait PayoutProvider: Send + Sync {
    async fn transfer(&self, tx_ref: &str, user_id: i64, amount: Naira) -> Result<(), LedgerError>;
}

/// A cache invalidation sink.
#[allow(async_fn_in_trait)]
pub trait CacheInvalidator: Send + Sync {
    async fn delete(&self, keys: &[String]);
}

/// A push-notification sink.
#[allow(async_fn_in_trait)]
pub trait Notifier: Send + Sync {
    async fn send(&self, tokens: &[String], title: &str, body: &str);
}
