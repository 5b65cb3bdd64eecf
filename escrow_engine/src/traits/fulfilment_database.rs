use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        Delivery,
        DeliveryStatus,
        FulfilmentOutcome,
        NewDelivery,
        NewOrder,
        Order,
        OrderId,
        OrderStatus,
        PaymentStatus,
        Role,
        TransitionTarget,
        UserAccount,
    },
    settlement::OrderStatusUpdate,
    traits::LedgerError,
};

#[derive(Debug, Error)]
pub enum OrderFlowError {
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("User {0} not found")]
    UserNotFound(i64),
    #[error("A {role} may not move an order from {from} to {to}")]
    InvalidTransition { role: Role, from: OrderStatus, to: OrderStatus },
    #[error("A {role} may not move a delivery from {from} to {to}")]
    InvalidDeliveryTransition { role: Role, from: DeliveryStatus, to: DeliveryStatus },
    #[error("Conflict. {0}")]
    Conflict(String),
    #[error("Operation not permitted. {0}")]
    Forbidden(String),
    #[error("User {0} is suspended and may not claim deliveries")]
    Suspended(i64),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Database error. {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::DatabaseError("no matching row".to_string()),
            e => Self::DatabaseError(e.to_string()),
        }
    }
}

/// Storage-side fulfilment operations. Each mutating call validates the
/// current statuses and applies the status change together with its ledger
/// effects in one database transaction, rolling both back on any error.
#[allow(async_fn_in_trait)]
pub trait OrderFulfilmentDatabase {
    async fn fetch_user(&self, user_id: i64) -> Result<UserAccount, OrderFlowError>;

    async fn insert_order(&self, order: NewOrder, delivery: Option<NewDelivery>)
        -> Result<FulfilmentOutcome, OrderFlowError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<(Order, Option<Delivery>), OrderFlowError>;

    /// Atomically claims an unassigned delivery for `rider` and places the
    /// escrow holds. A delivery already claimed by another rider yields
    /// [`OrderFlowError::Conflict`].
    async fn claim_delivery(&self, order_id: &OrderId, rider: &UserAccount)
        -> Result<FulfilmentOutcome, OrderFlowError>;

    /// Applies a validated transition to the target statuses, running the
    /// ledger effects for the target state in the same transaction. Used for
    /// every move except the claiming of a delivery.
    async fn apply_transition(
        &self,
        order_id: &OrderId,
        actor: &UserAccount,
        target: TransitionTarget,
    ) -> Result<FulfilmentOutcome, OrderFlowError>;

    /// Worker-side row sync for a cross-service status update. No role gate
    /// and no ledger effects; the originating service already settled.
    async fn sync_order_status(&self, update: &OrderStatusUpdate) -> Result<(), OrderFlowError>;

    async fn set_order_payment_status(&self, order_id: &OrderId, status: PaymentStatus)
        -> Result<(), OrderFlowError>;

    /// Suspends every user whose cancellation count reached three, until the
    /// given deadline. Returns the suspended user ids. Audit-logged.
    async fn suspend_three_strike_users(&self, until: DateTime<Utc>) -> Result<Vec<i64>, OrderFlowError>;

    /// Lifts suspensions whose deadline has passed and resets their counters.
    /// Returns the number of users reset.
    async fn reset_expired_suspensions(&self, now: DateTime<Utc>) -> Result<u64, OrderFlowError>;
}
