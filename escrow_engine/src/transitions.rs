//! The role-gated transition tables for orders and deliveries. Pure lookups;
//! the storage layer re-validates the current status inside the transaction
//! that applies the move, so a stale check here can never race another writer.

use crate::db_types::{DeliveryStatus, OrderStatus, Role};

/// Whether `role` may move an order from `from` to `to`. Admins may force any
/// move (the write is still audit-logged and still carries the ledger effects
/// for the target status).
pub fn order_transition_allowed(role: Role, from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    match role {
        Role::Admin => true,
        Role::Owner => matches!(
            (from, to),
            (Pending, Cancelled) | (Accepted, Cancelled) | (Delivered, Received) | (Delivered, Rejected)
        ),
        Role::Vendor => matches!(
            (from, to),
            (Pending, Delivered) | (Pending, Cancelled) | (Accepted, Delivered) | (Rejected, ReceivedRejectedProduct)
        ),
        Role::Rider => matches!((from, to), (Pending, Accepted) | (Accepted, Delivered) | (Accepted, Cancelled)),
    }
}

/// Whether `role` may move a delivery from `from` to `to`.
pub fn delivery_transition_allowed(role: Role, from: DeliveryStatus, to: DeliveryStatus) -> bool {
    use DeliveryStatus::*;
    match role {
        Role::Admin => true,
        Role::Owner => matches!((from, to), (Pending, Cancelled) | (Accepted, Cancelled) | (Delivered, Received)),
        Role::Vendor => matches!((from, to), (Pending, Cancelled) | (Delivered, LaundryReceived)),
        Role::Rider => matches!((from, to), (Pending, Accepted) | (Accepted, Delivered) | (Accepted, Cancelled)),
    }
}
