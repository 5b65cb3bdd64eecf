//! Per-domain dispatchers. Each wires the operations a service domain owns to
//! the escrow engine calls that apply them.

mod notification;
mod order_status;
mod wallet;

pub use notification::notification_dispatcher;
pub use order_status::order_status_dispatcher;
pub use wallet::wallet_dispatcher;
