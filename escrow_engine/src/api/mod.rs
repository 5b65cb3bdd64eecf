mod ledger_api;
mod order_flow_api;

pub use ledger_api::{LedgerApi, MAX_TOP_UP};
pub use order_flow_api::{DeliveryRoute, NewOrderRequest, OrderFlowApi, SUSPENSION_DAYS};
