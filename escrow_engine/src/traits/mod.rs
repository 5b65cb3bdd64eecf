mod collaborators;
mod fulfilment_database;
mod ledger_database;

pub use collaborators::{CacheInvalidator, Notifier, PaymentLinkProvider, PayoutProvider};
pub use fulfilment_database::{OrderFlowError, OrderFulfilmentDatabase};
pub use ledger_database::{EscrowLedgerDatabase, LedgerError};
