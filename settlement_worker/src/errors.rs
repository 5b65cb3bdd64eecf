use escrow_engine::{
    settlement::SettlementError,
    traits::{LedgerError, OrderFlowError},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("AMQP error. {0}")]
    Amqp(#[from] lapin::Error),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    OrderFlow(#[from] OrderFlowError),
    #[error("Unexpected payload for operation {0}")]
    UnexpectedPayload(String),
    #[error("Configuration error. {0}")]
    Config(String),
}
