use std::sync::{Arc, Mutex};

use mse_common::Naira;

use crate::{
    db_types::PaymentStatus,
    settlement::{SettlementError, SettlementMessage, SettlementSink},
    traits::{LedgerError, PaymentLinkProvider, PayoutProvider},
};

/// A broker stand-in that records every published message.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<SettlementMessage>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<SettlementMessage> {
        self.messages.lock().expect("sink lock poisoned").clone()
    }
}

impl SettlementSink for MemorySink {
    async fn publish(&self, message: SettlementMessage) -> Result<(), SettlementError> {
        self.messages.lock().expect("sink lock poisoned").push(message);
        Ok(())
    }
}

/// A payment gateway that settles every reference with a fixed status.
#[derive(Debug, Clone)]
pub struct MockGateway {
    pub status: PaymentStatus,
}

impl PaymentLinkProvider for MockGateway {
    async fn generate_payment_link(
        &self,
        tx_ref: &str,
        _amount: Naira,
        _payer_email: &str,
    ) -> Result<String, LedgerError> {
        Ok(format!("https://pay.test/{tx_ref}"))
    }

    async fn verify_transaction(&self, _tx_ref: &str) -> Result<PaymentStatus, LedgerError> {
        Ok(self.status)
    }
}

/// A payout rail that can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct MockPayout {
    pub fail: bool,
}

impl PayoutProvider for MockPayout {
    async fn transfer(&self, tx_ref: &str, _user_id: i64, _amount: Naira) -> Result<(), LedgerError> {
        if self.fail {
            return Err(LedgerError::ExternalDependency(format!("simulated payout outage for {tx_ref}")));
        }
        Ok(())
    }
}
