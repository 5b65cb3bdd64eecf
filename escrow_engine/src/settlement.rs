//! The settlement message types and broker naming contract.
//!
//! Every message crossing the broker is a JSON envelope of
//! `{ service, operation, payload, timestamp }`. Payloads are typed: the
//! [`SettlementMessage`] sum type carries one variant per operation, and the
//! consumer validates the payload against the operation before dispatch, so a
//! malformed message fails fast at the boundary instead of deep inside a
//! handler.

use chrono::{DateTime, Utc};
use mse_common::Naira;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{DeliveryStatus, NewWalletTransaction, OrderId, OrderStatus, PaymentStatus};

//------------------------------------    Broker naming       ---------------------------------------------------------

/// The single durable direct exchange all settlement traffic flows through.
pub const CENTRAL_EXCHANGE: &str = "central_operations";

pub const WALLET_SERVICE: &str = "wallet";
pub const ORDER_STATUS_SERVICE: &str = "order_status";
pub const NOTIFICATION_SERVICE: &str = "notification";

/// Work queue name for a service domain. Also its binding/routing key.
pub fn updates_queue(service: &str) -> String {
    format!("{service}_updates")
}

/// The dead-letter exchange for a service domain.
pub fn dead_letter_exchange(service: &str) -> String {
    format!("{service}_dlx")
}

/// Dead-letter queue name and routing key for a service domain.
pub fn dead_letter_queue(service: &str) -> String {
    format!("failed_{service}_updates")
}

/// Messages are parked on the work queue for at most 24 hours before the
/// broker dead-letters them.
pub const MESSAGE_TTL_MS: u32 = 24 * 60 * 60 * 1000;

//------------------------------------       Payloads         ---------------------------------------------------------

/// `update_wallet`: apply a delta to a wallet's spendable and escrow balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletUpdate {
    pub wallet_id: i64,
    pub balance_change: Naira,
    pub escrow_change: Naira,
}

/// `update_transaction`: advance the payment status of an existing transaction
/// record. Fund-wallet confirmations also stamp the payment method and mark
/// the transfer as a self-credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionUpdate {
    pub tx_ref: String,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub is_fund_wallet: bool,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub to_user: Option<String>,
}

/// `update_order_status`: cross-service status sync, with the cache keys to
/// drop and any push notifications to fan out once the write lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    pub order_id: OrderId,
    pub order_status: OrderStatus,
    #[serde(default)]
    pub delivery_status: Option<DeliveryStatus>,
    #[serde(default)]
    pub cache_keys: Vec<String>,
    #[serde(default)]
    pub notification_data: Vec<NotificationData>,
}

/// `order_payment_status`: mark an order paid/failed from the payment side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaymentUpdate {
    pub order_id: OrderId,
    pub order_payment_status: PaymentStatus,
}

/// A push notification handed to the notification fan-out (external).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub tokens: Vec<String>,
    pub title: String,
    pub body: String,
}

//------------------------------------  SettlementMessage     ---------------------------------------------------------

pub const OP_UPDATE_WALLET: &str = "update_wallet";
pub const OP_CREATE_TRANSACTION: &str = "create_transaction";
pub const OP_UPDATE_TRANSACTION: &str = "update_transaction";
pub const OP_UPDATE_ORDER_STATUS: &str = "update_order_status";
pub const OP_ORDER_PAYMENT_STATUS: &str = "order_payment_status";
pub const OP_SEND_NOTIFICATION: &str = "send_notification";

/// One variant per settlement operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementMessage {
    UpdateWallet(WalletUpdate),
    CreateTransaction(NewWalletTransaction),
    UpdateTransaction(TransactionUpdate),
    UpdateOrderStatus(OrderStatusUpdate),
    OrderPaymentStatus(OrderPaymentUpdate),
    SendNotification(NotificationData),
}

impl SettlementMessage {
    /// The service domain that owns this operation. Doubles as the routing key
    /// prefix for the domain's work queue.
    pub fn service(&self) -> &'static str {
        match self {
            Self::UpdateWallet(_) | Self::CreateTransaction(_) | Self::UpdateTransaction(_) => WALLET_SERVICE,
            Self::UpdateOrderStatus(_) | Self::OrderPaymentStatus(_) => ORDER_STATUS_SERVICE,
            Self::SendNotification(_) => NOTIFICATION_SERVICE,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::UpdateWallet(_) => OP_UPDATE_WALLET,
            Self::CreateTransaction(_) => OP_CREATE_TRANSACTION,
            Self::UpdateTransaction(_) => OP_UPDATE_TRANSACTION,
            Self::UpdateOrderStatus(_) => OP_UPDATE_ORDER_STATUS,
            Self::OrderPaymentStatus(_) => OP_ORDER_PAYMENT_STATUS,
            Self::SendNotification(_) => OP_SEND_NOTIFICATION,
        }
    }

    pub fn routing_key(&self) -> String {
        self.service().to_string()
    }

    pub fn into_envelope(self) -> Result<SettlementEnvelope, SettlementError> {
        let (service, operation) = (self.service(), self.operation());
        let payload = match self {
            Self::UpdateWallet(p) => serde_json::to_value(p)?,
            Self::CreateTransaction(p) => serde_json::to_value(p)?,
            Self::UpdateTransaction(p) => serde_json::to_value(p)?,
            Self::UpdateOrderStatus(p) => serde_json::to_value(p)?,
            Self::OrderPaymentStatus(p) => serde_json::to_value(p)?,
            Self::SendNotification(p) => serde_json::to_value(p)?,
        };
        Ok(SettlementEnvelope {
            service: service.to_string(),
            operation: operation.to_string(),
            payload,
            timestamp: Utc::now(),
        })
    }
}

//------------------------------------  SettlementEnvelope    ---------------------------------------------------------

/// The wire envelope. `payload` stays schemaless here; [`Self::message`]
/// performs the typed validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementEnvelope {
    pub service: String,
    pub operation: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl SettlementEnvelope {
    pub fn decode(bytes: &[u8]) -> Result<Self, SettlementError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>, SettlementError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Validates the payload against the operation and returns the typed
    /// message. Unknown operations and malformed payloads are poison.
    pub fn message(&self) -> Result<SettlementMessage, SettlementError> {
        let payload = self.payload.clone();
        let msg = match self.operation.as_str() {
            OP_UPDATE_WALLET => SettlementMessage::UpdateWallet(serde_json::from_value(payload)?),
            OP_CREATE_TRANSACTION => SettlementMessage::CreateTransaction(serde_json::from_value(payload)?),
            OP_UPDATE_TRANSACTION => SettlementMessage::UpdateTransaction(serde_json::from_value(payload)?),
            OP_UPDATE_ORDER_STATUS => SettlementMessage::UpdateOrderStatus(serde_json::from_value(payload)?),
            OP_ORDER_PAYMENT_STATUS => SettlementMessage::OrderPaymentStatus(serde_json::from_value(payload)?),
            OP_SEND_NOTIFICATION => SettlementMessage::SendNotification(serde_json::from_value(payload)?),
            op => return Err(SettlementError::UnknownOperation(op.to_string())),
        };
        Ok(msg)
    }
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Malformed settlement payload. {0}")]
    Codec(#[from] serde_json::Error),
    #[error("Unknown settlement operation: {0}")]
    UnknownOperation(String),
    #[error("Could not publish settlement message. {0}")]
    Publish(String),
}

//------------------------------------   SettlementSink       ---------------------------------------------------------

/// Where the state machine and ledger hand off out-of-band mutations. The
/// worker provides the AMQP implementation; tests use an in-memory sink.
#[allow(async_fn_in_trait)]
pub trait SettlementSink: Send + Sync {
    async fn publish(&self, message: SettlementMessage) -> Result<(), SettlementError>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let msg = SettlementMessage::UpdateWallet(WalletUpdate {
            wallet_id: 7,
            balance_change: Naira::from_naira(250),
            escrow_change: Naira::from_naira(-250),
        });
        let envelope = msg.clone().into_envelope().unwrap();
        assert_eq!(envelope.service, "wallet");
        assert_eq!(envelope.operation, "update_wallet");
        let bytes = envelope.encode().unwrap();
        let decoded = SettlementEnvelope::decode(&bytes).unwrap();
        assert_eq!(decoded.message().unwrap(), msg);
    }

    #[test]
    fn unknown_operation_is_poison() {
        let envelope = SettlementEnvelope {
            service: "wallet".to_string(),
            operation: "reticulate_splines".to_string(),
            payload: serde_json::json!({}),
            timestamp: Utc::now(),
        };
        assert!(matches!(envelope.message(), Err(SettlementError::UnknownOperation(_))));
    }

    #[test]
    fn malformed_payload_is_poison() {
        let envelope = SettlementEnvelope {
            service: "wallet".to_string(),
            operation: OP_UPDATE_WALLET.to_string(),
            payload: serde_json::json!({ "wallet_id": "not-a-number" }),
            timestamp: Utc::now(),
        };
        assert!(matches!(envelope.message(), Err(SettlementError::Codec(_))));
    }

    #[test]
    fn wire_field_names_are_stable() {
        let envelope = SettlementMessage::UpdateOrderStatus(OrderStatusUpdate {
            order_id: OrderId::from("ord-1".to_string()),
            order_status: OrderStatus::Delivered,
            delivery_status: Some(DeliveryStatus::Delivered),
            cache_keys: vec!["orders:ord-1".to_string()],
            notification_data: vec![],
        })
        .into_envelope()
        .unwrap();
        assert_eq!(envelope.payload["order_status"], "delivered");
        assert_eq!(envelope.payload["delivery_status"], "delivered");
        assert_eq!(envelope.payload["cache_keys"][0], "orders:ord-1");
    }

    #[test]
    fn queue_naming() {
        assert_eq!(updates_queue("wallet"), "wallet_updates");
        assert_eq!(dead_letter_exchange("wallet"), "wallet_dlx");
        assert_eq!(dead_letter_queue("order_status"), "failed_order_status_updates");
    }
}
