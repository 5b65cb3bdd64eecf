use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use mse_common::Naira;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------        Role          ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Vendor,
    Rider,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Vendor => write!(f, "vendor"),
            Role::Rider => write!(f, "rider"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "vendor" => Ok(Self::Vendor),
            "rider" => Ok(Self::Rider),
            "admin" => Ok(Self::Admin),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

//--------------------------------------      OrderType       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Package,
    Food,
    Laundry,
    Product,
}

impl Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Package => write!(f, "package"),
            OrderType::Food => write!(f, "food"),
            OrderType::Laundry => write!(f, "laundry"),
            OrderType::Product => write!(f, "product"),
        }
    }
}

//--------------------------------------     OrderStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Newly placed. No funds are earmarked yet.
    Pending,
    /// Claimed by a rider/dispatch. Escrow holds are in place.
    Accepted,
    /// Goods handed over; awaiting the owner's confirmation.
    Delivered,
    /// Terminal. The owner confirmed receipt and payouts were released.
    Received,
    /// A delivered product order the owner sent back.
    Rejected,
    /// Terminal. The vendor took the rejected product back and the owner was refunded.
    ReceivedRejectedProduct,
    /// Terminal.
    Cancelled,
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Accepted => write!(f, "accepted"),
            OrderStatus::Delivered => write!(f, "delivered"),
            OrderStatus::Received => write!(f, "received"),
            OrderStatus::Rejected => write!(f, "rejected"),
            OrderStatus::ReceivedRejectedProduct => write!(f, "received_rejected_product"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "delivered" => Ok(Self::Delivered),
            "received" => Ok(Self::Received),
            "rejected" => Ok(Self::Rejected),
            "received_rejected_product" => Ok(Self::ReceivedRejectedProduct),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Received | Self::ReceivedRejectedProduct | Self::Cancelled)
    }
}

//--------------------------------------   DeliveryStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Accepted,
    Delivered,
    Received,
    /// Vendor confirmed that returned laundry items arrived back.
    LaundryReceived,
    Cancelled,
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Accepted => write!(f, "accepted"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Received => write!(f, "received"),
            DeliveryStatus::LaundryReceived => write!(f, "laundry_received"),
            DeliveryStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "delivered" => Ok(Self::Delivered),
            "received" => Ok(Self::Received),
            "laundry_received" => Ok(Self::LaundryReceived),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid delivery status: {s}"))),
        }
    }
}

//--------------------------------------    PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Completed,
    Failed,
    Cancelled,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Completed => write!(f, "completed"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl PaymentStatus {
    /// True for the gateway statuses that mean the money actually moved.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Paid | Self::Completed)
    }
}

//--------------------------------------   TransactionType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    FundWallet,
    PaidWithWallet,
    UserToUser,
    Withdrawal,
    Refund,
    OrderCancellation,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::FundWallet => write!(f, "fund_wallet"),
            TransactionType::PaidWithWallet => write!(f, "paid_with_wallet"),
            TransactionType::UserToUser => write!(f, "user_to_user"),
            TransactionType::Withdrawal => write!(f, "withdrawal"),
            TransactionType::Refund => write!(f, "refund"),
            TransactionType::OrderCancellation => write!(f, "order_cancellation"),
        }
    }
}

//------------------------------------ TransactionDirection ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionDirection {
    Credit,
    Debit,
}

impl Display for TransactionDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionDirection::Credit => write!(f, "credit"),
            TransactionDirection::Debit => write!(f, "debit"),
        }
    }
}

//------------------------------------   RequireDelivery      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequireDelivery {
    Pickup,
    Delivery,
}

impl Display for RequireDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequireDelivery::Pickup => write!(f, "pickup"),
            RequireDelivery::Delivery => write!(f, "delivery"),
        }
    }
}

//--------------------------------------      OrderId         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      Wallet          ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub user_id: i64,
    pub balance: Naira,
    pub escrow_balance: Naira,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    EscrowRelease     ---------------------------------------------------------
/// The observable outcome of an escrow release. Releases are clamped at the
/// available escrow; a non-zero `shortfall` marks a partial release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRelease {
    pub wallet_id: i64,
    pub requested: Naira,
    pub released: Naira,
    pub shortfall: Naira,
}

impl EscrowRelease {
    pub fn is_partial(&self) -> bool {
        self.shortfall.is_positive()
    }
}

//-----------------------------------   WalletTransaction     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: i64,
    pub wallet_id: i64,
    pub tx_ref: String,
    pub amount: Naira,
    pub transaction_type: TransactionType,
    #[serde(rename = "transaction_direction")]
    pub direction: TransactionDirection,
    pub payment_status: PaymentStatus,
    pub from_user: Option<String>,
    pub to_user: Option<String>,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//-----------------------------------  NewWalletTransaction   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWalletTransaction {
    pub wallet_id: i64,
    pub tx_ref: String,
    /// Always strictly positive. The sign of the movement is carried by `direction`.
    pub amount: Naira,
    pub transaction_type: TransactionType,
    #[serde(rename = "transaction_direction")]
    pub direction: TransactionDirection,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub from_user: Option<String>,
    #[serde(default)]
    pub to_user: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

impl NewWalletTransaction {
    pub fn new(
        wallet_id: i64,
        tx_ref: String,
        amount: Naira,
        transaction_type: TransactionType,
        direction: TransactionDirection,
    ) -> Self {
        Self {
            wallet_id,
            tx_ref,
            amount,
            transaction_type,
            direction,
            payment_status: PaymentStatus::Pending,
            from_user: None,
            to_user: None,
            payment_method: None,
        }
    }

    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = status;
        self
    }

    pub fn with_parties(mut self, from_user: Option<String>, to_user: Option<String>) -> Self {
        self.from_user = from_user;
        self.to_user = to_user;
        self
    }
}

//--------------------------------------       Order          ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub owner_id: i64,
    pub vendor_id: Option<i64>,
    pub order_type: OrderType,
    /// The goods total (zero for pure package deliveries). The buyer-facing
    /// total adds the delivery fee when a delivery leg exists.
    pub total_price: Naira,
    /// The vendor payout, net of commission.
    pub amount_due_vendor: Naira,
    pub order_payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub require_delivery: RequireDelivery,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewOrder        ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub owner_id: i64,
    pub vendor_id: Option<i64>,
    pub order_type: OrderType,
    pub total_price: Naira,
    pub amount_due_vendor: Naira,
    pub require_delivery: RequireDelivery,
}

//--------------------------------------      Delivery        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Delivery {
    pub id: i64,
    pub order_id: OrderId,
    pub status: DeliveryStatus,
    pub rider_id: Option<i64>,
    pub dispatch_id: Option<i64>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub distance_km: f64,
    pub delivery_fee: Naira,
    /// The dispatch payout, net of commission.
    pub amount_due_dispatch: Naira,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    NewDelivery       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub order_id: OrderId,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub distance_km: f64,
    pub delivery_fee: Naira,
    pub amount_due_dispatch: Naira,
}

//--------------------------------------     OrderItem        ---------------------------------------------------------
/// A line item at checkout. Only used to compute the order totals; never persisted here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderItem {
    pub price: Naira,
    pub quantity: i64,
}

impl OrderItem {
    pub fn new(price: Naira, quantity: i64) -> Self {
        Self { price, quantity }
    }

    pub fn line_total(&self) -> Naira {
        self.price * self.quantity
    }
}

//----------------------------------- ChargeAndCommission -----------------------------------------------------------
/// The singleton fee and commission configuration row. Read-only to the fee
/// calculator; changed only by an administrative update path.
#[derive(Debug, Clone, FromRow)]
pub struct ChargeAndCommission {
    pub id: i64,
    pub base_delivery_fee: Naira,
    pub delivery_fee_per_km: Naira,
    pub delivery_commission_rate: f64,
    pub food_laundry_commission_rate: f64,
    pub product_commission_rate: f64,
    pub payout_charge_tier_low: Naira,
    pub payout_charge_tier_mid: Naira,
    pub payout_charge_tier_high: Naira,
    pub value_added_tax: f64,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------    UserAccount       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    pub role: Role,
    /// Riders can act under a dispatch company; payouts go to that wallet.
    pub dispatch_id: Option<i64>,
    pub order_cancel_count: i64,
    pub is_suspended: bool,
    pub suspension_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    /// The wallet that receives this rider's dispatch payouts.
    pub fn dispatch_wallet_user(&self) -> i64 {
        self.dispatch_id.unwrap_or(self.id)
    }
}

//--------------------------------------    AuditEntry        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: i64,
    pub actor_role: Role,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub summary: Option<String>,
    /// JSON object of `{field: [old, new]}` pairs.
    pub changes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: i64,
    pub actor_role: Role,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub summary: Option<String>,
    pub changes: serde_json::Value,
}

impl NewAuditEntry {
    pub fn new(actor_id: i64, actor_role: Role, action: &str, resource_type: &str, resource_id: String) -> Self {
        Self {
            actor_id,
            actor_role,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            summary: None,
            changes: serde_json::json!({}),
        }
    }

    pub fn with_change<T: Display>(mut self, field: &str, old: T, new: T) -> Self {
        self.changes[field] = serde_json::json!([old.to_string(), new.to_string()]);
        self
    }
}

//-----------------------------------   FulfilmentOutcome     ---------------------------------------------------------
/// The result of a state-machine transition: the updated rows plus every
/// escrow release performed by the ledger effects, so callers can observe
/// partial releases.
#[derive(Debug, Clone)]
pub struct FulfilmentOutcome {
    pub order: Order,
    pub delivery: Option<Delivery>,
    pub releases: Vec<EscrowRelease>,
}

impl FulfilmentOutcome {
    pub fn partial_releases(&self) -> impl Iterator<Item = &EscrowRelease> {
        self.releases.iter().filter(|r| r.is_partial())
    }
}

//-----------------------------------   TransitionTarget      ---------------------------------------------------------
/// The requested end state of a fulfilment transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionTarget {
    pub order_status: Option<OrderStatus>,
    pub delivery_status: Option<DeliveryStatus>,
    pub reason: Option<String>,
    /// Present for admin force-sets; written in the same transaction.
    pub audit: Option<NewAuditEntry>,
}

impl TransitionTarget {
    pub fn order(status: OrderStatus) -> Self {
        Self { order_status: Some(status), ..Default::default() }
    }

    pub fn with_delivery(mut self, status: DeliveryStatus) -> Self {
        self.delivery_status = Some(status);
        self
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn with_audit(mut self, audit: NewAuditEntry) -> Self {
        self.audit = Some(audit);
        self
    }
}
