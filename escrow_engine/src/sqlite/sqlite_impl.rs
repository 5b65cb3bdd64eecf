//! SQLite implementation of the ledger and fulfilment traits.
//!
//! Every mutating operation opens one transaction, composes the low-level
//! functions in [`super::db`], and commits at the end. An error anywhere rolls
//! the whole move back, so a status change can never land without its ledger
//! effects and vice versa.

use std::fmt::{Debug, Formatter};

use chrono::{DateTime, Utc};
use log::{debug, info};
use mse_common::Naira;
use sqlx::{Error as SqlxError, SqliteConnection, SqlitePool};

use crate::{
    db_types::{
        ChargeAndCommission,
        Delivery,
        DeliveryStatus,
        EscrowRelease,
        FulfilmentOutcome,
        NewAuditEntry,
        NewDelivery,
        NewOrder,
        NewWalletTransaction,
        Order,
        OrderId,
        OrderStatus,
        PaymentStatus,
        Role,
        TransactionDirection,
        TransactionType,
        TransitionTarget,
        UserAccount,
        Wallet,
        WalletTransaction,
    },
    fees::WithdrawalBreakdown,
    settlement::{OrderStatusUpdate, TransactionUpdate},
    sqlite::db::{audit, charges, db_url, deliveries, new_pool, orders, transactions, users, wallets},
    traits::{EscrowLedgerDatabase, LedgerError, OrderFlowError, OrderFulfilmentDatabase},
    transitions,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

impl SqliteDatabase {
    /// Connects to the database given by `MSE_DATABASE_URL`, or the default
    /// file store if unset.
    pub async fn new(max_connections: u32) -> Result<Self, SqlxError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqlxError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

//------------------------------------   Ledger effect ops    ---------------------------------------------------------

/// A single wallet mutation inside a transition's ledger effects.
enum LedgerOp {
    /// Earmark funds: escrow increases, the balance is untouched.
    Hold(Naira),
    /// Move escrow into the spendable balance, clamped at the available escrow.
    Release(Naira),
    /// Remove escrow without crediting the balance (the hold was consumed).
    Forfeit(Naira),
    /// A straight balance credit, used for refunds where no hold exists.
    Credit(Naira),
}

/// Runs the ops in ascending wallet-id order so concurrent multi-wallet
/// transactions always lock rows in the same sequence. Zero-amount ops are
/// dropped. Returns every (possibly partial) escrow movement.
async fn run_ledger_ops(
    conn: &mut SqliteConnection,
    mut ops: Vec<(i64, LedgerOp)>,
) -> Result<Vec<EscrowRelease>, LedgerError> {
    ops.sort_by_key(|(wallet_id, _)| *wallet_id);
    let mut releases = Vec::new();
    for (wallet_id, op) in ops {
        match op {
            LedgerOp::Hold(amount) if amount.is_positive() => {
                wallets::adjust_balances(conn, wallet_id, Naira::default(), amount).await?;
            },
            LedgerOp::Release(amount) if amount.is_positive() => {
                releases.push(wallets::release_escrow_to_balance(conn, wallet_id, amount).await?);
            },
            LedgerOp::Forfeit(amount) if amount.is_positive() => {
                releases.push(wallets::forfeit_escrow(conn, wallet_id, amount).await?);
            },
            LedgerOp::Credit(amount) if amount.is_positive() => {
                wallets::adjust_balances(conn, wallet_id, amount, Naira::default()).await?;
            },
            _ => {},
        }
    }
    Ok(releases)
}

/// The amount the buyer is on the hook for: goods plus the delivery fee when a
/// delivery leg exists.
fn buyer_total(order: &Order, delivery: Option<&Delivery>) -> Naira {
    order.total_price + delivery.map(|d| d.delivery_fee).unwrap_or_default()
}

/// Whether acceptance holds exist for this order. Holds are placed when a
/// rider claims the delivery; pickup orders and unclaimed deliveries settle by
/// direct credit instead of escrow release.
fn holds_placed(delivery: Option<&Delivery>) -> bool {
    delivery.is_some_and(|d| d.dispatch_id.is_some())
}

/// The escrow holds placed when an order is accepted. `dispatch_user` is the
/// wallet owner for the dispatch payout; absent when no rider has claimed the
/// delivery yet.
async fn acceptance_hold_ops(
    conn: &mut SqliteConnection,
    order: &Order,
    delivery: Option<&Delivery>,
    dispatch_user: Option<i64>,
) -> Result<Vec<(i64, LedgerOp)>, OrderFlowError> {
    let mut ops = Vec::new();
    let owner = wallets::fetch_or_create_wallet(conn, order.owner_id).await?;
    ops.push((owner.id, LedgerOp::Hold(buyer_total(order, delivery))));
    if let Some(vendor_id) = order.vendor_id {
        if order.amount_due_vendor.is_positive() {
            let vendor = wallets::fetch_or_create_wallet(conn, vendor_id).await?;
            ops.push((vendor.id, LedgerOp::Hold(order.amount_due_vendor)));
        }
    }
    if let (Some(d), Some(user_id)) = (delivery, dispatch_user) {
        if d.amount_due_dispatch.is_positive() {
            let dispatch = wallets::fetch_or_create_wallet(conn, user_id).await?;
            ops.push((dispatch.id, LedgerOp::Hold(d.amount_due_dispatch)));
        }
    }
    Ok(ops)
}

/// Payout releases when the owner confirms receipt. Laundry orders keep the
/// dispatch hold in place until the vendor confirms the items came back.
async fn received_ops(
    conn: &mut SqliteConnection,
    order: &Order,
    delivery: Option<&Delivery>,
) -> Result<Vec<(i64, LedgerOp)>, OrderFlowError> {
    let mut ops = Vec::new();
    let vendor_op = if holds_placed(delivery) { LedgerOp::Release } else { LedgerOp::Credit };
    if let Some(vendor_id) = order.vendor_id {
        if order.amount_due_vendor.is_positive() {
            let vendor = wallets::fetch_or_create_wallet(conn, vendor_id).await?;
            ops.push((vendor.id, vendor_op(order.amount_due_vendor)));
        }
    }
    if !holds_placed(delivery) {
        // The buyer's debit was never parked in escrow; nothing to forfeit.
        return Ok(ops);
    }
    let owner = wallets::fetch_or_create_wallet(conn, order.owner_id).await?;
    if order.order_type == crate::db_types::OrderType::Laundry {
        ops.push((owner.id, LedgerOp::Forfeit(order.total_price)));
        return Ok(ops);
    }
    match delivery {
        Some(d) => {
            if let Some(user_id) = d.dispatch_id {
                if d.amount_due_dispatch.is_positive() {
                    let dispatch = wallets::fetch_or_create_wallet(conn, user_id).await?;
                    ops.push((dispatch.id, LedgerOp::Release(d.amount_due_dispatch)));
                }
            }
            ops.push((owner.id, LedgerOp::Forfeit(order.total_price + d.delivery_fee)));
        },
        None => ops.push((owner.id, LedgerOp::Forfeit(order.total_price))),
    }
    Ok(ops)
}

/// The second half of laundry settlement: the vendor confirmed the returned
/// items, so the dispatch payout is released and the owner's fee hold spent.
async fn laundry_return_ops(
    conn: &mut SqliteConnection,
    order: &Order,
    delivery: &Delivery,
) -> Result<Vec<(i64, LedgerOp)>, OrderFlowError> {
    let mut ops = Vec::new();
    if let Some(user_id) = delivery.dispatch_id {
        if delivery.amount_due_dispatch.is_positive() {
            let dispatch = wallets::fetch_or_create_wallet(conn, user_id).await?;
            ops.push((dispatch.id, LedgerOp::Release(delivery.amount_due_dispatch)));
        }
    }
    let owner = wallets::fetch_or_create_wallet(conn, order.owner_id).await?;
    ops.push((owner.id, LedgerOp::Forfeit(delivery.delivery_fee)));
    Ok(ops)
}

/// Records a credit back to the owner for a refund-style settlement.
async fn record_refund(
    conn: &mut SqliteConnection,
    wallet_id: i64,
    amount: Naira,
    tx_type: TransactionType,
    tx_ref: String,
) -> Result<(), LedgerError> {
    if !amount.is_positive() {
        return Ok(());
    }
    let record = NewWalletTransaction::new(wallet_id, tx_ref, amount, tx_type, TransactionDirection::Credit)
        .with_status(PaymentStatus::Paid);
    transactions::insert_transaction(conn, &record).await?;
    Ok(())
}

/// Ledger effects for a delivered product the owner sent back: the goods price
/// goes back to the owner, the vendor's payout hold lapses, and the rider is
/// still paid for the legwork.
async fn settle_product_return(
    conn: &mut SqliteConnection,
    order: &Order,
    delivery: Option<&Delivery>,
) -> Result<Vec<EscrowRelease>, OrderFlowError> {
    let owner = wallets::fetch_or_create_wallet(conn, order.owner_id).await?;
    if !holds_placed(delivery) {
        if order.order_payment_status.is_settled() && order.total_price.is_positive() {
            wallets::adjust_balances(conn, owner.id, order.total_price, Naira::default()).await?;
            let tx_ref = format!("refund-{}", order.order_id.as_str());
            record_refund(conn, owner.id, order.total_price, TransactionType::Refund, tx_ref).await?;
        }
        return Ok(Vec::new());
    }
    let refund = wallets::release_escrow_to_balance(conn, owner.id, order.total_price).await?;
    let mut releases = vec![refund];
    let mut ops = Vec::new();
    if let Some(d) = delivery {
        ops.push((owner.id, LedgerOp::Forfeit(d.delivery_fee)));
        if let Some(user_id) = d.dispatch_id {
            if d.amount_due_dispatch.is_positive() {
                let dispatch = wallets::fetch_or_create_wallet(conn, user_id).await?;
                ops.push((dispatch.id, LedgerOp::Release(d.amount_due_dispatch)));
            }
        }
    }
    if let Some(vendor_id) = order.vendor_id {
        if order.amount_due_vendor.is_positive() {
            let vendor = wallets::fetch_or_create_wallet(conn, vendor_id).await?;
            ops.push((vendor.id, LedgerOp::Forfeit(order.amount_due_vendor)));
        }
    }
    releases.extend(run_ledger_ops(conn, ops).await?);
    let tx_ref = format!("refund-{}", order.order_id.as_str());
    record_refund(conn, owner.id, refund.released, TransactionType::Refund, tx_ref).await?;
    Ok(releases)
}

/// Ledger effects for a cancellation. If holds are in place the owner gets
/// their money back out of escrow (clamped) and the payout holds lapse; a paid
/// but unclaimed order is refunded straight to the balance.
async fn settle_cancellation(
    conn: &mut SqliteConnection,
    order: &Order,
    delivery: Option<&Delivery>,
) -> Result<Vec<EscrowRelease>, OrderFlowError> {
    let owner = wallets::fetch_or_create_wallet(conn, order.owner_id).await?;
    let total = buyer_total(order, delivery);
    let mut releases = Vec::new();
    let refunded;
    if !holds_placed(delivery) {
        if order.order_payment_status.is_settled() && total.is_positive() {
            wallets::adjust_balances(conn, owner.id, total, Naira::default()).await?;
            refunded = total;
        } else {
            refunded = Naira::default();
        }
    } else {
        let refund = wallets::release_escrow_to_balance(conn, owner.id, total).await?;
        refunded = refund.released;
        releases.push(refund);
        let mut ops = Vec::new();
        if let Some(vendor_id) = order.vendor_id {
            if order.amount_due_vendor.is_positive() {
                let vendor = wallets::fetch_or_create_wallet(conn, vendor_id).await?;
                ops.push((vendor.id, LedgerOp::Forfeit(order.amount_due_vendor)));
            }
        }
        if let Some(d) = delivery {
            if let Some(user_id) = d.dispatch_id {
                if d.amount_due_dispatch.is_positive() {
                    let dispatch = wallets::fetch_or_create_wallet(conn, user_id).await?;
                    ops.push((dispatch.id, LedgerOp::Forfeit(d.amount_due_dispatch)));
                }
            }
        }
        releases.extend(run_ledger_ops(conn, ops).await?);
    }
    let tx_ref = format!("cancel-{}", order.order_id.as_str());
    record_refund(conn, owner.id, refunded, TransactionType::OrderCancellation, tx_ref).await?;
    Ok(releases)
}

/// Dispatches the ledger effects for the target order status. Statuses without
/// money movement fall through untouched.
async fn order_ledger_effects(
    conn: &mut SqliteConnection,
    order: &Order,
    delivery: Option<&Delivery>,
    to: OrderStatus,
) -> Result<Vec<EscrowRelease>, OrderFlowError> {
    match to {
        OrderStatus::Accepted => {
            // Holds only make sense once a rider has the job. A force-set to
            // accepted without a claim leaves the ledger alone, so a later
            // settlement can tell the two situations apart.
            match delivery.and_then(|d| d.dispatch_id) {
                Some(dispatch_user) => {
                    let ops = acceptance_hold_ops(conn, order, delivery, Some(dispatch_user)).await?;
                    Ok(run_ledger_ops(conn, ops).await?)
                },
                None => Ok(Vec::new()),
            }
        },
        OrderStatus::Received => {
            let ops = received_ops(conn, order, delivery).await?;
            Ok(run_ledger_ops(conn, ops).await?)
        },
        OrderStatus::ReceivedRejectedProduct => settle_product_return(conn, order, delivery).await,
        OrderStatus::Cancelled => settle_cancellation(conn, order, delivery).await,
        OrderStatus::Pending | OrderStatus::Delivered | OrderStatus::Rejected => Ok(Vec::new()),
    }
}

async fn reread(conn: &mut SqliteConnection, order_id: &OrderId) -> Result<(Order, Option<Delivery>), OrderFlowError> {
    let order = orders::fetch_order(&mut *conn, order_id)
        .await?
        .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
    let delivery = deliveries::fetch_delivery(conn, order_id).await?;
    Ok((order, delivery))
}

//------------------------------------ EscrowLedgerDatabase  ----------------------------------------------------------

impl EscrowLedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_wallet(&self, wallet_id: i64) -> Result<Wallet, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        wallets::fetch_wallet(&mut conn, wallet_id).await
    }

    async fn fetch_or_create_wallet(&self, user_id: i64) -> Result<Wallet, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let wallet = wallets::fetch_or_create_wallet(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(wallet)
    }

    async fn adjust_wallet(
        &self,
        wallet_id: i64,
        balance_delta: Naira,
        escrow_delta: Naira,
    ) -> Result<Wallet, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let wallet = wallets::adjust_balances(&mut tx, wallet_id, balance_delta, escrow_delta).await?;
        tx.commit().await?;
        debug!("⚖️ Wallet {wallet_id} adjusted by ({balance_delta}, {escrow_delta})");
        Ok(wallet)
    }

    async fn release_escrow(&self, wallet_id: i64, amount: Naira) -> Result<EscrowRelease, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let release = wallets::release_escrow_to_balance(&mut tx, wallet_id, amount).await?;
        tx.commit().await?;
        Ok(release)
    }

    async fn insert_transaction(&self, tx_record: NewWalletTransaction) -> Result<WalletTransaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let record = transactions::insert_transaction(&mut tx, &tx_record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn fetch_transaction(&self, tx_ref: &str) -> Result<WalletTransaction, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transaction(&mut conn, tx_ref).await
    }

    async fn apply_transaction_update(&self, patch: &TransactionUpdate) -> Result<WalletTransaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let record = transactions::apply_transaction_update(&mut tx, patch).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn create_pending_top_up(
        &self,
        user_id: i64,
        amount: Naira,
        tx_ref: &str,
    ) -> Result<WalletTransaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let wallet = wallets::fetch_or_create_wallet(&mut tx, user_id).await?;
        let record = NewWalletTransaction::new(
            wallet.id,
            tx_ref.to_string(),
            amount,
            TransactionType::FundWallet,
            TransactionDirection::Credit,
        );
        let record = transactions::insert_transaction(&mut tx, &record).await?;
        tx.commit().await?;
        info!("💰️ Pending top-up of {amount} recorded for user {user_id} ({tx_ref})");
        Ok(record)
    }

    async fn pay_for_order_with_wallet(&self, order_id: &OrderId) -> Result<(Order, WalletTransaction), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("order {order_id}")))?;
        if order.order_payment_status.is_settled() {
            return Err(LedgerError::Conflict(format!("order {order_id} is already paid")));
        }
        if order.order_status != OrderStatus::Pending {
            return Err(LedgerError::Conflict(format!(
                "order {order_id} is {} and can no longer be paid",
                order.order_status
            )));
        }
        let delivery = deliveries::fetch_delivery(&mut tx, order_id).await?;
        let total = buyer_total(&order, delivery.as_ref());
        if !total.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("order {order_id} has a non-positive total of {total}")));
        }
        let wallet = wallets::fetch_or_create_wallet(&mut tx, order.owner_id).await?;
        wallets::adjust_balances(&mut tx, wallet.id, -total, Naira::default()).await?;
        orders::set_payment_status(&mut tx, order_id, PaymentStatus::Paid).await?;
        let mut record = NewWalletTransaction::new(
            wallet.id,
            format!("wallet-pay-{}", order.order_id.as_str()),
            total,
            TransactionType::PaidWithWallet,
            TransactionDirection::Debit,
        )
        .with_status(PaymentStatus::Paid)
        .with_parties(Some(format!("user-{}", order.owner_id)), order.vendor_id.map(|v| format!("user-{v}")));
        record.payment_method = Some("wallet".to_string());
        let record = transactions::insert_transaction(&mut tx, &record).await?;
        let order = orders::fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("order {order_id}")))?;
        tx.commit().await?;
        info!("💳️ Order {order_id} paid from wallet {} ({total})", wallet.id);
        Ok((order, record))
    }

    async fn create_pending_withdrawal(
        &self,
        user_id: i64,
        breakdown: &WithdrawalBreakdown,
        tx_ref: &str,
    ) -> Result<WalletTransaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let wallet = wallets::fetch_or_create_wallet(&mut tx, user_id).await?;
        if wallet.balance < breakdown.gross {
            return Err(LedgerError::InsufficientFunds {
                wallet_id: wallet.id,
                requested: breakdown.gross,
                available: wallet.balance,
            });
        }
        let mut record = NewWalletTransaction::new(
            wallet.id,
            tx_ref.to_string(),
            breakdown.net,
            TransactionType::Withdrawal,
            TransactionDirection::Debit,
        );
        record.payment_method = Some("bank_transfer".to_string());
        let record = transactions::insert_transaction(&mut tx, &record).await?;
        tx.commit().await?;
        info!("🏧️ Pending withdrawal for user {user_id}: gross {}, net {} ({tx_ref})", breakdown.gross, breakdown.net);
        Ok(record)
    }

    async fn settle_withdrawal(
        &self,
        tx_ref: &str,
        gross: Naira,
        success: bool,
    ) -> Result<WalletTransaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let record = transactions::fetch_transaction(&mut tx, tx_ref).await?;
        if record.payment_status != PaymentStatus::Pending {
            return Err(LedgerError::Conflict(format!(
                "withdrawal {tx_ref} is already {}",
                record.payment_status
            )));
        }
        let status = if success { PaymentStatus::Paid } else { PaymentStatus::Failed };
        if success {
            wallets::adjust_balances(&mut tx, record.wallet_id, -gross, Naira::default()).await?;
        }
        let patch = TransactionUpdate {
            tx_ref: tx_ref.to_string(),
            payment_status: status,
            is_fund_wallet: false,
            payment_method: None,
            to_user: None,
        };
        let record = transactions::apply_transaction_update(&mut tx, &patch).await?;
        tx.commit().await?;
        info!("🏧️ Withdrawal {tx_ref} settled as {status}");
        Ok(record)
    }

    async fn fetch_charges(&self) -> Result<ChargeAndCommission, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        charges::fetch_charges(&mut conn).await
    }
}

//---------------------------------- OrderFulfilmentDatabase ----------------------------------------------------------

impl OrderFulfilmentDatabase for SqliteDatabase {
    async fn fetch_user(&self, user_id: i64) -> Result<UserAccount, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        users::fetch_user(&mut conn, user_id).await?.ok_or(OrderFlowError::UserNotFound(user_id))
    }

    async fn insert_order(
        &self,
        order: NewOrder,
        delivery: Option<NewDelivery>,
    ) -> Result<FulfilmentOutcome, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(&mut tx, &order).await?;
        let delivery = match delivery {
            Some(d) => Some(deliveries::insert_delivery(&mut tx, &d).await?),
            None => None,
        };
        tx.commit().await?;
        info!("🧾️ Order {} created for user {}", order.order_id, order.owner_id);
        Ok(FulfilmentOutcome { order, delivery, releases: Vec::new() })
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<(Order, Option<Delivery>), OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        reread(&mut conn, order_id).await
    }

    async fn claim_delivery(&self, order_id: &OrderId, rider: &UserAccount) -> Result<FulfilmentOutcome, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        if !order.order_payment_status.is_settled() {
            return Err(OrderFlowError::Conflict(format!("order {order_id} has not been paid")));
        }
        let delivery = deliveries::fetch_delivery(&mut tx, order_id)
            .await?
            .ok_or_else(|| OrderFlowError::Conflict(format!("order {order_id} has no delivery leg")))?;
        if !transitions::delivery_transition_allowed(rider.role, delivery.status, DeliveryStatus::Accepted) {
            return Err(OrderFlowError::InvalidDeliveryTransition {
                role: rider.role,
                from: delivery.status,
                to: DeliveryStatus::Accepted,
            });
        }
        let dispatch_user = rider.dispatch_wallet_user();
        if deliveries::claim_delivery(&mut tx, order_id, rider.id, dispatch_user).await? == 0 {
            return Err(OrderFlowError::Conflict(format!("delivery for order {order_id} was already claimed")));
        }
        orders::update_order_status(&mut tx, order_id, OrderStatus::Accepted).await?;
        let ops = acceptance_hold_ops(&mut tx, &order, Some(&delivery), Some(dispatch_user)).await?;
        run_ledger_ops(&mut tx, ops).await?;
        let (order, delivery) = reread(&mut tx, order_id).await?;
        tx.commit().await?;
        info!("🛵️ Rider {} claimed the delivery for order {}", rider.id, order.order_id);
        Ok(FulfilmentOutcome { order, delivery, releases: Vec::new() })
    }

    async fn apply_transition(
        &self,
        order_id: &OrderId,
        actor: &UserAccount,
        target: TransitionTarget,
    ) -> Result<FulfilmentOutcome, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        let delivery = deliveries::fetch_delivery(&mut tx, order_id).await?;
        if let Some(to) = target.order_status {
            if !transitions::order_transition_allowed(actor.role, order.order_status, to) {
                return Err(OrderFlowError::InvalidTransition { role: actor.role, from: order.order_status, to });
            }
        }
        if let Some(to) = target.delivery_status {
            let d = delivery
                .as_ref()
                .ok_or_else(|| OrderFlowError::Conflict(format!("order {order_id} has no delivery leg")))?;
            if !transitions::delivery_transition_allowed(actor.role, d.status, to) {
                return Err(OrderFlowError::InvalidDeliveryTransition { role: actor.role, from: d.status, to });
            }
        }
        let mut releases = Vec::new();
        if let Some(to) = target.order_status {
            releases.extend(order_ledger_effects(&mut tx, &order, delivery.as_ref(), to).await?);
            orders::update_order_status(&mut tx, order_id, to).await?;
            if to == OrderStatus::Cancelled {
                if let Some(reason) = &target.reason {
                    orders::set_cancel_reason(&mut tx, order_id, reason).await?;
                }
                if order.order_payment_status.is_settled() {
                    orders::set_payment_status(&mut tx, order_id, PaymentStatus::Cancelled).await?;
                }
                // Owners and riders accumulate strikes toward suspension;
                // vendor and admin cancellations do not count.
                if matches!(actor.role, Role::Owner | Role::Rider) {
                    users::increment_cancel_count(&mut tx, actor.id).await?;
                }
            }
        }
        if let Some(to) = target.delivery_status {
            if to == DeliveryStatus::LaundryReceived {
                if let Some(d) = delivery.as_ref() {
                    let ops = laundry_return_ops(&mut tx, &order, d).await?;
                    releases.extend(run_ledger_ops(&mut tx, ops).await?);
                }
            }
            deliveries::update_delivery_status(&mut tx, order_id, to).await?;
        }
        if let Some(entry) = &target.audit {
            audit::insert_audit(&mut tx, entry).await?;
        }
        let (order, delivery) = reread(&mut tx, order_id).await?;
        tx.commit().await?;
        debug!(
            "🔄️ Order {} is now {} (delivery: {:?})",
            order.order_id,
            order.order_status,
            delivery.as_ref().map(|d| d.status)
        );
        Ok(FulfilmentOutcome { order, delivery, releases })
    }

    async fn sync_order_status(&self, update: &OrderStatusUpdate) -> Result<(), OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        if orders::update_order_status(&mut tx, &update.order_id, update.order_status).await? == 0 {
            return Err(OrderFlowError::OrderNotFound(update.order_id.clone()));
        }
        if let Some(status) = update.delivery_status {
            if deliveries::update_delivery_status(&mut tx, &update.order_id, status).await? == 0 {
                return Err(OrderFlowError::Conflict(format!("order {} has no delivery leg", update.order_id)));
            }
        }
        tx.commit().await?;
        debug!("🔄️ Synced order {} to {}", update.order_id, update.order_status);
        Ok(())
    }

    async fn set_order_payment_status(&self, order_id: &OrderId, status: PaymentStatus) -> Result<(), OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        if orders::set_payment_status(&mut tx, order_id, status).await? == 0 {
            return Err(OrderFlowError::OrderNotFound(order_id.clone()));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn suspend_three_strike_users(&self, until: DateTime<Utc>) -> Result<Vec<i64>, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let offenders = users::fetch_three_strike_users(&mut tx).await?;
        let mut suspended = Vec::with_capacity(offenders.len());
        for user in &offenders {
            users::suspend_user(&mut tx, user.id, until).await?;
            let entry = NewAuditEntry::new(user.id, user.role, "auto_suspend", "user", user.id.to_string())
                .with_change("is_suspended", false, true);
            audit::insert_audit(&mut tx, &entry).await?;
            suspended.push(user.id);
        }
        tx.commit().await?;
        if !suspended.is_empty() {
            info!("🚫️ Suspended {} users for repeated cancellations until {until}", suspended.len());
        }
        Ok(suspended)
    }

    async fn reset_expired_suspensions(&self, now: DateTime<Utc>) -> Result<u64, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let count = users::reset_expired_suspensions(&mut tx, now).await?;
        tx.commit().await?;
        if count > 0 {
            info!("🔓️ Lifted {count} expired suspensions");
        }
        Ok(count)
    }
}
