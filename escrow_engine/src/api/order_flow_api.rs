//! The fulfilment API: order creation, claiming, the role-gated status moves
//! and the admin force-set. Actor identity is checked here; the storage layer
//! re-validates role and status inside the transaction that applies the move.

use chrono::{Duration, Utc};
use log::{info, warn};
use mse_common::Naira;
use rand::{distributions::Alphanumeric, Rng};

use crate::{
    db_types::{
        Delivery,
        DeliveryStatus,
        FulfilmentOutcome,
        NewAuditEntry,
        NewDelivery,
        NewOrder,
        Order,
        OrderId,
        OrderItem,
        OrderStatus,
        OrderType,
        RequireDelivery,
        Role,
        TransitionTarget,
        UserAccount,
    },
    fees,
    settlement::{NotificationData, OrderStatusUpdate, SettlementMessage, SettlementSink},
    traits::{EscrowLedgerDatabase, OrderFlowError, OrderFulfilmentDatabase},
};

/// How long a three-strike suspension lasts.
pub const SUSPENSION_DAYS: i64 = 3;

/// The delivery leg requested at checkout.
#[derive(Debug, Clone)]
pub struct DeliveryRoute {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub distance_km: f64,
}

/// Everything needed to price and place an order.
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub owner_id: i64,
    pub vendor_id: Option<i64>,
    pub order_type: OrderType,
    pub items: Vec<OrderItem>,
    pub require_delivery: RequireDelivery,
    pub route: Option<DeliveryRoute>,
}

fn new_order_id() -> OrderId {
    let nonce: String = rand::thread_rng().sample_iter(&Alphanumeric).take(10).map(char::from).collect();
    OrderId(format!("ord-{}", nonce.to_lowercase()))
}

#[derive(Debug, Clone)]
pub struct OrderFlowApi<B, S> {
    db: B,
    sink: S,
}

impl<B, S> OrderFlowApi<B, S>
where
    B: OrderFulfilmentDatabase + EscrowLedgerDatabase,
    S: SettlementSink,
{
    pub fn new(db: B, sink: S) -> Self {
        Self { db, sink }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<(Order, Option<Delivery>), OrderFlowError> {
        OrderFulfilmentDatabase::fetch_order(&self.db, order_id).await
    }

    /// Prices and places a new order. Package deliveries carry no goods and no
    /// vendor payout; every other category prices its line items and the
    /// vendor's net payout up front so the amounts are frozen at checkout.
    pub async fn create_order(&self, request: NewOrderRequest) -> Result<FulfilmentOutcome, OrderFlowError> {
        let charges = self.db.fetch_charges().await?;
        let (total_price, amount_due_vendor) = match request.order_type {
            OrderType::Package => (Naira::default(), Naira::default()),
            order_type => {
                if request.vendor_id.is_none() {
                    return Err(OrderFlowError::Conflict(format!("{order_type} orders need a vendor")));
                }
                let total = fees::items_total(&request.items).map_err(crate::traits::LedgerError::from)?;
                let net = fees::vendor_payout(&charges, order_type, &request.items)
                    .map_err(crate::traits::LedgerError::from)?;
                (total, net)
            },
        };
        let order_id = new_order_id();
        let delivery = match (request.require_delivery, request.route) {
            (RequireDelivery::Delivery, Some(route)) => {
                let fee = fees::delivery_fee(&charges, route.distance_km).map_err(crate::traits::LedgerError::from)?;
                let payout = fees::dispatch_payout(&charges, fee).map_err(crate::traits::LedgerError::from)?;
                Some(NewDelivery {
                    order_id: order_id.clone(),
                    origin: route.origin,
                    destination: route.destination,
                    distance_km: route.distance_km,
                    delivery_fee: fee,
                    amount_due_dispatch: payout,
                })
            },
            (RequireDelivery::Delivery, None) => {
                return Err(OrderFlowError::Conflict("a delivery order needs a route".to_string()))
            },
            (RequireDelivery::Pickup, _) => None,
        };
        let order = NewOrder {
            order_id,
            owner_id: request.owner_id,
            vendor_id: request.vendor_id,
            order_type: request.order_type,
            total_price,
            amount_due_vendor,
            require_delivery: request.require_delivery,
        };
        self.db.insert_order(order, delivery).await
    }

    /// A rider claims an unassigned delivery. Suspended riders are turned
    /// away; losing the race for the claim is a [`OrderFlowError::Conflict`].
    pub async fn rider_accept_order(
        &self,
        rider: &UserAccount,
        order_id: &OrderId,
    ) -> Result<FulfilmentOutcome, OrderFlowError> {
        if rider.role != Role::Rider {
            return Err(OrderFlowError::Forbidden(format!("only riders claim deliveries, {} is a {}", rider.id, rider.role)));
        }
        if rider.is_suspended {
            return Err(OrderFlowError::Suspended(rider.id));
        }
        let outcome = self.db.claim_delivery(order_id, rider).await?;
        self.publish_status_sync(&outcome, Vec::new()).await;
        Ok(outcome)
    }

    /// The rider hands the goods over.
    pub async fn rider_mark_delivered(
        &self,
        rider: &UserAccount,
        order_id: &OrderId,
    ) -> Result<FulfilmentOutcome, OrderFlowError> {
        let (_, delivery) = self.fetch_order(order_id).await?;
        let claimed_by = delivery.as_ref().and_then(|d| d.rider_id);
        if rider.role != Role::Admin && claimed_by != Some(rider.id) {
            return Err(OrderFlowError::Forbidden(format!("rider {} did not claim order {order_id}", rider.id)));
        }
        let target = TransitionTarget::order(OrderStatus::Delivered).with_delivery(DeliveryStatus::Delivered);
        let outcome = self.db.apply_transition(order_id, rider, target).await?;
        self.publish_status_sync(&outcome, Vec::new()).await;
        Ok(outcome)
    }

    /// The vendor hands a pickup order over directly.
    pub async fn vendor_mark_delivered(
        &self,
        vendor: &UserAccount,
        order_id: &OrderId,
    ) -> Result<FulfilmentOutcome, OrderFlowError> {
        let (order, _) = self.fetch_order(order_id).await?;
        self.check_vendor(vendor, &order, order_id)?;
        let target = TransitionTarget::order(OrderStatus::Delivered);
        let outcome = self.db.apply_transition(order_id, vendor, target).await?;
        self.publish_status_sync(&outcome, Vec::new()).await;
        Ok(outcome)
    }

    /// The owner confirms receipt: payouts are released and the order settles.
    /// Laundry keeps the dispatch hold until the vendor confirms the returned
    /// items, so its delivery leg is left as delivered here.
    pub async fn owner_confirm_received(
        &self,
        owner: &UserAccount,
        order_id: &OrderId,
    ) -> Result<FulfilmentOutcome, OrderFlowError> {
        let (order, delivery) = self.fetch_order(order_id).await?;
        self.check_owner(owner, &order, order_id)?;
        let mut target = TransitionTarget::order(OrderStatus::Received);
        if let Some(d) = &delivery {
            if order.order_type != OrderType::Laundry && d.status == DeliveryStatus::Delivered {
                target = target.with_delivery(DeliveryStatus::Received);
            }
        }
        let outcome = self.db.apply_transition(order_id, owner, target).await?;
        self.publish_status_sync(&outcome, Vec::new()).await;
        Ok(outcome)
    }

    /// The vendor confirms the laundry items came back, releasing the dispatch
    /// payout.
    pub async fn vendor_confirm_laundry_received(
        &self,
        vendor: &UserAccount,
        order_id: &OrderId,
    ) -> Result<FulfilmentOutcome, OrderFlowError> {
        let (order, _) = self.fetch_order(order_id).await?;
        self.check_vendor(vendor, &order, order_id)?;
        if order.order_type != OrderType::Laundry {
            return Err(OrderFlowError::Conflict(format!("order {order_id} is not a laundry order")));
        }
        let target = TransitionTarget { delivery_status: Some(DeliveryStatus::LaundryReceived), ..Default::default() };
        let outcome = self.db.apply_transition(order_id, vendor, target).await?;
        self.publish_status_sync(&outcome, Vec::new()).await;
        Ok(outcome)
    }

    /// The owner sends a delivered product back.
    pub async fn owner_reject_product(
        &self,
        owner: &UserAccount,
        order_id: &OrderId,
    ) -> Result<FulfilmentOutcome, OrderFlowError> {
        let (order, _) = self.fetch_order(order_id).await?;
        self.check_owner(owner, &order, order_id)?;
        if order.order_type != OrderType::Product {
            return Err(OrderFlowError::Conflict(format!("only product orders can be rejected, {order_id} is {}", order.order_type)));
        }
        let outcome = self.db.apply_transition(order_id, owner, TransitionTarget::order(OrderStatus::Rejected)).await?;
        self.publish_status_sync(&outcome, Vec::new()).await;
        Ok(outcome)
    }

    /// The vendor takes the rejected product back; the owner is refunded the
    /// goods price and the rider still paid for the trip.
    pub async fn vendor_accept_rejected_product(
        &self,
        vendor: &UserAccount,
        order_id: &OrderId,
    ) -> Result<FulfilmentOutcome, OrderFlowError> {
        let (order, _) = self.fetch_order(order_id).await?;
        self.check_vendor(vendor, &order, order_id)?;
        let target = TransitionTarget::order(OrderStatus::ReceivedRejectedProduct);
        let outcome = self.db.apply_transition(order_id, vendor, target).await?;
        self.publish_status_sync(&outcome, Vec::new()).await;
        Ok(outcome)
    }

    /// Cancels an order. Owners may cancel their own orders, vendors may
    /// decline one that is still pending, and the claiming rider may abandon
    /// an accepted delivery. A cancellation after the claim refunds the owner
    /// out of escrow and lapses the payout holds; owner and rider
    /// cancellations accumulate strikes toward a suspension at the next
    /// sweep.
    pub async fn cancel_order(
        &self,
        actor: &UserAccount,
        order_id: &OrderId,
        reason: Option<String>,
    ) -> Result<FulfilmentOutcome, OrderFlowError> {
        let (order, delivery) = self.fetch_order(order_id).await?;
        match actor.role {
            Role::Admin => {},
            Role::Owner => self.check_owner(actor, &order, order_id)?,
            Role::Vendor => self.check_vendor(actor, &order, order_id)?,
            Role::Rider => {
                if delivery.as_ref().and_then(|d| d.rider_id) != Some(actor.id) {
                    return Err(OrderFlowError::Forbidden(format!(
                        "rider {} did not claim order {order_id}",
                        actor.id
                    )));
                }
            },
        }
        let mut target = TransitionTarget::order(OrderStatus::Cancelled).with_reason(reason);
        if let Some(d) = &delivery {
            if matches!(d.status, DeliveryStatus::Pending | DeliveryStatus::Accepted) {
                target = target.with_delivery(DeliveryStatus::Cancelled);
            }
        }
        let outcome = self.db.apply_transition(order_id, actor, target).await?;
        self.publish_status_sync(&outcome, Vec::new()).await;
        Ok(outcome)
    }

    /// Admin force-set of the order (and optionally delivery) status. The move
    /// still carries the ledger effects for the target status and is written
    /// to the audit log in the same transaction.
    pub async fn admin_force_status(
        &self,
        admin: &UserAccount,
        order_id: &OrderId,
        order_status: OrderStatus,
        delivery_status: Option<DeliveryStatus>,
        reason: Option<String>,
    ) -> Result<FulfilmentOutcome, OrderFlowError> {
        if admin.role != Role::Admin {
            return Err(OrderFlowError::Forbidden(format!("user {} is not an admin", admin.id)));
        }
        let (order, delivery) = self.fetch_order(order_id).await?;
        let mut audit = NewAuditEntry::new(admin.id, admin.role, "force_status", "order", order_id.0.clone())
            .with_change("order_status", order.order_status, order_status);
        if let (Some(d), Some(to)) = (&delivery, delivery_status) {
            audit = audit.with_change("delivery_status", d.status, to);
        }
        let mut target = TransitionTarget::order(order_status).with_reason(reason).with_audit(audit);
        target.delivery_status = delivery_status;
        let outcome = self.db.apply_transition(order_id, admin, target).await?;
        info!("🔧️ Admin {} forced order {order_id} to {order_status}", admin.id);
        self.publish_status_sync(&outcome, Vec::new()).await;
        Ok(outcome)
    }

    /// The periodic suspension sweep: suspend three-strike cancellers for
    /// [`SUSPENSION_DAYS`] and lift suspensions that have run their course.
    pub async fn sweep_suspensions(&self) -> Result<(Vec<i64>, u64), OrderFlowError> {
        let now = Utc::now();
        let suspended = self.db.suspend_three_strike_users(now + Duration::days(SUSPENSION_DAYS)).await?;
        let reset = self.db.reset_expired_suspensions(now).await?;
        Ok((suspended, reset))
    }

    fn check_owner(&self, actor: &UserAccount, order: &Order, order_id: &OrderId) -> Result<(), OrderFlowError> {
        if actor.role != Role::Admin && order.owner_id != actor.id {
            return Err(OrderFlowError::Forbidden(format!("user {} does not own order {order_id}", actor.id)));
        }
        Ok(())
    }

    fn check_vendor(&self, actor: &UserAccount, order: &Order, order_id: &OrderId) -> Result<(), OrderFlowError> {
        if actor.role != Role::Admin && order.vendor_id != Some(actor.id) {
            return Err(OrderFlowError::Forbidden(format!("user {} is not the vendor on order {order_id}", actor.id)));
        }
        Ok(())
    }

    /// Hands the committed row state to the settlement pipeline so the other
    /// services converge. The database is the source of truth; a failed
    /// publish is logged and the local result stands.
    async fn publish_status_sync(&self, outcome: &FulfilmentOutcome, notification_data: Vec<NotificationData>) {
        let update = OrderStatusUpdate {
            order_id: outcome.order.order_id.clone(),
            order_status: outcome.order.order_status,
            delivery_status: outcome.delivery.as_ref().map(|d| d.status),
            cache_keys: vec![
                format!("order:{}", outcome.order.order_id.as_str()),
                format!("user_orders:{}", outcome.order.owner_id),
            ],
            notification_data,
        };
        if let Err(e) = self.sink.publish(SettlementMessage::UpdateOrderStatus(update)).await {
            warn!("📤️ Could not publish status sync for order {}: {e}", outcome.order.order_id);
        }
    }
}
