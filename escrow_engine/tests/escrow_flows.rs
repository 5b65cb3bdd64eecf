//! End-to-end flows against a real SQLite store: escrow holds and releases,
//! the role-gated state machine, wallet payments and withdrawals.

use escrow_engine::{
    db_types::{
        DeliveryStatus,
        FulfilmentOutcome,
        OrderItem,
        OrderStatus,
        OrderType,
        PaymentStatus,
        RequireDelivery,
        Role,
        TransactionType,
        UserAccount,
    },
    settlement::SettlementMessage,
    test_utils::{fund_wallet, prepare_test_env, random_db_url, seed_user, MemorySink, MockGateway, MockPayout},
    traits::{EscrowLedgerDatabase, LedgerError, OrderFlowError, OrderFulfilmentDatabase},
    DeliveryRoute,
    LedgerApi,
    NewOrderRequest,
    OrderFlowApi,
    SqliteDatabase,
    MAX_TOP_UP,
};
use mse_common::Naira;
use tokio::runtime::Runtime;

struct Harness {
    db: SqliteDatabase,
    sink: MemorySink,
    orders: OrderFlowApi<SqliteDatabase, MemorySink>,
    ledger: LedgerApi<SqliteDatabase, MemorySink>,
}

async fn harness() -> Harness {
    let url = random_db_url();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("could not open test database");
    let sink = MemorySink::new();
    Harness {
        orders: OrderFlowApi::new(db.clone(), sink.clone()),
        ledger: LedgerApi::new(db.clone(), sink.clone()),
        db,
        sink,
    }
}

fn naira(n: i64) -> Naira {
    Naira::from_naira(n)
}

/// A ₦4 000 food order with a 5 km delivery leg. With the seeded fee
/// configuration: fee ₦1 000, dispatch net ₦850, vendor net ₦3 600, buyer
/// total ₦5 000.
async fn place_food_order(h: &Harness, owner: &UserAccount, vendor: &UserAccount) -> FulfilmentOutcome {
    h.orders
        .create_order(NewOrderRequest {
            owner_id: owner.id,
            vendor_id: Some(vendor.id),
            order_type: OrderType::Food,
            items: vec![OrderItem::new(naira(2_000), 2)],
            require_delivery: RequireDelivery::Delivery,
            route: Some(DeliveryRoute { origin: None, destination: None, distance_km: 5.0 }),
        })
        .await
        .expect("could not place order")
}

#[test]
fn food_order_happy_path_settles_everyone() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        let rider = seed_user(&h.db, "remi", Role::Rider, None).await;
        fund_wallet(&h.db, owner.id, naira(10_000)).await;

        let placed = place_food_order(&h, &owner, &vendor).await;
        let order_id = placed.order.order_id.clone();
        assert_eq!(placed.order.amount_due_vendor, naira(3_600));
        let delivery = placed.delivery.expect("expected a delivery leg");
        assert_eq!(delivery.delivery_fee, naira(1_000));
        assert_eq!(delivery.amount_due_dispatch, naira(850));

        let (paid, record) = h.ledger.pay_with_wallet(&order_id).await.unwrap();
        assert_eq!(paid.order_payment_status, PaymentStatus::Paid);
        assert_eq!(record.transaction_type, TransactionType::PaidWithWallet);
        assert_eq!(record.amount, naira(5_000));
        let owner_wallet = h.db.fetch_or_create_wallet(owner.id).await.unwrap();
        assert_eq!(owner_wallet.balance, naira(5_000));

        let claimed = h.orders.rider_accept_order(&rider, &order_id).await.unwrap();
        assert_eq!(claimed.order.order_status, OrderStatus::Accepted);
        let owner_wallet = h.db.fetch_or_create_wallet(owner.id).await.unwrap();
        let vendor_wallet = h.db.fetch_or_create_wallet(vendor.id).await.unwrap();
        let rider_wallet = h.db.fetch_or_create_wallet(rider.id).await.unwrap();
        assert_eq!(owner_wallet.escrow_balance, naira(5_000));
        assert_eq!(vendor_wallet.escrow_balance, naira(3_600));
        assert_eq!(rider_wallet.escrow_balance, naira(850));

        h.orders.rider_mark_delivered(&rider, &order_id).await.unwrap();
        let settled = h.orders.owner_confirm_received(&owner, &order_id).await.unwrap();
        assert_eq!(settled.order.order_status, OrderStatus::Received);
        assert_eq!(settled.partial_releases().count(), 0);

        let owner_wallet = h.db.fetch_or_create_wallet(owner.id).await.unwrap();
        let vendor_wallet = h.db.fetch_or_create_wallet(vendor.id).await.unwrap();
        let rider_wallet = h.db.fetch_or_create_wallet(rider.id).await.unwrap();
        assert_eq!(owner_wallet.balance, naira(5_000));
        assert_eq!(owner_wallet.escrow_balance, Naira::default());
        assert_eq!(vendor_wallet.balance, naira(3_600));
        assert_eq!(vendor_wallet.escrow_balance, Naira::default());
        assert_eq!(rider_wallet.balance, naira(850));
        assert_eq!(rider_wallet.escrow_balance, Naira::default());

        let syncs = h
            .sink
            .messages()
            .into_iter()
            .filter(|m| matches!(m, SettlementMessage::UpdateOrderStatus(_)))
            .count();
        assert!(syncs >= 3, "every transition should queue a status sync");
    });
}

#[test]
fn wallet_payment_is_all_or_nothing() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        fund_wallet(&h.db, owner.id, naira(1_000)).await;

        let placed = place_food_order(&h, &owner, &vendor).await;
        let order_id = placed.order.order_id.clone();

        let err = h.ledger.pay_with_wallet(&order_id).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }), "got {err:?}");

        // Nothing moved and nothing was recorded.
        let wallet = h.db.fetch_or_create_wallet(owner.id).await.unwrap();
        assert_eq!(wallet.balance, naira(1_000));
        let (order, _) = OrderFulfilmentDatabase::fetch_order(&h.db, &order_id).await.unwrap();
        assert_eq!(order.order_payment_status, PaymentStatus::Pending);
        let tx_ref = format!("wallet-pay-{}", order_id.as_str());
        assert!(matches!(h.db.fetch_transaction(&tx_ref).await, Err(LedgerError::NotFound(_))));
    });
}

#[test]
fn only_one_rider_wins_the_claim() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        let first = seed_user(&h.db, "remi", Role::Rider, None).await;
        let second = seed_user(&h.db, "tayo", Role::Rider, None).await;
        fund_wallet(&h.db, owner.id, naira(10_000)).await;

        let placed = place_food_order(&h, &owner, &vendor).await;
        let order_id = placed.order.order_id.clone();
        h.ledger.pay_with_wallet(&order_id).await.unwrap();

        h.orders.rider_accept_order(&first, &order_id).await.unwrap();
        let err = h.orders.rider_accept_order(&second, &order_id).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::InvalidDeliveryTransition { .. } | OrderFlowError::Conflict(_)));

        // The loser's wallet was never touched.
        let wallet = h.db.fetch_or_create_wallet(second.id).await.unwrap();
        assert_eq!(wallet.escrow_balance, Naira::default());
    });
}

#[test]
fn unpaid_orders_cannot_be_claimed() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        let rider = seed_user(&h.db, "remi", Role::Rider, None).await;

        let placed = place_food_order(&h, &owner, &vendor).await;
        let err = h.orders.rider_accept_order(&rider, &placed.order.order_id).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::Conflict(_)));
    });
}

#[test]
fn illegal_transitions_are_rejected() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        let rider = seed_user(&h.db, "remi", Role::Rider, None).await;
        let stranger = seed_user(&h.db, "mallory", Role::Owner, None).await;
        fund_wallet(&h.db, owner.id, naira(10_000)).await;

        let placed = place_food_order(&h, &owner, &vendor).await;
        let order_id = placed.order.order_id.clone();
        h.ledger.pay_with_wallet(&order_id).await.unwrap();
        h.orders.rider_accept_order(&rider, &order_id).await.unwrap();

        // The order is accepted, not delivered: the owner cannot confirm yet.
        let err = h.orders.owner_confirm_received(&owner, &order_id).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::InvalidTransition { .. }));

        // Another owner cannot act on this order at all.
        let err = h.orders.cancel_order(&stranger, &order_id, None).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::Forbidden(_)));

        // Escrow is untouched by the failed attempts.
        let owner_wallet = h.db.fetch_or_create_wallet(owner.id).await.unwrap();
        assert_eq!(owner_wallet.escrow_balance, naira(5_000));
    });
}

#[test]
fn cancellation_refunds_the_owner_and_drops_the_holds() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        let rider = seed_user(&h.db, "remi", Role::Rider, None).await;
        fund_wallet(&h.db, owner.id, naira(10_000)).await;

        let placed = place_food_order(&h, &owner, &vendor).await;
        let order_id = placed.order.order_id.clone();
        h.ledger.pay_with_wallet(&order_id).await.unwrap();
        h.orders.rider_accept_order(&rider, &order_id).await.unwrap();

        let cancelled = h.orders.cancel_order(&owner, &order_id, Some("changed my mind".to_string())).await.unwrap();
        assert_eq!(cancelled.order.order_status, OrderStatus::Cancelled);
        assert_eq!(cancelled.order.order_payment_status, PaymentStatus::Cancelled);
        assert_eq!(cancelled.order.cancel_reason.as_deref(), Some("changed my mind"));

        let owner_wallet = h.db.fetch_or_create_wallet(owner.id).await.unwrap();
        let vendor_wallet = h.db.fetch_or_create_wallet(vendor.id).await.unwrap();
        let rider_wallet = h.db.fetch_or_create_wallet(rider.id).await.unwrap();
        assert_eq!(owner_wallet.balance, naira(10_000));
        assert_eq!(owner_wallet.escrow_balance, Naira::default());
        assert_eq!(vendor_wallet.escrow_balance, Naira::default());
        assert_eq!(vendor_wallet.balance, Naira::default());
        assert_eq!(rider_wallet.escrow_balance, Naira::default());
        assert_eq!(rider_wallet.balance, Naira::default());

        let refund = h.db.fetch_transaction(&format!("cancel-{}", order_id.as_str())).await.unwrap();
        assert_eq!(refund.transaction_type, TransactionType::OrderCancellation);
        assert_eq!(refund.amount, naira(5_000));

        let owner = OrderFulfilmentDatabase::fetch_user(&h.db, owner.id).await.unwrap();
        assert_eq!(owner.order_cancel_count, 1);
    });
}

#[test]
fn rider_abandoning_a_claim_refunds_the_owner_and_earns_a_strike() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        let rider = seed_user(&h.db, "remi", Role::Rider, None).await;
        let other = seed_user(&h.db, "tayo", Role::Rider, None).await;
        fund_wallet(&h.db, owner.id, naira(10_000)).await;

        let placed = place_food_order(&h, &owner, &vendor).await;
        let order_id = placed.order.order_id.clone();
        h.ledger.pay_with_wallet(&order_id).await.unwrap();
        h.orders.rider_accept_order(&rider, &order_id).await.unwrap();

        // Only the rider who claimed the delivery may abandon it.
        let err = h.orders.cancel_order(&other, &order_id, None).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::Forbidden(_)));

        let cancelled = h.orders.cancel_order(&rider, &order_id, Some("bike trouble".to_string())).await.unwrap();
        assert_eq!(cancelled.order.order_status, OrderStatus::Cancelled);
        assert_eq!(cancelled.delivery.as_ref().map(|d| d.status), Some(DeliveryStatus::Cancelled));

        // The owner gets the full buyer total back; every hold lapses.
        let owner_wallet = h.db.fetch_or_create_wallet(owner.id).await.unwrap();
        let vendor_wallet = h.db.fetch_or_create_wallet(vendor.id).await.unwrap();
        let rider_wallet = h.db.fetch_or_create_wallet(rider.id).await.unwrap();
        assert_eq!(owner_wallet.balance, naira(10_000));
        assert_eq!(owner_wallet.escrow_balance, Naira::default());
        assert_eq!(vendor_wallet.escrow_balance, Naira::default());
        assert_eq!(rider_wallet.escrow_balance, Naira::default());
        assert_eq!(rider_wallet.balance, Naira::default());

        // The abandonment counts toward the rider's strikes, not the owner's.
        let rider = OrderFulfilmentDatabase::fetch_user(&h.db, rider.id).await.unwrap();
        assert_eq!(rider.order_cancel_count, 1);
        let owner = OrderFulfilmentDatabase::fetch_user(&h.db, owner.id).await.unwrap();
        assert_eq!(owner.order_cancel_count, 0);
    });
}

#[test]
fn three_abandonments_suspend_the_rider_from_claiming() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        let rider = seed_user(&h.db, "remi", Role::Rider, None).await;
        fund_wallet(&h.db, owner.id, naira(30_000)).await;

        for _ in 0..3 {
            let placed = place_food_order(&h, &owner, &vendor).await;
            let order_id = placed.order.order_id.clone();
            h.ledger.pay_with_wallet(&order_id).await.unwrap();
            h.orders.rider_accept_order(&rider, &order_id).await.unwrap();
            h.orders.cancel_order(&rider, &order_id, None).await.unwrap();
        }
        let (suspended, _) = h.orders.sweep_suspensions().await.unwrap();
        assert_eq!(suspended, vec![rider.id]);

        let placed = place_food_order(&h, &owner, &vendor).await;
        h.ledger.pay_with_wallet(&placed.order.order_id).await.unwrap();
        let rider = OrderFulfilmentDatabase::fetch_user(&h.db, rider.id).await.unwrap();
        let err = h.orders.rider_accept_order(&rider, &placed.order.order_id).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::Suspended(_)));
    });
}

#[test]
fn vendors_can_decline_a_pending_order() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        let rider = seed_user(&h.db, "remi", Role::Rider, None).await;
        fund_wallet(&h.db, owner.id, naira(10_000)).await;

        let placed = place_food_order(&h, &owner, &vendor).await;
        let order_id = placed.order.order_id.clone();
        h.ledger.pay_with_wallet(&order_id).await.unwrap();

        let cancelled = h.orders.cancel_order(&vendor, &order_id, Some("out of stock".to_string())).await.unwrap();
        assert_eq!(cancelled.order.order_status, OrderStatus::Cancelled);
        assert_eq!(cancelled.order.order_payment_status, PaymentStatus::Cancelled);

        // Nothing was ever escrowed: the refund is a direct credit, and a
        // vendor decline is not a strike against anyone.
        let owner_wallet = h.db.fetch_or_create_wallet(owner.id).await.unwrap();
        assert_eq!(owner_wallet.balance, naira(10_000));
        assert_eq!(owner_wallet.escrow_balance, Naira::default());
        let vendor = OrderFulfilmentDatabase::fetch_user(&h.db, vendor.id).await.unwrap();
        assert_eq!(vendor.order_cancel_count, 0);

        // Once a rider has claimed, the vendor can no longer decline.
        let placed = place_food_order(&h, &owner, &vendor).await;
        let order_id = placed.order.order_id.clone();
        h.ledger.pay_with_wallet(&order_id).await.unwrap();
        h.orders.rider_accept_order(&rider, &order_id).await.unwrap();
        let err = h.orders.cancel_order(&vendor, &order_id, None).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::InvalidTransition { .. }));
    });
}

#[test]
fn drained_escrow_yields_an_observable_partial_release() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        let rider = seed_user(&h.db, "remi", Role::Rider, None).await;
        fund_wallet(&h.db, owner.id, naira(10_000)).await;

        let placed = place_food_order(&h, &owner, &vendor).await;
        let order_id = placed.order.order_id.clone();
        h.ledger.pay_with_wallet(&order_id).await.unwrap();
        h.orders.rider_accept_order(&rider, &order_id).await.unwrap();
        h.orders.rider_mark_delivered(&rider, &order_id).await.unwrap();

        // Simulate drift: part of the vendor's hold has gone missing.
        let vendor_wallet = h.db.fetch_or_create_wallet(vendor.id).await.unwrap();
        h.db.adjust_wallet(vendor_wallet.id, Naira::default(), naira(-3_000)).await.unwrap();

        let settled = h.orders.owner_confirm_received(&owner, &order_id).await.unwrap();
        let partial: Vec<_> = settled.partial_releases().collect();
        assert_eq!(partial.len(), 1);
        assert_eq!(partial[0].wallet_id, vendor_wallet.id);
        assert_eq!(partial[0].requested, naira(3_600));
        assert_eq!(partial[0].released, naira(600));
        assert_eq!(partial[0].shortfall, naira(3_000));

        // The release was clamped, never negative.
        let vendor_wallet = h.db.fetch_or_create_wallet(vendor.id).await.unwrap();
        assert_eq!(vendor_wallet.balance, naira(600));
        assert_eq!(vendor_wallet.escrow_balance, Naira::default());
    });
}

#[test]
fn product_rejection_refunds_the_goods_but_pays_the_rider() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "gadgets", Role::Vendor, None).await;
        let rider = seed_user(&h.db, "remi", Role::Rider, None).await;
        fund_wallet(&h.db, owner.id, naira(10_000)).await;

        let placed = h
            .orders
            .create_order(NewOrderRequest {
                owner_id: owner.id,
                vendor_id: Some(vendor.id),
                order_type: OrderType::Product,
                items: vec![OrderItem::new(naira(4_000), 1)],
                require_delivery: RequireDelivery::Delivery,
                route: Some(DeliveryRoute { origin: None, destination: None, distance_km: 5.0 }),
            })
            .await
            .unwrap();
        let order_id = placed.order.order_id.clone();
        // Product commission is 8%: vendor net ₦3 680.
        assert_eq!(placed.order.amount_due_vendor, naira(3_680));

        h.ledger.pay_with_wallet(&order_id).await.unwrap();
        h.orders.rider_accept_order(&rider, &order_id).await.unwrap();
        h.orders.rider_mark_delivered(&rider, &order_id).await.unwrap();
        h.orders.owner_reject_product(&owner, &order_id).await.unwrap();
        let outcome = h.orders.vendor_accept_rejected_product(&vendor, &order_id).await.unwrap();
        assert_eq!(outcome.order.order_status, OrderStatus::ReceivedRejectedProduct);

        let owner_wallet = h.db.fetch_or_create_wallet(owner.id).await.unwrap();
        let vendor_wallet = h.db.fetch_or_create_wallet(vendor.id).await.unwrap();
        let rider_wallet = h.db.fetch_or_create_wallet(rider.id).await.unwrap();
        // The goods price comes back; the delivery fee does not.
        assert_eq!(owner_wallet.balance, naira(9_000));
        assert_eq!(owner_wallet.escrow_balance, Naira::default());
        // The vendor's payout hold lapsed.
        assert_eq!(vendor_wallet.balance, Naira::default());
        assert_eq!(vendor_wallet.escrow_balance, Naira::default());
        // The rider is paid for the legwork either way.
        assert_eq!(rider_wallet.balance, naira(850));

        let refund = h.db.fetch_transaction(&format!("refund-{}", order_id.as_str())).await.unwrap();
        assert_eq!(refund.transaction_type, TransactionType::Refund);
        assert_eq!(refund.amount, naira(4_000));
    });
}

#[test]
fn laundry_settles_in_two_stages() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "washers", Role::Vendor, None).await;
        let rider = seed_user(&h.db, "remi", Role::Rider, None).await;
        fund_wallet(&h.db, owner.id, naira(10_000)).await;

        let placed = h
            .orders
            .create_order(NewOrderRequest {
                owner_id: owner.id,
                vendor_id: Some(vendor.id),
                order_type: OrderType::Laundry,
                items: vec![OrderItem::new(naira(2_000), 2)],
                require_delivery: RequireDelivery::Delivery,
                route: Some(DeliveryRoute { origin: None, destination: None, distance_km: 5.0 }),
            })
            .await
            .unwrap();
        let order_id = placed.order.order_id.clone();

        h.ledger.pay_with_wallet(&order_id).await.unwrap();
        h.orders.rider_accept_order(&rider, &order_id).await.unwrap();
        h.orders.rider_mark_delivered(&rider, &order_id).await.unwrap();

        // Stage one: the owner confirms. The vendor is paid, the dispatch
        // hold stays until the vendor confirms the returned items.
        h.orders.owner_confirm_received(&owner, &order_id).await.unwrap();
        let vendor_wallet = h.db.fetch_or_create_wallet(vendor.id).await.unwrap();
        let rider_wallet = h.db.fetch_or_create_wallet(rider.id).await.unwrap();
        assert_eq!(vendor_wallet.balance, naira(3_600));
        assert_eq!(rider_wallet.balance, Naira::default());
        assert_eq!(rider_wallet.escrow_balance, naira(850));

        // Stage two: the vendor confirms and the dispatch payout is released.
        let outcome = h.orders.vendor_confirm_laundry_received(&vendor, &order_id).await.unwrap();
        assert_eq!(outcome.delivery.as_ref().map(|d| d.status), Some(DeliveryStatus::LaundryReceived));
        let rider_wallet = h.db.fetch_or_create_wallet(rider.id).await.unwrap();
        let owner_wallet = h.db.fetch_or_create_wallet(owner.id).await.unwrap();
        assert_eq!(rider_wallet.balance, naira(850));
        assert_eq!(rider_wallet.escrow_balance, Naira::default());
        assert_eq!(owner_wallet.escrow_balance, Naira::default());
    });
}

#[test]
fn withdrawal_takes_the_tiered_charge_and_zeroes_the_wallet() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        fund_wallet(&h.db, vendor.id, naira(5_000)).await;

        let record = h.ledger.withdraw(vendor.id, &MockPayout::default()).await.unwrap();
        assert_eq!(record.payment_status, PaymentStatus::Paid);
        // ₦5 000 gross, ₦10 charge, 7.5% VAT on the charge.
        assert_eq!(record.amount, Naira::from_kobo(498_925));

        let wallet = h.db.fetch_or_create_wallet(vendor.id).await.unwrap();
        assert_eq!(wallet.balance, Naira::default());
    });
}

#[test]
fn failed_payout_leaves_the_wallet_untouched() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        fund_wallet(&h.db, vendor.id, naira(5_000)).await;

        let err = h.ledger.withdraw(vendor.id, &MockPayout { fail: true }).await.unwrap_err();
        assert!(matches!(err, LedgerError::ExternalDependency(_)));

        let wallet = h.db.fetch_or_create_wallet(vendor.id).await.unwrap();
        assert_eq!(wallet.balance, naira(5_000));
    });
}

#[test]
fn empty_wallets_cannot_withdraw() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        let err = h.ledger.withdraw(vendor.id, &MockPayout::default()).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    });
}

#[test]
fn top_up_queues_the_wallet_credit_for_settlement() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;

        let over = MAX_TOP_UP + naira(1);
        assert!(matches!(
            h.ledger.top_up(owner.id, over, "alice@example.com", &MockGateway { status: PaymentStatus::Paid }).await,
            Err(LedgerError::InvalidAmount(_))
        ));

        let (record, link) = h
            .ledger
            .top_up(owner.id, naira(2_500), "alice@example.com", &MockGateway { status: PaymentStatus::Paid })
            .await
            .unwrap();
        assert_eq!(record.payment_status, PaymentStatus::Pending);
        assert!(link.contains(&record.tx_ref));

        h.ledger.confirm_top_up(&record.tx_ref, &MockGateway { status: PaymentStatus::Paid }).await.unwrap();
        let messages = h.sink.messages();
        assert!(messages.iter().any(|m| matches!(
            m,
            SettlementMessage::UpdateTransaction(p) if p.tx_ref == record.tx_ref && p.payment_status == PaymentStatus::Paid
        )));
        assert!(messages.iter().any(|m| matches!(
            m,
            SettlementMessage::UpdateWallet(w) if w.wallet_id == record.wallet_id && w.balance_change == naira(2_500)
        )));
    });
}

#[test]
fn three_cancellations_earn_a_suspension() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;

        for _ in 0..3 {
            let placed = place_food_order(&h, &owner, &vendor).await;
            h.orders.cancel_order(&owner, &placed.order.order_id, None).await.unwrap();
        }
        let (suspended, reset) = h.orders.sweep_suspensions().await.unwrap();
        assert_eq!(suspended, vec![owner.id]);
        assert_eq!(reset, 0);

        let owner = OrderFulfilmentDatabase::fetch_user(&h.db, owner.id).await.unwrap();
        assert!(owner.is_suspended);
        assert!(owner.suspension_until.is_some());

        // A second sweep is a no-op.
        let (suspended, _) = h.orders.sweep_suspensions().await.unwrap();
        assert!(suspended.is_empty());
    });
}

#[test]
fn suspended_riders_cannot_claim() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        let rider = seed_user(&h.db, "remi", Role::Rider, None).await;
        fund_wallet(&h.db, owner.id, naira(10_000)).await;

        let placed = place_food_order(&h, &owner, &vendor).await;
        h.ledger.pay_with_wallet(&placed.order.order_id).await.unwrap();

        let suspended = UserAccount { is_suspended: true, ..rider };
        let err = h.orders.rider_accept_order(&suspended, &placed.order.order_id).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::Suspended(_)));
    });
}

#[test]
fn admin_force_set_applies_ledger_effects() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "bukka", Role::Vendor, None).await;
        let rider = seed_user(&h.db, "remi", Role::Rider, None).await;
        let admin = seed_user(&h.db, "root", Role::Admin, None).await;
        fund_wallet(&h.db, owner.id, naira(10_000)).await;

        let placed = place_food_order(&h, &owner, &vendor).await;
        let order_id = placed.order.order_id.clone();
        h.ledger.pay_with_wallet(&order_id).await.unwrap();
        h.orders.rider_accept_order(&rider, &order_id).await.unwrap();
        h.orders.rider_mark_delivered(&rider, &order_id).await.unwrap();

        // Delivered -> Cancelled is not a move the owner could make, but the
        // admin can force it, and the refund still happens.
        let outcome = h
            .orders
            .admin_force_status(&admin, &order_id, OrderStatus::Cancelled, Some(DeliveryStatus::Cancelled), Some("dispute".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome.order.order_status, OrderStatus::Cancelled);

        let owner_wallet = h.db.fetch_or_create_wallet(owner.id).await.unwrap();
        assert_eq!(owner_wallet.balance, naira(10_000));
        assert_eq!(owner_wallet.escrow_balance, Naira::default());

        // Non-admins cannot force.
        let err = h
            .orders
            .admin_force_status(&owner, &order_id, OrderStatus::Pending, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::Forbidden(_)));
    });
}

#[test]
fn pickup_product_orders_skip_the_delivery_leg() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness().await;
        let owner = seed_user(&h.db, "alice", Role::Owner, None).await;
        let vendor = seed_user(&h.db, "gadgets", Role::Vendor, None).await;
        fund_wallet(&h.db, owner.id, naira(10_000)).await;

        let placed = h
            .orders
            .create_order(NewOrderRequest {
                owner_id: owner.id,
                vendor_id: Some(vendor.id),
                order_type: OrderType::Food,
                items: vec![OrderItem::new(naira(3_000), 1)],
                require_delivery: RequireDelivery::Pickup,
                route: None,
            })
            .await
            .unwrap();
        assert!(placed.delivery.is_none());
        let order_id = placed.order.order_id.clone();

        let (_, record) = h.ledger.pay_with_wallet(&order_id).await.unwrap();
        // No delivery fee on a pickup order.
        assert_eq!(record.amount, naira(3_000));

        h.orders.vendor_mark_delivered(&vendor, &order_id).await.unwrap();
        // Without a claim there are no holds: the vendor payout is a direct
        // credit (food commission is 10%).
        let outcome = h.orders.owner_confirm_received(&owner, &order_id).await.unwrap();
        assert_eq!(outcome.order.order_status, OrderStatus::Received);
        assert_eq!(outcome.partial_releases().count(), 0);
        let owner_wallet = h.db.fetch_or_create_wallet(owner.id).await.unwrap();
        let vendor_wallet = h.db.fetch_or_create_wallet(vendor.id).await.unwrap();
        assert_eq!(owner_wallet.balance, naira(7_000));
        assert_eq!(vendor_wallet.balance, naira(2_700));
        assert_eq!(vendor_wallet.escrow_balance, Naira::default());
    });
}
