use sqlx::SqliteConnection;

use crate::db_types::{Delivery, DeliveryStatus, NewDelivery, OrderId};

const DELIVERY_COLUMNS: &str = "id, order_id, status, rider_id, dispatch_id, origin, destination, distance_km, \
                                delivery_fee, amount_due_dispatch, created_at, updated_at";

pub async fn insert_delivery(conn: &mut SqliteConnection, delivery: &NewDelivery) -> Result<Delivery, sqlx::Error> {
    sqlx::query(
        "INSERT INTO deliveries (order_id, origin, destination, distance_km, delivery_fee, amount_due_dispatch) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&delivery.order_id)
    .bind(&delivery.origin)
    .bind(&delivery.destination)
    .bind(delivery.distance_km)
    .bind(delivery.delivery_fee)
    .bind(delivery.amount_due_dispatch)
    .execute(&mut *conn)
    .await?;
    let q = format!("SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE order_id = ?");
    sqlx::query_as::<_, Delivery>(&q).bind(&delivery.order_id).fetch_one(conn).await
}

pub async fn fetch_delivery(conn: &mut SqliteConnection, order_id: &OrderId) -> Result<Option<Delivery>, sqlx::Error> {
    let q = format!("SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE order_id = ?");
    sqlx::query_as::<_, Delivery>(&q).bind(order_id).fetch_optional(conn).await
}

/// Atomically claims an unassigned, pending delivery. Returns the number of
/// rows updated: 0 means another rider got there first (or the delivery is
/// not claimable).
pub async fn claim_delivery(
    conn: &mut SqliteConnection,
    order_id: &OrderId,
    rider_id: i64,
    dispatch_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE deliveries SET status = ?, rider_id = ?, dispatch_id = ?, updated_at = CURRENT_TIMESTAMP WHERE \
         order_id = ? AND status = ? AND rider_id IS NULL",
    )
    .bind(DeliveryStatus::Accepted)
    .bind(rider_id)
    .bind(dispatch_id)
    .bind(order_id)
    .bind(DeliveryStatus::Pending)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn update_delivery_status(
    conn: &mut SqliteConnection,
    order_id: &OrderId,
    status: DeliveryStatus,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE deliveries SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE order_id = ?")
        .bind(status)
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
