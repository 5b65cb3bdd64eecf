use sqlx::SqliteConnection;

use crate::db_types::{NewOrder, Order, OrderId, OrderStatus, PaymentStatus};

const ORDER_COLUMNS: &str = "id, order_id, owner_id, vendor_id, order_type, total_price, amount_due_vendor, \
                             order_payment_status, order_status, require_delivery, cancel_reason, created_at, \
                             updated_at";

pub async fn insert_order(conn: &mut SqliteConnection, order: &NewOrder) -> Result<Order, sqlx::Error> {
    sqlx::query(
        "INSERT INTO orders (order_id, owner_id, vendor_id, order_type, total_price, amount_due_vendor, \
         require_delivery) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&order.order_id)
    .bind(order.owner_id)
    .bind(order.vendor_id)
    .bind(order.order_type)
    .bind(order.total_price)
    .bind(order.amount_due_vendor)
    .bind(order.require_delivery)
    .execute(&mut *conn)
    .await?;
    let q = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = ?");
    sqlx::query_as::<_, Order>(&q).bind(&order.order_id).fetch_one(conn).await
}

pub async fn fetch_order(conn: &mut SqliteConnection, order_id: &OrderId) -> Result<Option<Order>, sqlx::Error> {
    let q = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = ?");
    sqlx::query_as::<_, Order>(&q).bind(order_id).fetch_optional(conn).await
}

/// Returns the number of rows updated (0 when the order does not exist).
pub async fn update_order_status(
    conn: &mut SqliteConnection,
    order_id: &OrderId,
    status: OrderStatus,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE orders SET order_status = ?, updated_at = CURRENT_TIMESTAMP WHERE order_id = ?")
        .bind(status)
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn set_payment_status(
    conn: &mut SqliteConnection,
    order_id: &OrderId,
    status: PaymentStatus,
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("UPDATE orders SET order_payment_status = ?, updated_at = CURRENT_TIMESTAMP WHERE order_id = ?")
            .bind(status)
            .bind(order_id)
            .execute(&mut *conn)
            .await?;
    Ok(result.rows_affected())
}

pub async fn set_cancel_reason(
    conn: &mut SqliteConnection,
    order_id: &OrderId,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET cancel_reason = ?, updated_at = CURRENT_TIMESTAMP WHERE order_id = ?")
        .bind(reason)
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
