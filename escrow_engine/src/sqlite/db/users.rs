use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{Role, UserAccount};

const USER_COLUMNS: &str =
    "id, username, role, dispatch_id, order_cancel_count, is_suspended, suspension_until, created_at";

pub async fn fetch_user(conn: &mut SqliteConnection, user_id: i64) -> Result<Option<UserAccount>, sqlx::Error> {
    let q = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    sqlx::query_as::<_, UserAccount>(&q).bind(user_id).fetch_optional(conn).await
}

pub async fn create_user(
    conn: &mut SqliteConnection,
    username: &str,
    role: Role,
    dispatch_id: Option<i64>,
) -> Result<UserAccount, sqlx::Error> {
    let result = sqlx::query("INSERT INTO users (username, role, dispatch_id) VALUES (?, ?, ?)")
        .bind(username)
        .bind(role)
        .bind(dispatch_id)
        .execute(&mut *conn)
        .await?;
    let id = result.last_insert_rowid();
    let q = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    sqlx::query_as::<_, UserAccount>(&q).bind(id).fetch_one(conn).await
}

pub async fn increment_cancel_count(conn: &mut SqliteConnection, user_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET order_cancel_count = order_cancel_count + 1 WHERE id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Users who have reached three cancellations and are not yet suspended.
pub async fn fetch_three_strike_users(conn: &mut SqliteConnection) -> Result<Vec<UserAccount>, sqlx::Error> {
    let q = format!("SELECT {USER_COLUMNS} FROM users WHERE order_cancel_count >= 3 AND is_suspended = 0");
    sqlx::query_as::<_, UserAccount>(&q).fetch_all(conn).await
}

pub async fn suspend_user(conn: &mut SqliteConnection, user_id: i64, until: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET is_suspended = 1, suspension_until = ? WHERE id = ?")
        .bind(until)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Lifts every suspension whose deadline has passed, clearing the counter.
pub async fn reset_expired_suspensions(conn: &mut SqliteConnection, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET is_suspended = 0, suspension_until = NULL, order_cancel_count = 0 WHERE is_suspended = 1 \
         AND suspension_until <= ?",
    )
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}
