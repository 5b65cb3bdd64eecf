use sqlx::SqliteConnection;

use crate::db_types::NewAuditEntry;

pub async fn insert_audit(conn: &mut SqliteConnection, entry: &NewAuditEntry) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO audit_log (actor_id, actor_role, action, resource_type, resource_id, summary, changes) VALUES \
         (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.actor_id)
    .bind(entry.actor_role)
    .bind(&entry.action)
    .bind(&entry.resource_type)
    .bind(&entry.resource_id)
    .bind(&entry.summary)
    .bind(entry.changes.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}
