//! Database operations for the change_log table.

use sqlx::{PgConnection, PgPool, Row};
use tandem_engine::{ChangeEntry, ChangeOperation, Timestamp};

/// A stored change-log row from the database.
#[derive(Debug)]
pub struct StoredChange {
    pub seq: i64,
    pub record_id: String,
    pub device_id: String,
    pub timestamp: Timestamp,
    pub operation: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredChange {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredChange {
            seq: row.try_get("seq")?,
            record_id: row.try_get("record_id")?,
            device_id: row.try_get("device_id")?,
            timestamp: row.try_get("timestamp")?,
            operation: row.try_get("operation")?,
        })
    }
}

impl StoredChange {
    /// Convert database row to an engine change entry.
    pub fn to_entry(&self) -> Result<ChangeEntry, String> {
        Ok(ChangeEntry {
            seq: self.seq as u64,
            record_id: self.record_id.clone(),
            device_id: self.device_id.clone(),
            timestamp: self.timestamp,
            operation: self.operation.parse::<ChangeOperation>()?,
        })
    }
}

/// Advisory lock key guarding the change log as a whole.
const CHANGE_LOG_LOCK: (i32, i32) = (2, 0);

/// Exclusive change-log lock, held by writers until commit.
///
/// Writers stamp their entries only after taking it, so no reader holding
/// [`share_change_log`] can have a checkpoint later than an entry it missed.
pub async fn lock_change_log(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
        .bind(CHANGE_LOG_LOCK.0)
        .bind(CHANGE_LOG_LOCK.1)
        .execute(conn)
        .await?;
    Ok(())
}

/// Shared change-log lock, held by readers of changed records.
pub async fn share_change_log(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock_shared($1, $2)")
        .bind(CHANGE_LOG_LOCK.0)
        .bind(CHANGE_LOG_LOCK.1)
        .execute(conn)
        .await?;
    Ok(())
}

/// Append one entry to the change log.
pub async fn append_change(
    conn: &mut PgConnection,
    record_id: &str,
    device_id: &str,
    timestamp: Timestamp,
    operation: ChangeOperation,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO change_log (record_id, device_id, timestamp, operation)
        VALUES ($1, $2, $3, $4)
        RETURNING seq
        "#,
    )
    .bind(record_id)
    .bind(device_id)
    .bind(timestamp)
    .bind(operation.as_str())
    .fetch_one(conn)
    .await
}

/// Drop entries that are neither the latest for their record nor among the
/// `buffer` most recent. Returns the number of entries removed.
pub async fn prune_change_log(conn: &mut PgConnection, buffer: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM change_log
        WHERE seq NOT IN (SELECT seq FROM change_log ORDER BY seq DESC LIMIT $1)
          AND seq NOT IN (SELECT MAX(seq) FROM change_log GROUP BY record_id)
        "#,
    )
    .bind(buffer)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Retained history for one record, oldest first.
pub async fn get_history(pool: &PgPool, record_id: &str) -> Result<Vec<StoredChange>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT seq, record_id, device_id, timestamp, operation
        FROM change_log
        WHERE record_id = $1
        ORDER BY seq ASC
        "#,
    )
    .bind(record_id)
    .fetch_all(pool)
    .await
}
