//! Database operations for the records table.

use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool, Row};
use tandem_engine::{Record, Timestamp};

/// A stored record row from the database.
#[derive(Debug)]
pub struct StoredRecord {
    pub id: String,
    pub record_type: String,
    pub data: Value,
    pub updated_at: Timestamp,
    pub meta: Value,
    pub deleted: bool,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            id: row.try_get("id")?,
            record_type: row.try_get("record_type")?,
            data: row.try_get("data")?,
            updated_at: row.try_get("updated_at")?,
            meta: row.try_get("meta")?,
            deleted: row.try_get("deleted")?,
        })
    }
}

impl StoredRecord {
    /// Convert database row to an engine record.
    pub fn into_record(self) -> Record {
        let meta = match self.meta {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Record {
            id: self.id,
            record_type: self.record_type,
            data: self.data,
            updated_at: self.updated_at,
            meta,
        }
    }
}

const SELECT_RECORD: &str =
    "SELECT id, record_type, data, updated_at, meta, deleted FROM records";

/// Advisory lock class for per-record write locks.
const RECORD_LOCK: i32 = 1;

/// Serialize writers on each id for the rest of the transaction.
///
/// Row locks cannot cover ids that have no row yet, so writers take an
/// advisory lock per id instead. Locks are taken in hash order so two
/// batches touching the same ids cannot deadlock.
pub async fn lock_record_ids(conn: &mut PgConnection, ids: &[String]) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        SELECT pg_advisory_xact_lock($1, h)
        FROM (SELECT DISTINCT hashtext(id) AS h FROM unnest($2::text[]) AS id ORDER BY h) locks
        "#,
    )
    .bind(RECORD_LOCK)
    .bind(ids)
    .execute(conn)
    .await?;
    Ok(())
}

/// Load a record for the rest of the transaction.
///
/// Callers hold the id's advisory lock from [`lock_record_ids`].
pub async fn lock_record(
    conn: &mut PgConnection,
    record_id: &str,
) -> Result<Option<StoredRecord>, sqlx::Error> {
    sqlx::query_as(&format!("{SELECT_RECORD} WHERE id = $1 FOR UPDATE"))
        .bind(record_id)
        .fetch_optional(conn)
        .await
}

/// Upsert a live record (insert or update, clearing any tombstone).
pub async fn upsert_record(conn: &mut PgConnection, record: &Record) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO records (id, record_type, data, updated_at, meta, deleted)
        VALUES ($1, $2, $3, $4, $5, FALSE)
        ON CONFLICT (id) DO UPDATE SET
            record_type = EXCLUDED.record_type,
            data = EXCLUDED.data,
            updated_at = EXCLUDED.updated_at,
            meta = EXCLUDED.meta,
            deleted = FALSE
        "#,
    )
    .bind(&record.id)
    .bind(&record.record_type)
    .bind(&record.data)
    .bind(record.updated_at)
    .bind(Value::Object(record.meta.clone()))
    .execute(conn)
    .await?;

    Ok(())
}

/// Tombstone a record.
pub async fn mark_deleted(conn: &mut PgConnection, record_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE records SET deleted = TRUE WHERE id = $1")
        .bind(record_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Every live record, ordered by id.
pub async fn get_live_records(pool: &PgPool) -> Result<Vec<StoredRecord>, sqlx::Error> {
    sqlx::query_as(&format!("{SELECT_RECORD} WHERE NOT deleted ORDER BY id"))
        .fetch_all(pool)
        .await
}

/// Live records whose latest change after `since` was written by another device.
///
/// Ordered by id, so `LIMIT`/`OFFSET` windows are stable across pages.
const CHANGED_RECORDS: &str = r#"
    WITH latest AS (
        SELECT DISTINCT ON (record_id) record_id, device_id
        FROM change_log
        WHERE timestamp > $1
        ORDER BY record_id, seq DESC
    )
    SELECT r.id, r.record_type, r.data, r.updated_at, r.meta, r.deleted
    FROM records r
    JOIN latest l ON l.record_id = r.id
    WHERE l.device_id <> $2 AND NOT r.deleted
    ORDER BY r.id
"#;

/// Records changed since a checkpoint by devices other than `device_id`.
pub async fn get_changed_records(
    conn: &mut PgConnection,
    since: Timestamp,
    device_id: &str,
) -> Result<Vec<StoredRecord>, sqlx::Error> {
    sqlx::query_as(CHANGED_RECORDS)
        .bind(since)
        .bind(device_id)
        .fetch_all(conn)
        .await
}

/// One page of [`get_changed_records`] plus the total across all pages.
pub async fn get_changed_records_page(
    conn: &mut PgConnection,
    since: Timestamp,
    device_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<StoredRecord>, i64), sqlx::Error> {
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM ({CHANGED_RECORDS}) changed"))
        .bind(since)
        .bind(device_id)
        .fetch_one(&mut *conn)
        .await?;

    let rows = sqlx::query_as(&format!("{CHANGED_RECORDS} LIMIT $3 OFFSET $4"))
        .bind(since)
        .bind(device_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(conn)
        .await?;

    Ok((rows, total))
}
