//! Database operations for the attachments table.

use sqlx::{PgPool, Row};
use tandem_engine::AttachmentMeta;

/// A stored attachment row, content included.
#[derive(Debug)]
pub struct StoredAttachment {
    pub id: String,
    pub record_id: String,
    pub mime_type: String,
    pub size: i64,
    pub filename: String,
    pub content: Vec<u8>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredAttachment {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredAttachment {
            id: row.try_get("id")?,
            record_id: row.try_get("record_id")?,
            mime_type: row.try_get("mime_type")?,
            size: row.try_get("size")?,
            filename: row.try_get("filename")?,
            content: row.try_get("content")?,
        })
    }
}

impl StoredAttachment {
    /// Split the row into engine metadata and content.
    pub fn into_parts(self) -> (AttachmentMeta, Vec<u8>) {
        let meta = AttachmentMeta {
            id: self.id,
            record_id: self.record_id,
            mime_type: self.mime_type,
            size: self.size as u64,
            filename: self.filename,
        };
        (meta, self.content)
    }
}

/// Insert or replace an attachment.
pub async fn insert_attachment(
    pool: &PgPool,
    meta: &AttachmentMeta,
    content: &[u8],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO attachments (id, record_id, mime_type, size, filename, content)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE SET
            record_id = EXCLUDED.record_id,
            mime_type = EXCLUDED.mime_type,
            size = EXCLUDED.size,
            filename = EXCLUDED.filename,
            content = EXCLUDED.content
        "#,
    )
    .bind(&meta.id)
    .bind(&meta.record_id)
    .bind(&meta.mime_type)
    .bind(meta.size as i64)
    .bind(&meta.filename)
    .bind(content)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load an attachment by id.
pub async fn get_attachment(
    pool: &PgPool,
    attachment_id: &str,
) -> Result<Option<StoredAttachment>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, record_id, mime_type, size, filename, content FROM attachments WHERE id = $1",
    )
    .bind(attachment_id)
    .fetch_optional(pool)
    .await
}
