//! Attachment storage (X-ray, ECG, PFT, audiometry reports)

use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::DbError;

/// Stored file
#[derive(Debug, Clone, FromRow)]
pub struct Blob {
    pub id: Uuid,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub length: i64,
    pub data: Vec<u8>,
    pub uploaded_at: DateTime<Utc>,
}

/// Blob repository
pub struct BlobRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> BlobRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a file on the caller's connection and return its id.
    pub async fn put(
        conn: &mut PgConnection,
        filename: Option<&str>,
        content_type: Option<&str>,
        data: &Bytes,
    ) -> Result<Uuid, DbError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO blobs (id, filename, content_type, length, data)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(filename)
        .bind(content_type)
        .bind(data.len() as i64)
        .bind(&data[..])
        .execute(conn)
        .await?;
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Blob, DbError> {
        sqlx::query_as::<_, Blob>(
            r#"
            SELECT id, filename, content_type, length, data, uploaded_at
            FROM blobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound {
            resource: "file",
            id: id.to_string(),
        })
    }
}
