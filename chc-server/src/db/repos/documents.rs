//! Document store over a JSONB table
//!
//! Catalog data (tests, packages, barcode stock ranges) is schemaless and
//! edited by other tools, so it lives as JSON documents grouped by
//! collection name rather than in typed tables.

use std::collections::HashMap;

use chc_core::models::SpecimenKey;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{FromRow, PgConnection, PgPool, Row};
use uuid::Uuid;

use super::DbError;

/// Known collection names
pub mod collections {
    /// Lab test catalog with prices
    pub const CORE_TEST: &str = "core_test";
    /// Per-test metadata: shortcut, specimen type
    pub const CORE_TESTDETAILS: &str = "core_testdetails";
    pub const CORE_PACKAGE: &str = "core_package";
    /// Barcode stock ranges `{startbarcode, endbarcode}`
    pub const BARCODE_RANGE: &str = "core_barcoderange";
    pub const PATIENT_BILLING: &str = "patient_billing";

    pub const ALL: [&str; 5] = [CORE_TEST, CORE_TESTDETAILS, CORE_PACKAGE, BARCODE_RANGE, PATIENT_BILLING];

    pub fn is_known(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// Longest barcode compared against stock ranges; bounds with more digits
/// never match.
pub const MAX_BARCODE_DIGITS: usize = 18;

/// Stored document
#[derive(Debug, Clone, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub collection: String,
    pub body: Value,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Body with `_id` set, as clients expect.
    pub fn into_json(self) -> Value {
        match self.body {
            Value::Object(mut map) => {
                map.insert("_id".into(), Value::String(self.id.to_string()));
                Value::Object(map)
            }
            other => {
                let mut map = Map::new();
                map.insert("_id".into(), Value::String(self.id.to_string()));
                map.insert("value".into(), other);
                Value::Object(map)
            }
        }
    }

    /// Top-level field of an object body.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.as_object().and_then(|o| o.get(name))
    }
}

/// Document repository
pub struct DocumentRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> DocumentRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, collection: &str, body: &Value) -> Result<Document, DbError> {
        Ok(sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (id, collection, body)
            VALUES ($1, $2, $3)
            RETURNING id, collection, body, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(collection)
        .bind(body)
        .fetch_one(self.pool)
        .await?)
    }

    /// Insert many documents in one transaction; returns how many were stored.
    pub async fn insert_many(&self, collection: &str, bodies: &[Value]) -> Result<u64, DbError> {
        let mut tx = self.pool.begin().await?;
        for body in bodies {
            sqlx::query("INSERT INTO documents (id, collection, body) VALUES ($1, $2, $3)")
                .bind(Uuid::new_v4())
                .bind(collection)
                .bind(body)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(bodies.len() as u64)
    }

    /// All documents of a collection in insertion order.
    pub async fn find_all(&self, collection: &str) -> Result<Vec<Document>, DbError> {
        Ok(sqlx::query_as::<_, Document>(
            r#"
            SELECT id, collection, body, created_at
            FROM documents
            WHERE collection = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(collection)
        .fetch_all(self.pool)
        .await?)
    }

    /// First barcode stock range with `startbarcode <= n <= endbarcode`.
    ///
    /// Bounds may be stored as numbers or numeric strings; ranges with
    /// non-numeric bounds never match.
    pub async fn find_range_containing(&self, n: i64) -> Result<Option<Document>, DbError> {
        Ok(sqlx::query_as::<_, Document>(
            r#"
            SELECT id, collection, body, created_at
            FROM documents
            WHERE collection = $1
              AND CASE WHEN body->>'startbarcode' ~ '^\s*[0-9]{1,18}\s*$'
                       THEN trim(body->>'startbarcode')::bigint END <= $2
              AND CASE WHEN body->>'endbarcode' ~ '^\s*[0-9]{1,18}\s*$'
                       THEN trim(body->>'endbarcode')::bigint END >= $2
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .bind(collections::BARCODE_RANGE)
        .bind(n)
        .fetch_optional(self.pool)
        .await?)
    }
}

/// Catalog specimen type for each key, first matching document wins.
///
/// Catalog values are compared trimmed and uppercased, like the keys.
///
/// Runs on the caller's connection so batch assembly sees one snapshot.
pub async fn specimen_types(
    conn: &mut PgConnection,
    keys: &[SpecimenKey],
) -> Result<HashMap<SpecimenKey, String>, DbError> {
    let mut shortcuts = Vec::new();
    let mut names = Vec::new();
    for key in keys {
        match key {
            SpecimenKey::Shortcut(v) => shortcuts.push(v.clone()),
            SpecimenKey::TestName(v) => names.push(v.clone()),
        }
    }
    if shortcuts.is_empty() && names.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query(
        r#"
        SELECT upper(trim(body->>'shortcut')) AS shortcut,
               upper(trim(body->>'test_name')) AS test_name,
               body->>'specimen_type' AS specimen_type
        FROM documents
        WHERE collection = $1
          AND body->>'specimen_type' IS NOT NULL
          AND (upper(trim(body->>'shortcut')) = ANY($2)
               OR upper(trim(body->>'test_name')) = ANY($3))
        ORDER BY created_at, id
        "#,
    )
    .bind(collections::CORE_TESTDETAILS)
    .bind(&shortcuts)
    .bind(&names)
    .fetch_all(conn)
    .await?;

    let mut found = HashMap::new();
    for row in rows {
        let specimen: String = row.get("specimen_type");
        if let Some(s) = row.get::<Option<String>, _>("shortcut") {
            found.entry(SpecimenKey::Shortcut(s)).or_insert_with(|| specimen.clone());
        }
        if let Some(t) = row.get::<Option<String>, _>("test_name") {
            found.entry(SpecimenKey::TestName(t)).or_insert(specimen);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(body: Value) -> Document {
        Document {
            id: Uuid::nil(),
            collection: collections::CORE_TEST.into(),
            body,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn json_carries_id() {
        let v = doc(json!({"test_name": "CBC"})).into_json();
        assert_eq!(v["_id"], Uuid::nil().to_string());
        assert_eq!(v["test_name"], "CBC");

        let v = doc(json!(42)).into_json();
        assert_eq!(v["value"], 42);
    }

    #[test]
    fn known_collections() {
        assert!(collections::is_known("core_barcoderange"));
        assert!(!collections::is_known("core_sample"));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn range_lookup_handles_strings_and_numbers() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        crate::db::migrations::run(&pool).await.expect("migrations");
        let repo = DocumentRepo::new(&pool);

        let base = (Utc::now().timestamp_micros() % 1_000_000_000) * 1000;
        repo.insert(collections::BARCODE_RANGE, &json!({"startbarcode": base.to_string(), "endbarcode": (base + 99).to_string()}))
            .await
            .unwrap();
        repo.insert(collections::BARCODE_RANGE, &json!({"startbarcode": "abc", "endbarcode": "xyz"}))
            .await
            .unwrap();

        assert!(repo.find_range_containing(base + 50).await.unwrap().is_some());
        assert!(repo.find_range_containing(base + 100).await.unwrap().is_none());
    }
}
