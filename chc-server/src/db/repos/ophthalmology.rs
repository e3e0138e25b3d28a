//! Ophthalmology repository

use chc_core::models::InvestigationStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgConnection, PgPool};

use super::DbError;

/// Eye examination record, one per barcode
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Ophthalmology {
    pub barcode: String,
    pub visual_acuity: Value,
    pub remarks: Option<String>,
    pub patient_complaints: Option<String>,
    pub status: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOphthalmology {
    pub barcode: String,
    pub visual_acuity: Value,
    pub remarks: Option<String>,
    pub patient_complaints: Option<String>,
    pub status: InvestigationStatus,
}

/// Ophthalmology repository
pub struct OphthalmologyRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> OphthalmologyRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, record: &NewOphthalmology) -> Result<Ophthalmology, DbError> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert(&mut conn, record).await
    }

    /// Insert or replace by barcode on the caller's connection.
    pub async fn upsert(conn: &mut PgConnection, record: &NewOphthalmology) -> Result<Ophthalmology, DbError> {
        Ok(sqlx::query_as::<_, Ophthalmology>(
            r#"
            INSERT INTO ophthalmology (barcode, visual_acuity, remarks, patient_complaints, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (barcode) DO UPDATE
            SET visual_acuity = EXCLUDED.visual_acuity,
                remarks = EXCLUDED.remarks,
                patient_complaints = EXCLUDED.patient_complaints,
                status = EXCLUDED.status
            RETURNING barcode, visual_acuity, remarks, patient_complaints, status, date
            "#,
        )
        .bind(&record.barcode)
        .bind(&record.visual_acuity)
        .bind(&record.remarks)
        .bind(&record.patient_complaints)
        .bind(record.status.as_str())
        .fetch_one(conn)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn save_twice_replaces() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        crate::db::migrations::run(&pool).await.expect("migrations");
        let repo = OphthalmologyRepo::new(&pool);

        let mut record = NewOphthalmology {
            barcode: uuid::Uuid::new_v4().simple().to_string()[..16].to_owned(),
            visual_acuity: json!({"right_eye": "6/6", "left_eye": "6/9"}),
            remarks: None,
            patient_complaints: Some("blurred vision".into()),
            status: InvestigationStatus::Pending,
        };
        repo.save(&record).await.unwrap();
        record.status = InvestigationStatus::Approved;
        record.remarks = Some("glasses advised".into());
        let saved = repo.save(&record).await.unwrap();
        assert_eq!(saved.status, "approved");
        assert_eq!(saved.remarks.as_deref(), Some("glasses advised"));
    }
}
