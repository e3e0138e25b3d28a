//! Investigation repository

use chc_core::models::{AttachmentKind, InvestigationStatus, Paginated, Pagination};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgConnection, PgPool, Row};
use uuid::Uuid;

use super::DbError;

/// Investigation record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Investigation {
    pub barcode: String,
    pub employee_id: String,
    pub company_id: String,
    pub vitals: Value,
    pub gender: String,
    pub age: i32,
    pub date: DateTime<Utc>,
    pub status: String,
    pub patient_history: Option<String>,
    pub ecg_notes: Option<String>,
    pub pft_notes: Option<String>,
    pub audiometry_notes: Option<String>,
    pub xray_file: Option<Uuid>,
    pub xrayfilm_file: Option<Uuid>,
    pub ecg_file: Option<Uuid>,
    pub pft_file: Option<Uuid>,
    pub audiometric_file: Option<Uuid>,
}

/// Values written by a save; attachments not listed keep their stored id
#[derive(Debug, Clone)]
pub struct InvestigationUpsert {
    pub barcode: String,
    pub employee_id: String,
    pub company_id: String,
    pub vitals: Value,
    pub gender: String,
    pub age: i32,
    pub status: InvestigationStatus,
    pub patient_history: Option<String>,
    pub ecg_notes: Option<String>,
    pub pft_notes: Option<String>,
    pub audiometry_notes: Option<String>,
    pub files: Vec<(AttachmentKind, Uuid)>,
}

impl InvestigationUpsert {
    fn file(&self, kind: AttachmentKind) -> Option<Uuid> {
        self.files.iter().rev().find(|(k, _)| *k == kind).map(|(_, id)| *id)
    }
}

const COLUMNS: &str = "barcode, employee_id, company_id, vitals, gender, age, date, status, \
                       patient_history, ecg_notes, pft_notes, audiometry_notes, \
                       xray_file, xrayfilm_file, ecg_file, pft_file, audiometric_file";

/// Investigation repository
pub struct InvestigationRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> InvestigationRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace by barcode inside a caller's transaction.
    pub async fn upsert(conn: &mut PgConnection, inv: &InvestigationUpsert) -> Result<Investigation, DbError> {
        Ok(sqlx::query_as::<_, Investigation>(&format!(
            r#"
            INSERT INTO investigations
                (barcode, employee_id, company_id, vitals, gender, age, status,
                 patient_history, ecg_notes, pft_notes, audiometry_notes,
                 xray_file, xrayfilm_file, ecg_file, pft_file, audiometric_file)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (barcode) DO UPDATE
            SET employee_id = EXCLUDED.employee_id,
                company_id = EXCLUDED.company_id,
                vitals = EXCLUDED.vitals,
                gender = EXCLUDED.gender,
                age = EXCLUDED.age,
                status = EXCLUDED.status,
                patient_history = EXCLUDED.patient_history,
                ecg_notes = EXCLUDED.ecg_notes,
                pft_notes = EXCLUDED.pft_notes,
                audiometry_notes = EXCLUDED.audiometry_notes,
                xray_file = COALESCE(EXCLUDED.xray_file, investigations.xray_file),
                xrayfilm_file = COALESCE(EXCLUDED.xrayfilm_file, investigations.xrayfilm_file),
                ecg_file = COALESCE(EXCLUDED.ecg_file, investigations.ecg_file),
                pft_file = COALESCE(EXCLUDED.pft_file, investigations.pft_file),
                audiometric_file = COALESCE(EXCLUDED.audiometric_file, investigations.audiometric_file)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&inv.barcode)
        .bind(&inv.employee_id)
        .bind(&inv.company_id)
        .bind(&inv.vitals)
        .bind(&inv.gender)
        .bind(inv.age)
        .bind(inv.status.as_str())
        .bind(&inv.patient_history)
        .bind(&inv.ecg_notes)
        .bind(&inv.pft_notes)
        .bind(&inv.audiometry_notes)
        .bind(inv.file(AttachmentKind::Xray))
        .bind(inv.file(AttachmentKind::XrayFilm))
        .bind(inv.file(AttachmentKind::Ecg))
        .bind(inv.file(AttachmentKind::Pft))
        .bind(inv.file(AttachmentKind::Audiometry))
        .fetch_one(conn)
        .await?)
    }

    pub async fn list_paginated(&self, page: Pagination) -> Result<Paginated<Investigation>, DbError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS}, COUNT(*) OVER() AS total
            FROM investigations
            ORDER BY date DESC, barcode
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
        let items = rows
            .iter()
            .map(Investigation::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paginated::new(items, total, page))
    }

    pub async fn set_status(&self, barcode: &str, status: InvestigationStatus) -> Result<Investigation, DbError> {
        sqlx::query_as::<_, Investigation>(&format!(
            "UPDATE investigations SET status = $2 WHERE barcode = $1 RETURNING {COLUMNS}"
        ))
        .bind(barcode)
        .bind(status.as_str())
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound {
            resource: "investigation",
            id: barcode.to_owned(),
        })
    }

    /// Raw vitals of every investigation, for analytics.
    pub async fn all_vitals(&self) -> Result<Vec<Value>, DbError> {
        let rows: Vec<(Value,)> = sqlx::query_as("SELECT vitals FROM investigations")
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upsert(barcode: &str, files: Vec<(AttachmentKind, Uuid)>) -> InvestigationUpsert {
        InvestigationUpsert {
            barcode: barcode.into(),
            employee_id: "E1".into(),
            company_id: "CHC001".into(),
            vitals: json!({"height_cm": 170, "weight_kg": 70}),
            gender: "Male".into(),
            age: 40,
            status: InvestigationStatus::Pending,
            patient_history: None,
            ecg_notes: None,
            pft_notes: None,
            audiometry_notes: None,
            files,
        }
    }

    #[test]
    fn last_upload_of_a_kind_wins() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let inv = upsert("1", vec![(AttachmentKind::Ecg, a), (AttachmentKind::Ecg, b)]);
        assert_eq!(inv.file(AttachmentKind::Ecg), Some(b));
        assert_eq!(inv.file(AttachmentKind::Pft), None);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn resave_keeps_earlier_files() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        crate::db::migrations::run(&pool).await.expect("migrations");

        let barcode = Uuid::new_v4().simple().to_string()[..16].to_owned();
        let ecg = Uuid::new_v4();
        let mut conn = pool.acquire().await.unwrap();
        InvestigationRepo::upsert(&mut conn, &upsert(&barcode, vec![(AttachmentKind::Ecg, ecg)]))
            .await
            .unwrap();
        let saved = InvestigationRepo::upsert(&mut conn, &upsert(&barcode, vec![]))
            .await
            .unwrap();
        assert_eq!(saved.ecg_file, Some(ecg));
        drop(conn);

        let repo = InvestigationRepo::new(&pool);
        let approved = repo.set_status(&barcode, InvestigationStatus::Approved).await.unwrap();
        assert_eq!(approved.status, "approved");
        assert!(matches!(
            repo.set_status("no-such-barcode", InvestigationStatus::Approved).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
