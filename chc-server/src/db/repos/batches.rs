//! Batch repository
//!
//! Assembling a batch touches three things at once: the sample rows whose
//! transferred tests join the batch, the catalog specimen lookup, and the
//! batch row itself. All of it runs in one transaction with the samples
//! locked, so two desks batching the same barcode cannot both claim it.

use std::collections::HashSet;

use chc_core::models::sample::{assign_batch, mark_received, tests_for_batch};
use chc_core::models::{resolve_specimen, BatchNumber, SpecimenCount, SpecimenKey, SpecimenTally};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};

use super::documents::specimen_types;
use super::samples::{lock_by_barcodes, lock_by_batch, write_tests};
use super::DbError;

/// Batch record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Batch {
    pub id: i64,
    pub company_id: String,
    pub batch_number: String,
    pub batch_date: NaiveDate,
    pub batch_details: Value,
    pub specimen_count: Value,
    pub received: bool,
    pub received_by: Option<String>,
    pub received_date: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_by: Option<String>,
    pub created_date: DateTime<Utc>,
}

/// Result of assembling a batch
#[derive(Debug, Clone)]
pub struct AssembledBatch {
    pub batch: Batch,
    pub specimen_count: Vec<SpecimenCount>,
    /// Tests newly moved into the batch by this call
    pub assigned: usize,
}

/// Result of receiving a batch at the lab
#[derive(Debug, Clone)]
pub struct ReceivedBatch {
    pub batch: Batch,
    pub tests_received: usize,
}

/// What to put in a batch
#[derive(Debug, Clone)]
pub struct BatchRequest<'r> {
    pub company_id: &'r str,
    pub batch_number: Option<BatchNumber>,
    pub barcodes: &'r [String],
    pub batch_details: &'r Value,
    pub day: NaiveDate,
    pub actor: &'r str,
}

const COLUMNS: &str = "id, company_id, batch_number, batch_date, batch_details, specimen_count, \
                       received, received_by, received_date, remarks, created_by, created_date";

/// Generated numbers tried per day before giving up
const MAX_GENERATE_ATTEMPTS: u32 = 50;

/// Batch repository
pub struct BatchRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> BatchRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Batch the transferred tests of `req.barcodes` and upsert the batch.
    ///
    /// Without a batch number the next free `BATCH-YYYYMMDD-NNN` of
    /// `req.day` is used. A batch already received cannot be changed.
    pub async fn assemble(&self, req: BatchRequest<'_>) -> Result<AssembledBatch, DbError> {
        let mut tx = self.pool.begin().await?;

        let number = match req.batch_number {
            Some(n) => n,
            None => next_number(&mut tx, req.day).await?,
        };
        if let Some(existing) = lock(&mut tx, &number).await? {
            if existing.received {
                return Err(DbError::Conflict {
                    message: format!("Batch {} has already been received", number.as_str()),
                });
            }
        }

        let mut samples: Vec<_> = lock_by_barcodes(&mut tx, req.barcodes)
            .await?
            .into_iter()
            .map(|s| {
                let tests = s.tests();
                (s, tests)
            })
            .collect();

        let keys: Vec<SpecimenKey> = samples
            .iter()
            .flat_map(|(_, tests)| tests_for_batch(tests, &number).filter_map(SpecimenKey::for_test))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let catalog = specimen_types(&mut tx, &keys).await?;

        let mut tally = SpecimenTally::new();
        for (_, tests) in &samples {
            for test in tests_for_batch(tests, &number) {
                let known = SpecimenKey::for_test(test)
                    .and_then(|k| catalog.get(&k))
                    .map(String::as_str);
                tally.add(&resolve_specimen(known, test));
            }
        }

        let now = Utc::now();
        let mut assigned = 0;
        for (sample, tests) in &mut samples {
            let n = assign_batch(tests, &number, req.actor, now);
            if n > 0 {
                write_tests(&mut tx, sample.id, tests, None, req.actor).await?;
                assigned += n;
            }
        }

        let specimen_count = tally.into_counts();
        let batch = sqlx::query_as::<_, Batch>(&format!(
            r#"
            INSERT INTO batches
                (company_id, batch_number, batch_date, batch_details, specimen_count, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (batch_number) DO UPDATE
            SET batch_details = EXCLUDED.batch_details,
                specimen_count = EXCLUDED.specimen_count,
                lastmodified_by = EXCLUDED.created_by,
                lastmodified_date = NOW()
            RETURNING {COLUMNS}
            "#
        ))
        .bind(req.company_id)
        .bind(number.as_str())
        .bind(req.day)
        .bind(req.batch_details)
        .bind(Json(&specimen_count))
        .bind(req.actor)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(
            batch_number = %batch.batch_number,
            barcodes = req.barcodes.len(),
            assigned,
            "batch assembled"
        );

        Ok(AssembledBatch {
            batch,
            specimen_count,
            assigned,
        })
    }

    /// All batches, newest first.
    pub async fn list(&self) -> Result<Vec<Batch>, DbError> {
        Ok(sqlx::query_as::<_, Batch>(&format!(
            "SELECT {COLUMNS} FROM batches ORDER BY created_date DESC, id DESC"
        ))
        .fetch_all(self.pool)
        .await?)
    }

    /// Batch by number; `NotFound` when missing.
    pub async fn get(&self, number: &BatchNumber) -> Result<Batch, DbError> {
        sqlx::query_as::<_, Batch>(&format!(
            "SELECT {COLUMNS} FROM batches WHERE batch_number = $1"
        ))
        .bind(number.as_str())
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound {
            resource: "batch",
            id: number.as_str().to_owned(),
        })
    }

    /// Mark a batch and all its tests received.
    pub async fn receive(
        &self,
        number: &BatchNumber,
        actor: &str,
        remarks: Option<&str>,
    ) -> Result<ReceivedBatch, DbError> {
        let mut tx = self.pool.begin().await?;

        let existing = lock(&mut tx, number).await?.ok_or_else(|| DbError::NotFound {
            resource: "batch",
            id: number.as_str().to_owned(),
        })?;
        if existing.received {
            return Err(DbError::Conflict {
                message: format!("Batch {} has already been received", number.as_str()),
            });
        }

        let now = Utc::now();
        let mut tests_received = 0;
        for sample in lock_by_batch(&mut tx, number).await? {
            let mut tests = sample.tests();
            let n = mark_received(&mut tests, number, actor, remarks, now);
            if n > 0 {
                write_tests(&mut tx, sample.id, &tests, None, actor).await?;
                tests_received += n;
            }
        }

        let batch = sqlx::query_as::<_, Batch>(&format!(
            r#"
            UPDATE batches
            SET received = TRUE,
                received_by = $2,
                received_date = $3,
                remarks = COALESCE($4, remarks),
                lastmodified_by = $2,
                lastmodified_date = $3
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(existing.id)
        .bind(actor)
        .bind(now)
        .bind(remarks)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(batch_number = %batch.batch_number, tests_received, "batch received");

        Ok(ReceivedBatch { batch, tests_received })
    }
}

async fn lock(conn: &mut PgConnection, number: &BatchNumber) -> Result<Option<Batch>, DbError> {
    Ok(sqlx::query_as::<_, Batch>(&format!(
        "SELECT {COLUMNS} FROM batches WHERE batch_number = $1 FOR UPDATE"
    ))
    .bind(number.as_str())
    .fetch_optional(conn)
    .await?)
}

async fn count_for_day(conn: &mut PgConnection, day: NaiveDate) -> Result<i64, DbError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM batches WHERE batch_date = $1")
        .bind(day)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// First generated number of `day` not taken yet.
async fn next_number(conn: &mut PgConnection, day: NaiveDate) -> Result<BatchNumber, DbError> {
    let start = count_for_day(conn, day).await? as u32 + 1;
    for seq in start..start + MAX_GENERATE_ATTEMPTS {
        let candidate = BatchNumber::generate(day, seq);
        let (taken,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM batches WHERE batch_number = $1)")
                .bind(candidate.as_str())
                .fetch_one(&mut *conn)
                .await?;
        if !taken {
            return Ok(candidate);
        }
    }
    Err(DbError::Conflict {
        message: format!("No free batch number left for {}", day),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::samples::{SampleKey, SampleRepo};
    use crate::db::repos::{collections, DocumentRepo};
    use chc_core::models::sample::{parse_incoming_tests, record_collection, record_transfer};
    use chc_core::models::LifecycleError;
    use serde_json::json;

    #[derive(Debug)]
    enum TestError {
        Db(DbError),
        Lifecycle(LifecycleError),
    }

    impl From<DbError> for TestError {
        fn from(e: DbError) -> Self {
            Self::Db(e)
        }
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn assemble_then_receive() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        crate::db::migrations::run(&pool).await.expect("migrations");

        let tag = uuid::Uuid::new_v4().simple().to_string();
        let shortcut = format!("T{}", &tag[..8]).to_uppercase();
        DocumentRepo::new(&pool)
            .insert(collections::CORE_TESTDETAILS, &json!({"shortcut": shortcut, "specimen_type": "Serum"}))
            .await
            .unwrap();

        let key = SampleKey {
            barcode: tag[..14].to_owned(),
            company_id: "CHC001".into(),
            day: Utc::now().date_naive(),
        };
        let samples = SampleRepo::new(&pool);
        let collected = parse_incoming_tests(&json!([
            {"test_id": 1, "testname": "Glucose", "shortcut": shortcut, "samplestatus": "Collected"},
            {"test_id": 2, "testname": "Urine R/M", "specimen_type": "Urine", "samplestatus": "Collected"}
        ]))
        .unwrap();
        samples
            .collect(&key, Some("E1"), "desk", |t| {
                record_collection(t, &collected, "desk", Utc::now()).map_err(TestError::Lifecycle)
            })
            .await
            .unwrap();
        let transfer = parse_incoming_tests(&json!([{"test_id": 1}, {"test_id": 2}])).unwrap();
        samples
            .update_existing(&key, "runner", |t| {
                record_transfer(t, &transfer, "runner", Utc::now()).map_err(TestError::Lifecycle)
            })
            .await
            .unwrap()
            .unwrap();

        let repo = BatchRepo::new(&pool);
        let number = BatchNumber::new(&format!("B{}", &tag[..12])).unwrap();
        let barcodes = vec![key.barcode.clone()];
        let details = json!([{"barcode": key.barcode}]);
        let assembled = repo
            .assemble(BatchRequest {
                company_id: "CHC001",
                batch_number: Some(number.clone()),
                barcodes: &barcodes,
                batch_details: &details,
                day: key.day,
                actor: "desk",
            })
            .await
            .unwrap();
        assert_eq!(assembled.assigned, 2);
        assert_eq!(
            assembled.specimen_count,
            vec![
                SpecimenCount { specimen_type: "Serum".into(), count: 1 },
                SpecimenCount { specimen_type: "Urine".into(), count: 1 },
            ]
        );

        let received = repo.receive(&number, "lab", Some("ok")).await.unwrap();
        assert_eq!(received.tests_received, 2);
        assert!(received.batch.received);
        assert!(matches!(
            repo.receive(&number, "lab", None).await,
            Err(DbError::Conflict { .. })
        ));

        assert!(repo.get(&number).await.unwrap().received);
        let carried = samples.list_by_batch(&number).await.unwrap();
        assert_eq!(carried.len(), 1);
        assert_eq!(carried[0].barcode, key.barcode);
    }
}
