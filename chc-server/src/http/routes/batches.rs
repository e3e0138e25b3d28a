//! Batch shipment endpoints

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, patch},
    Json, Router,
};
use chc_core::models::sample::SampleTest;
use chc_core::models::{local_day, BatchNumber, CompanyId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::repos::{Batch, BatchRepo, BatchRequest, Sample, SampleRepo};
use crate::http::error::ApiError;
use crate::http::extractors::ValidBatchNumber;
use crate::http::server::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    #[serde(default)]
    pub batch_details: Vec<Value>,
    pub batch_number: Option<String>,
    pub created_by: Option<String>,
    pub company_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReceiveBatchRequest {
    pub received_by: Option<String>,
    pub remarks: Option<String>,
}

/// Batch as listed to the shipment screen
#[derive(Debug, Serialize)]
pub struct BatchView {
    pub id: String,
    pub batch_number: String,
    pub date: String,
    pub created_by: Option<String>,
    pub created_date: String,
    pub received: bool,
    pub remarks: Option<String>,
    pub specimen_count: Value,
    pub batch_details: Value,
}

impl From<Batch> for BatchView {
    fn from(b: Batch) -> Self {
        Self {
            id: b.id.to_string(),
            batch_number: b.batch_number,
            date: b.batch_date.format("%Y-%m-%d").to_string(),
            created_by: b.created_by,
            created_date: b.created_date.format("%Y-%m-%d %H:%M:%S").to_string(),
            received: b.received,
            remarks: b.remarks,
            specimen_count: b.specimen_count,
            batch_details: b.batch_details,
        }
    }
}

/// Barcodes named in `batch_details`, in order, without repeats.
fn detail_barcodes(details: &[Value]) -> Vec<String> {
    let mut barcodes: Vec<String> = Vec::new();
    for entry in details {
        let barcode = match entry.get("barcode") {
            Some(Value::String(s)) => s.trim().to_owned(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if !barcode.is_empty() && !barcodes.contains(&barcode) {
            barcodes.push(barcode);
        }
    }
    barcodes
}

/// GET /batch/
async fn list_batches(State(state): State<Arc<AppState>>) -> Result<Json<Vec<BatchView>>, ApiError> {
    let batches = BatchRepo::new(&state.pool).list().await?;
    Ok(Json(batches.into_iter().map(BatchView::from).collect()))
}

/// Barcode with the tests it shipped in one batch
#[derive(Debug, Serialize)]
pub struct BatchedSample {
    pub barcode: String,
    pub employee_id: Option<String>,
    pub tests: Vec<SampleTest>,
}

impl BatchedSample {
    fn from_sample(sample: Sample, number: &BatchNumber) -> Self {
        let tests = sample
            .tests()
            .into_iter()
            .filter(|t| t.batch_number.as_deref() == Some(number.as_str()))
            .collect();
        Self {
            barcode: sample.barcode,
            employee_id: sample.employee_id,
            tests,
        }
    }
}

/// GET /batch/{batch_number}/ - one batch with the tests it carries
async fn get_batch(
    State(state): State<Arc<AppState>>,
    ValidBatchNumber(number): ValidBatchNumber,
) -> Result<Json<Value>, ApiError> {
    let batch = BatchRepo::new(&state.pool).get(&number).await?;
    let samples: Vec<BatchedSample> = SampleRepo::new(&state.pool)
        .list_by_batch(&number)
        .await?
        .into_iter()
        .map(|s| BatchedSample::from_sample(s, &number))
        .collect();

    Ok(Json(json!({
        "batch": BatchView::from(batch),
        "samples": samples,
    })))
}

/// POST /batch/ - assemble or top up a batch
async fn create_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBatchRequest>,
) -> Result<Json<Value>, ApiError> {
    let barcodes = detail_barcodes(&req.batch_details);
    if barcodes.is_empty() {
        return Err(ApiError::bad_request("Batch details (barcodes) are required"));
    }
    let batch_number = match req.batch_number.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => Some(BatchNumber::new(n)?),
        _ => None,
    };
    let company = match req.company_id.as_deref().map(str::trim) {
        Some(c) if !c.is_empty() => CompanyId::new(c)?,
        _ => state.default_company.clone(),
    };
    let details = Value::Array(req.batch_details.clone());

    let assembled = BatchRepo::new(&state.pool)
        .assemble(BatchRequest {
            company_id: company.as_str(),
            batch_number,
            barcodes: &barcodes,
            batch_details: &details,
            day: local_day(Utc::now(), state.tz),
            actor: req.created_by.as_deref().unwrap_or("system"),
        })
        .await?;

    Ok(Json(json!({
        "message": "Batch created/updated successfully",
        "batch_number": assembled.batch.batch_number,
        "specimen_count": assembled.specimen_count,
        "batch_details": assembled.batch.batch_details,
        "tests_assigned": assembled.assigned,
    })))
}

/// PATCH /batch/{batch_number}/receive
async fn receive_batch(
    State(state): State<Arc<AppState>>,
    ValidBatchNumber(number): ValidBatchNumber,
    body: Option<Json<ReceiveBatchRequest>>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body.unwrap_or_default();
    let received = BatchRepo::new(&state.pool)
        .receive(
            &number,
            req.received_by.as_deref().unwrap_or("system"),
            req.remarks.as_deref(),
        )
        .await?;

    Ok(Json(json!({
        "message": format!("Batch {} received", number.as_str()),
        "batch": BatchView::from(received.batch),
        "tests_received": received.tests_received,
    })))
}

/// Batch routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/batch/", get(list_batches).post(create_batch))
        .route("/batch/{batch_number}/", get(get_batch))
        .route("/batch/{batch_number}/receive", patch(receive_batch))
}
