//! Sample collection and transfer endpoints
//!
//! - `GET /billing/patients/` billings of a day still waiting for collection
//! - `GET /samples/` samples of a day with tests in a given status
//! - `POST /samples/` record a collection
//! - `PATCH /samples/` record a transfer
//! - `GET /samples/transferred/` samples waiting for a batch

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chc_core::models::sample::{
    awaiting_batch, has_uncollected, parse_incoming_tests, record_collection, record_transfer,
};
use chc_core::models::{
    billed_test_ids, day_bounds, parse_day, Barcode, CompanyId, SampleStatus, SampleTest,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::repos::{Billing, BillingRepo, Employee, EmployeeRepo, Sample, SampleKey, SampleRepo};
use crate::http::error::ApiError;
use crate::http::server::AppState;

/// `date` + `company_id` listing filters
#[derive(Debug, Default, Deserialize)]
pub struct DayQuery {
    pub date: Option<String>,
    pub company_id: Option<String>,
    pub employee_id: Option<String>,
    pub barcode: Option<String>,
    pub samplestatus: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransferredQuery {
    pub employee_id: Option<String>,
    pub date: Option<String>,
}

/// Collection or transfer request
#[derive(Debug, Deserialize)]
pub struct SampleRequest {
    pub date: Option<String>,
    pub company_id: Option<String>,
    pub barcode: Option<String>,
    #[serde(default)]
    pub testdetails: Option<Value>,
    pub collected_by: Option<String>,
    pub transferred_by: Option<String>,
}

/// `{results, count}` listing envelope
#[derive(Debug, Serialize)]
pub struct Results<T> {
    pub results: Vec<T>,
    pub count: usize,
}

impl<T> From<Vec<T>> for Results<T> {
    fn from(results: Vec<T>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

/// Employee details shown next to a billing or sample
#[derive(Debug, Serialize)]
pub struct EmployeeSummary {
    pub employee_name: String,
    pub age: Option<i32>,
    pub gender: String,
    pub company_name: String,
    pub department: String,
}

impl EmployeeSummary {
    fn unknown() -> Self {
        Self {
            employee_name: "Unknown".into(),
            age: None,
            gender: "Unknown".into(),
            company_name: "Unknown".into(),
            department: "Unknown".into(),
        }
    }

    fn lookup(employees: &HashMap<String, Employee>, employee_id: Option<&str>) -> Self {
        let Some(e) = employee_id.and_then(|id| employees.get(id)) else {
            return Self::unknown();
        };
        let or_unknown = |v: &Option<String>| {
            v.clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Unknown".into())
        };
        Self {
            employee_name: if e.employee_name.is_empty() { "Unknown".into() } else { e.employee_name.clone() },
            age: Some(e.age),
            gender: if e.gender.is_empty() { "Unknown".into() } else { e.gender.clone() },
            company_name: or_unknown(&e.company_name),
            department: or_unknown(&e.department),
        }
    }
}

/// Billing awaiting collection
#[derive(Debug, Serialize)]
pub struct BillingPatient {
    #[serde(flatten)]
    pub billing: Billing,
    pub test_count: usize,
    #[serde(flatten)]
    pub employee: EmployeeSummary,
}

/// Sample with the tests matching the requested status
#[derive(Debug, Serialize)]
pub struct SampleView {
    #[serde(rename = "_id")]
    pub id: i64,
    pub barcode: String,
    pub company_id: String,
    pub employee_id: Option<String>,
    pub created_date: DateTime<Utc>,
    pub collected_date: DateTime<Utc>,
    pub collected_by: String,
    pub testdetails: Vec<SampleTest>,
    #[serde(flatten)]
    pub employee: EmployeeSummary,
}

/// Sample waiting for a batch
#[derive(Debug, Serialize)]
pub struct TransferredSample {
    pub employee_id: String,
    pub barcode: String,
    pub testdetails: Vec<SampleTest>,
    pub transferred_date: Option<DateTime<Utc>>,
    pub transferred_by: Option<String>,
}

fn non_blank(v: Option<&String>) -> Option<&str> {
    v.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Required `date` and `company_id` of a day listing.
fn day_and_company(date: Option<&String>, company_id: Option<&String>) -> Result<(NaiveDate, CompanyId), ApiError> {
    match (non_blank(date), non_blank(company_id)) {
        (Some(date), Some(company)) => Ok((parse_day(date)?, CompanyId::new(company)?)),
        _ => Err(ApiError::bad_request("date and company_id are required")),
    }
}

async fn employees_by_id(state: &AppState, ids: Vec<String>) -> Result<HashMap<String, Employee>, ApiError> {
    Ok(EmployeeRepo::new(&state.pool)
        .find_many(&ids)
        .await?
        .into_iter()
        .map(|e| (e.employee_id.clone(), e))
        .collect())
}

/// GET /billing/patients/
async fn billing_patients(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DayQuery>,
) -> Result<Json<Results<BillingPatient>>, ApiError> {
    let (day, company) = day_and_company(q.date.as_ref(), q.company_id.as_ref())?;
    let bounds = day_bounds(day, state.tz);

    let billings = BillingRepo::new(&state.pool)
        .list_for_day(
            company.as_str(),
            &bounds,
            non_blank(q.employee_id.as_ref()),
            non_blank(q.barcode.as_ref()),
        )
        .await?;
    let samples: HashMap<String, Vec<SampleTest>> = SampleRepo::new(&state.pool)
        .list(company.as_str(), day, None, None)
        .await?
        .into_iter()
        .map(|s| {
            let tests = s.tests();
            (s.barcode, tests)
        })
        .collect();

    let pending: Vec<(Billing, usize)> = billings
        .into_iter()
        .filter_map(|b| {
            let billed = billed_test_ids(&b.testdetails);
            let collected = samples.get(&b.barcode).map(Vec::as_slice).unwrap_or_default();
            (!billed.is_empty() && has_uncollected(&billed, collected)).then(|| {
                let count = billed.len();
                (b, count)
            })
        })
        .collect();

    let employees = employees_by_id(&state, pending.iter().map(|(b, _)| b.employee_id.clone()).collect()).await?;
    let results: Vec<BillingPatient> = pending
        .into_iter()
        .map(|(billing, test_count)| BillingPatient {
            employee: EmployeeSummary::lookup(&employees, Some(&billing.employee_id)),
            billing,
            test_count,
        })
        .collect();

    Ok(Json(results.into()))
}

/// GET /samples/
async fn list_samples(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DayQuery>,
) -> Result<Json<Results<SampleView>>, ApiError> {
    let (day, company) = day_and_company(q.date.as_ref(), q.company_id.as_ref())?;
    let wanted = match non_blank(q.samplestatus.as_ref()) {
        Some(s) => s.parse::<SampleStatus>()?,
        None => SampleStatus::Transferred,
    };

    let samples: Vec<(Sample, Vec<SampleTest>)> = SampleRepo::new(&state.pool)
        .list(
            company.as_str(),
            day,
            non_blank(q.barcode.as_ref()),
            non_blank(q.employee_id.as_ref()),
        )
        .await?
        .into_iter()
        .filter_map(|s| {
            let tests: Vec<SampleTest> = s.tests().into_iter().filter(|t| t.samplestatus == wanted).collect();
            (!tests.is_empty()).then_some((s, tests))
        })
        .collect();

    let missing: Vec<String> = samples
        .iter()
        .filter(|(s, _)| s.employee_id.is_none())
        .map(|(s, _)| s.barcode.clone())
        .collect();
    let from_billing = BillingRepo::new(&state.pool)
        .latest_employee_ids(&missing, Some(company.as_str()))
        .await?;
    let resolved: Vec<Option<String>> = samples
        .iter()
        .map(|(s, _)| s.employee_id.clone().or_else(|| from_billing.get(&s.barcode).cloned()))
        .collect();
    let employees = employees_by_id(&state, resolved.iter().flatten().cloned().collect()).await?;

    let results: Vec<SampleView> = samples
        .into_iter()
        .zip(resolved)
        .map(|((sample, tests), employee_id)| SampleView {
            id: sample.id,
            employee: EmployeeSummary::lookup(&employees, employee_id.as_deref()),
            barcode: sample.barcode,
            company_id: sample.company_id,
            employee_id,
            created_date: sample.created_date,
            collected_date: sample.created_date,
            collected_by: sample.created_by.unwrap_or_else(|| "System".into()),
            testdetails: tests,
        })
        .collect();

    Ok(Json(results.into()))
}

/// Validated identity of the sample a request targets.
fn sample_key(req: &SampleRequest) -> Result<(SampleKey, NaiveDate), ApiError> {
    let (Some(date), Some(company), Some(barcode)) = (
        non_blank(req.date.as_ref()),
        non_blank(req.company_id.as_ref()),
        non_blank(req.barcode.as_ref()),
    ) else {
        return Err(ApiError::bad_request("date, company_id and barcode are required"));
    };
    let day = parse_day(date)?;
    let key = SampleKey::new(&Barcode::new(barcode)?, &CompanyId::new(company)?, day);
    Ok((key, day))
}

/// POST /samples/ - record a collection
async fn collect_sample(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SampleRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (key, day) = sample_key(&req)?;
    let incoming = parse_incoming_tests(req.testdetails.as_ref().unwrap_or(&Value::Array(Vec::new())))?;
    let actor = non_blank(req.collected_by.as_ref()).unwrap_or("system");

    let billing = BillingRepo::new(&state.pool)
        .find_for_day(&key.barcode, &key.company_id, &day_bounds(day, state.tz))
        .await?
        .ok_or_else(|| ApiError::not_found("Billing record not found for the given date, company_id and barcode"))?;

    let now = Utc::now();
    let update = SampleRepo::new(&state.pool)
        .collect(&key, Some(&billing.employee_id), actor, |tests| {
            record_collection(tests, &incoming, actor, now).map_err(ApiError::from)
        })
        .await?;

    tracing::info!(
        barcode = %key.barcode,
        created = update.created,
        updated = update.outcome.updated,
        added = update.outcome.added,
        "sample collection recorded"
    );

    let status = if update.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(json!({
            "message": "Sample data saved successfully",
            "data": update.sample,
        })),
    ))
}

/// PATCH /samples/ - record a transfer
async fn transfer_sample(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SampleRequest>,
) -> Result<Json<Value>, ApiError> {
    let (key, _) = sample_key(&req)?;
    let incoming = parse_incoming_tests(req.testdetails.as_ref().unwrap_or(&Value::Array(Vec::new())))?;
    let actor = non_blank(req.transferred_by.as_ref()).unwrap_or("system");

    let now = Utc::now();
    let update = SampleRepo::new(&state.pool)
        .update_existing(&key, actor, |tests| {
            match record_transfer(tests, &incoming, actor, now)? {
                0 => Err(ApiError::not_found("No matching tests found to update")),
                n => Ok(n),
            }
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Sample not found for the given date, company_id and barcode"))?;

    tracing::info!(barcode = %key.barcode, updated = update.outcome, "sample transfer recorded");

    Ok(Json(json!({
        "message": format!("Sample transferred successfully. Updated {} test(s).", update.outcome),
        "data": update.sample,
        "updated_tests": update.outcome,
    })))
}

/// GET /samples/transferred/
async fn transferred_samples(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TransferredQuery>,
) -> Result<Json<Value>, ApiError> {
    let bounds = non_blank(q.date.as_ref())
        .map(parse_day)
        .transpose()?
        .map(|day| day_bounds(day, state.tz));
    let needle = non_blank(q.employee_id.as_ref()).map(str::to_lowercase);

    let samples: Vec<(Sample, Vec<SampleTest>)> = SampleRepo::new(&state.pool)
        .list_with_transfers(bounds.as_ref())
        .await?
        .into_iter()
        .map(|s| {
            let tests = s.tests();
            (s, tests)
        })
        .filter(|(_, tests)| awaiting_batch(tests))
        .collect();

    let barcodes: Vec<String> = samples.iter().map(|(s, _)| s.barcode.clone()).collect();
    let employee_ids = BillingRepo::new(&state.pool)
        .latest_employee_ids(&barcodes, None)
        .await?;

    let transferred: Vec<TransferredSample> = samples
        .into_iter()
        .filter_map(|(sample, tests)| {
            // Samples without a billing cannot be traced to an employee
            let employee_id = employee_ids.get(&sample.barcode)?.clone();
            if let Some(needle) = &needle {
                if !employee_id.to_lowercase().contains(needle) {
                    return None;
                }
            }
            Some(TransferredSample {
                employee_id,
                barcode: sample.barcode,
                testdetails: tests,
                transferred_date: sample.lastmodified_date,
                transferred_by: sample.lastmodified_by,
            })
        })
        .collect();

    Ok(Json(json!({"transferred_samples": transferred})))
}

/// Sample routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/billing/patients/", get(billing_patients))
        .route(
            "/samples/",
            get(list_samples).post(collect_sample).patch(transfer_sample),
        )
        .route("/samples/transferred/", get(transferred_samples))
}
