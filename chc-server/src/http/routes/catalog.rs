//! Test catalog, packages and barcode stock checks
//!
//! Catalog collections live in the document store; packages are written
//! both as a row and as documents so older readers keep working.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chc_core::models::{is_all_digits, parse_amount};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::db::repos::{collections, DocumentRepo, PackageRepo, MAX_BARCODE_DIGITS};
use crate::http::error::ApiError;
use crate::http::server::AppState;

/// Create package request
#[derive(Debug, Deserialize)]
pub struct CreatePackageRequest {
    pub amount: Option<Value>,
    #[serde(default)]
    pub tests: Vec<Value>,
    pub package_name: Option<String>,
    pub created_by: Option<String>,
}

/// Barcode check request
#[derive(Debug, Deserialize)]
pub struct BarcodeCheckRequest {
    pub barcode: Option<Value>,
}

/// GET /get_core_test/ - test names with prices
async fn get_core_test(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let tests: Vec<Value> = DocumentRepo::new(&state.pool)
        .find_all(collections::CORE_TEST)
        .await?
        .iter()
        .filter_map(|doc| {
            let name = doc.field("test_name")?.as_str().filter(|s| !s.is_empty())?;
            Some(json!({
                "name": name,
                "MRP": doc.field("MRP").cloned().unwrap_or(json!(0)),
                "L2L_Rate_Card": doc.field("L2L_Rate_Card").cloned().unwrap_or(json!(0)),
            }))
        })
        .collect();

    Ok(Json(json!({"status": "success", "tests": tests})))
}

/// POST /create_package/
async fn create_package(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePackageRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let amount = match &req.amount {
        Some(v) if !req.tests.is_empty() && !v.is_null() => parse_amount("amount", Some(v))?,
        _ => return Err(ApiError::bad_request("Amount and tests are required")),
    };
    let actor = req.created_by.as_deref().unwrap_or("System");

    let investigations: Vec<Value> = req
        .tests
        .iter()
        .map(|t| json!({"testname": t.get("name").cloned().unwrap_or(Value::Null), "total": t.get("total").cloned().unwrap_or(Value::Null)}))
        .collect();
    let investigations = Value::Array(investigations);

    let package = PackageRepo::new(&state.pool)
        .create(req.package_name.as_deref(), &investigations, amount, actor)
        .await?;

    let docs = DocumentRepo::new(&state.pool);
    docs.insert(
        collections::CORE_PACKAGE,
        &json!({
            "package_name": package.package_name,
            "investigations": investigations,
            "total_amount": amount,
        }),
    )
    .await?;
    let summary = docs
        .insert(
            collections::PATIENT_BILLING,
            &json!({
                "items": sequential_items(&req.tests),
                "total_amount": amount,
                "created_at": Utc::now(),
            }),
        )
        .await?;
    tracing::info!(package_id = package.id, tests = req.tests.len(), "package created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Package created successfully",
            "data": {
                "package": package,
                "billing": summary.into_json(),
            },
        })),
    ))
}

/// GET /get_packages/
async fn get_packages(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let packages: Vec<Value> = DocumentRepo::new(&state.pool)
        .find_all(collections::CORE_PACKAGE)
        .await?
        .into_iter()
        .map(|doc| {
            let mut pkg = doc.into_json();
            let cleaned: Vec<Value> = pkg
                .get("investigations")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(normalize_investigation).collect())
                .unwrap_or_default();
            pkg["investigations"] = Value::Array(cleaned);
            pkg
        })
        .collect();

    Ok(Json(json!({"status": "success", "data": packages})))
}

/// POST /check_barcode_exists/
async fn check_barcode_exists(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BarcodeCheckRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Some(barcode) = req.barcode.as_ref().and_then(barcode_text).filter(|b| !b.is_empty()) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "valid": false, "message": "Barcode is required."})),
        ));
    };
    let n = match numeric_barcode(&barcode) {
        Ok(n) => n,
        Err(rejection) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(json!({"status": "error", "valid": false, "message": rejection.message()})),
            ));
        }
    };

    let body = if in_stock_range(&state, n).await? {
        json!({
            "status": "success",
            "valid": true,
            "barcode": barcode,
            "message": format!("Barcode {} is valid and available.", barcode)
        })
    } else {
        json!({
            "status": "success",
            "valid": false,
            "message": format!("Barcode {} is not in any available stock range.", barcode)
        })
    };
    Ok((StatusCode::OK, Json(body)))
}

/// GET /api/validate-barcode/{barcode}/
async fn validate_barcode(
    State(state): State<Arc<AppState>>,
    Path(barcode): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let n = match numeric_barcode(&barcode) {
        Ok(n) => n,
        Err(BarcodeRejection::NotNumeric) => {
            return Ok(Json(json!({
                "status": "error",
                "valid": false,
                "exists": false,
                "message": "Invalid barcode format. Only numeric values allowed."
            })));
        }
        Err(rejection) => {
            return Ok(Json(json!({
                "status": "error",
                "valid": false,
                "exists": false,
                "message": rejection.message()
            })));
        }
    };

    let found = in_stock_range(&state, n).await?;
    let message = if found {
        format!("Barcode {} is valid and available.", barcode)
    } else {
        format!("Barcode {} is not in any valid stock range.", barcode)
    };
    Ok(Json(json!({
        "status": "success",
        "valid": found,
        "exists": found,
        "message": message
    })))
}

async fn in_stock_range(state: &AppState, n: i64) -> Result<bool, ApiError> {
    Ok(DocumentRepo::new(&state.pool)
        .find_range_containing(n)
        .await?
        .is_some())
}

fn barcode_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Why a barcode cannot be compared against stock ranges.
#[derive(Debug, PartialEq, Eq)]
enum BarcodeRejection {
    NotNumeric,
    OutOfRange,
}

impl BarcodeRejection {
    fn message(&self) -> &'static str {
        match self {
            Self::NotNumeric => "Invalid barcode format. Only numeric barcodes are allowed.",
            Self::OutOfRange => "Barcode out of range. At most 18 digits are allowed.",
        }
    }
}

/// Digits only, at most `MAX_BARCODE_DIGITS` significant digits.
fn numeric_barcode(s: &str) -> Result<i64, BarcodeRejection> {
    if !is_all_digits(s) {
        return Err(BarcodeRejection::NotNumeric);
    }
    if s.trim_start_matches('0').len() > MAX_BARCODE_DIGITS {
        return Err(BarcodeRejection::OutOfRange);
    }
    s.parse().map_err(|_| BarcodeRejection::OutOfRange)
}

/// `[{"item_1": name}, {"item_2": name}, …]` over unique test names.
fn sequential_items(tests: &[Value]) -> Value {
    let mut seen = HashSet::new();
    let items: Vec<Value> = tests
        .iter()
        .map(|t| t.get("name").cloned().unwrap_or(Value::Null))
        .filter(|name| seen.insert(name.to_string()))
        .enumerate()
        .map(|(i, name)| {
            let mut item = Map::new();
            item.insert(format!("item_{}", i + 1), name);
            Value::Object(item)
        })
        .collect();
    Value::Array(items)
}

/// `{testname, test_id}` with the legacy `testnameme` key and
/// `{"$numberLong": "…"}` ids folded in.
fn normalize_investigation(inv: &Value) -> Value {
    let text = |key: &str| inv.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
    let testname = text("testname").or_else(|| text("testnameme")).unwrap_or_default();

    let test_id = match inv.get("test_id") {
        Some(Value::Object(o)) => match o.get("$numberLong") {
            Some(Value::String(s)) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            Some(Value::Number(n)) => Value::Number(n.clone()),
            _ => Value::Object(o.clone()),
        },
        Some(v) => v.clone(),
        None => Value::Null,
    };

    json!({"testname": testname, "test_id": test_id})
}

/// Catalog routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/get_core_test/", get(get_core_test))
        .route("/create_package/", post(create_package))
        .route("/get_packages/", get(get_packages))
        .route("/check_barcode_exists/", post(check_barcode_exists))
        .route("/api/validate-barcode/{barcode}/", get(validate_barcode))
}
