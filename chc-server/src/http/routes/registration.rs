//! Employee registration with billing

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chc_core::models::{BillingInput, EmployeeInput, NewBilling, NewEmployee};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::repos::{BilledEmployee, BillingRepo, DbError, Employee, EmployeeRepo};
use crate::http::error::ApiError;
use crate::http::server::AppState;

/// Registration desk payload: employee and billing fields side by side
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(flatten)]
    pub employee: EmployeeInput,
    #[serde(flatten)]
    pub billing: BillingInput,
    pub created_by: Option<String>,
}

/// POST /chc_empregisterandbilling/ - save employee and billing together
async fn register_with_billing(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let employee = NewEmployee::validate(&req.employee, &state.default_company)?;
    let billing = NewBilling::validate(&req.billing, &employee.employee_id, &employee.company_id)?;
    let actor = req.created_by.as_deref().unwrap_or("System");

    let mut tx = state.pool.begin().await.map_err(DbError::from)?;
    let employee = EmployeeRepo::create(&mut tx, &employee, actor).await?;
    let billing = BillingRepo::create(&mut tx, &billing, actor).await?;
    tx.commit().await.map_err(DbError::from)?;

    tracing::info!(
        employee_id = %employee.employee_id,
        barcode = %billing.barcode,
        "employee registered and billed"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Employee and Billing saved successfully",
            "employee": employee,
            "billing": billing,
        })),
    ))
}

/// GET /get_all_employees/ - employees seen on billings, with their barcode
async fn billed_employees(State(state): State<Arc<AppState>>) -> Result<Json<Vec<BilledEmployee>>, ApiError> {
    Ok(Json(BillingRepo::new(&state.pool).employees_with_barcodes().await?))
}

/// GET /get_all_registered_employees/
async fn registered_employees(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Employee>>, ApiError> {
    Ok(Json(EmployeeRepo::new(&state.pool).list().await?))
}

/// Registration routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chc_empregisterandbilling/", post(register_with_billing))
        .route("/get_all_employees/", get(billed_employees))
        .route("/get_all_registered_employees/", get(registered_employees))
}
