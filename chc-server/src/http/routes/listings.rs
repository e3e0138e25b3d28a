//! Paginated record listings
//!
//! `?page=&per_page=` on each; per page is clamped to 1..=100.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chc_core::models::{Paginated, PaginationParams};

use crate::db::repos::{Billing, BillingRepo, Employee, EmployeeRepo, Investigation, InvestigationRepo};
use crate::http::error::ApiError;
use crate::http::server::AppState;

/// GET /employees/
async fn list_employees(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Employee>>, ApiError> {
    let page = EmployeeRepo::new(&state.pool).list_paginated(params.into()).await?;
    Ok(Json(page))
}

/// GET /investigations/
async fn list_investigations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Investigation>>, ApiError> {
    let page = InvestigationRepo::new(&state.pool).list_paginated(params.into()).await?;
    Ok(Json(page))
}

/// GET /billings/
async fn list_billings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Billing>>, ApiError> {
    let page = BillingRepo::new(&state.pool).list_paginated(params.into()).await?;
    Ok(Json(page))
}

/// Listing routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/employees/", get(list_employees))
        .route("/investigations/", get(list_investigations))
        .route("/billings/", get(list_billings))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::http::server::test_app;

    #[tokio::test]
    async fn non_numeric_page_is_client_error() {
        let response = test_app()
            .oneshot(Request::builder().uri("/employees/?page=first").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }
}
