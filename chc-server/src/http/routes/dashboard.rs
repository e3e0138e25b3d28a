//! Dashboard analytics

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chc_core::analytics::{DashboardAnalytics, EmployeeProfile};
use chc_core::models::Vitals;

use crate::db::repos::{Employee, EmployeeRepo, InvestigationRepo};
use crate::http::error::ApiError;
use crate::http::server::AppState;

fn profile(e: &Employee) -> EmployeeProfile {
    EmployeeProfile {
        gender: Some(e.gender.clone()).filter(|g| !g.trim().is_empty()),
        age: Some(e.age),
        department: e.department.clone().filter(|d| !d.trim().is_empty()),
    }
}

/// GET /dashboard/analytics/
async fn analytics(State(state): State<Arc<AppState>>) -> Result<Json<DashboardAnalytics>, ApiError> {
    let employees: Vec<EmployeeProfile> = EmployeeRepo::new(&state.pool)
        .list()
        .await?
        .iter()
        .map(profile)
        .collect();
    let vitals: Vec<Vitals> = InvestigationRepo::new(&state.pool)
        .all_vitals()
        .await?
        .iter()
        .map(Vitals::from_value)
        .collect();

    tracing::debug!(employees = employees.len(), assessments = vitals.len(), "computing dashboard");
    Ok(Json(DashboardAnalytics::compute(&employees, &vitals)))
}

/// Dashboard routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/dashboard/analytics/", get(analytics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn blank_fields_become_unknown() {
        let e = Employee {
            id: 1,
            company_id: "CHC001".into(),
            employee_name: "Ravi".into(),
            employee_id: "E1".into(),
            gender: " ".into(),
            age: 30,
            company_name: None,
            department: Some(String::new()),
            email: None,
            mobile: None,
            created_date: Utc::now(),
        };
        let p = profile(&e);
        assert_eq!(p.gender, None);
        assert_eq!(p.department, None);
        assert_eq!(p.age, Some(30));
    }
}
