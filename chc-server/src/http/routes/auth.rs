//! Staff registration and login
//!
//! - `POST /registration/` creates an account
//! - `PUT /registration/` changes a password
//! - `GET /registration/` lists sales staff
//! - `POST /login/` checks a name and password

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chc_core::auth::{hash_password, verify_password, NewUser, PasswordChange, UserInput, SALES_ROLE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::repos::{DbError, User, UserRepo};
use crate::http::error::ApiError;
use crate::http::server::AppState;

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: Option<String>,
    pub password: Option<String>,
    /// Narrows the lookup when one name holds several roles
    pub role: Option<String>,
}

/// Successful login
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub role: String,
    pub name: String,
}

/// POST /registration/ - create an account
async fn register(
    State(state): State<Arc<AppState>>,
    Json(input): Json<UserInput>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user = NewUser::validate(&input)?;
    let hash = hash_password(&user.password)?;

    match UserRepo::new(&state.pool).create(&user.name, &user.role, &hash).await {
        Ok(created) => {
            tracing::info!(name = %created.name, role = %created.role, "account registered");
            Ok((
                StatusCode::CREATED,
                Json(json!({"message": "Registration successful!"})),
            ))
        }
        // Duplicate accounts are a client mistake, reported as 400
        Err(DbError::Conflict { message }) => Err(ApiError::bad_request(message)),
        Err(e) => Err(e.into()),
    }
}

/// PUT /registration/ - change a password
async fn change_password(
    State(state): State<Arc<AppState>>,
    Json(input): Json<UserInput>,
) -> Result<Json<Value>, ApiError> {
    let change = PasswordChange::validate(&input)?;
    let repo = UserRepo::new(&state.pool);

    let user = match repo.find_by_name_role(&change.name, &change.role).await {
        Ok(user) => user,
        Err(DbError::NotFound { .. }) => return Err(ApiError::not_found("User not found")),
        Err(e) => return Err(e.into()),
    };
    if !verify_password(&change.old_password, &user.password_hash)? {
        return Err(ApiError::bad_request("Incorrect current password"));
    }

    let hash = hash_password(&change.new_password)?;
    repo.update_password(user.id, &hash).await?;
    tracing::info!(name = %user.name, role = %user.role, "password changed");

    Ok(Json(json!({"message": "Password changed successfully"})))
}

/// GET /registration/ - sales staff accounts
async fn list_sales(State(state): State<Arc<AppState>>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(UserRepo::new(&state.pool).list_by_role(SALES_ROLE).await?))
}

/// POST /login/
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let name = req.name.as_deref().map(str::trim).unwrap_or_default();
    let password = req.password.as_deref().unwrap_or_default();

    let accounts: Vec<User> = UserRepo::new(&state.pool)
        .find_by_name(name)
        .await?
        .into_iter()
        .filter(|u| req.role.as_deref().map_or(true, |r| u.role == r))
        .collect();
    if accounts.is_empty() {
        return Err(ApiError::not_found("User not found"));
    }

    for user in accounts {
        match verify_password(password, &user.password_hash) {
            Ok(true) => {
                tracing::info!(name = %user.name, role = %user.role, "login");
                return Ok(Json(LoginResponse {
                    message: format!("Login successful as {}, {}", user.role, user.name),
                    role: user.role,
                    name: user.name,
                }));
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(user_id = user.id, error = %e, "skipping account with unreadable hash"),
        }
    }

    Err(ApiError::Unauthorized {
        message: "Invalid password".into(),
    })
}

/// Auth routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/registration/",
            post(register).put(change_password).get(list_sales),
        )
        .route("/login/", post(login))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::http::server::test_app;

    fn post_json(uri: &str, method: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn mismatched_passwords_rejected_before_storage() {
        let response = test_app()
            .oneshot(post_json(
                "/registration/",
                "POST",
                r#"{"name":"asha","role":"Sales Person","password":"a","confirmPassword":"b"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Passwords do not match");
    }

    #[tokio::test]
    async fn password_change_needs_old_password() {
        let response = test_app()
            .oneshot(post_json(
                "/registration/",
                "PUT",
                r#"{"name":"asha","role":"Sales Person","password":"n","confirmPassword":"n"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
