//! Stored report attachments

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::db::repos::{BlobRepo, DbError};
use crate::http::error::ApiError;
use crate::http::extractors::ValidUuid;
use crate::http::server::AppState;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// `inline; filename="…"` with quotes and control characters dropped.
fn content_disposition(filename: Option<&str>) -> Option<HeaderValue> {
    let name: String = filename?
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    if name.trim().is_empty() {
        return None;
    }
    HeaderValue::from_str(&format!("inline; filename=\"{}\"", name)).ok()
}

/// GET /files/{id}
async fn get_file(
    State(state): State<Arc<AppState>>,
    ValidUuid(id): ValidUuid,
) -> Result<impl IntoResponse, ApiError> {
    let blob = match BlobRepo::new(&state.pool).get(id).await {
        Ok(blob) => blob,
        Err(DbError::NotFound { .. }) => return Err(ApiError::not_found("File not found")),
        Err(e) => return Err(e.into()),
    };

    let mut headers = HeaderMap::new();
    let content_type = blob
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or(HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
    headers.insert(header::CONTENT_TYPE, content_type);
    if let Some(disposition) = content_disposition(blob.filename.as_deref()) {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    Ok((headers, blob.data))
}

/// File routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/files/{id}", get(get_file))
}
