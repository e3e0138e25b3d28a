//! Custom Axum extractors

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use chc_core::models::{Barcode, BatchNumber, ValidationError};
use uuid::Uuid;

use super::error::ApiError;

/// Extract and validate a batch number from path
pub struct ValidBatchNumber(pub BatchNumber);

impl<S> FromRequestParts<S> for ValidBatchNumber
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(number): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Validation(ValidationError::Empty { field: "batch_number" }))?;

        Ok(Self(BatchNumber::new(&number)?))
    }
}

/// Extract and validate a barcode from path
pub struct ValidBarcode(pub Barcode);

impl<S> FromRequestParts<S> for ValidBarcode
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(barcode): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Validation(ValidationError::Empty { field: "barcode" }))?;

        Ok(Self(Barcode::new(&barcode)?))
    }
}

/// Extract and validate a UUID from path
pub struct ValidUuid(pub Uuid);

impl<S> FromRequestParts<S> for ValidUuid
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Validation(ValidationError::Empty { field: "id" }))?;

        let uuid = Uuid::parse_str(&id)
            .map_err(|_| ApiError::Validation(ValidationError::format("id", "invalid UUID format")))?;

        Ok(Self(uuid))
    }
}
