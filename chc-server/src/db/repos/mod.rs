//! Repository implementations for database access
//!
//! Each repository follows these patterns:
//! - Uses JOINs or `= ANY($1)` for list operations (no N+1)
//! - Relies on unique constraints, maps violations to `DbError::Conflict`
//! - Uses transactions with `FOR UPDATE` for read-modify-write of JSON lists

pub mod users;
pub mod employees;
pub mod billings;
pub mod packages;
pub mod samples;
pub mod batches;
pub mod investigations;
pub mod ophthalmology;
pub mod documents;
pub mod blobs;

pub use users::{UserRepo, User};
pub use employees::{EmployeeRepo, Employee};
pub use billings::{BillingRepo, Billing, BilledEmployee};
pub use packages::{PackageRepo, Package};
pub use samples::{SampleRepo, Sample, SampleKey, SampleUpdate};
pub use batches::{BatchRepo, Batch, AssembledBatch, BatchRequest, ReceivedBatch};
pub use investigations::{InvestigationRepo, Investigation, InvestigationUpsert};
pub use ophthalmology::{OphthalmologyRepo, Ophthalmology, NewOphthalmology};
pub use documents::{DocumentRepo, Document, collections, MAX_BARCODE_DIGITS};
pub use blobs::{BlobRepo, Blob};

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("conflict: {message}")]
    Conflict { message: String },
}

impl DbError {
    /// Turn a unique-constraint violation into a conflict with `message`.
    pub(crate) fn unique_violation(e: sqlx::Error, message: &str) -> Self {
        match e.as_database_error() {
            Some(db) if db.is_unique_violation() => Self::Conflict {
                message: message.to_owned(),
            },
            _ => Self::Sqlx(e),
        }
    }
}

/// ILIKE pattern matching `needle` anywhere, with wildcards escaped.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("E10"), "%E10%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn non_database_errors_stay_sqlx() {
        let err = DbError::unique_violation(sqlx::Error::RowNotFound, "dup");
        assert!(matches!(err, DbError::Sqlx(_)));
    }
}
