//! Package repository

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use super::DbError;

/// Package record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Package {
    pub id: i64,
    pub package_name: Option<String>,
    pub investigations: Value,
    #[serde(rename = "totalAmount")]
    pub total_amount: Decimal,
    pub created_by: Option<String>,
    pub created_date: DateTime<Utc>,
}

/// Package repository
pub struct PackageRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> PackageRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        package_name: Option<&str>,
        investigations: &Value,
        total_amount: Decimal,
        actor: &str,
    ) -> Result<Package, DbError> {
        Ok(sqlx::query_as::<_, Package>(
            r#"
            INSERT INTO packages (package_name, investigations, total_amount, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, package_name, investigations, total_amount, created_by, created_date
            "#,
        )
        .bind(package_name)
        .bind(investigations)
        .bind(total_amount)
        .bind(actor)
        .fetch_one(self.pool)
        .await?)
    }
}
