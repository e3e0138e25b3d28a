//! Billing repository

use std::collections::HashMap;

use chc_core::models::{DayBounds, NewBilling, Paginated, Pagination};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgConnection, PgPool, Row};

use super::{contains_pattern, DbError};

/// Billing record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Billing {
    pub id: i64,
    pub company_id: String,
    pub date: DateTime<Utc>,
    pub employee_id: String,
    pub barcode: String,
    pub testdetails: Value,
    #[serde(rename = "netAmount")]
    pub net_amount: Decimal,
    #[serde(rename = "paymentMode")]
    pub payment_mode: String,
}

/// One employee seen on a billing, with the barcode billed
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BilledEmployee {
    pub employee_name: String,
    pub age: i32,
    pub gender: String,
    pub employee_id: String,
    pub barcode: String,
}

const COLUMNS: &str =
    "id, company_id, date, employee_id, barcode, testdetails, net_amount, payment_mode";

/// Billing repository
pub struct BillingRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> BillingRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert inside a caller's transaction.
    pub async fn create(conn: &mut PgConnection, billing: &NewBilling, actor: &str) -> Result<Billing, DbError> {
        Ok(sqlx::query_as::<_, Billing>(&format!(
            r#"
            INSERT INTO billings
                (company_id, employee_id, barcode, testdetails, net_amount, payment_mode, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(billing.company_id.as_str())
        .bind(billing.employee_id.as_str())
        .bind(billing.barcode.as_str())
        .bind(&billing.testdetails)
        .bind(billing.net_amount)
        .bind(&billing.payment_mode)
        .bind(actor)
        .fetch_one(conn)
        .await?)
    }

    /// Billings of one company on one day, optionally narrowed by
    /// case-insensitive substring matches on employee id and barcode.
    pub async fn list_for_day(
        &self,
        company_id: &str,
        day: &DayBounds,
        employee_filter: Option<&str>,
        barcode_filter: Option<&str>,
    ) -> Result<Vec<Billing>, DbError> {
        Ok(sqlx::query_as::<_, Billing>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM billings
            WHERE company_id = $1
              AND date >= $2 AND date < $3
              AND ($4::text IS NULL OR employee_id ILIKE $4)
              AND ($5::text IS NULL OR barcode ILIKE $5)
            ORDER BY date, id
            "#
        ))
        .bind(company_id)
        .bind(day.start)
        .bind(day.end)
        .bind(employee_filter.map(contains_pattern))
        .bind(barcode_filter.map(contains_pattern))
        .fetch_all(self.pool)
        .await?)
    }

    /// The billing for a barcode on a given day, if any.
    pub async fn find_for_day(
        &self,
        barcode: &str,
        company_id: &str,
        day: &DayBounds,
    ) -> Result<Option<Billing>, DbError> {
        Ok(sqlx::query_as::<_, Billing>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM billings
            WHERE barcode = $1 AND company_id = $2 AND date >= $3 AND date < $4
            ORDER BY date DESC
            LIMIT 1
            "#
        ))
        .bind(barcode)
        .bind(company_id)
        .bind(day.start)
        .bind(day.end)
        .fetch_optional(self.pool)
        .await?)
    }

    /// Employee id on the latest billing of each barcode.
    ///
    /// With `company_id` only that company's billings are considered.
    pub async fn latest_employee_ids(
        &self,
        barcodes: &[String],
        company_id: Option<&str>,
    ) -> Result<HashMap<String, String>, DbError> {
        if barcodes.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (barcode) barcode, employee_id
            FROM billings
            WHERE barcode = ANY($1) AND ($2::text IS NULL OR company_id = $2)
            ORDER BY barcode, date DESC, id DESC
            "#,
        )
        .bind(barcodes)
        .bind(company_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get("barcode"), r.get("employee_id")))
            .collect())
    }

    pub async fn list_paginated(&self, page: Pagination) -> Result<Paginated<Billing>, DbError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS}, COUNT(*) OVER() AS total
            FROM billings
            ORDER BY date DESC, id DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
        let items = rows
            .iter()
            .map(Billing::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paginated::new(items, total, page))
    }

    /// Every employee that appears on a billing, once, with the barcode of
    /// their first billing. Billings whose employee was never registered
    /// are left out.
    pub async fn employees_with_barcodes(&self) -> Result<Vec<BilledEmployee>, DbError> {
        Ok(sqlx::query_as::<_, BilledEmployee>(
            r#"
            SELECT DISTINCT ON (b.employee_id)
                e.employee_name, e.age, e.gender, e.employee_id, b.barcode
            FROM billings b
            JOIN employees e ON e.employee_id = b.employee_id
            ORDER BY b.employee_id, b.id, e.id DESC
            "#,
        )
        .fetch_all(self.pool)
        .await?)
    }
}

