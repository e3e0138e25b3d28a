//! Employee repository

use chc_core::models::{NewEmployee, Paginated, Pagination};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool, Row};

use super::DbError;

/// Employee record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Employee {
    pub id: i64,
    pub company_id: String,
    pub employee_name: String,
    pub employee_id: String,
    pub gender: String,
    pub age: i32,
    pub company_name: Option<String>,
    pub department: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub created_date: DateTime<Utc>,
}

const COLUMNS: &str = "id, company_id, employee_name, employee_id, gender, age, \
                       company_name, department, email, mobile, created_date";

/// Employee repository
pub struct EmployeeRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> EmployeeRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert inside a caller's transaction (registration saves billing alongside).
    pub async fn create(conn: &mut PgConnection, emp: &NewEmployee, actor: &str) -> Result<Employee, DbError> {
        let row = sqlx::query_as::<_, Employee>(&format!(
            r#"
            INSERT INTO employees
                (company_id, employee_name, employee_id, gender, age,
                 company_name, department, email, mobile, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(emp.company_id.as_str())
        .bind(&emp.employee_name)
        .bind(emp.employee_id.as_str())
        .bind(&emp.gender)
        .bind(emp.age)
        .bind(emp.company_name.as_deref())
        .bind(emp.department.as_deref())
        .bind(emp.email.as_deref())
        .bind(emp.mobile.as_deref())
        .bind(actor)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    /// Most recent registration for an employee id.
    pub async fn find_by_employee_id(&self, employee_id: &str) -> Result<Employee, DbError> {
        sqlx::query_as::<_, Employee>(&format!(
            "SELECT {COLUMNS} FROM employees WHERE employee_id = $1 ORDER BY id DESC LIMIT 1"
        ))
        .bind(employee_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound {
            resource: "employee",
            id: employee_id.to_owned(),
        })
    }

    /// Latest registration for each of `employee_ids`.
    pub async fn find_many(&self, employee_ids: &[String]) -> Result<Vec<Employee>, DbError> {
        if employee_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(sqlx::query_as::<_, Employee>(&format!(
            r#"
            SELECT DISTINCT ON (employee_id) {COLUMNS}
            FROM employees
            WHERE employee_id = ANY($1)
            ORDER BY employee_id, id DESC
            "#
        ))
        .bind(employee_ids)
        .fetch_all(self.pool)
        .await?)
    }

    pub async fn list(&self) -> Result<Vec<Employee>, DbError> {
        Ok(sqlx::query_as::<_, Employee>(&format!(
            "SELECT {COLUMNS} FROM employees ORDER BY id"
        ))
        .fetch_all(self.pool)
        .await?)
    }

    /// Page of employees, newest first, with total in the same query.
    pub async fn list_paginated(&self, page: Pagination) -> Result<Paginated<Employee>, DbError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS}, COUNT(*) OVER() AS total
            FROM employees
            ORDER BY id DESC
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
            .map(Employee::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paginated::new(items, total, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chc_core::models::{CompanyId, EmployeeInput};
    use serde_json::json;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn create_and_find_latest() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        crate::db::migrations::run(&pool).await.expect("migrations");

        let emp_id = format!("T{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let input = EmployeeInput {
            employee_name: Some("Test Person".into()),
            employee_id: Some(emp_id.clone()),
            gender: Some("Male".into()),
            age: Some(json!(40)),
            ..Default::default()
        };
        let emp = NewEmployee::validate(&input, &CompanyId::default()).unwrap();

        let mut conn = pool.acquire().await.unwrap();
        EmployeeRepo::create(&mut conn, &emp, "test").await.unwrap();
        drop(conn);

        let repo = EmployeeRepo::new(&pool);
        let found = repo.find_by_employee_id(&emp_id).await.unwrap();
        assert_eq!(found.age, 40);
        assert_eq!(repo.find_many(&[emp_id]).await.unwrap().len(), 1);
    }
}
