//! Staff account repository

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use super::DbError;

/// Account row. The hash never leaves the server.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub role: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_date: DateTime<Utc>,
    pub lastmodified_date: Option<DateTime<Utc>>,
}

const COLUMNS: &str = "id, name, role, password_hash, created_date, lastmodified_date";

/// User repository
pub struct UserRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert an account; a second account with the same name and role is a conflict.
    pub async fn create(&self, name: &str, role: &str, password_hash: &str) -> Result<User, DbError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, role, password_hash, created_by)
            VALUES ($1, $2, $3, $1)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(name)
        .bind(role)
        .bind(password_hash)
        .fetch_one(self.pool)
        .await
        .map_err(|e| DbError::unique_violation(e, "User with this name and role already exists"))
    }

    /// All accounts with this name, oldest first.
    pub async fn find_by_name(&self, name: &str) -> Result<Vec<User>, DbError> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {COLUMNS} FROM users WHERE name = $1 ORDER BY id"
        ))
        .bind(name)
        .fetch_all(self.pool)
        .await?)
    }

    pub async fn find_by_name_role(&self, name: &str, role: &str) -> Result<User, DbError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {COLUMNS} FROM users WHERE name = $1 AND role = $2"
        ))
        .bind(name)
        .bind(role)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound {
            resource: "user",
            id: name.to_owned(),
        })
    }

    pub async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, lastmodified_by = name, lastmodified_date = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound {
                resource: "user",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn list_by_role(&self, role: &str) -> Result<Vec<User>, DbError> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {COLUMNS} FROM users WHERE role = $1 ORDER BY name"
        ))
        .bind(role)
        .fetch_all(self.pool)
        .await?)
    }
}
