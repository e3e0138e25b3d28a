//! Database layer - connection pool, schema and repositories
//!
//! - Connection pool, no shared connection behind a mutex
//! - List operations use JOINs or `= ANY`, no N+1 queries
//! - Rely on DB constraints and map conflicts, no check-then-insert
//! - Transactions for multi-step writes

pub mod migrations;
pub mod pool;
pub mod repos;

pub use pool::{create_pool, create_pool_with_options};
pub use repos::*;
pub use sqlx::PgPool;
