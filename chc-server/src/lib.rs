//! chc-server: HTTP backend for corporate health checkups
//!
//! Employee registration and billing, sample collection and transfer,
//! lab batches, medical investigations and dashboard analytics over
//! PostgreSQL.

pub mod db;
pub mod http;

pub use http::{build_router, run_server, ApiError, AppState};
