//! chc-core: domain types for the corporate health-checkup backend
//!
//! Validated request models, the per-test sample lifecycle, batch
//! specimen tallies, dashboard analytics and configuration. Nothing here
//! touches the database.

pub mod analytics;
pub mod auth;
pub mod config;
pub mod models;

pub use analytics::{DashboardAnalytics, EmployeeProfile, HealthBand};
pub use config::{ChcConfig, ConfigError};
pub use models::{LifecycleError, ValidationError};
