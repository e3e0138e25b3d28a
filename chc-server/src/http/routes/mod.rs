//! Route handlers organized by resource
//!
//! Paths keep the trailing slashes existing clients call.

pub mod health;
pub mod auth;
pub mod catalog;
pub mod registration;
pub mod samples;
pub mod batches;
pub mod investigations;
pub mod files;
pub mod listings;
pub mod dashboard;
