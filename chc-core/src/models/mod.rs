//! Domain models with validation at construction
//!
//! Request payloads are validated when these types are built.
//! Invalid input returns ValidationError, never a panic.

pub mod validation;
pub mod ids;
pub mod day;
pub mod pagination;
pub mod employee;
pub mod billing;
pub mod sample;
pub mod batch;
pub mod investigation;

pub use validation::ValidationError;
pub use ids::{is_all_digits, Barcode, CompanyId, EmployeeId, DEFAULT_COMPANY_ID};
pub use day::{day_bounds, local_day, parse_day, DayBounds};
pub use pagination::{Paginated, Pagination, PaginationParams};
pub use employee::{AgeGroup, EmployeeInput, NewEmployee};
pub use billing::{billed_test_ids, parse_amount, BillingInput, NewBilling};
pub use sample::{
    IncomingTest, LifecycleError, SampleStatus, SampleTest, TestId, DEFAULT_SPECIMEN_TYPE,
};
pub use batch::{resolve_specimen, BatchNumber, SpecimenCount, SpecimenKey, SpecimenTally, UNKNOWN_SPECIMEN};
pub use investigation::{parse_json_object, AttachmentKind, InvestigationStatus, Vitals};
