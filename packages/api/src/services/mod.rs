//! Domain services behind the HTTP handlers.
//!
//! Services own transactions and talk to the envelope and the scheduler;
//! handlers only translate HTTP to service calls and [`ServiceError`] to
//! status codes.

pub mod credentials;
pub mod drop_configs;
pub mod error;
pub mod jobs;
pub mod restaurants;

pub use credentials::CredentialService;
pub use drop_configs::DropConfigService;
pub use error::{ServiceError, ServiceResult};
pub use jobs::{JobService, JobSettings};
pub use restaurants::RestaurantService;

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}
