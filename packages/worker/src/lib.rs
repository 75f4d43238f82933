//! Cierge Worker
//!
//! Short-lived runtime started by the scheduler shortly before a drop. It
//! decrypts the user's platform credentials, waits for the drop instant,
//! polls the platform, books the most preferred matching slot and reports
//! the [`cierge_types::Outcome`] back to the server.
//!
//! The same pipeline runs inside AWS Lambda and in-process under the local
//! scheduler.

pub mod config;
pub mod error;
pub mod execute;
pub mod selection;
pub mod timing;

pub use config::WorkerConfig;
pub use error::WorkerError;
pub use execute::{Worker, emit_outcome};
pub use timing::wait_until;
