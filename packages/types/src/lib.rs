//! Shared wire types for the drop booking pipeline.
//!
//! Everything that crosses a process boundary lives here: the [`DropEvent`]
//! handed from the scheduler to a worker, the [`Outcome`] a worker reports
//! back, and the [`Sealed`] ciphertext wrapper used for every secret carried
//! inside those documents.

pub mod event;
pub mod outcome;
pub mod platform;
pub mod sealed;
pub mod wall;

pub use event::DropEvent;
pub use outcome::{Outcome, OutcomeLevel};
pub use platform::{Platform, PlatformCredentials, UnknownPlatform};
pub use sealed::Sealed;
pub use wall::{WallTimeError, format_wall_time, parse_wall_time};
