//! Scheduler backends for one-shot drop firings
//!
//! This crate provides a unified abstraction over:
//! - AWS EventBridge Scheduler (`at()` schedules targeting the worker Lambda)
//! - An in-process priority wheel (Docker Compose / local development)

mod traits;

pub mod aws;
pub mod local;

pub use aws::{AwsEventBridgeConfig, AwsEventBridgeScheduler};
pub use local::{FireHandler, LocalScheduler};
pub use traits::{ScheduleInfo, SchedulerBackend, SchedulerError, SchedulerResult, schedule_name};

/// Scheduler provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerProvider {
    /// AWS EventBridge Scheduler
    Aws,
    /// In-process scheduler
    Local,
}

impl SchedulerProvider {
    /// Parse from string
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "aws" | "eventbridge" => Self::Aws,
            _ => Self::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsing_falls_back_to_local() {
        assert_eq!(SchedulerProvider::from_str("EventBridge"), SchedulerProvider::Aws);
        assert_eq!(SchedulerProvider::from_str("aws"), SchedulerProvider::Aws);
        assert_eq!(SchedulerProvider::from_str("memory"), SchedulerProvider::Local);
    }
}
