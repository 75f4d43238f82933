//! Wall-clock time helpers.
//!
//! Preferred times and drop times are written as `HH:MM` in the restaurant's
//! local time zone. Slot times coming back from platforms carry seconds.

use chrono::{NaiveTime, Timelike};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WallTimeError {
    #[error("Invalid wall time '{0}', expected HH:MM")]
    Invalid(String),
}

/// Parse `HH:MM` (or `HH:MM:SS`) into a naive wall-clock time.
pub fn parse_wall_time(value: &str) -> Result<NaiveTime, WallTimeError> {
    let trimmed = value.trim();
    let parsed = match trimmed.len() {
        5 => NaiveTime::parse_from_str(trimmed, "%H:%M"),
        8 => NaiveTime::parse_from_str(trimmed, "%H:%M:%S"),
        _ => return Err(WallTimeError::Invalid(value.to_string())),
    };
    parsed.map_err(|_| WallTimeError::Invalid(value.to_string()))
}

/// Render a wall-clock time as `HH:MM`, dropping seconds.
pub fn format_wall_time(time: NaiveTime) -> String {
    format!("{:02}:{:02}", time.hour(), time.minute())
}
