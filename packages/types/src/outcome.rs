use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeLevel {
    Info,
    Error,
}

/// Result document a worker reports for one job.
///
/// Posted to the server callback and printed as a single JSON line.
/// `duration` and `drift_ns` are nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub job_id: Uuid,
    pub success: bool,
    pub duration: i64,
    #[serde(default)]
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub level: OutcomeLevel,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub drift_ns: i64,
    /// Wall-clock time of the booked slot, encoded with a zero offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub platform_confirmation: serde_json::Value,
}

impl Outcome {
    pub fn succeeded(
        job_id: Uuid,
        start_time: DateTime<Utc>,
        reservation_time: DateTime<Utc>,
        confirmation: serde_json::Value,
    ) -> Self {
        Self {
            job_id,
            success: true,
            duration: 0,
            error_message: String::new(),
            error: None,
            level: OutcomeLevel::Info,
            start_time,
            booking_start: None,
            drift_ns: 0,
            reservation_time: Some(reservation_time),
            platform_confirmation: confirmation,
        }
    }

    pub fn failed(job_id: Uuid, start_time: DateTime<Utc>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            job_id,
            success: false,
            duration: 0,
            error: Some(message.clone()),
            error_message: message,
            level: OutcomeLevel::Error,
            start_time,
            booking_start: None,
            drift_ns: 0,
            reservation_time: None,
            platform_confirmation: serde_json::Value::Null,
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        chrono::Duration::nanoseconds(self.duration)
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.start_time + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn completed_at_adds_nanosecond_duration() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut outcome = Outcome::failed(Uuid::nil(), start, "boom");
        outcome.duration = 1_500_000_000;
        assert_eq!(
            outcome.completed_at(),
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 1).unwrap()
                + chrono::Duration::milliseconds(500)
        );
    }

    #[test]
    fn failure_wire_shape() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let outcome = Outcome::failed(Uuid::nil(), start, "no slots matching the preferred times");
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["level"], "error");
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "no slots matching the preferred times");
        assert!(value.get("reservation_time").is_none());
    }
}
