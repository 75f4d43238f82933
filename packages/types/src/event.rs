use crate::platform::Platform;
use crate::sealed::Sealed;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload the scheduler fires into a worker.
///
/// Carries only opaque identifiers and ciphertext. `drop_time` is the
/// nominal release instant; the scheduler fires ahead of it by the cold
/// start buffer and the worker waits out the remainder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropEvent {
    pub job_id: Uuid,
    pub platform: Platform,
    pub platform_venue_id: String,
    pub encrypted_token: Sealed,
    pub encrypted_callback_secret: Sealed,
    pub reservation_date: NaiveDate,
    pub party_size: u32,
    /// `HH:MM` wall-clock times, most preferred first.
    pub preferred_times: Vec<String>,
    pub drop_time: DateTime<Utc>,
    pub server_endpoint: String,
    #[serde(default = "default_callback")]
    pub callback: bool,
}

fn default_callback() -> bool {
    true
}

impl DropEvent {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Absolute URL of the status callback endpoint.
    pub fn callback_url(&self) -> String {
        format!(
            "{}/internal/job/status",
            self.server_endpoint.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> DropEvent {
        DropEvent {
            job_id: Uuid::nil(),
            platform: Platform::Resy,
            platform_venue_id: "1505".into(),
            encrypted_token: Sealed::new("dG9rZW4="),
            encrypted_callback_secret: Sealed::new("c2VjcmV0"),
            reservation_date: NaiveDate::from_ymd_opt(2026, 11, 20).unwrap(),
            party_size: 2,
            preferred_times: vec!["19:00".into(), "19:15".into()],
            drop_time: Utc.with_ymd_and_hms(2026, 11, 6, 14, 0, 0).unwrap(),
            server_endpoint: "https://cierge.example.com/".into(),
            callback: true,
        }
    }

    #[test]
    fn callback_url_strips_trailing_slash() {
        assert_eq!(
            sample().callback_url(),
            "https://cierge.example.com/internal/job/status"
        );
    }

    #[test]
    fn callback_defaults_to_true_when_absent() {
        let mut value = serde_json::to_value(sample()).unwrap();
        value.as_object_mut().unwrap().remove("callback");
        let event: DropEvent = serde_json::from_value(value).unwrap();
        assert!(event.callback);
        assert_eq!(event.drop_time.to_rfc3339(), "2026-11-06T14:00:00+00:00");
    }
}
