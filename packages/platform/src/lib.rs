//! Booking platform adapters
//!
//! Every platform is reached through the [`BookingPlatform`] capability set:
//! - `pre_check` validates credentials before the drop
//! - `search` asks once for inventory
//! - `book` turns a slot into a confirmed reservation
//!
//! [`fetch_slots`] wraps `search` in the bounded poll used at drop time.
//! Adapters are created through a [`PlatformRegistry`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use cierge_types::{DropEvent, Platform};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod error;
pub mod opentable;
pub mod registry;
pub mod resy;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{PlatformError, PlatformResult};
pub use registry::{PlatformFactory, PlatformRegistry};

/// What a worker is trying to book. Contains no secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub venue_id: String,
    pub reservation_date: NaiveDate,
    pub party_size: u32,
    pub drop_time: DateTime<Utc>,
}

impl BookingRequest {
    pub fn from_event(event: &DropEvent) -> Self {
        Self {
            venue_id: event.platform_venue_id.clone(),
            reservation_date: event.reservation_date,
            party_size: event.party_size,
            drop_time: event.drop_time,
        }
    }
}

/// A bookable table time as published by a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Platform handle used to request booking details for this slot.
    pub config_token: String,
    /// Wall-clock start in the restaurant's time zone.
    pub start: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Slot {
    pub fn time(&self) -> NaiveTime {
        self.start.time()
    }
}

/// A confirmed booking.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingAttempt {
    pub reservation_time: NaiveDateTime,
    pub confirmation: serde_json::Value,
}

#[async_trait::async_trait]
pub trait BookingPlatform: Send + Sync {
    fn platform(&self) -> Platform;

    /// Validate credentials and warm up anything `book` needs.
    async fn pre_check(&self, request: &BookingRequest) -> PlatformResult<()>;

    /// One inventory lookup for the request's venue, date and party size.
    async fn search(&self, request: &BookingRequest) -> PlatformResult<Vec<Slot>>;

    /// Fetch a booking token for `slot` and submit the booking.
    async fn book(&self, request: &BookingRequest, slot: &Slot) -> PlatformResult<BookingAttempt>;

    /// Cancel a booking previously confirmed by `book`.
    async fn cancel(&self, confirmation: &serde_json::Value) -> PlatformResult<()>;
}

/// Polling cadence around a drop.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    /// How long after the nominal drop instant to keep searching.
    pub window: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(50),
            window: Duration::from_secs(30),
        }
    }
}

/// Search repeatedly until inventory appears, the window closes or the token
/// is cancelled.
///
/// Transport hiccups and 5xx answers are logged and searched through; any
/// other error ends the poll.
pub async fn fetch_slots(
    platform: &dyn BookingPlatform,
    request: &BookingRequest,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> PlatformResult<Vec<Slot>> {
    let deadline =
        request.drop_time + chrono::Duration::milliseconds(policy.window.as_millis() as i64);
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(PlatformError::Cancelled);
        }

        attempts += 1;
        match platform.search(request).await {
            Ok(slots) if !slots.is_empty() => {
                tracing::info!(
                    platform = %platform.platform(),
                    attempts,
                    slots = slots.len(),
                    "Inventory published"
                );
                return Ok(slots);
            }
            Ok(_) => {}
            Err(e) if e.is_transient() => {
                tracing::warn!(platform = %platform.platform(), attempts, error = %e, "Search failed, polling on");
            }
            Err(e) => return Err(e),
        }

        if Utc::now() >= deadline {
            tracing::info!(platform = %platform.platform(), attempts, "Poll window closed without inventory");
            return Err(PlatformError::NoSlotsFound);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(PlatformError::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}
