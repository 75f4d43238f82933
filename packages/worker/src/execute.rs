//! Core worker pipeline
//!
//! Straight-line: decrypt, pre-check, wait for the drop, poll, book the most
//! preferred slot still available, report. Every failure ends up inside the
//! returned [`Outcome`]; nothing is propagated to the caller.

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::selection::{parse_preferred_times, select_preferred};
use crate::timing::wait_until;
use chrono::{DateTime, Utc};
use cierge_envelope::Envelope;
use cierge_platform::{
    BookingAttempt, BookingPlatform, BookingRequest, PlatformError, PlatformRegistry, fetch_slots,
};
use cierge_types::{DropEvent, Outcome, PlatformCredentials};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Timing facts gathered while running, folded into the outcome.
#[derive(Debug, Default)]
struct Timeline {
    booking_start: Option<DateTime<Utc>>,
    drift_ns: i64,
}

#[derive(Clone)]
pub struct Worker {
    envelope: Envelope,
    registry: PlatformRegistry,
    config: WorkerConfig,
    http: reqwest::Client,
}

impl Worker {
    pub fn new(envelope: Envelope, registry: PlatformRegistry, config: WorkerConfig) -> Self {
        Self {
            envelope,
            registry,
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Run one drop end to end: book, call back if asked, print the outcome.
    pub async fn run(&self, event: DropEvent, cancel: &CancellationToken) -> Outcome {
        let outcome = self.execute(&event, cancel).await;

        if event.callback {
            if let Err(e) = self.report(&event, &outcome).await {
                tracing::warn!(job_id = %event.job_id, error = %e, "Outcome callback failed");
            }
        }

        emit_outcome(&outcome);
        outcome
    }

    /// Book without reporting.
    pub async fn execute(&self, event: &DropEvent, cancel: &CancellationToken) -> Outcome {
        let start_time = Utc::now();
        let started = Instant::now();
        let mut timeline = Timeline::default();

        let result = self.book(event, cancel, &mut timeline).await;

        let mut outcome = match result {
            Ok(attempt) => Outcome::succeeded(
                event.job_id,
                start_time,
                attempt.reservation_time.and_utc(),
                attempt.confirmation,
            ),
            Err(e) => Outcome::failed(event.job_id, start_time, e.to_string()),
        };
        outcome.duration = started.elapsed().as_nanos().min(i64::MAX as u128) as i64;
        outcome.booking_start = timeline.booking_start;
        outcome.drift_ns = timeline.drift_ns;

        if outcome.success {
            tracing::info!(
                job_id = %event.job_id,
                drift_ns = outcome.drift_ns,
                duration_ns = outcome.duration,
                "Booking succeeded"
            );
        } else {
            tracing::warn!(
                job_id = %event.job_id,
                drift_ns = outcome.drift_ns,
                error = %outcome.error_message,
                "Booking failed"
            );
        }
        outcome
    }

    async fn book(
        &self,
        event: &DropEvent,
        cancel: &CancellationToken,
        timeline: &mut Timeline,
    ) -> Result<BookingAttempt, WorkerError> {
        let preferred = parse_preferred_times(&event.preferred_times)?;
        let request = BookingRequest::from_event(event);

        let credentials: PlatformCredentials = self.envelope.open_json(&event.encrypted_token).await?;
        let platform: Arc<dyn BookingPlatform> = self.registry.build(event.platform, credentials)?;
        platform.pre_check(&request).await?;
        tracing::info!(job_id = %event.job_id, platform = %event.platform, drop_time = %event.drop_time, "Pre-check passed, waiting for drop");

        wait_until(event.drop_time, cancel)
            .await
            .map_err(|_| WorkerError::Cancelled)?;

        let booking_start = Utc::now();
        timeline.booking_start = Some(booking_start);
        timeline.drift_ns = (booking_start - event.drop_time)
            .num_nanoseconds()
            .unwrap_or(i64::MAX);

        let slots = fetch_slots(platform.as_ref(), &request, self.config.poll_policy(), cancel)
            .await
            .map_err(|e| match e {
                PlatformError::Cancelled => WorkerError::Cancelled,
                other => WorkerError::Platform(other),
            })?;

        let candidates = select_preferred(&slots, &preferred);
        if candidates.is_empty() {
            tracing::info!(job_id = %event.job_id, published = slots.len(), "No published slot matches the preferred times");
            return Err(WorkerError::NoMatchingSlots);
        }

        for slot in &candidates {
            match platform.book(&request, slot).await {
                Ok(attempt) => return Ok(attempt),
                Err(PlatformError::NotFound) => {
                    tracing::info!(job_id = %event.job_id, slot = %slot.start, "Slot taken, trying next preference");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(WorkerError::FailedToBookAny)
    }

    /// POST the outcome to the server, authenticated with the job's callback
    /// secret.
    pub async fn report(&self, event: &DropEvent, outcome: &Outcome) -> Result<(), WorkerError> {
        let secret = self.envelope.decrypt(&event.encrypted_callback_secret).await?;
        let secret = String::from_utf8(secret)
            .map_err(|_| WorkerError::Callback("callback secret is not utf-8".to_string()))?;

        let response = self
            .http
            .post(event.callback_url())
            .header("Authorization", format!("Bearer {}", secret))
            .header("Content-Type", "application/json")
            .timeout(self.config.callback_timeout())
            .json(outcome)
            .send()
            .await
            .map_err(|e| WorkerError::Callback(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::Callback(format!("status {}: {}", status, body)));
        }

        tracing::info!(job_id = %event.job_id, "Outcome reported");
        Ok(())
    }
}

/// Print the outcome as one JSON line on stdout.
pub fn emit_outcome(outcome: &Outcome) {
    match serde_json::to_string(outcome) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::error!(job_id = %outcome.job_id, error = %e, "Could not serialize outcome"),
    }
}
