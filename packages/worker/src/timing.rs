//! Tiered wait for the drop instant.
//!
//! Coarse sleeps while far away, short sleeps when close, and a busy spin
//! over the last stretch so the worker wakes within scheduler granularity of
//! the target instead of within timer granularity.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const COARSE_THRESHOLD: Duration = Duration::from_secs(1);
const COARSE_STEP: Duration = Duration::from_millis(500);
const FINE_THRESHOLD: Duration = Duration::from_millis(100);
const FINE_STEP: Duration = Duration::from_millis(100);
/// Timers may fire late; fine sleeps end at least this long before the target.
const TIMER_SLACK: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Wait until `target`. Returns immediately when `target` is not in the future.
pub async fn wait_until(target: DateTime<Utc>, cancel: &CancellationToken) -> Result<(), Cancelled> {
    loop {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        let remaining = match (target - Utc::now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => remaining,
            _ => return Ok(()),
        };

        if remaining > COARSE_THRESHOLD {
            sleep_or_cancel(COARSE_STEP, cancel).await?;
        } else if remaining > FINE_THRESHOLD {
            let step = FINE_STEP.min(remaining.saturating_sub(TIMER_SLACK));
            sleep_or_cancel(step, cancel).await?;
        } else {
            return spin_until(target, cancel);
        }
    }
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

fn spin_until(target: DateTime<Utc>, cancel: &CancellationToken) -> Result<(), Cancelled> {
    while Utc::now() < target {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        std::hint::spin_loop();
    }
    Ok(())
}
