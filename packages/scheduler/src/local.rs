//! In-process scheduler for Docker Compose and local development.
//!
//! Pending firings sit in a priority queue ordered by fire time. A single
//! tokio task sleeps until the earliest entry is due, removes it and hands
//! the event to a [`FireHandler`]. Cancelled or rescheduled entries leave a
//! stale heap item behind which is skipped when it surfaces.

use super::{ScheduleInfo, SchedulerBackend, SchedulerError, SchedulerResult, traits::validate};
use chrono::{DateTime, Utc};
use cierge_types::{DropEvent, Sealed};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Receives events when their fire time arrives.
#[async_trait::async_trait]
pub trait FireHandler: Send + Sync {
    async fn fire(&self, event: DropEvent);
}

#[derive(Debug, Clone)]
struct Entry {
    fire_at: DateTime<Utc>,
    event: DropEvent,
    seq: u64,
}

#[derive(Default)]
struct Wheel {
    queue: BinaryHeap<Reverse<(DateTime<Utc>, u64, Uuid)>>,
    entries: HashMap<Uuid, Entry>,
    next_seq: u64,
}

impl Wheel {
    fn insert(&mut self, event: DropEvent, fire_at: DateTime<Utc>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse((fire_at, seq, event.job_id)));
        self.entries.insert(event.job_id, Entry { fire_at, event, seq });
    }

    /// Earliest live fire time, dropping stale heap items on the way.
    fn peek(&mut self) -> Option<DateTime<Utc>> {
        while let Some(Reverse((fire_at, seq, job_id))) = self.queue.peek().copied() {
            match self.entries.get(&job_id) {
                Some(entry) if entry.seq == seq => return Some(fire_at),
                _ => {
                    self.queue.pop();
                }
            }
        }
        None
    }

    fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<DropEvent> {
        let mut due = Vec::new();
        while let Some(fire_at) = self.peek() {
            if fire_at > now {
                break;
            }
            if let Some(Reverse((_, _, job_id))) = self.queue.pop()
                && let Some(entry) = self.entries.remove(&job_id)
            {
                due.push(entry.event);
            }
        }
        due
    }
}

pub struct LocalScheduler {
    wheel: Arc<Mutex<Wheel>>,
    wake: Arc<Notify>,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self {
            wheel: Arc::new(Mutex::new(Wheel::default())),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Number of pending firings
    pub fn len(&self) -> usize {
        self.wheel.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the firing loop. It runs until `shutdown` is cancelled.
    pub fn spawn(
        &self,
        handler: Arc<dyn FireHandler>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let wheel = self.wheel.clone();
        let wake = self.wake.clone();

        tokio::spawn(async move {
            tracing::info!("Local scheduler started");
            loop {
                let now = Utc::now();
                let (due, next) = {
                    let mut wheel = wheel.lock();
                    let due = wheel.pop_due(now);
                    (due, wheel.peek())
                };

                for event in due {
                    let handler = handler.clone();
                    tracing::info!(job_id = %event.job_id, drop_time = %event.drop_time, "Firing scheduled job");
                    tokio::spawn(async move { handler.fire(event).await });
                }

                let sleep_for = next
                    .map(|at| (at - Utc::now()).to_std().unwrap_or_default())
                    .unwrap_or(std::time::Duration::from_secs(3600));

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = wake.notified() => {}
                    _ = tokio::time::sleep(sleep_for) => {}
                }
            }
            tracing::info!("Local scheduler stopped");
        })
    }
}

impl Default for LocalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SchedulerBackend for LocalScheduler {
    async fn schedule(&self, event: &DropEvent, fire_at: DateTime<Utc>) -> SchedulerResult<()> {
        validate(event, fire_at)?;

        {
            let mut wheel = self.wheel.lock();
            if let Some(existing) = wheel.entries.get(&event.job_id) {
                if existing.event == *event && existing.fire_at == fire_at {
                    return Ok(());
                }
                return Err(SchedulerError::AlreadyExists(event.job_id.to_string()));
            }
            wheel.insert(event.clone(), fire_at);
        }
        self.wake.notify_one();

        tracing::info!(job_id = %event.job_id, fire_at = %fire_at, "Scheduled local firing");
        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> SchedulerResult<()> {
        let removed = self.wheel.lock().entries.remove(&job_id).is_some();
        if removed {
            self.wake.notify_one();
            tracing::info!(job_id = %job_id, "Cancelled local firing");
        } else {
            tracing::debug!(job_id = %job_id, "Schedule already gone");
        }
        Ok(())
    }

    async fn update_credentials(&self, job_id: Uuid, encrypted_token: Sealed) -> SchedulerResult<()> {
        let mut wheel = self.wheel.lock();
        let entry = wheel
            .entries
            .get_mut(&job_id)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;
        entry.event.encrypted_token = encrypted_token;
        tracing::info!(job_id = %job_id, "Updated credentials of local firing");
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> SchedulerResult<Option<ScheduleInfo>> {
        Ok(self.wheel.lock().entries.get(&job_id).map(|entry| ScheduleInfo {
            job_id,
            fire_at: entry.fire_at,
            event: entry.event.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use cierge_types::Platform;
    use tokio::sync::mpsc;

    struct ChannelHandler(mpsc::UnboundedSender<(Uuid, DateTime<Utc>)>);

    #[async_trait::async_trait]
    impl FireHandler for ChannelHandler {
        async fn fire(&self, event: DropEvent) {
            let _ = self.0.send((event.job_id, Utc::now()));
        }
    }

    fn event(drop_in_ms: i64) -> DropEvent {
        DropEvent {
            job_id: Uuid::new_v4(),
            platform: Platform::Resy,
            platform_venue_id: "1".into(),
            encrypted_token: Sealed::new("dG9r"),
            encrypted_callback_secret: Sealed::new("c2Vj"),
            reservation_date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
            party_size: 2,
            preferred_times: vec!["19:00".into()],
            drop_time: Utc::now() + chrono::Duration::milliseconds(drop_in_ms),
            server_endpoint: "http://localhost".into(),
            callback: true,
        }
    }

    fn start() -> (LocalScheduler, mpsc::UnboundedReceiver<(Uuid, DateTime<Utc>)>, CancellationToken) {
        let scheduler = LocalScheduler::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        scheduler.spawn(Arc::new(ChannelHandler(tx)), shutdown.clone());
        (scheduler, rx, shutdown)
    }

    #[tokio::test]
    async fn fires_in_fire_time_order_and_removes_entries() {
        let (scheduler, mut rx, shutdown) = start();
        let late = event(400);
        let early = event(400);
        let now = Utc::now();

        scheduler
            .schedule(&late, now + chrono::Duration::milliseconds(120))
            .await
            .unwrap();
        scheduler
            .schedule(&early, now + chrono::Duration::milliseconds(40))
            .await
            .unwrap();

        let (first, first_at) = rx.recv().await.unwrap();
        let (second, _) = rx.recv().await.unwrap();
        assert_eq!(first, early.job_id);
        assert_eq!(second, late.job_id);
        assert!(first_at >= now + chrono::Duration::milliseconds(40));
        assert!(scheduler.is_empty());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn cancelled_entry_never_fires() {
        let (scheduler, mut rx, shutdown) = start();
        let cancelled = event(300);
        let kept = event(300);
        let now = Utc::now();

        scheduler
            .schedule(&cancelled, now + chrono::Duration::milliseconds(50))
            .await
            .unwrap();
        scheduler
            .schedule(&kept, now + chrono::Duration::milliseconds(100))
            .await
            .unwrap();
        scheduler.cancel(cancelled.job_id).await.unwrap();
        assert!(scheduler.get(cancelled.job_id).await.unwrap().is_none());

        let (fired, _) = rx.recv().await.unwrap();
        assert_eq!(fired, kept.job_id);
        assert!(rx.try_recv().is_err());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn cancel_of_unknown_job_is_ok() {
        let scheduler = LocalScheduler::new();
        scheduler.cancel(Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn update_credentials_keeps_timing() {
        let scheduler = LocalScheduler::new();
        let ev = event(60_000);
        let fire_at = ev.drop_time - chrono::Duration::seconds(30);
        scheduler.schedule(&ev, fire_at).await.unwrap();

        scheduler
            .update_credentials(ev.job_id, Sealed::new("bmV3"))
            .await
            .unwrap();

        let info = scheduler.get(ev.job_id).await.unwrap().unwrap();
        assert_eq!(info.fire_at, fire_at);
        assert_eq!(info.event.drop_time, ev.drop_time);
        assert_eq!(info.event.encrypted_token, Sealed::new("bmV3"));

        let missing = scheduler
            .update_credentials(Uuid::new_v4(), Sealed::new("bmV3"))
            .await;
        assert!(matches!(missing, Err(SchedulerError::NotFound(_))));
    }

    #[tokio::test]
    async fn rescheduling_is_idempotent_for_identical_events() {
        let scheduler = LocalScheduler::new();
        let ev = event(60_000);
        let fire_at = ev.drop_time - chrono::Duration::seconds(30);
        scheduler.schedule(&ev, fire_at).await.unwrap();
        scheduler.schedule(&ev, fire_at).await.unwrap();
        assert_eq!(scheduler.len(), 1);

        let moved = scheduler
            .schedule(&ev, fire_at - chrono::Duration::seconds(1))
            .await;
        assert!(matches!(moved, Err(SchedulerError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn rejects_fire_time_after_drop() {
        let scheduler = LocalScheduler::new();
        let ev = event(1_000);
        let err = scheduler
            .schedule(&ev, ev.drop_time + chrono::Duration::seconds(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidEvent(_)));
    }
}
