//! Scripted in-process platform for tests.
//!
//! Inventory appears at a chosen instant and each slot time can be scripted
//! to confirm, vanish or fail when booked.

use crate::{
    BookingAttempt, BookingPlatform, BookingRequest, PlatformError, PlatformFactory,
    PlatformResult, Slot,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use cierge_types::{Platform, PlatformCredentials, parse_wall_time};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookScript {
    Confirm,
    NotFound,
    PaymentRequired,
    Reject(String),
}

#[derive(Default)]
struct Script {
    release: Option<(DateTime<Utc>, Vec<Slot>)>,
    book: HashMap<NaiveTime, BookScript>,
    reject_credentials: bool,
    searches: u32,
    pre_checks: u32,
    booked: Vec<NaiveTime>,
    seen_tokens: Vec<String>,
}

pub struct ScriptedPlatform {
    platform: Platform,
    script: Mutex<Script>,
}

impl ScriptedPlatform {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            script: Mutex::new(Script::default()),
        }
    }

    /// Publish slots at `times` on `date` from `at` onwards.
    pub fn release_at(self, at: DateTime<Utc>, date: NaiveDate, times: &[&str]) -> Self {
        let slots = times
            .iter()
            .map(|t| {
                let time = parse_wall_time(t).unwrap_or(NaiveTime::MIN);
                Slot {
                    config_token: format!("cfg-{}", t),
                    start: date.and_time(time),
                    kind: Some("Dining Room".into()),
                }
            })
            .collect();
        self.script.lock().release = Some((at, slots));
        self
    }

    pub fn on_book(self, time: &str, outcome: BookScript) -> Self {
        let time = parse_wall_time(time).unwrap_or(NaiveTime::MIN);
        self.script.lock().book.insert(time, outcome);
        self
    }

    pub fn reject_credentials(self) -> Self {
        self.script.lock().reject_credentials = true;
        self
    }

    /// Factory handing out this instance and recording the credentials seen.
    pub fn factory(self: &Arc<Self>) -> PlatformFactory {
        let this = self.clone();
        Arc::new(move |credentials: PlatformCredentials| {
            this.script.lock().seen_tokens.push(credentials.auth_token);
            Ok(this.clone() as Arc<dyn BookingPlatform>)
        })
    }

    pub fn search_count(&self) -> u32 {
        self.script.lock().searches
    }

    pub fn pre_check_count(&self) -> u32 {
        self.script.lock().pre_checks
    }

    /// Slot times `book` was called for, in call order.
    pub fn booked_times(&self) -> Vec<NaiveTime> {
        self.script.lock().booked.clone()
    }

    pub fn seen_tokens(&self) -> Vec<String> {
        self.script.lock().seen_tokens.clone()
    }
}

#[async_trait::async_trait]
impl BookingPlatform for ScriptedPlatform {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn pre_check(&self, _request: &BookingRequest) -> PlatformResult<()> {
        let mut script = self.script.lock();
        script.pre_checks += 1;
        if script.reject_credentials {
            return Err(PlatformError::Unauthorized);
        }
        Ok(())
    }

    async fn search(&self, _request: &BookingRequest) -> PlatformResult<Vec<Slot>> {
        let mut script = self.script.lock();
        script.searches += 1;
        match &script.release {
            Some((at, slots)) if Utc::now() >= *at => Ok(slots.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn book(&self, _request: &BookingRequest, slot: &Slot) -> PlatformResult<BookingAttempt> {
        let mut script = self.script.lock();
        script.booked.push(slot.time());
        let outcome = script
            .book
            .get(&slot.time())
            .cloned()
            .unwrap_or(BookScript::Confirm);
        let attempt = script.booked.len();

        match outcome {
            BookScript::Confirm => Ok(BookingAttempt {
                reservation_time: slot.start,
                confirmation: serde_json::json!({
                    "resy_token": format!("scripted-{}", slot.config_token),
                    "reservation_id": attempt,
                }),
            }),
            BookScript::NotFound => Err(PlatformError::NotFound),
            BookScript::PaymentRequired => Err(PlatformError::PaymentRequired),
            BookScript::Reject(body) => Err(PlatformError::BadRequest(body)),
        }
    }

    async fn cancel(&self, _confirmation: &serde_json::Value) -> PlatformResult<()> {
        Ok(())
    }
}
