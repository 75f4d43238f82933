//! Resy adapter
//!
//! Flow for one booking: `GET /4/find` for inventory, `POST /3/details` for a
//! short-lived book token, `POST /3/book` to commit. Resy answers expired or
//! invalid auth tokens with 419 and malformed input with 502.

mod dto;

use crate::error::check_status;
use crate::{BookingAttempt, BookingPlatform, BookingRequest, PlatformError, PlatformResult, Slot};
use chrono::NaiveDateTime;
use cierge_types::{Platform, PlatformCredentials};
use dto::{
    DetailsRequest, DetailsResponse, FindResponse, StructPaymentMethod, UserResponse,
    default_payment_method,
};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

/// Resy rejects requests without a browser-looking user agent with a 500.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const SOURCE_ID: &str = "resy.com-venue-details";
const SLOT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct ResyConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl ResyConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.resy.com".to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(20),
        }
    }
}

pub struct ResyClient {
    config: ResyConfig,
    http: reqwest::Client,
    /// Payment method sent with `book`; from the credentials or learned in
    /// `pre_check`/details.
    payment_method: RwLock<Option<i64>>,
}

impl ResyClient {
    pub fn new(config: ResyConfig, credentials: PlatformCredentials) -> PlatformResult<Self> {
        if credentials.auth_token.trim().is_empty() {
            return Err(PlatformError::InvalidCredentials(
                "auth token is empty".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(&format!("ResyAPI api_key=\"{}\"", config.api_key))
            .map_err(|_| PlatformError::InvalidCredentials("api key is not a valid header".into()))?;
        let mut auth_token = HeaderValue::from_str(&credentials.auth_token)
            .map_err(|_| PlatformError::InvalidCredentials("auth token is not a valid header".into()))?;
        auth_token.set_sensitive(true);

        headers.insert(reqwest::header::AUTHORIZATION, api_key);
        headers.insert("X-Resy-Auth-Token", auth_token.clone());
        headers.insert("X-Resy-Universal-Auth", auth_token);
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(reqwest::header::ORIGIN, HeaderValue::from_static("https://resy.com"));
        headers.insert(reqwest::header::REFERER, HeaderValue::from_static("https://resy.com/"));

        let http = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .build()
            .map_err(PlatformError::from)?;

        Ok(Self {
            config,
            http,
            payment_method: RwLock::new(credentials.payment_method_id),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn details(&self, request: &BookingRequest, slot: &Slot) -> PlatformResult<DetailsResponse> {
        let body = DetailsRequest {
            commit: 1,
            config_id: &slot.config_token,
            day: request.reservation_date.format("%Y-%m-%d").to_string(),
            party_size: request.party_size,
        };

        let response = self
            .http
            .post(self.url("/3/details"))
            .json(&body)
            .send()
            .await?;
        let details: DetailsResponse = check_status(response).await?.json().await?;
        Ok(details)
    }
}

pub(crate) fn parse_slot_start(raw: &str) -> PlatformResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, SLOT_TIME_FORMAT)
        .map_err(|e| PlatformError::Decode(format!("slot start '{}': {}", raw, e)))
}

#[async_trait::async_trait]
impl BookingPlatform for ResyClient {
    fn platform(&self) -> Platform {
        Platform::Resy
    }

    async fn pre_check(&self, _request: &BookingRequest) -> PlatformResult<()> {
        let response = self.http.get(self.url("/2/user")).send().await?;
        let user: UserResponse = check_status(response).await?.json().await?;

        let mut payment_method = self.payment_method.write();
        if payment_method.is_none() {
            *payment_method = default_payment_method(&user.payment_methods);
        }
        tracing::debug!(has_payment_method = payment_method.is_some(), "Resy credentials accepted");
        Ok(())
    }

    async fn search(&self, request: &BookingRequest) -> PlatformResult<Vec<Slot>> {
        let day = request.reservation_date.format("%Y-%m-%d").to_string();
        let party_size = request.party_size.to_string();
        let response = self
            .http
            .get(self.url("/4/find"))
            .query(&[
                ("lat", "0"),
                ("long", "0"),
                ("day", day.as_str()),
                ("party_size", party_size.as_str()),
                ("venue_id", request.venue_id.as_str()),
            ])
            .send()
            .await?;
        let found: FindResponse = check_status(response).await?.json().await?;

        let mut slots = Vec::new();
        for venue in found.results.venues {
            for slot in venue.slots {
                slots.push(Slot {
                    config_token: slot.config.token,
                    start: parse_slot_start(&slot.date.start)?,
                    kind: slot.config.kind,
                });
            }
        }
        Ok(slots)
    }

    async fn book(&self, request: &BookingRequest, slot: &Slot) -> PlatformResult<BookingAttempt> {
        let details = self.details(request, slot).await?;

        let learned = details
            .user
            .as_ref()
            .and_then(|u| default_payment_method(&u.payment_methods));
        let payment_method = (*self.payment_method.read()).or(learned);

        let mut form: Vec<(&str, String)> = vec![
            ("book_token", details.book_token.value),
            ("source_id", SOURCE_ID.to_string()),
        ];
        if let Some(id) = payment_method {
            form.push((
                "struct_payment_method",
                serde_json::to_string(&StructPaymentMethod { id })?,
            ));
        }

        let response = self.http.post(self.url("/3/book")).form(&form).send().await?;
        let confirmation: serde_json::Value = check_status(response).await?.json().await?;

        tracing::info!(slot = %slot.start, "Resy booking confirmed");
        Ok(BookingAttempt {
            reservation_time: slot.start,
            confirmation,
        })
    }

    async fn cancel(&self, confirmation: &serde_json::Value) -> PlatformResult<()> {
        let resy_token = confirmation
            .get("resy_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PlatformError::BadRequest("confirmation has no resy_token".into()))?;

        let response = self
            .http
            .post(self.url("/3/cancel"))
            .form(&[("resy_token", resy_token)])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
