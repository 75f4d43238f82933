use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Booking platforms the pipeline knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Resy,
    #[serde(rename = "opentable")]
    OpenTable,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Resy, Platform::OpenTable];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Resy => "resy",
            Platform::OpenTable => "opentable",
        }
    }

    /// How far ahead of the reservation date the platform publishes inventory.
    pub fn max_lead_days(&self) -> i64 {
        90
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "resy" => Ok(Platform::Resy),
            "opentable" | "open_table" => Ok(Platform::OpenTable),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

/// Plaintext platform credential bundle.
///
/// Only ever materialised inside the credential service right before
/// encryption and inside a worker right after decryption.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCredentials {
    pub auth_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl PlatformCredentials {
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            refresh_token: None,
            payment_method_id: None,
            expires_at: None,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl fmt::Debug for PlatformCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformCredentials")
            .field("auth_token", &"<redacted>")
            .field("has_refresh", &self.refresh_token.is_some())
            .field("payment_method_id", &self.payment_method_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
