//! Response shapes returned by the resy API. Only the fields the adapter
//! reads are modelled.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct UserResponse {
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMethod {
    pub id: i64,
    #[serde(default)]
    pub is_default: bool,
}

pub fn default_payment_method(methods: &[PaymentMethod]) -> Option<i64> {
    methods.iter().find(|m| m.is_default).map(|m| m.id)
}

#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub results: FindResults,
}

#[derive(Debug, Deserialize)]
pub struct FindResults {
    #[serde(default)]
    pub venues: Vec<FindVenue>,
}

#[derive(Debug, Deserialize)]
pub struct FindVenue {
    #[serde(default)]
    pub slots: Vec<FindSlot>,
}

#[derive(Debug, Deserialize)]
pub struct FindSlot {
    pub config: SlotConfig,
    pub date: SlotDate,
}

#[derive(Debug, Deserialize)]
pub struct SlotConfig {
    pub token: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SlotDate {
    /// `YYYY-MM-DD HH:MM:SS` in venue local time
    pub start: String,
}

#[derive(Debug, Serialize)]
pub struct DetailsRequest<'a> {
    pub commit: u8,
    pub config_id: &'a str,
    pub day: String,
    pub party_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct DetailsResponse {
    pub book_token: BookToken,
    #[serde(default)]
    pub user: Option<DetailsUser>,
}

#[derive(Debug, Deserialize)]
pub struct BookToken {
    pub value: String,
    #[serde(default)]
    pub date_expires: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DetailsUser {
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
}

#[derive(Debug, Serialize)]
pub struct StructPaymentMethod {
    pub id: i64,
}
