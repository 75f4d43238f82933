/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Longest platform response body kept inside an error.
const MAX_BODY_LEN: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Platform rejected the request: {0}")]
    BadRequest(String),

    #[error("Payment method required")]
    PaymentRequired,

    /// Usually means the slot was taken between details and book.
    #[error("Not found")]
    NotFound,

    #[error("Platform rejected the credentials")]
    Unauthorized,

    #[error("Bad gateway")]
    BadGateway,

    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Could not decode platform response: {0}")]
    Decode(String),

    #[error("No slots found")]
    NoSlotsFound,

    #[error("Cancelled")]
    Cancelled,

    #[error("Platform not supported: {0}")]
    Unsupported(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

impl PlatformError {
    /// Map a non-success HTTP status to the matching error.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            400 => PlatformError::BadRequest(truncate(body)),
            402 => PlatformError::PaymentRequired,
            404 => PlatformError::NotFound,
            419 => PlatformError::Unauthorized,
            502 => PlatformError::BadGateway,
            other => PlatformError::UnexpectedStatus {
                status: other,
                body: truncate(body),
            },
        }
    }

    /// Errors worth another search while polling for a drop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::Transport(_)
                | PlatformError::BadGateway
                | PlatformError::UnexpectedStatus { status: 500..=599, .. }
        )
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PlatformError::Decode(e.without_url().to_string())
        } else {
            PlatformError::Transport(e.without_url().to_string())
        }
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(e: serde_json::Error) -> Self {
        PlatformError::Decode(e.to_string())
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_BODY_LEN {
        return body.to_string();
    }
    let mut end = MAX_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Pass 200/201 responses through and turn everything else into an error.
pub(crate) async fn check_status(response: reqwest::Response) -> PlatformResult<reqwest::Response> {
    let status = response.status().as_u16();
    if status == 200 || status == 201 {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let error = PlatformError::from_status(status, &body);
    if (400..500).contains(&status) {
        tracing::warn!(status, body = %truncate(&body), "Platform returned client error");
    }
    Err(error)
}
