use cierge_envelope::EnvelopeError;
use cierge_platform::PlatformError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Invalid drop event: {0}")]
    InvalidEvent(String),

    #[error("Could not decrypt credentials: {0}")]
    Decrypt(#[from] EnvelopeError),

    #[error("{0}")]
    Platform(#[from] PlatformError),

    #[error("no slots matching the preferred times")]
    NoMatchingSlots,

    #[error("failed to book any of the preferred slots")]
    FailedToBookAny,

    #[error("Cancelled")]
    Cancelled,

    #[error("Callback error: {0}")]
    Callback(String),
}
