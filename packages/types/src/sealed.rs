use serde::{Deserialize, Serialize};
use std::fmt;

/// Base64 ciphertext produced by the envelope.
///
/// The wrapper exists so ciphertext never ends up in a log line by accident:
/// `Debug` only reveals the length and there is no `Display`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sealed(String);

impl Sealed {
    pub fn new(ciphertext: impl Into<String>) -> Self {
        Self(ciphertext.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Sealed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sealed(<{} bytes redacted>)", self.0.len())
    }
}

impl From<String> for Sealed {
    fn from(value: String) -> Self {
        Self(value)
    }
}
