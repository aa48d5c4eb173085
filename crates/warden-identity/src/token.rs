use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque authentication token issued by the identity service.
///
/// The framework never inspects token contents; the only property that
/// matters is its shape. UUID-shaped tokens are stable across re-auth within
/// the same second, while opaque (Fernet-style) tokens embed a second-precise
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the token parses as a UUID (hyphenated or 32-hex simple form).
    pub fn is_uuid_shaped(&self) -> bool {
        Uuid::try_parse(&self.0).is_ok()
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
