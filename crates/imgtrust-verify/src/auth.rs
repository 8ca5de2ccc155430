//! Bearer token authentication for registries.
//!
//! Token acquisition (OAuth flows, credential helpers) happens elsewhere;
//! this only carries a token that was already obtained.

use crate::error::TransportResult;

/// Token provider for registry authentication.
#[derive(Clone, Default)]
pub enum TokenProvider {
    /// Static token (from `VerifierConfig::registry_token`).
    Static(String),

    /// No authentication.
    #[default]
    None,
}

impl TokenProvider {
    /// Create a static token provider.
    pub fn static_token(token: impl Into<String>) -> Self {
        Self::Static(token.into())
    }

    /// `Static` when `token` is set and non-empty, otherwise `None`.
    pub fn from_option(token: Option<&str>) -> Self {
        match token {
            Some(token) if !token.is_empty() => Self::Static(token.to_string()),
            _ => Self::None,
        }
    }

    /// Get the current token.
    pub async fn get_token(&self) -> TransportResult<Option<String>> {
        match self {
            Self::Static(token) => Ok(Some(token.clone())),
            Self::None => Ok(None),
        }
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Static(<redacted>)"),
            Self::None => f.write_str("None"),
        }
    }
}
