//! Access/refresh token pair returned by provider token endpoints

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized token pair produced by a code exchange or refresh.
///
/// Held only transiently to drive the selection surface; nothing in this
/// workspace caches or persists it. Callers that need the refresh token to
/// survive past the flow must store it themselves.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Lifetime in seconds, when the provider reports one
    #[serde(default)]
    pub expires_in: Option<i64>,

    #[serde(default)]
    pub token_type: String,
}

impl TokenPair {
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in: None,
            token_type: "bearer".to_string(),
        }
    }
}

// Token material never goes to logs
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}
