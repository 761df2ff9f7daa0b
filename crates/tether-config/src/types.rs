use serde_json::json;
use url::Url;

use tether_types::{
    ConnectError, ConnectResult, ErrorHandler, ProviderKind, SuccessHandler,
};

/// Provider credentials supplied by the caller for white-label flows.
///
/// Field names follow each provider's own vocabulary: Google and Notion issue
/// a client id/secret, Dropbox an app key/secret. Google additionally needs a
/// browser API key for its embedded picker widget.
#[derive(Clone)]
pub enum ProviderCredentials {
    Google {
        client_id: String,
        client_secret: String,
        api_key: String,
    },
    Dropbox {
        app_key: String,
        app_secret: String,
    },
    Notion {
        client_id: String,
        client_secret: String,
    },
}

impl ProviderCredentials {
    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::Google { .. } => ProviderKind::GoogleDrive,
            Self::Dropbox { .. } => ProviderKind::Dropbox,
            Self::Notion { .. } => ProviderKind::Notion,
        }
    }

    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::Google {
                client_id,
                client_secret,
                api_key,
            } => vec![
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("api_key", api_key.as_str()),
            ],
            Self::Dropbox {
                app_key,
                app_secret,
            } => vec![
                ("app_key", app_key.as_str()),
                ("app_secret", app_secret.as_str()),
            ],
            Self::Notion {
                client_id,
                client_secret,
            } => vec![
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ],
        }
    }
}

/// Configuration for one connector flow.
///
/// Immutable for the duration of the flow; the orchestration core borrows it
/// and never persists it past the active flow. The two callbacks are the only
/// channel through which the flow reports back.
#[derive(Clone)]
pub struct OAuthConfig {
    pub provider: ProviderKind,
    pub credentials: ProviderCredentials,
    pub redirect_uri: String,

    /// Requested scopes; empty means the provider's defaults
    pub scopes: Vec<String>,

    pub on_success: SuccessHandler,
    pub on_error: ErrorHandler,
}

impl OAuthConfig {
    pub fn new(
        credentials: ProviderCredentials,
        redirect_uri: impl Into<String>,
        on_success: SuccessHandler,
        on_error: ErrorHandler,
    ) -> Self {
        Self {
            provider: credentials.provider(),
            credentials,
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            on_success,
            on_error,
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Check required fields before any I/O happens.
    ///
    /// Fails fast with a configuration error naming the offending field, so
    /// no surface is ever opened for a config that cannot complete.
    pub fn validate(&self) -> ConnectResult<()> {
        for (field, value) in self.credentials.required_fields() {
            if value.trim().is_empty() {
                return Err(ConnectError::configuration_with(
                    format!("Missing required field: {}", field),
                    json!({ "field": field }),
                ));
            }
        }

        if self.redirect_uri.trim().is_empty() {
            return Err(ConnectError::configuration_with(
                "Missing required field: redirect_uri",
                json!({ "field": "redirect_uri" }),
            ));
        }
        self.callback_port()?;

        Ok(())
    }

    /// Loopback port the callback server must bind, taken from the redirect URI
    pub fn callback_port(&self) -> ConnectResult<u16> {
        let url = Url::parse(&self.redirect_uri).map_err(|e| {
            ConnectError::configuration_with(
                format!("Invalid redirect URI: {}", e),
                json!({ "field": "redirect_uri" }),
            )
        })?;

        url.port()
            .or_else(|| match url.scheme() {
                "http" => Some(80),
                "https" => Some(443),
                _ => None,
            })
            .ok_or_else(|| {
                ConnectError::configuration_with(
                    "Could not determine port from redirect URI",
                    json!({ "field": "redirect_uri" }),
                )
            })
    }
}

/// Configuration for platform-managed flows.
///
/// Managed flows use the platform's own registered provider credentials; the
/// caller only holds a bearer token for the platform API and its organization
/// id.
#[derive(Clone)]
pub struct PlatformConfig {
    /// Bearer token for the platform REST API
    pub authorization: String,
    pub organization_id: String,
    pub base_url: String,
}

impl PlatformConfig {
    pub fn new(authorization: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            authorization: authorization.into(),
            organization_id: organization_id.into(),
            base_url: crate::defaults::platform_base_url(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn validate(&self) -> ConnectResult<()> {
        for (field, value) in [
            ("authorization", self.authorization.as_str()),
            ("organization_id", self.organization_id.as_str()),
            ("base_url", self.base_url.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(ConnectError::configuration_with(
                    format!("Missing required field: {}", field),
                    json!({ "field": field }),
                ));
            }
        }
        Ok(())
    }
}

// The bearer token never goes to logs
impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("authorization", &"[REDACTED]")
            .field("organization_id", &self.organization_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}
