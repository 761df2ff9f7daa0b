//! Flow configuration for Tether connector flows
//!
//! Owns the caller-supplied [`OAuthConfig`] (credentials, redirect URI,
//! scopes, success/error callbacks), the platform-managed flow configuration,
//! and validation that runs before any window or socket is touched.

mod defaults;
mod types;

pub use defaults::{default_redirect_uri, platform_base_url, DEFAULT_CALLBACK_PORT};
pub use types::{OAuthConfig, PlatformConfig, ProviderCredentials};
