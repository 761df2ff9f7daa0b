//! Google Drive flow shape
//!
//! Drive selection runs through Google's own picker widget; the surface
//! embeds it with the caller's API key. `access_type=offline` plus
//! `prompt=consent` makes Google return a refresh token on every consent.

use tether_types::ProviderKind;

use crate::spec::ProviderSpec;

pub(crate) static SPEC: ProviderSpec = ProviderSpec {
    kind: ProviderKind::GoogleDrive,
    auth_endpoint: "https://accounts.google.com/o/oauth2/v2/auth",
    default_scopes: &["https://www.googleapis.com/auth/drive.file"],
    extra_auth_params: &[("access_type", "offline"), ("prompt", "consent")],
    native_listing: false,
};
