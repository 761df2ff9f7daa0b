//! Dropbox flow shape
//!
//! Dropbox selection runs through the Dropbox chooser widget, keyed by the
//! caller's app key. `token_access_type=offline` requests a refresh token.

use tether_types::ProviderKind;

use crate::spec::ProviderSpec;

pub(crate) static SPEC: ProviderSpec = ProviderSpec {
    kind: ProviderKind::Dropbox,
    auth_endpoint: "https://www.dropbox.com/oauth2/authorize",
    default_scopes: &["files.metadata.readonly", "files.content.read"],
    extra_auth_params: &[("token_access_type", "offline")],
    native_listing: false,
};
