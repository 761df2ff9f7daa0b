//! Provider capability record
//!
//! The variation points between providers are data: where authorization
//! happens, which scopes are requested by default, which extra query
//! parameters the provider wants, and whether selection uses a native
//! listing or the provider's embedded picker.

use tether_types::ProviderKind;

/// Static description of one provider's flow shape
#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    pub auth_endpoint: &'static str,
    pub default_scopes: &'static [&'static str],
    pub extra_auth_params: &'static [(&'static str, &'static str)],

    /// Whether the surface lists resources itself (Notion) or embeds the
    /// provider's picker widget (Drive, Dropbox)
    pub native_listing: bool,
}

impl ProviderSpec {
    pub fn for_kind(kind: ProviderKind) -> &'static ProviderSpec {
        match kind {
            ProviderKind::GoogleDrive => &crate::google_drive::SPEC,
            ProviderKind::Dropbox => &crate::dropbox::SPEC,
            ProviderKind::Notion => &crate::notion::SPEC,
        }
    }

    /// Build the full authorization URL for one flow
    pub fn authorize_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
        state: &str,
    ) -> String {
        let mut url = format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&state={}",
            self.auth_endpoint,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state),
        );

        let scopes = if scopes.is_empty() {
            self.default_scopes
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        } else {
            scopes.to_vec()
        };
        if !scopes.is_empty() {
            let joined = scopes.join(" ");
            url.push_str(&format!("&scope={}", urlencoding::encode(&joined)));
        }

        for (key, value) in self.extra_auth_params {
            url.push_str(&format!(
                "&{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            ));
        }

        url
    }
}
