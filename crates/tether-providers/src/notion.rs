//! Notion flow shape
//!
//! Notion has no scope list; access is granted per page/database by the user
//! during consent, and the selection surface lists pages and databases
//! through the search API. Integration tokens do not rotate, so the access
//! token itself is echoed back to the caller.

use tether_types::ProviderKind;

use crate::spec::ProviderSpec;

pub(crate) static SPEC: ProviderSpec = ProviderSpec {
    kind: ProviderKind::Notion,
    auth_endpoint: "https://api.notion.com/v1/oauth/authorize",
    default_scopes: &[],
    extra_auth_params: &[("owner", "user")],
    native_listing: true,
};
