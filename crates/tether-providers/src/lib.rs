//! Provider orchestrators for Tether connector flows
//!
//! One generic orchestrator drives every provider; the differences between
//! Google Drive, Dropbox, and Notion are data, not behavior: an
//! authorization endpoint, default scopes, extra auth parameters, and which
//! selection surface the provider gets. Each provider contributes a
//! capability record and the orchestrator composes the flow manager, token
//! exchanger, and selection surface around it.

mod dropbox;
mod google_drive;
mod notion;
mod orchestrator;
mod platform;
mod spec;

pub use orchestrator::{ConnectorFlow, Orchestrator};
pub use platform::{
    redirect_to_tether_connect, redirect_to_tether_edit, PlatformClient, UserAction,
};
pub use spec::ProviderSpec;
