//! Shared types for Tether connector flows
//!
//! Everything that crosses a crate boundary lives here: the error taxonomy,
//! the wire-safe error report, token pairs, provider identity, and the
//! provider-agnostic resource/selection shapes.

mod errors;
mod provider;
mod resources;
mod tokens;

pub use errors::{ConnectError, ConnectResult, ErrorReport};
pub use provider::ProviderKind;
pub use resources::{ErrorHandler, ResourceReference, SelectionPayload, SuccessHandler};
pub use tokens::TokenPair;
