//! Flow types shared across the surface lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

use tether_types::{
    ConnectResult, ErrorReport, ProviderKind, ResourceReference, SelectionPayload, TokenPair,
};

use crate::channel::FlowHandlers;

/// Live flows, shared between the manager, its supervisors, and the
/// callback server
pub(crate) type FlowMap = Arc<parking_lot::RwLock<HashMap<FlowId, FlowState>>>;

/// Unique identifier for one flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(Uuid);

impl FlowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Trades an authorization code for a token pair
pub type CodeExchangeFn =
    Arc<dyn Fn(String) -> BoxFuture<ConnectResult<TokenPair>> + Send + Sync>;

/// Lists selectable resources for a given access token
pub type ListFn =
    Arc<dyn Fn(String) -> BoxFuture<ConnectResult<Vec<ResourceReference>>> + Send + Sync>;

/// Provider picker widget embedded in the surface page
#[derive(Debug, Clone)]
pub enum EmbedPage {
    GoogleDrive { api_key: String },
    Dropbox { app_key: String },
}

/// How the selection surface is populated once a token is available
#[derive(Clone)]
pub enum SurfaceMode {
    /// Built-in list UI fed by a native listing call (Notion)
    NativeSearch(ListFn),

    /// The provider's own picker widget, same selection-state contract
    EmbeddedPicker(EmbedPage),

    /// The surface lives on a hosted platform page; only sentinel messages
    /// come back through the channel
    Hosted,
}

/// Which token string is echoed back in the success payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEcho {
    Refresh,
    Access,
}

/// Everything the flow manager needs to run one surface.
///
/// Built by a provider orchestrator; the manager itself is provider-agnostic.
#[derive(Clone)]
pub struct FlowRequest {
    pub provider: ProviderKind,

    /// Full authorization (or hosted-page) URL to open; `None` for
    /// selection-only flows, which open the picker page directly
    pub auth_url: Option<String>,

    pub redirect_uri: String,
    pub csrf_state: String,

    /// Code-for-token exchange; required for auth flows
    pub exchange: Option<CodeExchangeFn>,

    pub mode: SurfaceMode,
    pub echo: TokenEcho,

    /// Previous selection, hydrated into the surface so editing an existing
    /// connection does not lose prior choices
    pub pre_selection: HashMap<String, ResourceReference>,

    pub handlers: FlowHandlers,
}

/// Lifecycle of one flow.
///
/// `Idle → Opening → Open → {callback | user closed | timed out} → Closed`,
/// collapsed to the states an observer can actually see: the opening steps
/// happen synchronously inside `start_*`, and every closed flow keeps the
/// reason it closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum FlowStatus {
    /// Surface is open, waiting for the provider callback
    Pending,

    /// Callback received, exchanging the authorization code
    ExchangingToken,

    /// Token in hand, selection surface is live
    Selecting,

    /// Selection delivered to the initiator
    Success,

    /// Surface closed by the user before completion; no error is raised
    Cancelled,

    /// Deadline elapsed with no completion
    Timeout,

    /// Terminal failure, already delivered through the error channel
    Error { report: ErrorReport },
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Cancelled | Self::Timeout | Self::Error { .. }
        )
    }
}

/// Tracked state of one flow
#[derive(Debug, Clone)]
pub struct FlowState {
    pub flow_id: FlowId,
    pub provider: ProviderKind,
    pub csrf_state: String,

    /// URL the surface was opened at
    pub surface_url: String,

    pub started_at: DateTime<Utc>,
    pub status: FlowStatus,

    /// Present once the flow succeeded
    pub payload: Option<SelectionPayload>,
}

/// Returned by `start_*`: the live flow and where its surface points
#[derive(Debug, Clone)]
pub struct FlowStart {
    pub flow_id: FlowId,
    pub surface_url: String,
    pub state: String,
    pub redirect_uri: String,
}

/// Snapshot returned by `poll_status`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum FlowResult {
    Pending {
        /// Seconds until the flow times out
        time_remaining: Option<i64>,
    },
    ExchangingToken,
    Selecting,
    Success {
        payload: SelectionPayload,
    },
    Error {
        report: ErrorReport,
    },
    Timeout,
    Cancelled,
}
