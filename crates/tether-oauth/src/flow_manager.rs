//! Flow manager - supervises the lifecycle of every authorization surface
//!
//! One manager per embedding application. Each flow gets a loopback callback
//! server, a registration in the one-slot handler registry, and a supervisor
//! task that polls flow state on a fixed interval, enforces the deadline,
//! and tears everything down exactly once.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use tether_picker::SelectionState;
use tether_types::{ConnectError, ConnectResult, ErrorReport, SelectionPayload, TokenPair};

use crate::callback_server::{self, SurfaceSession};
use crate::channel::HandlerSlot;
use crate::types::{
    FlowId, FlowMap, FlowRequest, FlowResult, FlowStart, FlowState, FlowStatus, SurfaceMode,
};

/// Default flow timeout in seconds (5 minutes)
const FLOW_TIMEOUT_SECS: i64 = 300;

/// Interval between surface-state checks. Closing a surface is detected by
/// polling, so this bounds cancellation latency.
const POLL_INTERVAL_MS: u64 = 500;

/// Opens the authorization surface; injectable so tests never spawn a real
/// browser
pub type BrowserLauncher = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Flow manager
///
/// Guarantees at most one live flow per manager (the handler slot is a
/// singleton), that no flow outlives its deadline, and that teardown runs
/// exactly once no matter how a flow ends.
pub struct FlowManager {
    flows: FlowMap,
    slot: Arc<HandlerSlot>,
    launcher: BrowserLauncher,
    poll_interval: Duration,
    timeout_secs: i64,
}

impl FlowManager {
    pub fn new() -> Self {
        Self::with_launcher(Arc::new(|url: &str| open::that(url)))
    }

    /// Use a custom browser launcher (tests, embedders with their own shell)
    pub fn with_launcher(launcher: BrowserLauncher) -> Self {
        Self {
            flows: Arc::new(RwLock::new(HashMap::new())),
            slot: Arc::new(HandlerSlot::new()),
            launcher,
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            timeout_secs: FLOW_TIMEOUT_SECS,
        }
    }

    /// Shrink the poll interval and deadline (tests)
    pub fn with_timings(mut self, poll_interval: Duration, timeout_secs: i64) -> Self {
        self.poll_interval = poll_interval;
        self.timeout_secs = timeout_secs;
        self
    }

    /// Start a fresh OAuth flow: open the provider's consent page, receive
    /// the redirect, exchange the code, and host the selection surface.
    pub async fn start_auth_flow(&self, request: FlowRequest) -> ConnectResult<FlowStart> {
        let auth_url = request.auth_url.clone().ok_or_else(|| {
            ConnectError::configuration("An authorization URL is required for an OAuth flow")
        })?;
        if request.exchange.is_none() {
            return Err(ConnectError::configuration(
                "A code exchanger is required for an OAuth flow",
            ));
        }
        self.launch_flow(request, auth_url, None).await
    }

    /// Start a selection-only flow with an already-obtained token: the
    /// surface opens directly on the picker page, no authorization step.
    pub async fn start_selection_flow(
        &self,
        request: FlowRequest,
        tokens: TokenPair,
    ) -> ConnectResult<FlowStart> {
        self.launch_flow(request, String::new(), Some(tokens)).await
    }

    /// Start a hosted flow: the surface is a platform page; completion comes
    /// back only through sentinel messages.
    pub async fn start_hosted_flow(&self, request: FlowRequest) -> ConnectResult<FlowStart> {
        if !matches!(request.mode, SurfaceMode::Hosted) {
            return Err(ConnectError::configuration(
                "Hosted flows require the hosted surface mode",
            ));
        }
        let hosted_url = request.auth_url.clone().ok_or_else(|| {
            ConnectError::configuration("A hosted page URL is required for a hosted flow")
        })?;
        self.launch_flow(request, hosted_url, None).await
    }

    /// Common open path: register the slot, bind the server, open the
    /// browser, start the supervisor.
    async fn launch_flow(
        &self,
        request: FlowRequest,
        surface_url: String,
        tokens: Option<TokenPair>,
    ) -> ConnectResult<FlowStart> {
        let flow_id = FlowId::new();
        info!(%flow_id, provider = %request.provider, "Starting connector flow");

        // The slot rejects a second concurrent flow rather than clobbering
        // the first one's callbacks
        self.slot.register(flow_id, request.handlers.clone())?;

        let port = parse_port(&request.redirect_uri).inspect_err(|_| {
            self.slot.vacate(flow_id);
        })?;

        let listener = match callback_server::bind(port).await {
            Ok(listener) => listener,
            Err(e) => {
                self.slot.vacate(flow_id);
                return Err(e);
            }
        };
        let bound_port = listener
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or(port);

        // Selection-only flows open straight onto the picker page
        let surface_url = if surface_url.is_empty() {
            format!("http://127.0.0.1:{}/picker", bound_port)
        } else {
            surface_url
        };

        self.flows.write().insert(
            flow_id,
            FlowState {
                flow_id,
                provider: request.provider,
                csrf_state: request.csrf_state.clone(),
                surface_url: surface_url.clone(),
                started_at: Utc::now(),
                status: FlowStatus::Pending,
                payload: None,
            },
        );

        let session = Arc::new(SurfaceSession {
            flow_id,
            csrf_state: request.csrf_state.clone(),
            exchange: request.exchange.clone(),
            mode: request.mode.clone(),
            echo: request.echo,
            tokens: parking_lot::Mutex::new(tokens),
            listed: parking_lot::Mutex::new(Vec::new()),
            selection: parking_lot::Mutex::new(SelectionState::from_preselection(
                request.pre_selection.clone(),
            )),
            slot: Arc::clone(&self.slot),
            flows: Arc::clone(&self.flows),
        });

        let shutdown_tx = callback_server::spawn(listener, session);

        // A blocked browser launch is terminal: there is no surface and
        // there will never be a callback
        if let Err(e) = (self.launcher)(&surface_url) {
            let err = ConnectError::configuration(format!(
                "The authorization window could not be opened: {}",
                e
            ));
            let report = ErrorReport::from(&err);
            if let Some(flow) = self.flows.write().get_mut(&flow_id) {
                flow.status = FlowStatus::Error {
                    report: report.clone(),
                };
            }
            self.slot.vacate(flow_id);
            let _ = shutdown_tx.send(());
            return Err(err);
        }

        self.spawn_supervisor(flow_id, shutdown_tx);

        Ok(FlowStart {
            flow_id,
            surface_url,
            state: request.csrf_state,
            redirect_uri: request.redirect_uri,
        })
    }

    /// Supervisor task: polls the flow on a fixed interval, enforces the
    /// deadline, and runs teardown exactly once
    fn spawn_supervisor(&self, flow_id: FlowId, shutdown_tx: oneshot::Sender<()>) {
        let flows = Arc::clone(&self.flows);
        let slot = Arc::clone(&self.slot);
        let poll_interval = self.poll_interval;
        let timeout_secs = self.timeout_secs;

        tokio::spawn(async move {
            let mut shutdown_tx = Some(shutdown_tx);
            loop {
                tokio::time::sleep(poll_interval).await;

                let snapshot = flows
                    .read()
                    .get(&flow_id)
                    .map(|flow| (flow.status.clone(), flow.started_at));
                let (status, started_at) = match snapshot {
                    Some(snapshot) => snapshot,
                    None => break,
                };

                if status.is_terminal() {
                    debug!(%flow_id, "Flow reached terminal state, tearing down surface");
                    slot.vacate(flow_id);
                    if let Some(tx) = shutdown_tx.take() {
                        let _ = tx.send(());
                    }
                    break;
                }

                let elapsed = Utc::now().signed_duration_since(started_at).num_seconds();
                if elapsed >= timeout_secs {
                    warn!(%flow_id, "Flow timed out after {} seconds", timeout_secs);
                    if let Some(flow) = flows.write().get_mut(&flow_id) {
                        flow.status = FlowStatus::Timeout;
                    }
                    if let Some(handlers) = slot.take(flow_id) {
                        (handlers.on_error)(ErrorReport {
                            code: "OAUTH_ERROR".to_string(),
                            message: format!(
                                "Authorization flow timed out after {} seconds",
                                timeout_secs
                            ),
                            details: Some(serde_json::json!({ "timeoutSeconds": timeout_secs })),
                        });
                    }
                    if let Some(tx) = shutdown_tx.take() {
                        let _ = tx.send(());
                    }
                    break;
                }
            }
        });
    }

    /// Poll flow status
    pub fn poll_status(&self, flow_id: FlowId) -> ConnectResult<FlowResult> {
        let flows = self.flows.read();
        let flow = flows
            .get(&flow_id)
            .ok_or_else(|| ConnectError::oauth(format!("Flow {} not found", flow_id)))?;

        let elapsed = Utc::now()
            .signed_duration_since(flow.started_at)
            .num_seconds();
        let time_remaining = Some(self.timeout_secs - elapsed).filter(|&t| t > 0);

        let result = match &flow.status {
            FlowStatus::Pending => FlowResult::Pending { time_remaining },
            FlowStatus::ExchangingToken => FlowResult::ExchangingToken,
            FlowStatus::Selecting => FlowResult::Selecting,
            FlowStatus::Success => {
                let payload = flow.payload.clone().unwrap_or_else(SelectionPayload::default);
                FlowResult::Success { payload }
            }
            FlowStatus::Error { report } => FlowResult::Error {
                report: report.clone(),
            },
            FlowStatus::Timeout => FlowResult::Timeout,
            FlowStatus::Cancelled => FlowResult::Cancelled,
        };

        Ok(result)
    }

    /// Block until the flow reaches a terminal state
    pub async fn wait_for_completion(&self, flow_id: FlowId) -> ConnectResult<FlowResult> {
        loop {
            let result = self.poll_status(flow_id)?;
            match result {
                FlowResult::Pending { .. }
                | FlowResult::ExchangingToken
                | FlowResult::Selecting => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                terminal => return Ok(terminal),
            }
        }
    }

    /// Cancel a flow explicitly. The supervisor notices the terminal state
    /// and shuts the surface down on its next tick.
    pub fn cancel_flow(&self, flow_id: FlowId) -> ConnectResult<()> {
        let mut flows = self.flows.write();
        let flow = flows
            .get_mut(&flow_id)
            .ok_or_else(|| ConnectError::oauth(format!("Flow {} not found", flow_id)))?;

        if !flow.status.is_terminal() {
            info!(%flow_id, "Cancelling flow");
            flow.status = FlowStatus::Cancelled;
        }
        drop(flows);

        self.slot.vacate(flow_id);
        Ok(())
    }

    /// Remove completed flows older than an hour; live flows are never touched
    pub fn cleanup_flows(&self) {
        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let mut flows = self.flows.write();

        let before = flows.len();
        flows.retain(|_, flow| !flow.status.is_terminal() || flow.started_at > cutoff);

        let removed = before - flows.len();
        if removed > 0 {
            debug!("Cleaned up {} old flows", removed);
        }
    }

    pub fn active_flow_count(&self) -> usize {
        self.flows.read().len()
    }

    /// The flow currently holding the handler slot, if any
    pub fn active_flow(&self) -> Option<FlowId> {
        self.slot.active_flow()
    }
}

impl Default for FlowManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Loopback port the redirect URI points at
fn parse_port(redirect_uri: &str) -> ConnectResult<u16> {
    let url = Url::parse(redirect_uri)
        .map_err(|e| ConnectError::configuration(format!("Invalid redirect URI: {}", e)))?;

    url.port()
        .or_else(|| match url.scheme() {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        })
        .ok_or_else(|| {
            ConnectError::configuration("Could not determine port from redirect URI")
        })
}
