//! Loopback callback server hosting the authorization/selection surface
//!
//! One short-lived server per flow. It receives the provider redirect,
//! drives the code exchange, serves the selection surface pages, and relays
//! every terminal outcome through the handler slot. The flow supervisor owns
//! its shutdown.

use axum::{
    extract::{Query, State},
    http::{header::ORIGIN, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use tether_picker::{
    dropbox_chooser_page, drive_picker_page, flow_complete_page, flow_error_page,
    notion_picker_page, SelectionState,
};
use tether_types::{
    ConnectError, ConnectResult, ErrorReport, ResourceReference, SelectionPayload, TokenPair,
};

use crate::channel::{origin_allowed, HandlerSlot, ParsedMessage, SurfaceMessage};
use crate::types::{
    CodeExchangeFn, EmbedPage, FlowId, FlowMap, FlowStatus, SurfaceMode, TokenEcho,
};

/// Shared state of one open surface.
///
/// Everything the loopback endpoints need: the expected CSRF state, the
/// exchange function, the selection state, and the channel back to the flow
/// initiator. Dropped when the server shuts down; tokens never outlive it.
pub(crate) struct SurfaceSession {
    pub flow_id: FlowId,
    pub csrf_state: String,
    pub exchange: Option<CodeExchangeFn>,
    pub mode: SurfaceMode,
    pub echo: TokenEcho,
    pub tokens: Mutex<Option<TokenPair>>,
    pub listed: Mutex<Vec<ResourceReference>>,
    pub selection: Mutex<SelectionState>,
    pub slot: Arc<HandlerSlot>,
    pub flows: FlowMap,
}

impl SurfaceSession {
    pub(crate) fn status(&self) -> Option<FlowStatus> {
        self.flows
            .read()
            .get(&self.flow_id)
            .map(|flow| flow.status.clone())
    }

    pub(crate) fn set_status(&self, status: FlowStatus) {
        if let Some(flow) = self.flows.write().get_mut(&self.flow_id) {
            flow.status = status;
        }
    }

    /// Terminal failure: record it and deliver through the error channel.
    /// Delivery happens at most once; a vacated slot means the outcome was
    /// already reported.
    pub(crate) fn fail(&self, err: &ConnectError) -> ErrorReport {
        let report = ErrorReport::from(err);
        warn!(flow_id = %self.flow_id, code = %report.code, "Flow failed: {}", report.message);
        self.set_status(FlowStatus::Error {
            report: report.clone(),
        });
        if let Some(handlers) = self.slot.take(self.flow_id) {
            (handlers.on_error)(report.clone());
        }
        report
    }

    fn fail_page(&self, err: ConnectError) -> Response {
        let report = self.fail(&err);
        Html(flow_error_page(&report)).into_response()
    }

    /// Terminal success: record the payload and deliver it exactly once
    pub(crate) fn succeed(&self, payload: SelectionPayload) {
        if let Some(flow) = self.flows.write().get_mut(&self.flow_id) {
            flow.status = FlowStatus::Success;
            flow.payload = Some(payload.clone());
        }
        if let Some(handlers) = self.slot.take(self.flow_id) {
            info!(flow_id = %self.flow_id, "Delivering selection to initiator");
            (handlers.on_success)(payload);
        }
    }

    /// Implicit cancellation: the user closed the surface. No error reaches
    /// the initiator; the slot is simply vacated.
    pub(crate) fn cancel(&self) {
        debug!(flow_id = %self.flow_id, "Surface closed by user, cancelling flow");
        self.set_status(FlowStatus::Cancelled);
        self.slot.vacate(self.flow_id);
    }
}

/// Bind the loopback listener for a flow
pub(crate) async fn bind(port: u16) -> ConnectResult<TcpListener> {
    TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
        ConnectError::configuration_with(
            format!("Could not bind callback port {}: {}", port, e),
            json!({ "port": port }),
        )
    })
}

/// Serve the surface until the returned sender fires
pub(crate) fn spawn(listener: TcpListener, session: Arc<SurfaceSession>) -> oneshot::Sender<()> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let flow_id = session.flow_id;
    let app = router(session);

    tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = serve.await {
            error!(%flow_id, "Callback server error: {}", e);
        }
        debug!(%flow_id, "Callback server stopped");
    });

    shutdown_tx
}

fn router(session: Arc<SurfaceSession>) -> Router {
    Router::new()
        .route("/callback", get(auth_callback))
        .route("/picker", get(picker_page))
        .route("/picker/toggle", post(picker_toggle))
        .route("/picker/select-all", post(picker_select_all))
        .route("/picker/deselect-all", post(picker_deselect_all))
        .route("/picker/finalize", post(picker_finalize))
        .route("/surface/closed", post(surface_closed))
        .route("/surface/message", post(surface_message))
        .layer(CorsLayer::permissive())
        .with_state(session)
}

/// Provider redirect target: validates, exchanges the code, and renders the
/// selection surface into the still-open window
async fn auth_callback(
    State(session): State<Arc<SurfaceSession>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(error) = params.get("error") {
        return session.fail_page(ConnectError::token_with(
            format!("Provider returned an error: {}", error),
            json!({ "errorCode": error }),
        ));
    }

    let code = match params.get("code") {
        Some(code) => code.clone(),
        None => {
            return session.fail_page(ConnectError::token(
                "No authorization code found in callback",
            ))
        }
    };

    if params.get("state").map(String::as_str) != Some(session.csrf_state.as_str()) {
        return session.fail_page(ConnectError::token("State parameter mismatch in callback"));
    }

    let exchange = match session.exchange.clone() {
        Some(exchange) => exchange,
        None => {
            return session.fail_page(ConnectError::oauth(
                "This flow does not accept authorization callbacks",
            ))
        }
    };

    session.set_status(FlowStatus::ExchangingToken);
    let tokens = match exchange(code).await {
        Ok(tokens) => tokens,
        Err(e) => return session.fail_page(e),
    };
    *session.tokens.lock() = Some(tokens);

    match render_surface(&session).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => session.fail_page(e),
    }
}

/// Selection surface page; entry point for selection-only flows
async fn picker_page(State(session): State<Arc<SurfaceSession>>) -> Response {
    match render_surface(&session).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => session.fail_page(e),
    }
}

/// Populate and render the surface for the session's mode
async fn render_surface(session: &Arc<SurfaceSession>) -> ConnectResult<String> {
    let tokens = session
        .tokens
        .lock()
        .clone()
        .ok_or_else(|| ConnectError::selection("No access token available for this surface"))?;

    let html = match &session.mode {
        SurfaceMode::NativeSearch(list) => {
            if session.listed.lock().is_empty() {
                let resources = list(tokens.access_token.clone()).await?;
                *session.listed.lock() = resources;
            }
            let listed = session.listed.lock().clone();
            let selection = session.selection.lock().clone();
            notion_picker_page(&listed, &selection)
        }
        SurfaceMode::EmbeddedPicker(EmbedPage::GoogleDrive { api_key }) => {
            drive_picker_page(api_key, &tokens.access_token)
        }
        SurfaceMode::EmbeddedPicker(EmbedPage::Dropbox { app_key }) => {
            dropbox_chooser_page(app_key)
        }
        SurfaceMode::Hosted => {
            return Err(ConnectError::oauth(
                "Hosted flows render on the platform page",
            ))
        }
    };

    session.set_status(FlowStatus::Selecting);
    Ok(html)
}

async fn picker_toggle(
    State(session): State<Arc<SurfaceSession>>,
    Json(resource): Json<ResourceReference>,
) -> Response {
    let mut selection = session.selection.lock();
    let selected = selection.toggle(resource);
    Json(json!({ "selected": selected, "count": selection.len() })).into_response()
}

async fn picker_select_all(State(session): State<Arc<SurfaceSession>>) -> Response {
    let listed = session.listed.lock().clone();
    let mut selection = session.selection.lock();
    selection.select_all(&listed);
    Json(json!({ "count": selection.len() })).into_response()
}

async fn picker_deselect_all(State(session): State<Arc<SurfaceSession>>) -> Response {
    let listed = session.listed.lock().clone();
    let mut selection = session.selection.lock();
    selection.deselect_all(&listed);
    Json(json!({ "count": selection.len() })).into_response()
}

/// Finish action. An empty selection is rejected locally: no network call,
/// no channel delivery, and the surface stays open.
async fn picker_finalize(State(session): State<Arc<SurfaceSession>>) -> Response {
    let finalized = session.selection.lock().finalize();
    let selection = match finalized {
        Ok(selection) => selection,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ErrorReport::from(&e))).into_response();
        }
    };

    let tokens = match session.tokens.lock().clone() {
        Some(tokens) => tokens,
        None => {
            let e = ConnectError::selection("No access token available for this surface");
            return (StatusCode::BAD_REQUEST, Json(ErrorReport::from(&e))).into_response();
        }
    };

    let payload = SelectionPayload {
        selection,
        refresh_token: match session.echo {
            TokenEcho::Refresh => tokens.refresh_token.clone(),
            TokenEcho::Access => None,
        },
        access_token: match session.echo {
            TokenEcho::Access => Some(tokens.access_token.clone()),
            TokenEcho::Refresh => None,
        },
    };

    session.succeed(payload);
    Html(flow_complete_page()).into_response()
}

/// Unload beacon from the surface page. Closing before completion is an
/// implicit cancellation; closing after a terminal outcome is a no-op.
async fn surface_closed(State(session): State<Arc<SurfaceSession>>) -> StatusCode {
    let terminal = session
        .status()
        .map(|status| status.is_terminal())
        .unwrap_or(true);
    if !terminal {
        session.cancel();
    }
    StatusCode::NO_CONTENT
}

/// Sentinel message channel for hosted (cross-origin) surface pages
async fn surface_message(
    State(session): State<Arc<SurfaceSession>>,
    headers: HeaderMap,
    Json(message): Json<SurfaceMessage>,
) -> Response {
    let trusted = headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(origin_allowed)
        .unwrap_or(false);
    if !trusted {
        warn!(flow_id = %session.flow_id, "Rejected surface message from untrusted origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    match message.parse() {
        Ok(ParsedMessage::ConnectComplete(payload)) => {
            session.succeed(payload.unwrap_or_default());
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(ParsedMessage::SelectionComplete(payload)) => {
            session.succeed(payload);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(ParsedMessage::SelectionCancelled) => {
            session.cancel();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, Json(ErrorReport::from(&e))).into_response(),
    }
}
