//! Channel between the authorization surface and the flow initiator
//!
//! The surface cannot share memory with the initiating application, so
//! results travel through two mechanisms: a one-slot handler registry the
//! initiator installs before the surface opens, and (for hosted pages) a
//! small set of sentinel messages posted back over the loopback server,
//! validated against an origin allow-list before being trusted.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use tether_types::{
    ConnectError, ConnectResult, ErrorHandler, SelectionPayload, SuccessHandler,
};

use crate::types::FlowId;

/// Hosted connect page finished
pub const MSG_CONNECT_COMPLETE: &str = "tether-connect-complete";

/// Hosted Notion selection finished, payload attached
pub const MSG_NOTION_SELECTION_COMPLETE: &str = "notion-selection-complete";

/// Hosted Notion selection dismissed by the user
pub const MSG_NOTION_SELECTION_CANCELLED: &str = "notion-selection-cancelled";

static ALLOWED_ORIGINS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https://([a-z0-9-]+\.)?tether\.dev|https?://(localhost|127\.0\.0\.1)(:\d+)?)$")
        .expect("origin allow-list regex is valid")
});

/// Whether a message from this origin may be trusted
pub fn origin_allowed(origin: &str) -> bool {
    ALLOWED_ORIGINS.is_match(origin)
}

/// Callback pair installed for one flow
#[derive(Clone)]
pub struct FlowHandlers {
    pub on_success: SuccessHandler,
    pub on_error: ErrorHandler,
}

/// One-slot registry tying the active flow's surface to its initiator.
///
/// At most one flow may hold the slot at a time: registering while the slot
/// is occupied fails with "flow already in progress" instead of silently
/// replacing the first flow's callbacks. Taking the handlers vacates the
/// slot, so the first terminal delivery wins and later deliveries are
/// ignored.
#[derive(Default)]
pub struct HandlerSlot {
    active: Mutex<Option<(FlowId, FlowHandlers)>>,
}

impl HandlerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install handlers for a flow; fails if another flow holds the slot
    pub fn register(&self, flow_id: FlowId, handlers: FlowHandlers) -> ConnectResult<()> {
        let mut active = self.active.lock();
        if let Some((existing, _)) = active.as_ref() {
            warn!(%existing, "Rejected handler registration: flow already in progress");
            return Err(ConnectError::configuration(
                "A connector flow is already in progress for this application",
            ));
        }
        *active = Some((flow_id, handlers));
        Ok(())
    }

    /// Remove and return the handlers for delivery; `None` if the slot is
    /// empty or held by a different flow
    pub fn take(&self, flow_id: FlowId) -> Option<FlowHandlers> {
        let mut active = self.active.lock();
        match active.as_ref() {
            Some((id, _)) if *id == flow_id => active.take().map(|(_, handlers)| handlers),
            _ => None,
        }
    }

    /// Clear the slot without delivering anything. Idempotent.
    pub fn vacate(&self, flow_id: FlowId) -> bool {
        let mut active = self.active.lock();
        match active.as_ref() {
            Some((id, _)) if *id == flow_id => {
                *active = None;
                debug!(%flow_id, "Handler slot vacated");
                true
            }
            _ => false,
        }
    }

    pub fn active_flow(&self) -> Option<FlowId> {
        self.active.lock().as_ref().map(|(id, _)| *id)
    }
}

/// Raw message posted by a hosted surface page
#[derive(Debug, Clone, Deserialize)]
pub struct SurfaceMessage {
    pub message: String,

    #[serde(default)]
    pub payload: Option<Value>,
}

/// A validated sentinel message
#[derive(Debug)]
pub enum ParsedMessage {
    ConnectComplete(Option<SelectionPayload>),
    SelectionComplete(SelectionPayload),
    SelectionCancelled,
}

impl SurfaceMessage {
    pub fn parse(self) -> ConnectResult<ParsedMessage> {
        match self.message.as_str() {
            MSG_CONNECT_COMPLETE => {
                let payload = self
                    .payload
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| {
                        ConnectError::oauth(format!("Malformed completion payload: {}", e))
                    })?;
                Ok(ParsedMessage::ConnectComplete(payload))
            }
            MSG_NOTION_SELECTION_COMPLETE => {
                let payload = self.payload.ok_or_else(|| {
                    ConnectError::selection("Selection completion arrived without a payload")
                })?;
                let payload = serde_json::from_value(payload).map_err(|e| {
                    ConnectError::selection(format!("Malformed selection payload: {}", e))
                })?;
                Ok(ParsedMessage::SelectionComplete(payload))
            }
            MSG_NOTION_SELECTION_CANCELLED => Ok(ParsedMessage::SelectionCancelled),
            other => Err(ConnectError::oauth(format!(
                "Unrecognized surface message: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn noop_handlers() -> FlowHandlers {
        FlowHandlers {
            on_success: Arc::new(|_| {}),
            on_error: Arc::new(|_| {}),
        }
    }

    #[test]
    fn test_second_registration_rejected() {
        let slot = HandlerSlot::new();
        let first = FlowId::new();
        slot.register(first, noop_handlers()).unwrap();

        let err = slot.register(FlowId::new(), noop_handlers()).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");

        // First flow still holds the slot
        assert_eq!(slot.active_flow(), Some(first));
    }

    #[test]
    fn test_take_is_single_delivery() {
        let slot = HandlerSlot::new();
        let flow_id = FlowId::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        slot.register(
            flow_id,
            FlowHandlers {
                on_success: Arc::new(move |_| {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                }),
                on_error: Arc::new(|_| {}),
            },
        )
        .unwrap();

        if let Some(handlers) = slot.take(flow_id) {
            (handlers.on_success)(SelectionPayload::default());
        }
        // Second take finds the slot empty
        assert!(slot.take(flow_id).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_take_ignores_foreign_flow() {
        let slot = HandlerSlot::new();
        let flow_id = FlowId::new();
        slot.register(flow_id, noop_handlers()).unwrap();

        assert!(slot.take(FlowId::new()).is_none());
        assert_eq!(slot.active_flow(), Some(flow_id));
    }

    #[test]
    fn test_vacate_idempotent() {
        let slot = HandlerSlot::new();
        let flow_id = FlowId::new();
        slot.register(flow_id, noop_handlers()).unwrap();

        assert!(slot.vacate(flow_id));
        assert!(!slot.vacate(flow_id));
        assert!(slot.register(FlowId::new(), noop_handlers()).is_ok());
    }

    #[test]
    fn test_origin_allow_list() {
        assert!(origin_allowed("https://platform.tether.dev"));
        assert!(origin_allowed("https://tether.dev"));
        assert!(origin_allowed("http://localhost:8489"));
        assert!(origin_allowed("http://127.0.0.1:9100"));

        assert!(!origin_allowed("https://evil.example.com"));
        assert!(!origin_allowed("https://tether.dev.evil.com"));
        assert!(!origin_allowed("http://tether.dev"));
    }

    #[test]
    fn test_parse_selection_complete() {
        let message = SurfaceMessage {
            message: MSG_NOTION_SELECTION_COMPLETE.to_string(),
            payload: Some(json!({
                "selection": {
                    "p1": { "id": "p1", "name": "Roadmap", "type": "page" }
                },
                "access_token": "at-1"
            })),
        };
        match message.parse().unwrap() {
            ParsedMessage::SelectionComplete(payload) => {
                assert_eq!(payload.selection["p1"].name, "Roadmap");
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_sentinel() {
        let message = SurfaceMessage {
            message: "something-else".to_string(),
            payload: None,
        };
        assert!(message.parse().is_err());
    }

    #[test]
    fn test_selection_complete_requires_payload() {
        let message = SurfaceMessage {
            message: MSG_NOTION_SELECTION_COMPLETE.to_string(),
            payload: None,
        };
        assert_eq!(message.parse().unwrap_err().code(), "SELECTION_ERROR");
    }
}
