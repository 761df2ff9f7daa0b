//! Authorization surface lifecycle for Tether connector flows
//!
//! This crate owns the cross-window protocol core: the one-slot handler
//! registry through which the surface reports back, the loopback callback
//! server that receives the provider redirect and hosts the selection
//! surface, the flow manager supervising each surface (poll, timeout,
//! cancellation, idempotent teardown), and the per-provider token
//! exchange/refresh client.
//!
//! # Usage Example
//! ```no_run
//! use tether_oauth::{FlowManager, FlowRequest};
//!
//! # async fn example(request: FlowRequest) -> tether_types::ConnectResult<()> {
//! let manager = FlowManager::new();
//! let start = manager.start_auth_flow(request).await?;
//! // The system browser is now at the provider's consent page.
//! // Poll with manager.poll_status(start.flow_id) or rely on the
//! // config callbacks.
//! # Ok(())
//! # }
//! ```

mod callback_server;
mod channel;
mod flow_manager;
mod state;
mod token_exchange;
mod types;

pub use channel::{
    origin_allowed, FlowHandlers, HandlerSlot, ParsedMessage, SurfaceMessage,
    MSG_CONNECT_COMPLETE, MSG_NOTION_SELECTION_CANCELLED, MSG_NOTION_SELECTION_COMPLETE,
};
pub use flow_manager::{BrowserLauncher, FlowManager};
pub use state::generate_state;
pub use token_exchange::{TokenEndpoints, TokenExchanger};
pub use types::{
    BoxFuture, CodeExchangeFn, EmbedPage, FlowId, FlowRequest, FlowResult, FlowStart, FlowState,
    FlowStatus, ListFn, SurfaceMode, TokenEcho,
};
