//! Generic connector-flow orchestrator
//!
//! Composes the flow manager, token exchanger, and selection surface behind
//! two public operations with identical shape for every provider: a fresh
//! OAuth-plus-selection flow, and a selection-only flow for callers that
//! already hold a token. Both catch every failure internally, funnel it
//! through the config's error callback, and return `None` — nothing ever
//! throws past this boundary.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use tether_config::{OAuthConfig, ProviderCredentials};
use tether_oauth::{
    generate_state, CodeExchangeFn, EmbedPage, FlowHandlers, FlowManager, FlowRequest, FlowResult,
    FlowStart, ListFn, SurfaceMode, TokenEcho, TokenExchanger,
};
use tether_picker::NotionLister;
use tether_types::{
    ConnectError, ConnectResult, ErrorReport, ProviderKind, ResourceReference, TokenPair,
};

use crate::spec::ProviderSpec;

/// Handle for one live connector flow
pub struct ConnectorFlow {
    start: FlowStart,
    manager: Arc<FlowManager>,
}

impl ConnectorFlow {
    pub fn flow_id(&self) -> tether_oauth::FlowId {
        self.start.flow_id
    }

    /// URL the surface was opened at
    pub fn surface_url(&self) -> &str {
        &self.start.surface_url
    }

    pub fn poll(&self) -> ConnectResult<FlowResult> {
        self.manager.poll_status(self.start.flow_id)
    }

    pub async fn wait(&self) -> ConnectResult<FlowResult> {
        self.manager.wait_for_completion(self.start.flow_id).await
    }

    pub fn cancel(&self) -> ConnectResult<()> {
        self.manager.cancel_flow(self.start.flow_id)
    }
}

/// Provider-agnostic orchestrator
pub struct Orchestrator {
    manager: Arc<FlowManager>,
    exchanger: Arc<TokenExchanger>,
    lister: Arc<NotionLister>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            manager: Arc::new(FlowManager::new()),
            exchanger: Arc::new(TokenExchanger::new()),
            lister: Arc::new(NotionLister::new()),
        }
    }

    /// Assemble from pre-built components (tests, embedders with custom
    /// endpoints or browser launchers)
    pub fn with_components(
        manager: FlowManager,
        exchanger: TokenExchanger,
        lister: NotionLister,
    ) -> Self {
        Self {
            manager: Arc::new(manager),
            exchanger: Arc::new(exchanger),
            lister: Arc::new(lister),
        }
    }

    pub fn manager(&self) -> &Arc<FlowManager> {
        &self.manager
    }

    /// Start a fresh OAuth flow: provider consent, code exchange, then
    /// resource selection.
    ///
    /// Never fails outward: any error is delivered through `on_error` and
    /// `None` is returned.
    pub async fn start_oauth(&self, config: OAuthConfig) -> Option<ConnectorFlow> {
        match self.try_start_oauth(&config).await {
            Ok(start) => Some(ConnectorFlow {
                start,
                manager: Arc::clone(&self.manager),
            }),
            Err(e) => {
                warn!(provider = %config.provider, "OAuth flow failed to start: {}", e);
                (config.on_error)(ErrorReport::from(&e));
                None
            }
        }
    }

    /// Start a selection-only flow with an already-held token, refreshing or
    /// validating it first. Supports "select more" without re-authenticating.
    pub async fn start_file_selection(
        &self,
        config: OAuthConfig,
        existing_token: &str,
        pre_selected: Option<HashMap<String, ResourceReference>>,
    ) -> Option<ConnectorFlow> {
        match self
            .try_start_selection(&config, existing_token, pre_selected)
            .await
        {
            Ok(start) => Some(ConnectorFlow {
                start,
                manager: Arc::clone(&self.manager),
            }),
            Err(e) => {
                warn!(provider = %config.provider, "Selection flow failed to start: {}", e);
                (config.on_error)(ErrorReport::from(&e));
                None
            }
        }
    }

    async fn try_start_oauth(&self, config: &OAuthConfig) -> ConnectResult<FlowStart> {
        config.validate()?;
        let spec = ProviderSpec::for_kind(config.provider);
        let csrf_state = generate_state();

        let client_id = match &config.credentials {
            ProviderCredentials::Google { client_id, .. } => client_id.clone(),
            ProviderCredentials::Dropbox { app_key, .. } => app_key.clone(),
            ProviderCredentials::Notion { client_id, .. } => client_id.clone(),
        };
        let auth_url =
            spec.authorize_url(&client_id, &config.redirect_uri, &config.scopes, &csrf_state);

        let request = FlowRequest {
            provider: config.provider,
            auth_url: Some(auth_url),
            redirect_uri: config.redirect_uri.clone(),
            csrf_state,
            exchange: Some(self.code_exchanger(config)),
            mode: self.surface_mode(config),
            echo: token_echo(config.provider),
            pre_selection: HashMap::new(),
            handlers: FlowHandlers {
                on_success: Arc::clone(&config.on_success),
                on_error: Arc::clone(&config.on_error),
            },
        };

        self.manager.start_auth_flow(request).await
    }

    async fn try_start_selection(
        &self,
        config: &OAuthConfig,
        existing_token: &str,
        pre_selected: Option<HashMap<String, ResourceReference>>,
    ) -> ConnectResult<FlowStart> {
        config.validate()?;
        if existing_token.trim().is_empty() {
            return Err(ConnectError::configuration(
                "A refresh or access token is required to reopen selection",
            ));
        }

        // Authorization is skipped; the held token is turned into a usable
        // access token first
        let tokens = match &config.credentials {
            ProviderCredentials::Google {
                client_id,
                client_secret,
                ..
            } => {
                self.exchanger
                    .refresh_google_token(existing_token, client_id, client_secret)
                    .await?
            }
            ProviderCredentials::Dropbox {
                app_key,
                app_secret,
            } => {
                self.exchanger
                    .refresh_dropbox_token(existing_token, app_key, app_secret)
                    .await?
            }
            ProviderCredentials::Notion { .. } => {
                self.exchanger.validate_notion_token(existing_token).await?
            }
        };

        let request = FlowRequest {
            provider: config.provider,
            auth_url: None,
            redirect_uri: config.redirect_uri.clone(),
            csrf_state: generate_state(),
            exchange: None,
            mode: self.surface_mode(config),
            echo: token_echo(config.provider),
            pre_selection: pre_selected.unwrap_or_default(),
            handlers: FlowHandlers {
                on_success: Arc::clone(&config.on_success),
                on_error: Arc::clone(&config.on_error),
            },
        };

        self.manager.start_selection_flow(request, tokens).await
    }

    /// Code-for-token exchange bound to this config's credentials
    fn code_exchanger(&self, config: &OAuthConfig) -> CodeExchangeFn {
        let exchanger = Arc::clone(&self.exchanger);
        let redirect_uri = config.redirect_uri.clone();

        match &config.credentials {
            ProviderCredentials::Google {
                client_id,
                client_secret,
                ..
            } => {
                let client_id = client_id.clone();
                let client_secret = client_secret.clone();
                Arc::new(move |code: String| {
                    let exchanger = Arc::clone(&exchanger);
                    let client_id = client_id.clone();
                    let client_secret = client_secret.clone();
                    let redirect_uri = redirect_uri.clone();
                    Box::pin(async move {
                        exchanger
                            .exchange_google_code(&code, &client_id, &client_secret, &redirect_uri)
                            .await
                    }) as tether_oauth::BoxFuture<ConnectResult<TokenPair>>
                })
            }
            ProviderCredentials::Dropbox {
                app_key,
                app_secret,
            } => {
                let app_key = app_key.clone();
                let app_secret = app_secret.clone();
                Arc::new(move |code: String| {
                    let exchanger = Arc::clone(&exchanger);
                    let app_key = app_key.clone();
                    let app_secret = app_secret.clone();
                    let redirect_uri = redirect_uri.clone();
                    Box::pin(async move {
                        exchanger
                            .exchange_dropbox_code(&code, &app_key, &app_secret, &redirect_uri)
                            .await
                    }) as tether_oauth::BoxFuture<ConnectResult<TokenPair>>
                })
            }
            ProviderCredentials::Notion {
                client_id,
                client_secret,
            } => {
                let client_id = client_id.clone();
                let client_secret = client_secret.clone();
                Arc::new(move |code: String| {
                    let exchanger = Arc::clone(&exchanger);
                    let client_id = client_id.clone();
                    let client_secret = client_secret.clone();
                    let redirect_uri = redirect_uri.clone();
                    Box::pin(async move {
                        exchanger
                            .exchange_notion_code(&code, &client_id, &client_secret, &redirect_uri)
                            .await
                    }) as tether_oauth::BoxFuture<ConnectResult<TokenPair>>
                })
            }
        }
    }

    /// Selection surface for this provider: native listing for Notion, the
    /// provider's own widget for Drive and Dropbox
    fn surface_mode(&self, config: &OAuthConfig) -> SurfaceMode {
        match &config.credentials {
            ProviderCredentials::Google { api_key, .. } => {
                SurfaceMode::EmbeddedPicker(EmbedPage::GoogleDrive {
                    api_key: api_key.clone(),
                })
            }
            ProviderCredentials::Dropbox { app_key, .. } => {
                SurfaceMode::EmbeddedPicker(EmbedPage::Dropbox {
                    app_key: app_key.clone(),
                })
            }
            ProviderCredentials::Notion { .. } => {
                let lister = Arc::clone(&self.lister);
                let list: ListFn = Arc::new(move |access_token: String| {
                    let lister = Arc::clone(&lister);
                    Box::pin(async move { lister.list_pages_and_databases(&access_token).await })
                        as tether_oauth::BoxFuture<ConnectResult<Vec<ResourceReference>>>
                });
                SurfaceMode::NativeSearch(list)
            }
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Which token string the success payload carries back: Notion tokens do not
/// rotate, so the access token itself is the durable credential; Drive and
/// Dropbox hand back the refresh token.
fn token_echo(provider: ProviderKind) -> TokenEcho {
    match provider {
        ProviderKind::Notion => TokenEcho::Access,
        ProviderKind::GoogleDrive | ProviderKind::Dropbox => TokenEcho::Refresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_echo_per_provider() {
        assert_eq!(token_echo(ProviderKind::Notion), TokenEcho::Access);
        assert_eq!(token_echo(ProviderKind::GoogleDrive), TokenEcho::Refresh);
        assert_eq!(token_echo(ProviderKind::Dropbox), TokenEcho::Refresh);
    }
}
