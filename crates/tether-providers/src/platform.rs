//! Hosted platform flows and the thin platform REST client
//!
//! Managed flows substitute a one-time platform-issued token for raw
//! provider credentials and point the surface at a hosted connect page. The
//! page is cross-origin, so completion comes back only through the sentinel
//! message channel. Unlike the white-label operations, these return a
//! `Result` that errs on timeout or transport failure.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use tether_config::PlatformConfig;
use tether_oauth::{
    generate_state, FlowHandlers, FlowManager, FlowRequest, FlowResult, SurfaceMode, TokenEcho,
};
use tether_types::{ConnectError, ConnectResult, ProviderKind, SelectionPayload};

/// User-record operation on a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Add,
    Edit,
    Remove,
}

/// Thin bearer-authenticated wrapper over the platform REST surface.
///
/// No orchestration lives here: each method is one request, one response.
pub struct PlatformClient {
    client: reqwest::Client,
    config: PlatformConfig,
}

impl PlatformClient {
    pub fn new(config: PlatformConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Issue a one-time token for a hosted connect/edit page
    pub async fn generate_one_time_token(&self, user_id: &str) -> ConnectResult<String> {
        let response = self
            .client
            .post(format!("{}/api/v1/one-time-tokens", self.config.base_url))
            .bearer_auth(&self.config.authorization)
            .json(&json!({
                "organization_id": self.config.organization_id,
                "user_id": user_id,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let body = check_platform_response(response).await?;
        body.get("token")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ConnectError::oauth("Platform response missing one-time token"))
    }

    /// Create a connector record for a provider
    pub async fn create_connector(
        &self,
        name: &str,
        provider: ProviderKind,
    ) -> ConnectResult<String> {
        let response = self
            .client
            .post(format!("{}/api/v1/connectors", self.config.base_url))
            .bearer_auth(&self.config.authorization)
            .json(&json!({
                "organization_id": self.config.organization_id,
                "name": name,
                "type": provider,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let body = check_platform_response(response).await?;
        body.get("connector_id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ConnectError::oauth("Platform response missing connector id"))
    }

    /// Add, edit, or remove a user record on a connector
    pub async fn manage_user(
        &self,
        connector_id: &str,
        user_id: &str,
        action: UserAction,
        selection: Option<&SelectionPayload>,
    ) -> ConnectResult<()> {
        let users_url = format!(
            "{}/api/v1/connectors/{}/users",
            self.config.base_url, connector_id
        );

        let request = match action {
            UserAction::Add => self.client.post(&users_url).json(&json!({
                "user_id": user_id,
                "selection": selection,
            })),
            UserAction::Edit => self.client.patch(&users_url).json(&json!({
                "user_id": user_id,
                "selection": selection,
            })),
            UserAction::Remove => self
                .client
                .delete(format!("{}/{}", users_url, user_id)),
        };

        let response = request
            .bearer_auth(&self.config.authorization)
            .send()
            .await
            .map_err(transport_error)?;

        check_platform_response(response).await?;
        info!(connector_id, user_id, ?action, "Platform user record updated");
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> ConnectError {
    ConnectError::oauth(format!("Platform request failed: {}", e))
}

async fn check_platform_response(response: reqwest::Response) -> ConnectResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ConnectError::oauth_with(
            format!("Platform request failed with status {}", status.as_u16()),
            json!({ "status": status.as_u16(), "body": body }),
        ));
    }
    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    response
        .json()
        .await
        .map_err(|e| ConnectError::oauth(format!("Malformed platform response: {}", e)))
}

/// Open a hosted connect page and wait for it to finish.
///
/// The platform performs OAuth and selection with its own registered
/// credentials; this side only supervises the surface. Errs on timeout,
/// transport failure, or a reported error; a user dismissal resolves
/// cleanly.
pub async fn redirect_to_tether_connect(
    manager: &FlowManager,
    config: &PlatformConfig,
    one_time_token: &str,
    provider: ProviderKind,
    redirect_uri: &str,
) -> ConnectResult<()> {
    require_one_time_token(one_time_token)?;
    let url = format!(
        "{}/connect/{}?token={}&organizationId={}",
        config.base_url,
        provider,
        urlencoding::encode(one_time_token),
        urlencoding::encode(&config.organization_id),
    );
    run_hosted_flow(manager, config, url, provider, redirect_uri).await
}

/// Open a hosted edit page for an existing connection and wait for it to
/// finish
pub async fn redirect_to_tether_edit(
    manager: &FlowManager,
    config: &PlatformConfig,
    one_time_token: &str,
    provider: ProviderKind,
    redirect_uri: &str,
) -> ConnectResult<()> {
    require_one_time_token(one_time_token)?;
    let url = format!(
        "{}/edit/{}?token={}&organizationId={}",
        config.base_url,
        provider,
        urlencoding::encode(one_time_token),
        urlencoding::encode(&config.organization_id),
    );
    run_hosted_flow(manager, config, url, provider, redirect_uri).await
}

fn require_one_time_token(one_time_token: &str) -> ConnectResult<()> {
    if one_time_token.trim().is_empty() {
        return Err(ConnectError::configuration(
            "A one-time token is required for a hosted flow",
        ));
    }
    Ok(())
}

async fn run_hosted_flow(
    manager: &FlowManager,
    config: &PlatformConfig,
    hosted_url: String,
    provider: ProviderKind,
    redirect_uri: &str,
) -> ConnectResult<()> {
    config.validate()?;

    let request = FlowRequest {
        provider,
        auth_url: Some(hosted_url),
        redirect_uri: redirect_uri.to_string(),
        csrf_state: generate_state(),
        exchange: None,
        mode: SurfaceMode::Hosted,
        echo: TokenEcho::Refresh,
        pre_selection: HashMap::new(),
        // The platform page carries its own UI; outcomes surface through
        // the returned Result, not callbacks
        handlers: FlowHandlers {
            on_success: Arc::new(|_| {}),
            on_error: Arc::new(|_| {}),
        },
    };

    let start = manager.start_hosted_flow(request).await?;
    match manager.wait_for_completion(start.flow_id).await? {
        FlowResult::Success { .. } | FlowResult::Cancelled => Ok(()),
        FlowResult::Timeout => Err(ConnectError::oauth("Hosted flow timed out")),
        FlowResult::Error { report } => Err(report.into_error()),
        FlowResult::Pending { .. } | FlowResult::ExchangingToken | FlowResult::Selecting => {
            Err(ConnectError::oauth("Hosted flow ended in a non-terminal state"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> PlatformConfig {
        PlatformConfig::new("jwt-1", "org-1").with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_one_time_token_issuance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/one-time-tokens"))
            .and(header("Authorization", "Bearer jwt-1"))
            .and(body_partial_json(json!({
                "organization_id": "org-1",
                "user_id": "user-7"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "ott-9" })))
            .mount(&server)
            .await;

        let client = PlatformClient::new(test_config(&server));
        let token = client.generate_one_time_token("user-7").await.unwrap();
        assert_eq!(token, "ott-9");
    }

    #[tokio::test]
    async fn test_create_connector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/connectors"))
            .and(body_partial_json(json!({ "type": "google-drive" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "connector_id": "conn-3" })),
            )
            .mount(&server)
            .await;

        let client = PlatformClient::new(test_config(&server));
        let id = client
            .create_connector("Team Drive", ProviderKind::GoogleDrive)
            .await
            .unwrap();
        assert_eq!(id, "conn-3");
    }

    #[tokio::test]
    async fn test_remove_user() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/connectors/conn-3/users/user-7"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = PlatformClient::new(test_config(&server));
        client
            .manage_user("conn-3", "user-7", UserAction::Remove, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_platform_rejection_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/one-time-tokens"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = PlatformClient::new(test_config(&server));
        let err = client.generate_one_time_token("user-7").await.unwrap_err();
        assert_eq!(err.code(), "OAUTH_ERROR");
        assert_eq!(err.details().unwrap()["status"], 403);
    }
}
