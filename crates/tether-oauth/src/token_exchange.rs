//! OAuth token exchange and refresh
//!
//! One function per provider operation, each a single network round trip
//! with no retry, no caching, and no persistence. Field-name differences
//! between providers are normalized into [`TokenPair`] before anything else
//! sees the response.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use tether_types::{ConnectError, ConnectResult, TokenPair};

const NOTION_VERSION: &str = "2022-06-28";

/// Provider token endpoints; overridable for tests
#[derive(Debug, Clone)]
pub struct TokenEndpoints {
    pub google: String,
    pub dropbox: String,
    pub notion: String,
    /// Cheap authenticated probe used to validate an existing Notion token
    pub notion_users: String,
}

impl Default for TokenEndpoints {
    fn default() -> Self {
        Self {
            google: "https://oauth2.googleapis.com/token".to_string(),
            dropbox: "https://api.dropboxapi.com/oauth2/token".to_string(),
            notion: "https://api.notion.com/v1/oauth/token".to_string(),
            notion_users: "https://api.notion.com/v1/users/me".to_string(),
        }
    }
}

/// Token exchanger for connector flows
pub struct TokenExchanger {
    client: Client,
    endpoints: TokenEndpoints,
}

impl TokenExchanger {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            endpoints: TokenEndpoints::default(),
        }
    }

    pub fn with_endpoints(endpoints: TokenEndpoints) -> Self {
        Self {
            client: Client::new(),
            endpoints,
        }
    }

    /// Exchange a Google authorization code for tokens
    pub async fn exchange_google_code(
        &self,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> ConnectResult<TokenPair> {
        info!("Exchanging Google authorization code");
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
        ];
        self.form_request(&self.endpoints.google, &params, "Google code exchange")
            .await
    }

    /// Refresh a Google access token
    pub async fn refresh_google_token(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> ConnectResult<TokenPair> {
        info!("Refreshing Google access token");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        let mut pair = self
            .form_request(&self.endpoints.google, &params, "Google token refresh")
            .await?;
        // Google omits the refresh token on refresh; keep the one we have
        pair.refresh_token = pair.refresh_token.or_else(|| Some(refresh_token.to_string()));
        Ok(pair)
    }

    /// Exchange a Dropbox authorization code for tokens
    pub async fn exchange_dropbox_code(
        &self,
        code: &str,
        app_key: &str,
        app_secret: &str,
        redirect_uri: &str,
    ) -> ConnectResult<TokenPair> {
        info!("Exchanging Dropbox authorization code");
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", app_key),
            ("client_secret", app_secret),
            ("redirect_uri", redirect_uri),
        ];
        self.form_request(&self.endpoints.dropbox, &params, "Dropbox code exchange")
            .await
    }

    /// Refresh a Dropbox access token
    pub async fn refresh_dropbox_token(
        &self,
        refresh_token: &str,
        app_key: &str,
        app_secret: &str,
    ) -> ConnectResult<TokenPair> {
        info!("Refreshing Dropbox access token");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", app_key),
            ("client_secret", app_secret),
        ];
        let mut pair = self
            .form_request(&self.endpoints.dropbox, &params, "Dropbox token refresh")
            .await?;
        pair.refresh_token = pair.refresh_token.or_else(|| Some(refresh_token.to_string()));
        Ok(pair)
    }

    /// Exchange a Notion authorization code for tokens.
    ///
    /// Notion wants a JSON body and HTTP Basic client authentication rather
    /// than credentials in the form.
    pub async fn exchange_notion_code(
        &self,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> ConnectResult<TokenPair> {
        info!("Exchanging Notion authorization code");
        let basic = BASE64.encode(format!("{}:{}", client_id, client_secret));
        let body = json!({
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": redirect_uri,
        });

        let response = self
            .client
            .post(&self.endpoints.notion)
            .header("Authorization", format!("Basic {}", basic))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ConnectError::token(format!("Failed to send Notion token request: {}", e))
            })?;

        Self::parse_token_response(response, "Notion code exchange").await
    }

    /// Validate an existing Notion access token.
    ///
    /// Notion integrations have no refresh grant; an authenticated probe
    /// stands in for refresh, re-wrapping the same token when it is still
    /// accepted.
    pub async fn validate_notion_token(&self, access_token: &str) -> ConnectResult<TokenPair> {
        debug!("Validating Notion access token");
        let response = self
            .client
            .get(&self.endpoints.notion_users)
            .bearer_auth(access_token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(|e| {
                ConnectError::token(format!("Failed to send Notion validation request: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("Notion token validation failed with status {}", status);
            return Err(token_failure(status, body, "Notion token validation"));
        }

        Ok(TokenPair::access_only(access_token))
    }

    async fn form_request(
        &self,
        url: &str,
        params: &[(&str, &str)],
        context: &str,
    ) -> ConnectResult<TokenPair> {
        let response = self
            .client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| ConnectError::token(format!("Failed to send token request: {}", e)))?;

        Self::parse_token_response(response, context).await
    }

    async fn parse_token_response(response: Response, context: &str) -> ConnectResult<TokenPair> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("{} failed with status {}", context, status);
            return Err(token_failure(status, body, context));
        }

        let pair: TokenPair = response.json().await.map_err(|e| {
            ConnectError::token(format!("Failed to parse token response: {}", e))
        })?;

        info!("{} successful", context);
        Ok(pair)
    }
}

impl Default for TokenExchanger {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a provider rejection, surfacing the provider's error code when the
/// body carries one
fn token_failure(status: u16, body: String, context: &str) -> ConnectError {
    let error_code = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from));

    ConnectError::token_with(
        format!("{} failed with status {}", context, status),
        json!({
            "status": status,
            "errorCode": error_code,
            "body": body,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_exchanger(server: &MockServer) -> TokenExchanger {
        TokenExchanger::with_endpoints(TokenEndpoints {
            google: format!("{}/google/token", server.uri()),
            dropbox: format!("{}/dropbox/token", server.uri()),
            notion: format!("{}/notion/token", server.uri()),
            notion_users: format!("{}/notion/users/me", server.uri()),
        })
    }

    #[tokio::test]
    async fn test_google_exchange_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/google/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code-1"))
            .and(body_string_contains("client_id=cid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let pair = test_exchanger(&server)
            .exchange_google_code("auth-code-1", "cid", "secret", "http://127.0.0.1:8489/callback")
            .await
            .unwrap();

        assert_eq!(pair.access_token, "at-1");
        assert_eq!(pair.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(pair.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn test_invalid_grant_surfaces_provider_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/google/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Code was already redeemed."
            })))
            .mount(&server)
            .await;

        let err = test_exchanger(&server)
            .exchange_google_code("stale", "cid", "secret", "http://127.0.0.1:8489/callback")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "TOKEN_ERROR");
        let details = err.details().unwrap();
        assert_eq!(details["status"], 400);
        assert_eq!(details["errorCode"], "invalid_grant");
    }

    #[tokio::test]
    async fn test_google_refresh_preserves_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/google/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-2",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let pair = test_exchanger(&server)
            .refresh_google_token("rt-original", "cid", "secret")
            .await
            .unwrap();

        assert_eq!(pair.access_token, "at-2");
        assert_eq!(pair.refresh_token.as_deref(), Some("rt-original"));
    }

    #[tokio::test]
    async fn test_notion_exchange_uses_basic_auth() {
        let server = MockServer::start().await;
        let expected = BASE64.encode("nid:nsecret");
        Mock::given(method("POST"))
            .and(path("/notion/token"))
            .and(header("Authorization", format!("Basic {}", expected).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "notion-at",
                "token_type": "bearer",
                "workspace_id": "ws-1"
            })))
            .mount(&server)
            .await;

        let pair = test_exchanger(&server)
            .exchange_notion_code("code-1", "nid", "nsecret", "http://127.0.0.1:8489/callback")
            .await
            .unwrap();

        assert_eq!(pair.access_token, "notion-at");
        assert_eq!(pair.refresh_token, None);
    }

    #[tokio::test]
    async fn test_notion_validation_rejection_is_token_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notion/users/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "unauthorized"
            })))
            .mount(&server)
            .await;

        let err = test_exchanger(&server)
            .validate_notion_token("stale-token")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "TOKEN_ERROR");
        assert_eq!(err.details().unwrap()["status"], 401);
    }

    #[tokio::test]
    async fn test_notion_validation_rewraps_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notion/users/me"))
            .and(header("Notion-Version", NOTION_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "user", "id": "u-1"
            })))
            .mount(&server)
            .await;

        let pair = test_exchanger(&server)
            .validate_notion_token("live-token")
            .await
            .unwrap();
        assert_eq!(pair.access_token, "live-token");
    }
}
