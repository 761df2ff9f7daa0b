//! Notion resource listing
//!
//! Drive and Dropbox embed the provider's own picker widget, so only Notion
//! needs a native listing client: its search endpoint is queried once per
//! object type (pages and databases concurrently), following cursor
//! pagination to exhaustion.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use tether_types::{ConnectError, ConnectResult, ResourceReference};

const NOTION_SEARCH_URL: &str = "https://api.notion.com/v1/search";
const NOTION_VERSION: &str = "2022-06-28";
const SEARCH_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<Value>,

    #[serde(default)]
    has_more: bool,

    #[serde(default)]
    next_cursor: Option<String>,
}

/// Client for Notion's search endpoint
pub struct NotionLister {
    client: Client,
    search_url: String,
}

impl NotionLister {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            search_url: NOTION_SEARCH_URL.to_string(),
        }
    }

    /// Override the search endpoint (tests)
    pub fn with_search_url(search_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            search_url: search_url.into(),
        }
    }

    /// List every page and database the integration can see.
    ///
    /// The two object types are fetched concurrently; each fetch follows
    /// `next_cursor` until the provider reports no more results.
    pub async fn list_pages_and_databases(
        &self,
        access_token: &str,
    ) -> ConnectResult<Vec<ResourceReference>> {
        let (pages, databases) = tokio::try_join!(
            self.search(access_token, "page"),
            self.search(access_token, "database"),
        )?;

        debug!(
            pages = pages.len(),
            databases = databases.len(),
            "Listed Notion resources"
        );

        let mut resources = pages;
        resources.extend(databases);
        Ok(resources)
    }

    async fn search(
        &self,
        access_token: &str,
        object_type: &str,
    ) -> ConnectResult<Vec<ResourceReference>> {
        let mut resources = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({
                "filter": { "property": "object", "value": object_type },
                "page_size": SEARCH_PAGE_SIZE,
            });
            if let Some(ref c) = cursor {
                body["start_cursor"] = json!(c);
            }

            let response = self
                .client
                .post(&self.search_url)
                .bearer_auth(access_token)
                .header("Notion-Version", NOTION_VERSION)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    ConnectError::selection(format!("Notion search request failed: {}", e))
                })?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(ConnectError::selection_with(
                    format!("Notion search failed with status {}", status),
                    json!({ "status": status, "body": body }),
                ));
            }

            let page: SearchResponse = response.json().await.map_err(|e| {
                ConnectError::selection(format!("Failed to parse Notion search response: {}", e))
            })?;

            resources.extend(
                page.results
                    .iter()
                    .filter_map(|result| map_search_result(result, object_type)),
            );

            if page.has_more {
                cursor = page.next_cursor;
                if cursor.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(resources)
    }
}

impl Default for NotionLister {
    fn default() -> Self {
        Self::new()
    }
}

/// Translate one raw search result into the generic resource shape
fn map_search_result(result: &Value, object_type: &str) -> Option<ResourceReference> {
    let id = result.get("id")?.as_str()?.to_string();
    let name = extract_title(result).unwrap_or_else(|| "Untitled".to_string());
    Some(ResourceReference::new(id, name, object_type))
}

/// Pull a display title out of a page or database record.
///
/// Databases carry a top-level `title` rich-text array; pages bury theirs
/// inside whichever property has type "title".
fn extract_title(result: &Value) -> Option<String> {
    if let Some(title) = result.get("title").and_then(plain_text) {
        return Some(title);
    }

    let properties = result.get("properties")?.as_object()?;
    properties
        .values()
        .find(|prop| prop.get("type").and_then(Value::as_str) == Some("title"))
        .and_then(|prop| prop.get("title"))
        .and_then(plain_text)
}

fn plain_text(rich_text: &Value) -> Option<String> {
    let parts: Vec<&str> = rich_text
        .as_array()?
        .iter()
        .filter_map(|t| t.get("plain_text").and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_database_title() {
        let result = json!({
            "id": "db-1",
            "title": [{ "plain_text": "Projects" }]
        });
        assert_eq!(extract_title(&result), Some("Projects".to_string()));
    }

    #[test]
    fn test_extract_page_title_from_properties() {
        let result = json!({
            "id": "page-1",
            "properties": {
                "Name": {
                    "type": "title",
                    "title": [
                        { "plain_text": "Q3 " },
                        { "plain_text": "Roadmap" }
                    ]
                },
                "Status": { "type": "select" }
            }
        });
        assert_eq!(extract_title(&result), Some("Q3 Roadmap".to_string()));
    }

    #[test]
    fn test_untitled_fallback() {
        let result = json!({ "id": "page-2", "properties": {} });
        let resource = map_search_result(&result, "page").unwrap();
        assert_eq!(resource.name, "Untitled");
        assert_eq!(resource.resource_type, "page");
    }

    #[tokio::test]
    async fn test_listing_follows_pagination() {
        let server = MockServer::start().await;

        // First page of pages
        Mock::given(method("POST"))
            .and(path("/v1/search"))
            .and(header("Notion-Version", NOTION_VERSION))
            .and(body_partial_json(
                json!({ "filter": { "value": "page" } }),
            ))
            .and(body_partial_json(json!({ "page_size": 100 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "id": "p1", "properties": { "t": { "type": "title", "title": [{ "plain_text": "One" }] } } }
                ],
                "has_more": true,
                "next_cursor": "cursor-2"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        // Second page of pages
        Mock::given(method("POST"))
            .and(path("/v1/search"))
            .and(body_partial_json(json!({ "start_cursor": "cursor-2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "id": "p2", "properties": { "t": { "type": "title", "title": [{ "plain_text": "Two" }] } } }
                ],
                "has_more": false
            })))
            .mount(&server)
            .await;

        // Databases: single page
        Mock::given(method("POST"))
            .and(path("/v1/search"))
            .and(body_partial_json(
                json!({ "filter": { "value": "database" } }),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "id": "db1", "title": [{ "plain_text": "Tasks" }] }
                ],
                "has_more": false
            })))
            .mount(&server)
            .await;

        let lister = NotionLister::with_search_url(format!("{}/v1/search", server.uri()));
        let resources = lister.list_pages_and_databases("at-1").await.unwrap();

        let ids: Vec<&str> = resources.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"p1"));
        assert!(ids.contains(&"p2"));
        assert!(ids.contains(&"db1"));
        assert_eq!(resources.len(), 3);
    }

    #[tokio::test]
    async fn test_listing_failure_is_selection_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/search"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "code": "unauthorized" })),
            )
            .mount(&server)
            .await;

        let lister = NotionLister::with_search_url(format!("{}/v1/search", server.uri()));
        let err = lister
            .list_pages_and_databases("bad-token")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SELECTION_ERROR");
        assert_eq!(err.details().unwrap()["status"], 401);
    }
}
