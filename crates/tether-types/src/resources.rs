//! Provider-agnostic resource and selection shapes

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::ErrorReport;

/// One selectable item, normalized across providers.
///
/// Each provider's native record (Drive file, Dropbox entry, Notion page or
/// database) is translated to this shape at the orchestrator boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceReference {
    pub id: String,
    pub name: String,
    /// MIME type for file providers, object type ("page"/"database") for Notion
    #[serde(rename = "type")]
    pub resource_type: String,
}

impl ResourceReference {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            resource_type: resource_type.into(),
        }
    }
}

/// Final result delivered to the flow initiator on success: the approved
/// selection keyed by resource id, plus the token string the caller needs to
/// act on it later.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SelectionPayload {
    pub selection: HashMap<String, ResourceReference>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// Success callback supplied by the flow initiator
pub type SuccessHandler = Arc<dyn Fn(SelectionPayload) + Send + Sync>;

/// Error callback supplied by the flow initiator; the single failure channel
/// for every flow
pub type ErrorHandler = Arc<dyn Fn(ErrorReport) + Send + Sync>;
