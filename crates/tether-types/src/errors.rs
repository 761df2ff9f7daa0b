//! Error types and conversions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure raised anywhere in a connector flow.
///
/// Every variant carries a human-readable message plus optional free-form
/// details (HTTP status, provider error body, offending field name). The
/// variant itself is the machine-readable classification; [`ConnectError::code`]
/// exposes it as a stable string for callers that log or display failures.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Bad or missing caller input, detected before any I/O
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        details: Option<Value>,
    },

    /// Provider rejected an authorization-code exchange or token refresh
    #[error("Token error: {message}")]
    Token {
        message: String,
        details: Option<Value>,
    },

    /// Failure while listing or finalizing resources in the selection surface
    #[error("Selection error: {message}")]
    Selection {
        message: String,
        details: Option<Value>,
    },

    /// Anything uncaught, wrapped defensively
    #[error("OAuth error: {message}")]
    OAuth {
        message: String,
        details: Option<Value>,
    },
}

pub type ConnectResult<T> = Result<T, ConnectError>;

impl ConnectError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            details: None,
        }
    }

    pub fn configuration_with(message: impl Into<String>, details: Value) -> Self {
        Self::Configuration {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn token(message: impl Into<String>) -> Self {
        Self::Token {
            message: message.into(),
            details: None,
        }
    }

    pub fn token_with(message: impl Into<String>, details: Value) -> Self {
        Self::Token {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn selection(message: impl Into<String>) -> Self {
        Self::Selection {
            message: message.into(),
            details: None,
        }
    }

    pub fn selection_with(message: impl Into<String>, details: Value) -> Self {
        Self::Selection {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn oauth(message: impl Into<String>) -> Self {
        Self::OAuth {
            message: message.into(),
            details: None,
        }
    }

    pub fn oauth_with(message: impl Into<String>, details: Value) -> Self {
        Self::OAuth {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Stable machine code for this failure class
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Token { .. } => "TOKEN_ERROR",
            Self::Selection { .. } => "SELECTION_ERROR",
            Self::OAuth { .. } => "OAUTH_ERROR",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Configuration { message, .. }
            | Self::Token { message, .. }
            | Self::Selection { message, .. }
            | Self::OAuth { message, .. } => message,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Configuration { details, .. }
            | Self::Token { details, .. }
            | Self::Selection { details, .. }
            | Self::OAuth { details, .. } => details.as_ref(),
        }
    }
}

impl From<std::io::Error> for ConnectError {
    fn from(err: std::io::Error) -> Self {
        Self::oauth(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for ConnectError {
    fn from(err: serde_json::Error) -> Self {
        Self::oauth(format!("Serialization error: {}", err))
    }
}

impl From<anyhow::Error> for ConnectError {
    fn from(err: anyhow::Error) -> Self {
        Self::oauth(err.to_string())
    }
}

/// Serializable error record that crosses the surface/opener boundary.
///
/// Live error values cannot travel through an HTTP channel, so failures are
/// flattened to `{code, message, details}` on the sending side and
/// reconstructed into the proper [`ConnectError`] variant purely from `code`
/// on the receiving side. Unknown codes reconstruct as the generic variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorReport {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Rebuild the typed error this report was flattened from
    pub fn into_error(self) -> ConnectError {
        let Self {
            code,
            message,
            details,
        } = self;
        match code.as_str() {
            "CONFIGURATION_ERROR" => ConnectError::Configuration { message, details },
            "TOKEN_ERROR" => ConnectError::Token { message, details },
            "SELECTION_ERROR" => ConnectError::Selection { message, details },
            _ => ConnectError::OAuth { message, details },
        }
    }
}

impl From<&ConnectError> for ErrorReport {
    fn from(err: &ConnectError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.message().to_string(),
            details: err.details().cloned(),
        }
    }
}

impl From<ConnectError> for ErrorReport {
    fn from(err: ConnectError) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ConnectError::configuration("missing field").code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(ConnectError::token("rejected").code(), "TOKEN_ERROR");
        assert_eq!(ConnectError::selection("empty").code(), "SELECTION_ERROR");
        assert_eq!(ConnectError::oauth("unknown").code(), "OAUTH_ERROR");
    }

    #[test]
    fn test_report_round_trip() {
        let err = ConnectError::token_with(
            "exchange rejected",
            json!({"status": 400, "errorCode": "invalid_grant"}),
        );
        let report = ErrorReport::from(&err);
        assert_eq!(report.code, "TOKEN_ERROR");

        let rebuilt = report.into_error();
        assert!(matches!(rebuilt, ConnectError::Token { .. }));
        assert_eq!(
            rebuilt.details().unwrap()["errorCode"],
            json!("invalid_grant")
        );
    }

    #[test]
    fn test_unknown_code_reconstructs_as_generic() {
        let report = ErrorReport::new("SOMETHING_NEW", "mystery");
        assert!(matches!(report.into_error(), ConnectError::OAuth { .. }));
    }

    #[test]
    fn test_report_serialization_omits_empty_details() {
        let report = ErrorReport::new("SELECTION_ERROR", "no resources selected");
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("details"));
    }
}
