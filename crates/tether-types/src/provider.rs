//! Storage provider identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{ConnectError, ConnectResult};

/// Supported storage providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    GoogleDrive,
    Dropbox,
    Notion,
}

impl ProviderKind {
    pub fn all() -> Vec<Self> {
        vec![Self::GoogleDrive, Self::Dropbox, Self::Notion]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::GoogleDrive => "Google Drive",
            Self::Dropbox => "Dropbox",
            Self::Notion => "Notion",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoogleDrive => write!(f, "google-drive"),
            Self::Dropbox => write!(f, "dropbox"),
            Self::Notion => write!(f, "notion"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConnectError;

    fn from_str(s: &str) -> ConnectResult<Self> {
        match s.to_lowercase().as_str() {
            "google-drive" | "googledrive" | "google_drive" => Ok(Self::GoogleDrive),
            "dropbox" => Ok(Self::Dropbox),
            "notion" => Ok(Self::Notion),
            _ => Err(ConnectError::configuration(format!(
                "Unknown provider: {}. Supported: google-drive, dropbox, notion",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!(
            "google-drive".parse::<ProviderKind>().unwrap(),
            ProviderKind::GoogleDrive
        );
        assert_eq!(
            "NOTION".parse::<ProviderKind>().unwrap(),
            ProviderKind::Notion
        );
        assert!("box".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(ProviderKind::GoogleDrive.to_string(), "google-drive");
        assert_eq!(ProviderKind::Dropbox.to_string(), "dropbox");
        assert_eq!(ProviderKind::Notion.display_name(), "Notion");
    }
}
