//! Session profile types

use crate::{ConnectionDescriptor, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named, reusable connection profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Profile name
    pub name: String,
    /// Connection URI (never carries a password written by the store itself)
    pub uri: String,
    /// Free-form application data
    #[serde(default)]
    pub app_data: BTreeMap<String, String>,
}

impl SessionConfig {
    /// Create a profile without application data
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            app_data: BTreeMap::new(),
        }
    }

    /// Add one application data entry
    pub fn with_app_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.app_data.insert(key.into(), value.into());
        self
    }

    /// Parse and validate the stored URI
    pub fn descriptor(&self) -> Result<ConnectionDescriptor> {
        ConnectionDescriptor::parse(&self.uri)
    }

    pub(crate) fn from_document(name: impl Into<String>, document: ProfileDocument) -> Self {
        Self {
            name: name.into(),
            uri: document.uri,
            app_data: document.appdata,
        }
    }

    pub(crate) fn to_document(&self) -> ProfileDocument {
        ProfileDocument {
            uri: self.uri.clone(),
            appdata: self.app_data.clone(),
        }
    }
}

/// What a persistence backend stores per profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDocument {
    /// Connection URI
    pub uri: String,
    /// Application data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub appdata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_json_shape() {
        let doc = SessionConfig::new("p1", "mysqlx://u@h/s").to_document();
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            serde_json::json!({ "uri": "mysqlx://u@h/s" })
        );

        let doc = SessionConfig::new("p1", "mysqlx://u@h")
            .with_app_data("color", "blue")
            .to_document();
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            serde_json::json!({ "uri": "mysqlx://u@h", "appdata": { "color": "blue" } })
        );
    }

    #[test]
    fn test_document_without_appdata_deserializes() {
        let doc: ProfileDocument = serde_json::from_str(r#"{"uri":"mysqlx://u@h"}"#).unwrap();
        let config = SessionConfig::from_document("p", doc);
        assert!(config.app_data.is_empty());
        assert_eq!(config.descriptor().unwrap().user(), "u");
    }
}
