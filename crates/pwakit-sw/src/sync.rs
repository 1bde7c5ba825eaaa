//! Background-sync tag registry.
//!
//! A small fixed set of tags maps to backend endpoints; the host issues
//! a GET against the endpoint and reads a `{"success": bool}` receipt.
//! Unknown tags are ignored and sync failures never propagate.

use hashbrown::HashMap;
use serde::Deserialize;

/// Registered sync tags and their endpoint paths.
#[derive(Debug, Clone, Default)]
pub struct SyncRegistry {
    tags: HashMap<String, String>,
}

impl SyncRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the standard application tags.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("daily-message-sync", "/api/daily-message-notification/");
        registry.register("weekly-report-sync", "/api/weekly-report-notification/");
        registry
    }

    /// Register a tag.
    pub fn register(&mut self, tag: &str, endpoint: &str) {
        self.tags.insert(tag.to_string(), endpoint.to_string());
    }

    /// Endpoint path for a tag, if registered.
    pub fn endpoint(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(|s| s.as_str())
    }

    /// All registered tags.
    pub fn tags(&self) -> Vec<&str> {
        self.tags.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Receipt returned by sync endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncReceipt {
    #[serde(default)]
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_tags() {
        let registry = SyncRegistry::standard();
        assert_eq!(
            registry.endpoint("daily-message-sync"),
            Some("/api/daily-message-notification/")
        );
        assert_eq!(
            registry.endpoint("weekly-report-sync"),
            Some("/api/weekly-report-notification/")
        );
    }

    #[test]
    fn test_unknown_tag_is_none() {
        let registry = SyncRegistry::standard();
        assert_eq!(registry.endpoint("background-sync"), None);
    }

    #[test]
    fn test_register_custom_tag() {
        let mut registry = SyncRegistry::new();
        registry.register("background-sync", "/api/background/");
        assert_eq!(registry.endpoint("background-sync"), Some("/api/background/"));
    }

    #[test]
    fn test_receipt_parse() {
        let receipt: SyncReceipt = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(receipt.success);

        // Missing field defaults to false.
        let receipt: SyncReceipt = serde_json::from_str("{}").unwrap();
        assert!(!receipt.success);
    }
}
