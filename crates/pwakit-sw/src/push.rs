//! Push payload parsing and notification construction.
//!
//! Push payloads arrive from an external event source and are never
//! trusted: anything that is not the expected JSON shape degrades to a
//! plain-text or fully defaulted notification. The push path is total.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use pwakit_common::epoch_millis;

use crate::SwError;

/// An action button on a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    /// Action identifier carried back on click.
    pub action: String,

    /// Button label.
    pub title: String,

    /// Optional button icon URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// The raw push payload, every field optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub tag: Option<String>,

    /// Free-form data forwarded to the click handler.
    #[serde(default)]
    pub data: JsonValue,

    #[serde(default)]
    pub actions: Vec<NotificationAction>,

    #[serde(default)]
    pub require_interaction: bool,
}

/// Defaults applied to missing payload fields.
#[derive(Debug, Clone)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "Notification".to_string(),
            body: "You have a new notification.".to_string(),
            icon: "/static/icons/icon-192.png".to_string(),
            badge: "/static/icons/badge-72.png".to_string(),
            tag: "general".to_string(),
            vibrate: vec![200, 100, 200],
        }
    }
}

/// A fully resolved notification, ready for display.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub vibrate: Vec<u32>,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
    pub data: JsonValue,
    /// Creation timestamp (ms since epoch).
    pub timestamp: u64,
}

impl Notification {
    /// Resolve a payload against the configured defaults.
    pub fn from_payload(payload: NotificationPayload, defaults: &NotificationDefaults) -> Self {
        Self {
            title: payload.title.unwrap_or_else(|| defaults.title.clone()),
            body: payload.body.unwrap_or_else(|| defaults.body.clone()),
            icon: payload.icon.unwrap_or_else(|| defaults.icon.clone()),
            badge: payload.badge.unwrap_or_else(|| defaults.badge.clone()),
            tag: payload.tag.unwrap_or_else(|| defaults.tag.clone()),
            vibrate: defaults.vibrate.clone(),
            require_interaction: payload.require_interaction,
            actions: payload.actions,
            data: payload.data,
            timestamp: epoch_millis(),
        }
    }

    /// The navigation target carried in the data object, if any.
    pub fn data_url(&self) -> Option<&str> {
        self.data.get("url").and_then(|v| v.as_str())
    }
}

/// Parse raw push bytes into a payload. Never fails.
///
/// JSON object → structured payload; anything else non-empty → the raw
/// bytes become the body text; empty → fully defaulted payload.
pub fn parse_payload(bytes: &[u8]) -> NotificationPayload {
    if bytes.is_empty() {
        return NotificationPayload::default();
    }

    match serde_json::from_slice::<NotificationPayload>(bytes) {
        Ok(payload) => payload,
        Err(err) => {
            debug!(error = %err, "Push payload is not JSON, treating as text");
            NotificationPayload {
                body: Some(String::from_utf8_lossy(bytes).into_owned()),
                ..Default::default()
            }
        }
    }
}

/// Display seam for notifications.
///
/// The host shows and closes notifications through this trait; the
/// real implementation belongs to the embedding platform.
pub trait NotificationSink: Send + Sync {
    /// Display a notification.
    fn show(&self, notification: Notification) -> Result<(), SwError>;

    /// Close a displayed notification.
    fn close(&self, notification: &Notification);
}
