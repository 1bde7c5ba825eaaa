//! # PWAKit Service Worker Engine
//!
//! Offline-first service-worker engine: versioned cache buckets with a
//! fixed prefetch manifest, cache-first / network-first retrieval, push
//! notification display, and background-sync tag dispatch.
//!
//! ## Features
//!
//! - **Lifecycle**: install (manifest prefetch), activate (stale bucket
//!   cleanup, client claim)
//! - **Fetch interception**: GET-only, configurable scheme exclusions,
//!   offline fallback for document requests
//! - **Push**: tolerant payload parsing, defaulted notification fields
//! - **Background sync**: tag registry mapped to backend endpoints
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerHost
//!     ├── CacheStorage
//!     │       └── CacheBucket (one per deployed version)
//!     │               └── url → CacheEntry
//!     ├── Clients (controlled windows)
//!     ├── dyn Fetch          (network seam)
//!     └── dyn NotificationSink (display seam)
//! ```
//!
//! At most one bucket is in the `Current` phase at a time; every other
//! bucket is garbage and is removed during activation.

use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod fetch;
pub mod host;
pub mod push;
pub mod sync;

pub use cache::{BucketPhase, CacheBucket, CacheEntry, CacheStorage, ResponseKind};
pub use clients::{Client, Clients};
pub use fetch::{
    Fetch, FetchRequest, FetchResponse, RequestDestination, RequestFilter, RetrievalStrategy,
};
pub use host::{
    NotificationClickEvent, OfflineFallback, ReadOutcome, ReadSource, ServiceWorkerConfig,
    ServiceWorkerHost, SwEvent,
};
pub use push::{
    parse_payload, Notification, NotificationAction, NotificationDefaults, NotificationPayload,
    NotificationSink,
};
pub use sync::{SyncReceipt, SyncRegistry};

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone)]
pub enum SwError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Version string naming the current cache bucket.
///
/// Injected through [`host::ServiceWorkerConfig`]; bumping it on deploy
/// supersedes the previous bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketVersion(String);

impl BucketVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BucketVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BucketVersion {
    fn from(version: &str) -> Self {
        Self::new(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_version_display() {
        let version = BucketVersion::new("app-v2");
        assert_eq!(version.as_str(), "app-v2");
        assert_eq!(version.to_string(), "app-v2");
    }

    #[test]
    fn test_bucket_version_eq() {
        assert_eq!(BucketVersion::from("v1"), BucketVersion::new("v1"));
        assert_ne!(BucketVersion::from("v1"), BucketVersion::from("v2"));
    }
}
