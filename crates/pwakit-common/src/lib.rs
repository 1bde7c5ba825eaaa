//! # PWAKit Common
//!
//! Common utilities and logging configuration for the PWAKit
//! service-worker engine.
//!
//! ## Features
//!
//! - Logging configuration and setup
//! - Retry utilities for best-effort network work
//! - Shared timestamp helper

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, RetryConfig};

/// Milliseconds since the Unix epoch.
///
/// Cache entries and notifications are stamped with this so they can be
/// compared without pulling in a date/time crate.
pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
