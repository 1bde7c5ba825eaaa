//! Versioned cache buckets and the storage that holds them.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pwakit_common::epoch_millis;

/// How the response was obtained relative to the requesting origin.
///
/// Mirrors the distinction the retrieval strategies care about: only
/// direct same-origin (`Basic`) responses are stored opportunistically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Same-origin response.
    #[default]
    Basic,
    /// Cross-origin response with readable body.
    Cors,
    /// Cross-origin response with an unreadable body.
    Opaque,
}

/// A cached request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method (GET only in practice).
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Whether the response was reached through a redirect.
    pub redirected: bool,

    /// Origin relationship of the response.
    pub kind: ResponseKind,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

/// Lifecycle phase of a bucket.
///
/// Phases only move forward; "absent" and "deleted" are represented by
/// the bucket not existing in [`CacheStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BucketPhase {
    /// Created during install, manifest prefetch in progress.
    Installing,
    /// Manifest prefetch finished (best-effort).
    Populated,
    /// Serving traffic for the active version.
    Current,
    /// Superseded by a newer version's install; deleted on its activate.
    Stale,
}

/// A named cache bucket holding responses for one deployed version.
#[derive(Debug, Clone)]
pub struct CacheBucket {
    name: String,
    phase: BucketPhase,
    entries: HashMap<String, CacheEntry>,
}

impl CacheBucket {
    /// Create a new bucket in the `Installing` phase.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            phase: BucketPhase::Installing,
            entries: HashMap::new(),
        }
    }

    /// Bucket name (the version string).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> BucketPhase {
        self.phase
    }

    /// Advance to a later phase. Backwards transitions are ignored.
    ///
    /// Returns `true` if the phase changed.
    pub fn advance(&mut self, phase: BucketPhase) -> bool {
        if phase <= self.phase {
            return false;
        }
        debug!(bucket = %self.name, from = ?self.phase, to = ?phase, "Bucket phase change");
        self.phase = phase;
        true
    }

    /// Match a request URL.
    pub fn match_url(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    /// Store an entry, replacing any previous one for the same URL.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.url.clone(), entry);
    }

    /// Delete an entry.
    pub fn delete(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    /// All stored URLs.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All cache buckets, keyed by version string.
#[derive(Debug, Default)]
pub struct CacheStorage {
    buckets: HashMap<String, CacheBucket>,
}

impl CacheStorage {
    /// Create empty cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a bucket, creating it in the `Installing` phase if absent.
    pub fn open(&mut self, name: &str) -> &mut CacheBucket {
        self.buckets
            .entry(name.to_string())
            .or_insert_with(|| CacheBucket::new(name))
    }

    /// Check if a bucket exists.
    pub fn has(&self, name: &str) -> bool {
        self.buckets.contains_key(name)
    }

    /// Get a bucket.
    pub fn get(&self, name: &str) -> Option<&CacheBucket> {
        self.buckets.get(name)
    }

    /// Get a bucket mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut CacheBucket> {
        self.buckets.get_mut(name)
    }

    /// Delete a bucket and everything in it.
    pub fn delete(&mut self, name: &str) -> bool {
        self.buckets.remove(name).is_some()
    }

    /// All bucket names.
    pub fn keys(&self) -> Vec<String> {
        self.buckets.keys().cloned().collect()
    }

    /// Iterate buckets mutably.
    pub fn buckets_mut(&mut self) -> impl Iterator<Item = (&String, &mut CacheBucket)> {
        self.buckets.iter_mut()
    }

    /// Store an entry into a named bucket.
    ///
    /// A put into a missing bucket is a silent no-op: a write racing a
    /// bucket delete must not surface on the read path. Returns whether
    /// the entry was stored.
    pub fn put(&mut self, bucket: &str, entry: CacheEntry) -> bool {
        match self.buckets.get_mut(bucket) {
            Some(b) => {
                b.put(entry);
                true
            }
            None => {
                debug!(bucket, "Cache write skipped, bucket no longer exists");
                false
            }
        }
    }

    /// Match a URL across all buckets.
    pub fn match_url(&self, url: &str) -> Option<&CacheEntry> {
        self.buckets.values().find_map(|b| b.match_url(url))
    }
}

/// Build a cache entry stamped with the current time.
pub fn entry(
    url: &str,
    method: &str,
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    redirected: bool,
    kind: ResponseKind,
) -> CacheEntry {
    CacheEntry {
        url: url.to_string(),
        method: method.to_string(),
        status,
        headers,
        body,
        redirected,
        kind,
        cached_at: epoch_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entry(url: &str) -> CacheEntry {
        entry(
            url,
            "GET",
            200,
            HashMap::new(),
            b"hello".to_vec(),
            false,
            ResponseKind::Basic,
        )
    }

    #[test]
    fn test_bucket_put_and_match() {
        let mut bucket = CacheBucket::new("v1");
        bucket.put(test_entry("https://example.com/style.css"));

        assert!(bucket.match_url("https://example.com/style.css").is_some());
        assert!(bucket.match_url("https://example.com/other.css").is_none());
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn test_bucket_delete() {
        let mut bucket = CacheBucket::new("v1");
        bucket.put(test_entry("https://example.com/a.js"));

        assert!(bucket.delete("https://example.com/a.js"));
        assert!(!bucket.delete("https://example.com/a.js"));
        assert!(bucket.is_empty());
    }

    #[test]
    fn test_phase_only_moves_forward() {
        let mut bucket = CacheBucket::new("v1");
        assert_eq!(bucket.phase(), BucketPhase::Installing);

        assert!(bucket.advance(BucketPhase::Populated));
        assert!(bucket.advance(BucketPhase::Current));

        // Backwards and repeated transitions are ignored.
        assert!(!bucket.advance(BucketPhase::Populated));
        assert!(!bucket.advance(BucketPhase::Current));
        assert_eq!(bucket.phase(), BucketPhase::Current);

        assert!(bucket.advance(BucketPhase::Stale));
        assert_eq!(bucket.phase(), BucketPhase::Stale);
    }

    #[test]
    fn test_storage_open_has_delete() {
        let mut storage = CacheStorage::new();
        assert!(!storage.has("v1"));

        storage.open("v1");
        assert!(storage.has("v1"));
        assert_eq!(storage.get("v1").map(|b| b.phase()), Some(BucketPhase::Installing));

        assert!(storage.delete("v1"));
        assert!(!storage.has("v1"));
        assert!(!storage.delete("v1"));
    }

    #[test]
    fn test_put_into_missing_bucket_is_noop() {
        let mut storage = CacheStorage::new();
        storage.open("v1");
        storage.delete("v1");

        // The racing write must neither fail nor resurrect the bucket.
        assert!(!storage.put("v1", test_entry("https://example.com/late.js")));
        assert!(!storage.has("v1"));
    }

    #[test]
    fn test_match_across_buckets() {
        let mut storage = CacheStorage::new();
        storage.open("v1").put(test_entry("https://example.com/a.js"));
        storage.open("v2").put(test_entry("https://example.com/b.js"));

        assert!(storage.match_url("https://example.com/a.js").is_some());
        assert!(storage.match_url("https://example.com/b.js").is_some());
        assert!(storage.match_url("https://example.com/c.js").is_none());
    }

    #[test]
    fn test_entry_round_trip_bytes() {
        let mut storage = CacheStorage::new();
        let body = vec![0u8, 159, 146, 150];
        let mut e = test_entry("https://example.com/blob");
        e.body = body.clone();
        storage.open("v1").put(e);

        let stored = storage.get("v1").and_then(|b| b.match_url("https://example.com/blob"));
        assert_eq!(stored.map(|e| e.body.as_slice()), Some(body.as_slice()));
    }
}
