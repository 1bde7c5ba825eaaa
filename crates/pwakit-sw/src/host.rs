//! The service worker host: configuration, lifecycle, and event wiring.

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use pwakit_common::{retry_with_backoff, RetryConfig};

use crate::cache::{BucketPhase, CacheStorage};
use crate::clients::{Client, Clients};
use crate::fetch::{Fetch, FetchRequest, FetchResponse, RequestFilter, RetrievalStrategy};
use crate::push::{
    parse_payload, Notification, NotificationDefaults, NotificationSink,
};
use crate::sync::{SyncReceipt, SyncRegistry};
use crate::{BucketVersion, SwError};

/// Inline offline page served when neither network nor cache can
/// satisfy a document request.
const DEFAULT_OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Offline</title>
<style>
  body { font-family: sans-serif; display: flex; align-items: center;
         justify-content: center; min-height: 100vh; margin: 0;
         text-align: center; }
  .offline { max-width: 400px; padding: 40px; }
</style>
</head>
<body>
<div class="offline">
  <h1>You're offline</h1>
  <p>Check your connection and try again.</p>
  <button onclick="window.location.reload()">Retry</button>
</div>
</body>
</html>
"#;

/// What to serve when both network and cache miss for a document.
#[derive(Debug, Clone)]
pub enum OfflineFallback {
    /// Serve a pre-cached path (must be in the manifest to be useful).
    CachedPath(String),
    /// Serve an inline HTML literal.
    Inline(String),
}

impl Default for OfflineFallback {
    fn default() -> Self {
        Self::Inline(DEFAULT_OFFLINE_PAGE.to_string())
    }
}

/// Host configuration, injected at construction.
///
/// The version string decides the current bucket name; bumping it is an
/// explicit redeploy parameter.
#[derive(Debug, Clone)]
pub struct ServiceWorkerConfig {
    /// Current cache version.
    pub version: BucketVersion,

    /// Origin that relative manifest, sync, and click paths resolve
    /// against.
    pub origin: Url,

    /// URLs to prefetch at install time (absolute or origin-relative).
    pub manifest: Vec<String>,

    /// Retrieval strategy for the read path.
    pub strategy: RetrievalStrategy,

    /// Offline fallback for document requests.
    pub offline_fallback: OfflineFallback,

    /// Defaults applied to missing push payload fields.
    pub notification_defaults: NotificationDefaults,

    /// Landing path opened when a click carries no action and no URL.
    pub default_landing: String,

    /// Per-action navigation routes for notification clicks.
    pub click_routes: HashMap<String, String>,

    /// Registered background-sync tags.
    pub sync_tags: SyncRegistry,

    /// URL schemes that are never intercepted.
    pub excluded_schemes: Vec<String>,

    /// If set, activation only deletes stale buckets with this prefix.
    pub delete_only_prefixed: Option<String>,

    /// Retry policy for per-URL manifest prefetch during install.
    pub manifest_retry: RetryConfig,
}

impl Default for ServiceWorkerConfig {
    fn default() -> Self {
        Self {
            version: BucketVersion::new("v1"),
            origin: Url::parse("http://localhost/").expect("static origin URL"),
            manifest: Vec::new(),
            strategy: RetrievalStrategy::default(),
            offline_fallback: OfflineFallback::default(),
            notification_defaults: NotificationDefaults::default(),
            default_landing: "/".to_string(),
            click_routes: HashMap::new(),
            sync_tags: SyncRegistry::standard(),
            excluded_schemes: vec!["chrome-extension".to_string()],
            delete_only_prefixed: None,
            manifest_retry: RetryConfig::none(),
        }
    }
}

/// Host events.
#[derive(Debug, Clone)]
pub enum SwEvent {
    /// Install finished; `populated` counts stored manifest entries.
    Installed { version: String, populated: usize },
    /// Activation finished; `deleted` lists removed buckets.
    Activated { version: String, deleted: Vec<String> },
    /// A notification was displayed.
    NotificationShown { tag: String },
    /// A window was opened from a notification click.
    WindowOpened { url: String },
    /// A background sync ran against its endpoint.
    SyncCompleted { tag: String, success: bool },
}

/// Where a read response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Network,
    Cache,
    OfflineFallback,
}

/// Result of the read path.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub response: FetchResponse,
    pub source: ReadSource,
}

impl ReadOutcome {
    fn network(response: FetchResponse) -> Self {
        Self {
            response,
            source: ReadSource::Network,
        }
    }

    fn cache(response: FetchResponse) -> Self {
        Self {
            response,
            source: ReadSource::Cache,
        }
    }

    fn fallback(response: FetchResponse) -> Self {
        Self {
            response,
            source: ReadSource::OfflineFallback,
        }
    }
}

/// A notification click as delivered by the platform.
///
/// An empty `action` string is the default body click.
#[derive(Debug, Clone)]
pub struct NotificationClickEvent {
    pub action: String,
    pub notification: Notification,
}

/// The offline cache manager.
///
/// One instance per deployed version. Each lifecycle method is an
/// independent async task; the embedder awaits the returned future
/// before treating the event as settled.
pub struct ServiceWorkerHost {
    config: ServiceWorkerConfig,
    fetcher: Arc<dyn Fetch>,
    sink: Arc<dyn NotificationSink>,
    storage: Arc<RwLock<CacheStorage>>,
    clients: Arc<RwLock<Clients>>,
    filter: RequestFilter,
    event_tx: mpsc::UnboundedSender<SwEvent>,
}

impl ServiceWorkerHost {
    /// Create a host with fresh cache storage.
    pub fn new(
        config: ServiceWorkerConfig,
        fetcher: Arc<dyn Fetch>,
        sink: Arc<dyn NotificationSink>,
    ) -> (Self, mpsc::UnboundedReceiver<SwEvent>) {
        Self::with_storage(config, fetcher, sink, Arc::new(RwLock::new(CacheStorage::new())))
    }

    /// Create a host over existing storage.
    ///
    /// Version upgrades hand the previous deployment's storage to the
    /// new host so stale buckets can be found and removed.
    pub fn with_storage(
        config: ServiceWorkerConfig,
        fetcher: Arc<dyn Fetch>,
        sink: Arc<dyn NotificationSink>,
        storage: Arc<RwLock<CacheStorage>>,
    ) -> (Self, mpsc::UnboundedReceiver<SwEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let filter = RequestFilter::new(config.excluded_schemes.clone());

        (
            Self {
                config,
                fetcher,
                sink,
                storage,
                clients: Arc::new(RwLock::new(Clients::new())),
                filter,
                event_tx,
            },
            event_rx,
        )
    }

    /// Host configuration.
    pub fn config(&self) -> &ServiceWorkerConfig {
        &self.config
    }

    /// Shared cache storage handle.
    pub fn storage(&self) -> Arc<RwLock<CacheStorage>> {
        Arc::clone(&self.storage)
    }

    /// Shared clients handle.
    pub fn clients(&self) -> Arc<RwLock<Clients>> {
        Arc::clone(&self.clients)
    }

    fn version_str(&self) -> &str {
        self.config.version.as_str()
    }

    fn emit(&self, event: SwEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Resolve a possibly relative path against the configured origin.
    fn resolve(&self, target: &str) -> Result<Url, SwError> {
        match Url::parse(target) {
            Ok(url) => Ok(url),
            Err(_) => self
                .config
                .origin
                .join(target)
                .map_err(|e| SwError::InvalidUrl(format!("{target}: {e}"))),
        }
    }

    /// Install: open the current bucket and prefetch the manifest.
    ///
    /// Per-URL failures are logged and skipped. Returns as soon as the
    /// prefetch pass is done, without waiting on any prior instance
    /// (non-blocking takeover).
    pub async fn on_install(&self) -> Result<(), SwError> {
        let version = self.version_str().to_string();
        info!(version = %version, manifest = self.config.manifest.len(), "Installing");

        {
            let mut storage = self.storage.write().await;
            // A newer install supersedes any still-current bucket.
            for (name, bucket) in storage.buckets_mut() {
                if name != &version && bucket.phase() == BucketPhase::Current {
                    bucket.advance(BucketPhase::Stale);
                }
            }
            storage.open(&version);
        }

        let mut populated = 0usize;
        for target in &self.config.manifest {
            let url = match self.resolve(target) {
                Ok(url) => url,
                Err(e) => {
                    warn!(target, error = %e, "Skipping unresolvable manifest entry");
                    continue;
                }
            };

            let request = FetchRequest::get(url.clone());
            let result = retry_with_backoff(&self.config.manifest_retry, || {
                self.fetcher.fetch(request.clone())
            })
            .await;

            match result {
                Ok(response) if response.ok() => {
                    let entry = response.to_entry(&request);
                    if self.storage.write().await.put(&version, entry) {
                        populated += 1;
                    }
                }
                Ok(response) => {
                    warn!(url = %url, status = response.status, "Manifest entry not cached");
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Manifest entry fetch failed");
                }
            }
        }

        {
            let mut storage = self.storage.write().await;
            if let Some(bucket) = storage.get_mut(&version) {
                bucket.advance(BucketPhase::Populated);
            }
        }

        info!(version = %version, populated, "Install complete");
        self.emit(SwEvent::Installed { version, populated });
        Ok(())
    }

    /// Activate: delete stale buckets and claim all open clients.
    ///
    /// Idempotent; running it again for the same version deletes
    /// nothing further.
    pub async fn on_activate(&self) -> Result<(), SwError> {
        let version = self.version_str().to_string();
        let mut deleted = Vec::new();

        {
            let mut storage = self.storage.write().await;
            for name in storage.keys() {
                if name == version {
                    continue;
                }
                if let Some(prefix) = &self.config.delete_only_prefixed {
                    if !name.starts_with(prefix.as_str()) {
                        continue;
                    }
                }
                if storage.delete(&name) {
                    debug!(bucket = %name, "Deleted stale bucket");
                    deleted.push(name);
                }
            }

            storage.open(&version).advance(BucketPhase::Current);
        }

        self.clients.write().await.claim();

        info!(version = %version, deleted = deleted.len(), "Activated");
        self.emit(SwEvent::Activated { version, deleted });
        Ok(())
    }

    /// Read path: serve a request under the configured strategy.
    ///
    /// Non-GET requests and excluded schemes pass straight through to
    /// the network, untouched by the cache.
    pub async fn on_read(&self, request: FetchRequest) -> Result<ReadOutcome, SwError> {
        if !self.filter.should_intercept(&request) {
            debug!(url = %request.url, method = %request.method, "Pass-through request");
            let response = self.fetcher.fetch(request).await?;
            return Ok(ReadOutcome::network(response));
        }

        match self.config.strategy {
            RetrievalStrategy::CacheFirst => self.read_cache_first(request).await,
            RetrievalStrategy::NetworkFirst => self.read_network_first(request).await,
        }
    }

    async fn read_cache_first(&self, request: FetchRequest) -> Result<ReadOutcome, SwError> {
        if let Some(response) = self.lookup(&request).await {
            debug!(url = %request.url, "Cache hit");
            return Ok(ReadOutcome::cache(response));
        }

        match self.fetcher.fetch(request.clone()).await {
            Ok(response) => {
                self.store_if_storable(&request, &response).await;
                Ok(ReadOutcome::network(response))
            }
            Err(e) => self.network_failure(request, e).await,
        }
    }

    async fn read_network_first(&self, request: FetchRequest) -> Result<ReadOutcome, SwError> {
        match self.fetcher.fetch(request.clone()).await {
            Ok(response) => {
                self.store_if_storable(&request, &response).await;
                Ok(ReadOutcome::network(response))
            }
            Err(e) => {
                if let Some(response) = self.lookup(&request).await {
                    debug!(url = %request.url, "Network failed, serving from cache");
                    return Ok(ReadOutcome::cache(response));
                }
                self.network_failure(request, e).await
            }
        }
    }

    /// Shared tail of the fallback chain: offline page for documents,
    /// the original network error for everything else.
    async fn network_failure(
        &self,
        request: FetchRequest,
        error: SwError,
    ) -> Result<ReadOutcome, SwError> {
        if request.expects_document() {
            if let Some(response) = self.offline_response().await {
                warn!(url = %request.url, "Serving offline fallback");
                return Ok(ReadOutcome::fallback(response));
            }
        }
        warn!(url = %request.url, error = %error, "Read failed with no fallback");
        Err(error)
    }

    /// Look the request up in the current bucket.
    async fn lookup(&self, request: &FetchRequest) -> Option<FetchResponse> {
        let storage = self.storage.read().await;
        storage
            .get(self.version_str())
            .and_then(|bucket| bucket.match_url(request.cache_key()))
            .map(FetchResponse::from_entry)
    }

    /// Opportunistic write-back. Failures never reach the read path.
    async fn store_if_storable(&self, request: &FetchRequest, response: &FetchResponse) {
        if !response.is_storable() {
            return;
        }
        let entry = response.to_entry(request);
        let mut storage = self.storage.write().await;
        if !storage.put(self.version_str(), entry) {
            debug!(url = %request.url, "Cache write dropped");
        }
    }

    async fn offline_response(&self) -> Option<FetchResponse> {
        match &self.config.offline_fallback {
            OfflineFallback::Inline(html) => Some(FetchResponse::html(200, html)),
            OfflineFallback::CachedPath(path) => {
                let url = self.resolve(path).ok()?;
                let storage = self.storage.read().await;
                // Any bucket will do; during an upgrade the new bucket
                // may not hold the page yet.
                storage.match_url(url.as_str()).map(FetchResponse::from_entry)
            }
        }
    }

    /// Push: parse the payload and display a notification.
    ///
    /// Total: malformed payloads degrade to defaults and sink failures
    /// are logged, never returned.
    pub async fn on_push(&self, payload: &[u8]) {
        let parsed = parse_payload(payload);
        let notification =
            Notification::from_payload(parsed, &self.config.notification_defaults);
        let tag = notification.tag.clone();

        debug!(title = %notification.title, tag = %tag, "Displaying notification");
        match self.sink.show(notification) {
            Ok(()) => self.emit(SwEvent::NotificationShown { tag }),
            Err(e) => warn!(error = %e, "Notification sink failed"),
        }
    }

    /// Notification click: close the notification and open the target.
    ///
    /// Target resolution order: configured action route, then the
    /// notification's `data.url`, then the default landing path.
    pub async fn on_notification_click(
        &self,
        event: NotificationClickEvent,
    ) -> Result<Client, SwError> {
        self.sink.close(&event.notification);

        let target = if event.action.is_empty() {
            None
        } else {
            self.config.click_routes.get(&event.action).cloned()
        };
        let target = target
            .or_else(|| event.notification.data_url().map(str::to_string))
            .unwrap_or_else(|| self.config.default_landing.clone());

        let url = self.resolve(&target)?;
        let client = self.clients.write().await.open_window(url.clone());

        debug!(url = %url, client = %client.id, "Opened window from notification");
        self.emit(SwEvent::WindowOpened {
            url: url.to_string(),
        });
        Ok(client)
    }

    /// Background sync: dispatch a tag against its endpoint.
    ///
    /// Unknown tags are ignored; fetch and decode failures are logged
    /// and swallowed.
    pub async fn on_sync(&self, tag: &str) {
        let Some(endpoint) = self.config.sync_tags.endpoint(tag) else {
            debug!(tag, "Ignoring unknown sync tag");
            return;
        };

        let url = match self.resolve(endpoint) {
            Ok(url) => url,
            Err(e) => {
                warn!(tag, endpoint, error = %e, "Sync endpoint does not resolve");
                return;
            }
        };

        match self.fetcher.fetch(FetchRequest::get(url.clone())).await {
            Ok(response) => match serde_json::from_slice::<SyncReceipt>(&response.body) {
                Ok(receipt) => {
                    if receipt.success {
                        info!(tag, "Sync completed");
                    } else {
                        warn!(tag, "Sync endpoint reported failure");
                    }
                    self.emit(SwEvent::SyncCompleted {
                        tag: tag.to_string(),
                        success: receipt.success,
                    });
                }
                Err(e) => warn!(tag, error = %e, "Sync receipt was not valid JSON"),
            },
            Err(e) => warn!(tag, url = %url, error = %e, "Sync fetch failed"),
        }
    }
}
