//! # PWAKit Net
//!
//! The `reqwest`-backed implementation of the engine's network seam.
//!
//! Translates [`pwakit_sw::FetchRequest`] into real HTTP calls and maps
//! the response back into the engine's wire form, including the
//! redirect flag and the origin relationship the cache strategies use
//! to decide storability.

use std::time::Duration;

use futures::future::BoxFuture;
use hashbrown::HashMap;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

use pwakit_sw::{Fetch, FetchRequest, FetchResponse, ResponseKind, SwError};

/// Errors building the fetcher itself.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Client build failed: {0}")]
    Build(String),
}

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Default request timeout.
    pub timeout: Duration,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("PWAKit/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// HTTP fetcher over `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with default configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(LoaderConfig::default())
    }

    /// Create a fetcher with custom configuration.
    pub fn with_config(config: LoaderConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| FetchError::Build(e.to_string()))?;

        debug!(user_agent = %config.user_agent, "HttpFetcher initialized");
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<FetchResponse, SwError>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|_| SwError::Network(format!("invalid method: {}", request.method)))?;

            let original_url = request.url.clone();
            debug!(url = %original_url, method = %method, "Fetching");

            let mut builder = self.client.request(method, original_url.clone());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| SwError::Network(e.to_string()))?;

            let status = response.status().as_u16();
            let final_url = response.url().clone();
            let redirected = final_url != original_url;
            let kind = if same_origin(&original_url, &final_url) {
                ResponseKind::Basic
            } else {
                ResponseKind::Cors
            };

            let mut headers = HashMap::new();
            for (name, value) in response.headers() {
                if let Ok(value) = value.to_str() {
                    headers.insert(name.as_str().to_string(), value.to_string());
                }
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| SwError::Network(e.to_string()))?
                .to_vec();

            trace!(url = %final_url, status, redirected, body_len = body.len(), "Response received");

            Ok(FetchResponse {
                status,
                headers,
                body,
                redirected,
                kind,
            })
        })
    }
}

/// Whether two URLs share scheme, host, and port.
fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwakit_sw::{
        BucketVersion, Notification, NotificationSink, ReadSource, ServiceWorkerConfig,
        ServiceWorkerHost,
    };
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoopSink;

    impl NotificationSink for NoopSink {
        fn show(&self, _notification: Notification) -> Result<(), SwError> {
            Ok(())
        }

        fn close(&self, _notification: &Notification) {}
    }

    #[test]
    fn test_same_origin() {
        let a = Url::parse("https://example.com/a").unwrap();
        let b = Url::parse("https://example.com:443/b").unwrap();
        let c = Url::parse("https://cdn.example.com/a").unwrap();

        assert!(same_origin(&a, &b));
        assert!(!same_origin(&a, &c));
    }

    #[tokio::test]
    async fn test_fetch_translates_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("world", "text/plain"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&format!("{}/hello", server.uri())).unwrap();
        let response = fetcher.fetch(FetchRequest::get(url)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"world");
        assert!(!response.redirected);
        assert_eq!(response.kind, ResponseKind::Basic);
        assert!(response.is_storable());
    }

    #[tokio::test]
    async fn test_fetch_marks_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "/new"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("moved", "text/plain"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
        let response = fetcher.fetch(FetchRequest::get(url)).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(response.redirected);
        // Redirected responses are not written back to the cache.
        assert!(!response.is_storable());
    }

    #[tokio::test]
    async fn test_fetch_connection_error() {
        let fetcher = HttpFetcher::new().unwrap();
        // Port 0 is never connectable.
        let url = Url::parse("http://127.0.0.1:0/").unwrap();
        let result = fetcher.fetch(FetchRequest::get(url)).await;

        assert!(matches!(result, Err(SwError::Network(_))));
    }

    #[tokio::test]
    async fn test_host_round_trip_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html>home</html>", "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/static/app.css"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("body{}", "text/css"))
            .mount(&server)
            .await;

        let config = ServiceWorkerConfig {
            version: BucketVersion::new("v1"),
            origin: Url::parse(&server.uri()).unwrap(),
            manifest: vec!["/".to_string(), "/static/app.css".to_string()],
            ..Default::default()
        };

        let fetcher = Arc::new(HttpFetcher::new().unwrap());
        let (host, _rx) = ServiceWorkerHost::new(config, fetcher, Arc::new(NoopSink));

        host.on_install().await.unwrap();
        host.on_activate().await.unwrap();

        // Served from the bucket even though the server is gone.
        drop(server);
        let url = Url::parse(&format!("{}static/app.css", host.config().origin)).unwrap();
        let outcome = host.on_read(FetchRequest::get(url)).await.unwrap();
        assert_eq!(outcome.source, ReadSource::Cache);
        assert_eq!(outcome.response.body, b"body{}");
    }
}
