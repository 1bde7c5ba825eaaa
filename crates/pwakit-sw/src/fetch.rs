//! Fetch requests, responses, the network seam, and retrieval strategies.

use futures::future::BoxFuture;
use hashbrown::HashMap;
use url::Url;

use crate::cache::{self, CacheEntry, ResponseKind};
use crate::SwError;

/// What kind of resource the request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestDestination {
    #[default]
    Other,
    Document,
    Style,
    Script,
    Image,
    Font,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Request URL.
    pub url: Url,

    /// Request method.
    pub method: String,

    /// Request headers.
    pub headers: HashMap<String, String>,

    /// Destination resource kind.
    pub destination: RequestDestination,
}

impl FetchRequest {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: HashMap::new(),
            destination: RequestDestination::Other,
        }
    }

    /// Create a request with an explicit method.
    pub fn with_method(url: Url, method: &str) -> Self {
        Self {
            method: method.to_string(),
            ..Self::get(url)
        }
    }

    /// Set the destination.
    pub fn destination(mut self, destination: RequestDestination) -> Self {
        self.destination = destination;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Get a header value (name is case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Whether the requester expects an HTML document.
    ///
    /// The source variants disagree on the signal (`destination` vs the
    /// `Accept` header), so either counts.
    pub fn expects_document(&self) -> bool {
        if self.destination == RequestDestination::Document {
            return true;
        }
        self.get_header("accept")
            .map(|accept| accept.contains("text/html"))
            .unwrap_or(false)
    }

    /// Cache key for this request.
    pub fn cache_key(&self) -> &str {
        self.url.as_str()
    }
}

/// A response delivered to the read path.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Status code.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Whether the response was reached through a redirect.
    pub redirected: bool,

    /// Origin relationship of the response.
    pub kind: ResponseKind,
}

impl FetchResponse {
    /// Check if the response is a success (2xx).
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the response may be written back into a bucket: a direct
    /// (non-redirected, non-opaque) 200.
    pub fn is_storable(&self) -> bool {
        self.status == 200 && !self.redirected && self.kind == ResponseKind::Basic
    }

    /// Get a header value (name is case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
            .map(|(_, v)| v.as_str())
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.clone())
    }

    /// Convert into a cache entry keyed by the originating request.
    pub fn to_entry(&self, request: &FetchRequest) -> CacheEntry {
        cache::entry(
            request.cache_key(),
            &request.method,
            self.status,
            self.headers.clone(),
            self.body.clone(),
            self.redirected,
            self.kind,
        )
    }

    /// Rebuild a response from a cache entry.
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            status: entry.status,
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            redirected: entry.redirected,
            kind: entry.kind,
        }
    }

    /// Build an HTML response, used for the inline offline fallback.
    pub fn html(status: u16, html: &str) -> Self {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "text/html; charset=utf-8".to_string(),
        );
        Self {
            status,
            headers,
            body: html.as_bytes().to_vec(),
            redirected: false,
            kind: ResponseKind::Basic,
        }
    }
}

/// The network seam.
///
/// The host never talks to the network directly; embedders hand it an
/// implementation (see `pwakit-net` for the reqwest-backed one).
pub trait Fetch: Send + Sync {
    /// Perform a network fetch.
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<FetchResponse, SwError>>;
}

/// Which retrieval order the read path uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievalStrategy {
    /// Serve from the bucket if present, otherwise fetch and store.
    #[default]
    CacheFirst,
    /// Always attempt the network, fall back to the bucket on failure.
    NetworkFirst,
}

/// Decides which requests are intercepted at all.
///
/// Non-GET requests and excluded schemes pass straight through: they
/// are forwarded to the fetcher but never cached and never fall back.
#[derive(Debug, Clone)]
pub struct RequestFilter {
    /// URL schemes that are never intercepted.
    pub excluded_schemes: Vec<String>,
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self {
            excluded_schemes: vec!["chrome-extension".to_string()],
        }
    }
}

impl RequestFilter {
    pub fn new(excluded_schemes: Vec<String>) -> Self {
        Self { excluded_schemes }
    }

    /// Whether the read path applies caching to this request.
    pub fn should_intercept(&self, request: &FetchRequest) -> bool {
        if !request.is_get() {
            return false;
        }
        !self
            .excluded_schemes
            .iter()
            .any(|scheme| request.url.scheme() == scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_expects_document_via_destination() {
        let request = FetchRequest::get(url("https://example.com/page"))
            .destination(RequestDestination::Document);
        assert!(request.expects_document());
    }

    #[test]
    fn test_expects_document_via_accept_header() {
        let request = FetchRequest::get(url("https://example.com/page"))
            .header("Accept", "text/html,application/xhtml+xml");
        assert!(request.expects_document());

        let request = FetchRequest::get(url("https://example.com/data"))
            .header("Accept", "application/json");
        assert!(!request.expects_document());
    }

    #[test]
    fn test_filter_rejects_non_get() {
        let filter = RequestFilter::default();
        let request = FetchRequest::with_method(url("https://example.com/api"), "POST");
        assert!(!filter.should_intercept(&request));
    }

    #[test]
    fn test_filter_rejects_excluded_scheme() {
        let filter = RequestFilter::default();
        let request = FetchRequest::get(url("chrome-extension://abcdef/script.js"));
        assert!(!filter.should_intercept(&request));

        let request = FetchRequest::get(url("https://example.com/script.js"));
        assert!(filter.should_intercept(&request));
    }

    #[test]
    fn test_storable() {
        let ok = FetchResponse::html(200, "<p>hi</p>");
        assert!(ok.is_storable());

        let redirected = FetchResponse {
            redirected: true,
            ..ok.clone()
        };
        assert!(!redirected.is_storable());

        let opaque = FetchResponse {
            kind: ResponseKind::Opaque,
            ..ok.clone()
        };
        assert!(!opaque.is_storable());

        let not_found = FetchResponse { status: 404, ..ok };
        assert!(!not_found.is_storable());
    }

    #[test]
    fn test_entry_round_trip() {
        let request = FetchRequest::get(url("https://example.com/app.js"));
        let response = FetchResponse {
            status: 200,
            headers: HashMap::new(),
            body: b"console.log(1)".to_vec(),
            redirected: false,
            kind: ResponseKind::Basic,
        };

        let entry = response.to_entry(&request);
        assert_eq!(entry.url, "https://example.com/app.js");

        let rebuilt = FetchResponse::from_entry(&entry);
        assert_eq!(rebuilt.status, 200);
        assert_eq!(rebuilt.body, response.body);
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let response = FetchResponse::html(200, "x");
        assert_eq!(
            response.header("Content-Type"),
            Some("text/html; charset=utf-8")
        );
    }
}
