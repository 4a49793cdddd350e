//! HTTP proxy fetcher.
//!
//! Pages are fetched by POSTing a [`ProxyRequest`] envelope to a forwarding
//! proxy, which relays it to the upstream resource. The actual HTTP client
//! is abstracted via a trait to allow different implementations (reqwest,
//! hyper, etc.).

use crate::error::{SyncError, SyncResult};
use crate::fetch::PageFetch;
use async_trait::async_trait;
use ledgersync_protocol::{PageEnvelope, PaginationStyle, ProxyRequest};

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. This allows
/// using different HTTP libraries (reqwest, hyper, ureq, etc.) without the
/// engine depending on any of them.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body and returns the raw response
    /// body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// Configuration for the proxy fetcher.
///
/// Carries the persisted deployment settings (proxy URL, upstream endpoint,
/// token, parameter naming). When these change, callers build a fresh
/// fetcher and engine rather than mutating a live one.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// URL of the forwarding proxy.
    pub proxy_url: String,
    /// Upstream endpoint the proxy relays page requests to.
    pub endpoint: String,
    /// Bearer token forwarded to the upstream, if it requires one.
    pub token: Option<String>,
    /// Query-parameter naming convention expected by the upstream.
    pub pagination: PaginationStyle,
}

impl ProxyConfig {
    /// Creates a proxy configuration.
    pub fn new(proxy_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            proxy_url: proxy_url.into(),
            endpoint: endpoint.into(),
            token: None,
            pagination: PaginationStyle::default(),
        }
    }

    /// Sets the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the pagination parameter naming convention.
    pub fn with_pagination(mut self, pagination: PaginationStyle) -> Self {
        self.pagination = pagination;
        self
    }
}

/// A [`PageFetch`] implementation that goes through the forwarding proxy.
///
/// Encodes each page request as a JSON [`ProxyRequest`], POSTs it to the
/// proxy, and decodes the [`PageEnvelope`] that comes back.
pub struct ProxyFetcher<C: HttpClient> {
    config: ProxyConfig,
    client: C,
}

impl<C: HttpClient> ProxyFetcher<C> {
    /// Creates a new proxy fetcher.
    pub fn new(config: ProxyConfig, client: C) -> Self {
        Self { config, client }
    }

    /// Returns the fetcher configuration.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

#[async_trait]
impl<C: HttpClient> PageFetch for ProxyFetcher<C> {
    async fn fetch_page(&self, page: u64, page_size: u32) -> SyncResult<PageEnvelope> {
        let request = ProxyRequest::page(
            self.config.endpoint.clone(),
            self.config.token.clone(),
            self.config.pagination,
            page,
            page_size,
        );
        let body = serde_json::to_vec(&request)
            .map_err(|e| SyncError::Protocol(format!("failed to encode proxy request: {e}")))?;

        let response = self
            .client
            .post(&self.config.proxy_url, body)
            .await
            .map_err(SyncError::Transport)?;

        serde_json::from_slice(&response)
            .map_err(|e| SyncError::Protocol(format!("failed to decode page response: {e}")))
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST request and returns the response body.
    fn handle_post(&self, url: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

/// An HTTP client that routes requests directly to an in-process server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        self.server.handle_post(url, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_protocol::Record;
    use serde_json::json;
    use std::sync::Mutex;

    struct TestClient {
        response: Result<Vec<u8>, String>,
        last_body: Mutex<Option<Vec<u8>>>,
    }

    impl TestClient {
        fn replying(response: Result<Vec<u8>, String>) -> Self {
            Self {
                response,
                last_body: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl HttpClient for TestClient {
        async fn post(&self, _url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
            *self.last_body.lock().unwrap() = Some(body);
            self.response.clone()
        }
    }

    fn envelope_bytes(envelope: &PageEnvelope) -> Vec<u8> {
        serde_json::to_vec(envelope).unwrap()
    }

    #[tokio::test]
    async fn wraps_page_requests_in_the_proxy_envelope() {
        let envelope = PageEnvelope::page(
            vec![Record::from_value(json!({"id": 1})).unwrap()],
            Some(1),
        );
        let config = ProxyConfig::new("https://proxy.example.com/forward", "/buyers")
            .with_token("secret")
            .with_pagination(PaginationStyle::Perpage);
        let fetcher = ProxyFetcher::new(config, TestClient::replying(Ok(envelope_bytes(&envelope))));

        let result = fetcher.fetch_page(2, 50).await.unwrap();
        assert!(result.ok);

        let body = fetcher.client.last_body.lock().unwrap().clone().unwrap();
        let sent: ProxyRequest = serde_json::from_slice(&body).unwrap();
        assert_eq!(sent.endpoint, "/buyers");
        assert_eq!(sent.token.as_deref(), Some("secret"));
        assert_eq!(sent.method, "POST");
        assert_eq!(sent.params.get("pagination[page]"), Some(&json!(2)));
        assert_eq!(sent.params.get("pagination[perpage]"), Some(&json!(50)));
    }

    #[tokio::test]
    async fn maps_client_failures_to_transport_errors() {
        let config = ProxyConfig::new("https://proxy.example.com/forward", "/buyers");
        let fetcher = ProxyFetcher::new(config, TestClient::replying(Err("503".into())));

        let error = fetcher.fetch_page(1, 50).await.unwrap_err();
        assert!(matches!(error, SyncError::Transport(message) if message == "503"));
    }

    #[tokio::test]
    async fn maps_malformed_bodies_to_protocol_errors() {
        let config = ProxyConfig::new("https://proxy.example.com/forward", "/buyers");
        let fetcher = ProxyFetcher::new(config, TestClient::replying(Ok(b"not json".to_vec())));

        let error = fetcher.fetch_page(1, 50).await.unwrap_err();
        assert!(matches!(error, SyncError::Protocol(_)));
    }

    #[tokio::test]
    async fn rejected_envelopes_pass_through_for_the_engine_to_classify() {
        let envelope = PageEnvelope::error("upstream 502");
        let config = ProxyConfig::new("https://proxy.example.com/forward", "/buyers");
        let fetcher = ProxyFetcher::new(config, TestClient::replying(Ok(envelope_bytes(&envelope))));

        let result = fetcher.fetch_page(1, 50).await.unwrap();
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("upstream 502"));
    }

    #[tokio::test]
    async fn loopback_client_routes_to_the_server() {
        struct EchoServer;
        impl LoopbackServer for EchoServer {
            fn handle_post(&self, _url: &str, body: &[u8]) -> Result<Vec<u8>, String> {
                Ok(body.to_vec())
            }
        }

        let client = LoopbackClient::new(EchoServer);
        let reply = client.post("loopback://proxy", b"ping".to_vec()).await.unwrap();
        assert_eq!(reply, b"ping");
    }
}
