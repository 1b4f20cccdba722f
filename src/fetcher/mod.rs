pub mod details;
pub mod fingerprint;
pub mod http_fetcher;
pub mod index;
pub mod poller;
pub mod refresher;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;

/// Options for a single request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    /// Suppresses failure logging.
    pub quiet: bool,
    /// Aborts the request when cancelled, in addition to the transport timeout.
    pub cancel: Option<CancellationToken>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            quiet: false,
            cancel: None,
        }
    }
}

impl RequestOptions {
    pub fn head() -> Self {
        Self {
            method: Method::HEAD,
            ..Default::default()
        }
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn with_cancel(mut self, cancel: Option<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A successful (2xx) response with its body fully read.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TransportResponse {
    /// Header value as text, or an empty string when absent.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Declared media type without parameters, lowercased.
    pub fn media_type(&self) -> String {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// Executes one time-bounded request.
///
/// Implementations never retry. A timeout, a non-2xx status or any transport
/// failure yields `None`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, address: &str, options: RequestOptions) -> Option<TransportResponse>;
}
