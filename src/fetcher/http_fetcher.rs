use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::Result;
use crate::config::TransportConfig;
use crate::fetcher::{RequestOptions, Transport, TransportResponse};

/// reqwest-backed [`Transport`] with a fixed per-request timeout.
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Self::with_config(&TransportConfig::default())
    }

    pub fn with_config(config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            timeout: config.timeout(),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, address: &str, options: RequestOptions) -> Option<TransportResponse> {
        let quiet = options.quiet;
        let response = match self
            .client
            .request(options.method, address)
            .headers(options.headers)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if !quiet {
                    warn!(%address, error = %e, "Request failed");
                }
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            if !quiet {
                warn!(%address, %status, "Request returned non-success status");
            }
            return None;
        }

        let headers = response.headers().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                if !quiet {
                    warn!(%address, error = %e, "Failed to read response body");
                }
                return None;
            }
        };

        Some(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, address: &str, mut options: RequestOptions) -> Option<TransportResponse> {
        let quiet = options.quiet;
        let cancel = options.cancel.take().unwrap_or_else(CancellationToken::new);

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%address, "Request aborted");
                None
            }
            outcome = tokio::time::timeout(self.timeout, self.execute(address, options)) => {
                match outcome {
                    Ok(response) => response,
                    Err(_) => {
                        if !quiet {
                            warn!(%address, timeout_ms = self.timeout.as_millis() as u64, "Request timed out");
                        }
                        None
                    }
                }
            }
        }
    }
}
