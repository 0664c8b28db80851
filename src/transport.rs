use crate::error::{ReolinkError, Result};
use async_trait::async_trait;
use tokio::time::Duration;
use url::Url;

/// HTTP method for one exchange. Command batches POST, binary fetches GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Raw outcome of one exchange. Status is surfaced so the engine can treat
/// an unauthorized response as a token-rejection signal.
#[derive(Debug)]
pub struct Exchange {
    pub status: u16,
    pub body: Vec<u8>,
}

/// One HTTP exchange against the device.
///
/// The engine is agnostic to the implementation behind this trait; tests
/// drive it with a mock server, production uses [`HttpTransport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, method: Method, url: Url, body: Option<Vec<u8>>) -> Result<Exchange>;
}

/// `reqwest`-backed transport honoring the TLS policy and timeout chosen at
/// client construction.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reolink-rs/", env!("CARGO_PKG_VERSION")));

        if accept_invalid_certs {
            // Most of these devices ship self-signed certificates.
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| ReolinkError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, method: Method, url: Url, body: Option<Vec<u8>>) -> Result<Exchange> {
        let mut request = match method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
        };

        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ReolinkError::Transport("request timed out".to_string())
            } else {
                ReolinkError::Transport(format!("exchange failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ReolinkError::Transport(format!("failed to read body: {e}")))?
            .to_vec();

        Ok(Exchange { status, body })
    }
}
