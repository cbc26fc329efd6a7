//! Network transport used by providers, replay and feedback.
//!
//! The catalog never talks to `reqwest` directly; everything goes through the
//! [`Transport`] trait so tests and offline tools can substitute an
//! in-memory transport (`test-utils` feature).

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The request never produced a response (DNS, TLS, refused, CORS).
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    /// A response arrived but its body could not be decoded.
    #[error("could not decode response from {url}: {message}")]
    Parse { url: String, message: String },
}

impl TransportError {
    pub fn url(&self) -> &str {
        match self {
            TransportError::Network { url, .. }
            | TransportError::Status { url, .. }
            | TransportError::Parse { url, .. } => url,
        }
    }
}

/// HTTP collaborator.
///
/// Implementations must be `Send + Sync` for use across async tasks.
/// Methods return boxed futures for dyn-compatibility.
pub trait Transport: Send + Sync {
    fn fetch_json<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Value, TransportError>>;

    fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, TransportError>>;

    fn post_json<'a>(
        &'a self,
        url: &'a str,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, TransportError>>;
}

pub(crate) fn parse_json(url: &str, body: &str) -> Result<Value, TransportError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| TransportError::Parse {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn read_body(url: &str, resp: reqwest::Response) -> Result<String, TransportError> {
        if !resp.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        resp.text().await.map_err(|e| TransportError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

impl Transport for HttpTransport {
    fn fetch_json<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Value, TransportError>> {
        Box::pin(async move {
            let body = self.fetch_text(url).await?;
            parse_json(url, &body)
        })
    }

    fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, TransportError>> {
        Box::pin(async move {
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| TransportError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            Self::read_body(url, resp).await
        })
    }

    fn post_json<'a>(
        &'a self,
        url: &'a str,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, TransportError>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(|e| TransportError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            let text = Self::read_body(url, resp).await?;
            parse_json(url, &text)
        })
    }
}
