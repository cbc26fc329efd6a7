//! Canned-response transport for tests and offline tools.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::transport::{BoxFuture, Transport, TransportError, parse_json};

#[derive(Debug, Clone)]
enum Canned {
    Json(Value),
    Text(String),
    Status(u16),
    Unreachable(String),
}

/// In-memory transport answering from canned responses keyed by exact URL.
///
/// Unknown URLs answer HTTP 404. Every request is recorded so callers can
/// assert on network traffic.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    responses: Mutex<HashMap<String, Canned>>,
    requests: Mutex<Vec<String>>,
    posts: Mutex<Vec<(String, Value)>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(self, url: impl Into<String>, body: Value) -> Self {
        self.insert_json(url, body);
        self
    }

    pub fn with_text(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.responses
            .lock()
            .insert(url.into(), Canned::Text(body.into()));
        self
    }

    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.responses.lock().insert(url.into(), Canned::Status(status));
        self
    }

    pub fn with_unreachable(self, url: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses
            .lock()
            .insert(url.into(), Canned::Unreachable(message.into()));
        self
    }

    /// Replaces (or adds) a JSON response after construction.
    pub fn insert_json(&self, url: impl Into<String>, body: Value) {
        self.responses.lock().insert(url.into(), Canned::Json(body));
    }

    /// Every URL requested so far, GET and POST, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|u| *u == url).count()
    }

    pub fn posts(&self) -> Vec<(String, Value)> {
        self.posts.lock().clone()
    }

    fn answer(&self, url: &str) -> Result<String, TransportError> {
        self.requests.lock().push(url.to_string());
        match self.responses.lock().get(url).cloned() {
            Some(Canned::Json(value)) => Ok(value.to_string()),
            Some(Canned::Text(text)) => Ok(text),
            Some(Canned::Status(status)) => Err(TransportError::Status {
                url: url.to_string(),
                status,
            }),
            Some(Canned::Unreachable(message)) => Err(TransportError::Network {
                url: url.to_string(),
                message,
            }),
            None => Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

impl Transport for MemoryTransport {
    fn fetch_json<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Value, TransportError>> {
        Box::pin(async move {
            let body = self.answer(url)?;
            parse_json(url, &body)
        })
    }

    fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, TransportError>> {
        Box::pin(async move { self.answer(url) })
    }

    fn post_json<'a>(
        &'a self,
        url: &'a str,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, TransportError>> {
        Box::pin(async move {
            self.posts.lock().push((url.to_string(), body.clone()));
            let text = self.answer(url)?;
            parse_json(url, &text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryTransport;
    use crate::transport::{Transport, TransportError};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn memory_transport_serves_canned_bodies() {
        let transport = MemoryTransport::new()
            .with_json("https://example.com/a.json", json!({"ok": true}))
            .with_text("https://example.com/b.csv", "lat,lon\n1,2\n")
            .with_text("https://example.com/bad.json", "{not json");

        let a = transport.fetch_json("https://example.com/a.json").await.unwrap();
        assert_eq!(a, json!({"ok": true}));

        let b = transport.fetch_text("https://example.com/b.csv").await.unwrap();
        assert!(b.starts_with("lat,lon"));

        let bad = transport.fetch_json("https://example.com/bad.json").await;
        assert!(matches!(bad, Err(TransportError::Parse { .. })));

        let missing = transport.fetch_json("https://example.com/none").await;
        assert_eq!(
            missing,
            Err(TransportError::Status {
                url: "https://example.com/none".into(),
                status: 404
            })
        );
        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn posts_are_recorded() {
        let transport = MemoryTransport::new().with_json("https://example.com/fn", json!({"id": "x"}));
        let reply = transport
            .post_json("https://example.com/fn", &json!({"inputs": {}}))
            .await
            .unwrap();
        assert_eq!(reply, json!({"id": "x"}));
        assert_eq!(transport.posts()[0].1, json!({"inputs": {}}));
    }
}
