//! Short-link service contract and its HTTP client.

use std::sync::Arc;

use catalog::{BoxFuture, Transport};
use serde_json::Value;
use tracing::{info, warn};

use crate::document::ShareDocument;
use crate::error::ShareError;
use crate::link::{DecodedLink, LinkOptions, LinkPayload, encode, encode_token};

pub trait ShortLinkService: Send + Sync {
    /// Capability check; `false` makes callers fall back to full links.
    fn is_usable(&self) -> bool;

    fn get_share_token<'a>(
        &'a self,
        document: &'a ShareDocument,
    ) -> BoxFuture<'a, Result<String, ShareError>>;

    fn resolve_token<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<ShareDocument, ShareError>>;
}

/// Stores documents by `POST {endpoint}` (reply `{"id": token}`) and reads
/// them back with `GET {endpoint}/{token}`.
pub struct HttpShortLinkService {
    endpoint: Option<String>,
    transport: Arc<dyn Transport>,
}

impl HttpShortLinkService {
    pub fn new(endpoint: Option<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            endpoint: endpoint.filter(|e| !e.trim().is_empty()),
            transport,
        }
    }

    fn endpoint(&self) -> Result<&str, ShareError> {
        self.endpoint
            .as_deref()
            .map(|e| e.trim_end_matches('/'))
            .ok_or(ShareError::ShortenUnavailable)
    }
}

impl ShortLinkService for HttpShortLinkService {
    fn is_usable(&self) -> bool {
        self.endpoint.is_some()
    }

    fn get_share_token<'a>(
        &'a self,
        document: &'a ShareDocument,
    ) -> BoxFuture<'a, Result<String, ShareError>> {
        Box::pin(async move {
            let endpoint = self.endpoint()?;
            let body =
                serde_json::to_value(document).map_err(|e| ShareError::Encode(e.to_string()))?;
            let reply = self
                .transport
                .post_json(endpoint, &body)
                .await
                .map_err(|e| ShareError::Shorten(e.to_string()))?;
            reply
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ShareError::Shorten(format!("no id in reply from {endpoint}")))
        })
    }

    fn resolve_token<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<ShareDocument, ShareError>> {
        Box::pin(async move {
            let url = format!("{}/{token}", self.endpoint()?);
            let value = self.transport.fetch_json(&url).await?;
            ShareDocument::from_value(value)
        })
    }
}

/// Short link when a usable service is configured, the full link otherwise.
///
/// Once the short path is chosen its failures are returned as they are;
/// falling back at that point is left to the caller.
pub async fn shorten_if_possible(
    document: &ShareDocument,
    options: &LinkOptions,
    service: Option<&dyn ShortLinkService>,
) -> Result<String, ShareError> {
    match service {
        Some(service) if service.is_usable() => {
            let token = service.get_share_token(document).await?;
            info!(token = %token, "share link shortened");
            Ok(encode_token(&token, options))
        }
        _ => encode(document, options),
    }
}

/// The document a decoded link points at, fetching it for short links.
pub async fn resolve(
    decoded: &DecodedLink,
    service: Option<&dyn ShortLinkService>,
) -> Result<Option<ShareDocument>, ShareError> {
    match &decoded.payload {
        LinkPayload::Document(document) => Ok(Some(document.clone())),
        LinkPayload::Token(token) => {
            let Some(service) = service else {
                warn!(token = %token, "short link given but no short-link service configured");
                return Err(ShareError::ShortenUnavailable);
            };
            service.resolve_token(token).await.map(Some)
        }
        LinkPayload::None => Ok(None),
    }
}
