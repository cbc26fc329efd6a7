//! Error types for catalog operations.

use thiserror::Error;

use crate::node::{MemberType, NodeId};
use crate::transport::TransportError;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors raised by structural catalog operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("catalog node not found: {0}")]
    NotFound(NodeId),

    #[error("a catalog node with id {0} already exists")]
    DuplicateId(NodeId),

    #[error("catalog node {0} is not a group")]
    NotAGroup(NodeId),

    #[error("catalog node {0} is not an item")]
    NotAnItem(NodeId),

    #[error("the root group cannot be removed or moved")]
    RootIsFixed,

    #[error("cannot move {id} into its own subtree ({parent})")]
    WouldCreateCycle { id: NodeId, parent: NodeId },

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Errors attached to a node whose load failed.
///
/// Cloneable so that every waiter on a single-flight load receives the same
/// outcome, and so the error can be kept on the node while it sits in
/// `LoadState::Failed`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    /// The provider could not be reached (network, CORS, HTTP status).
    #[error("could not reach {url}: {message}")]
    Transport { url: String, message: String },

    /// The provider answered with something that does not match its type.
    #[error("unexpected response from {url}: {message}")]
    Format { url: String, message: String },

    #[error("no provider registered for type {0}")]
    NoProvider(MemberType),

    #[error("catalog node not found: {0}")]
    NotFound(NodeId),

    /// The node was removed from the tree while its load was in flight.
    #[error("catalog node {0} was removed while loading")]
    Detached(NodeId),
}

impl LoadError {
    pub fn format(url: impl Into<String>, message: impl Into<String>) -> Self {
        LoadError::Format {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Human-readable hint shown next to the failure notification.
    pub fn remediation(&self) -> &'static str {
        match self {
            LoadError::Transport { .. } => {
                "Check that the URL is correct, that the server is online and that it allows \
                 cross-origin requests (CORS), then retry."
            }
            LoadError::Format { .. } => {
                "Check that the URL points at a service of the declared type."
            }
            LoadError::NoProvider(_) => "This type of data source is not supported.",
            LoadError::NotFound(_) | LoadError::Detached(_) => {
                "The dataset is no longer in the catalog."
            }
        }
    }
}

impl From<TransportError> for LoadError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network { url, message } => LoadError::Transport { url, message },
            TransportError::Status { url, status } => LoadError::Transport {
                url,
                message: format!("HTTP {status}"),
            },
            TransportError::Parse { url, message } => LoadError::Format { url, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LoadError;
    use crate::transport::TransportError;

    #[test]
    fn parse_failures_become_format_errors() {
        let err: LoadError = TransportError::Parse {
            url: "http://x".into(),
            message: "eof".into(),
        }
        .into();
        assert!(matches!(err, LoadError::Format { .. }));
    }

    #[test]
    fn status_failures_stay_transport_errors() {
        let err: LoadError = TransportError::Status {
            url: "http://x".into(),
            status: 502,
        }
        .into();
        match err {
            LoadError::Transport { message, .. } => assert_eq!(message, "HTTP 502"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(
            LoadError::Transport {
                url: String::new(),
                message: String::new()
            }
            .remediation()
            .contains("CORS")
        );
    }
}
