use catalog::{CatalogError, TransportError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShareError {
    #[error("could not encode share document: {0}")]
    Encode(String),

    #[error("could not read share document: {0}")]
    Decode(String),

    #[error("not a share link: {0}")]
    InvalidLink(String),

    /// No usable short-link service; callers fall back to the full link.
    #[error("short links are not available")]
    ShortenUnavailable,

    #[error("could not shorten the share link: {0}")]
    Shorten(String),

    #[error("could not read configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
