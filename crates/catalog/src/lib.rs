//! Catalog tree of geospatial data sources.
//!
//! Nodes are groups or items addressed by stable `/`-separated ids. Groups
//! backed by a remote service populate their children lazily through a
//! [`providers::Provider`]; items load into a [`Renderable`] that is attached
//! to the map when enabled.

pub mod catalog;
pub mod error;
pub mod events;
pub mod load;
pub mod map;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod node;
pub mod providers;
pub mod proxy;
pub mod transport;
pub mod tree;

pub use catalog::{Catalog, CatalogBuilder};
pub use error::{CatalogError, LoadError, Result};
pub use events::CatalogEvent;
pub use load::{LoadOutcome, LoadRequest, LoadState, LoadStatus};
pub use map::{DetachedMap, MapContext, Renderable, RenderableKind};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryTransport;
pub use node::{
    CatalogNode, MemberType, NodeId, NodeOrigin, NodeSpec, Source, USER_ADDED_GROUP_ID,
    USER_ADDED_GROUP_NAME,
};
pub use providers::{LoadContext, Provider, ProviderRegistry};
pub use proxy::{ProxyConfig, ProxyHints, UrlProxy};
pub use transport::{BoxFuture, HttpTransport, Transport, TransportError};
pub use tree::{CatalogTree, Inserted};
