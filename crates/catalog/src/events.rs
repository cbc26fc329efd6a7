use crate::load::LoadState;
use crate::node::NodeId;

/// A single observable change to the catalog.
///
/// Emitted by the tree at the mutation point, one event per change, through
/// `runtime::EventBus`.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    NodeAdded { id: NodeId, parent: NodeId },
    NodeRemoved { id: NodeId },
    NodeMoved { id: NodeId, parent: NodeId, index: usize },
    LoadStateChanged { id: NodeId, state: LoadState },
    /// User-facing notification for a failed load.
    LoadFailed {
        id: NodeId,
        message: String,
        remediation: &'static str,
    },
    Enabled { id: NodeId },
    Disabled { id: NodeId },
    Opened { id: NodeId },
    Closed { id: NodeId },
    PropertiesChanged { id: NodeId },
}

impl CatalogEvent {
    pub fn node(&self) -> &NodeId {
        match self {
            CatalogEvent::NodeAdded { id, .. }
            | CatalogEvent::NodeRemoved { id }
            | CatalogEvent::NodeMoved { id, .. }
            | CatalogEvent::LoadStateChanged { id, .. }
            | CatalogEvent::LoadFailed { id, .. }
            | CatalogEvent::Enabled { id }
            | CatalogEvent::Disabled { id }
            | CatalogEvent::Opened { id }
            | CatalogEvent::Closed { id }
            | CatalogEvent::PropertiesChanged { id } => id,
        }
    }
}
