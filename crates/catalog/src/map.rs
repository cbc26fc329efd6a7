use serde::{Deserialize, Serialize};

use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderableKind {
    EsriMapServer,
    GeoJson,
    Csv,
}

/// What a loaded item hands to the mapping engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Renderable {
    pub kind: RenderableKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_count: Option<usize>,
    /// West, south, east, north in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<[f64; 4]>,
}

impl Renderable {
    pub fn new(kind: RenderableKind) -> Self {
        Self {
            kind,
            url: None,
            layers: Vec::new(),
            feature_count: None,
            extent: None,
        }
    }
}

/// The rendering engine as seen from the catalog.
///
/// Called outside the tree lock, after the corresponding state change has
/// been committed.
pub trait MapContext: Send + Sync {
    fn attach(&self, id: &NodeId, renderable: &Renderable);
    fn detach(&self, id: &NodeId);
}

/// Map context for headless use: accepts and drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedMap;

impl MapContext for DetachedMap {
    fn attach(&self, _id: &NodeId, _renderable: &Renderable) {}

    fn detach(&self, _id: &NodeId) {}
}
