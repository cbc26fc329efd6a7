//! Load state machine shared by groups and items.
//!
//! `NotLoaded -> Loading -> Loaded | Failed`. The transitions live on
//! [`CatalogTree`] so they happen under the same lock as every other
//! mutation; the asynchronous provider call in between is driven by
//! `Catalog::load`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::events::CatalogEvent;
use crate::map::Renderable;
use crate::node::{CatalogNode, MemberType, NodeId, NodeOrigin, NodeSpec, Source};
use crate::providers::function::FunctionDescription;
use crate::proxy::ProxyHints;
use crate::tree::CatalogTree;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadState {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
    Failed,
}

/// Load bookkeeping carried by every node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadStatus {
    pub(crate) state: LoadState,
    pub(crate) error: Option<LoadError>,
    /// `load_key` the last finished load ran against.
    pub(crate) loaded_key: Option<String>,
    /// Concrete type an `auto` node resolved to.
    pub(crate) resolved_type: Option<MemberType>,
    pub(crate) renderable: Option<Renderable>,
    pub(crate) function: Option<FunctionDescription>,
}

impl LoadStatus {
    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn error(&self) -> Option<&LoadError> {
        self.error.as_ref()
    }

    pub fn resolved_type(&self) -> Option<MemberType> {
        self.resolved_type
    }
}

/// What a provider produced.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Children of a group, in upstream order.
    Children(Vec<NodeSpec>),
    /// An `auto` node resolved to `resolved` and produced `children`.
    Dispatched {
        resolved: MemberType,
        children: Vec<NodeSpec>,
    },
    Renderable(Renderable),
    Function(FunctionDescription),
    /// Nothing to apply (static groups).
    Unchanged,
}

/// Snapshot of everything a provider needs, taken under the lock.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub id: NodeId,
    pub name: String,
    pub source: Source,
    pub blacklist: Vec<String>,
    pub item_properties: Map<String, Value>,
    pub proxy_hints: ProxyHints,
}

/// Decision taken by [`CatalogTree::begin_load`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LoadPlan {
    /// Already loaded against the current key.
    Ready,
    /// Failed against the current key; the recorded error is returned as is.
    Failed(LoadError),
    /// The node is now `Loading`; run the provider and call `finish_load`.
    Start {
        request: LoadRequest,
        serial: u64,
        key: String,
    },
}

impl CatalogTree {
    pub(crate) fn begin_load(&mut self, id: &NodeId) -> Result<LoadPlan, LoadError> {
        let node = self
            .node(id)
            .ok_or_else(|| LoadError::NotFound(id.clone()))?;
        let key = node.load_key();
        let unchanged = node.load.loaded_key.as_deref() == Some(key.as_str());
        let state = node.load.state;
        let recorded = node.load.error.clone();

        match state {
            LoadState::Loaded if unchanged => return Ok(LoadPlan::Ready),
            LoadState::Failed if unchanged => {
                if let Some(err) = recorded {
                    return Ok(LoadPlan::Failed(err));
                }
            }
            LoadState::Loaded | LoadState::Failed => {
                debug!(id = %id, "load-influencing values changed; invalidating");
                self.set_load_state(id, LoadState::NotLoaded);
            }
            LoadState::NotLoaded | LoadState::Loading => {}
        }

        let Some(node) = self.node(id) else {
            return Err(LoadError::NotFound(id.clone()));
        };
        let request = LoadRequest {
            id: id.clone(),
            name: node.name.clone(),
            source: node.source.clone(),
            blacklist: node.blacklist().to_vec(),
            item_properties: node.item_properties().cloned().unwrap_or_default(),
            proxy_hints: ProxyHints::from_properties(&node.properties),
        };
        let serial = node.serial;
        self.set_load_state(id, LoadState::Loading);
        Ok(LoadPlan::Start {
            request,
            serial,
            key,
        })
    }

    /// Applies a provider result. Returns the ids of enabled nodes that were
    /// dropped while replacing generated children; the caller detaches them
    /// from the map.
    pub(crate) fn finish_load(
        &mut self,
        id: &NodeId,
        serial: u64,
        key: String,
        result: Result<LoadOutcome, LoadError>,
    ) -> Result<Vec<NodeId>, LoadError> {
        let attached = self.node(id).is_some_and(|n| n.serial == serial);
        if !attached {
            debug!(id = %id, "discarding load result for a detached node");
            return Err(LoadError::Detached(id.clone()));
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(id = %id, error = %err, "catalog load failed");
                if let Some(node) = self.node_mut(id) {
                    node.load.state = LoadState::Failed;
                    node.load.error = Some(err.clone());
                    node.load.loaded_key = Some(key);
                }
                self.emit(CatalogEvent::LoadStateChanged {
                    id: id.clone(),
                    state: LoadState::Failed,
                });
                self.emit(CatalogEvent::LoadFailed {
                    id: id.clone(),
                    message: err.to_string(),
                    remediation: err.remediation(),
                });
                return Err(err);
            }
        };

        let mut dropped = Vec::new();
        match outcome {
            LoadOutcome::Children(children) => {
                dropped = self.apply_children(id, children);
            }
            LoadOutcome::Dispatched { resolved, children } => {
                debug!(id = %id, resolved = %resolved, "auto node resolved");
                if let Some(node) = self.node_mut(id) {
                    node.load.resolved_type = Some(resolved);
                }
                dropped = self.apply_children(id, children);
            }
            LoadOutcome::Renderable(renderable) => {
                if let Some(node) = self.node_mut(id) {
                    node.load.renderable = Some(renderable);
                }
            }
            LoadOutcome::Function(description) => {
                if let Some(node) = self.node_mut(id) {
                    node.load.function = Some(description);
                }
            }
            LoadOutcome::Unchanged => {}
        }

        if let Some(node) = self.node_mut(id) {
            node.load.error = None;
            node.load.loaded_key = Some(key);
        }
        self.set_load_state(id, LoadState::Loaded);
        info!(id = %id, "catalog node loaded");
        Ok(dropped)
    }

    /// `Failed -> NotLoaded`, so the next load reaches the provider again.
    pub(crate) fn reset_failed(&mut self, id: &NodeId) -> Result<(), LoadError> {
        let node = self
            .node(id)
            .ok_or_else(|| LoadError::NotFound(id.clone()))?;
        if node.load.state == LoadState::Failed {
            if let Some(node) = self.node_mut(id) {
                node.load.error = None;
                node.load.loaded_key = None;
            }
            self.set_load_state(id, LoadState::NotLoaded);
        }
        Ok(())
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut CatalogNode> {
        self.get_mut(id).ok()
    }

    fn set_load_state(&mut self, id: &NodeId, state: LoadState) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        if node.load.state == state {
            return;
        }
        node.load.state = state;
        self.emit(CatalogEvent::LoadStateChanged {
            id: id.clone(),
            state,
        });
    }

    /// Replaces the generated children of `parent` with `children`.
    ///
    /// Blacklisted names are skipped and `itemProperties` applied to every
    /// surviving child. Generated children that already exist are kept (with
    /// their state) and updated in place; configured and user children are
    /// left alone and stay ahead of the generated ones.
    fn apply_children(&mut self, parent: &NodeId, children: Vec<NodeSpec>) -> Vec<NodeId> {
        let Some(parent_node) = self.node(parent) else {
            return Vec::new();
        };
        let blacklist: HashSet<String> = parent_node.blacklist().iter().cloned().collect();
        let item_properties = parent_node.item_properties().cloned().unwrap_or_default();
        let existing_generated: Vec<NodeId> = parent_node
            .items()
            .iter()
            .filter(|child| {
                self.node(child)
                    .is_some_and(|n| n.origin == NodeOrigin::Generated)
            })
            .cloned()
            .collect();

        let mut wanted = Vec::new();
        for spec in children {
            if blacklist.contains(&spec.name) {
                debug!(parent = %parent, child = %spec.name, "skipping blacklisted child");
                continue;
            }
            let child_id = match &spec.id {
                Some(id) => NodeId::new(id.clone()),
                None => parent.child(&spec.name),
            };
            if wanted.contains(&child_id) {
                debug!(parent = %parent, child = %child_id, "skipping repeated child");
                continue;
            }

            if existing_generated.contains(&child_id) {
                self.refresh_generated(&child_id, spec);
            } else if self.contains(&child_id) {
                warn!(parent = %parent, child = %child_id, "generated child id already taken");
                continue;
            } else if let Err(err) = self.insert(parent, None, spec, NodeOrigin::Generated) {
                warn!(parent = %parent, error = %err, "could not create generated child");
                continue;
            }

            if !item_properties.is_empty() {
                if let Err(err) = self.set_properties(&child_id, &item_properties) {
                    warn!(child = %child_id, error = %err, "could not apply itemProperties");
                }
            }
            wanted.push(child_id);
        }

        let mut dropped = Vec::new();
        for stale in existing_generated.iter().filter(|id| !wanted.contains(id)) {
            match self.remove(stale) {
                Ok(removed) => dropped.extend(
                    removed
                        .into_iter()
                        .filter(|n| n.is_enabled)
                        .map(|n| n.id),
                ),
                Err(err) => warn!(child = %stale, error = %err, "could not drop stale child"),
            }
        }

        let fixed = self
            .node(parent)
            .map(|p| {
                p.items()
                    .iter()
                    .filter(|child| !wanted.contains(child))
                    .count()
            })
            .unwrap_or(0);
        for (offset, child) in wanted.iter().enumerate() {
            let target = fixed + offset;
            let current = self
                .node(parent)
                .and_then(|p| p.items().iter().position(|c| c == child));
            if current != Some(target) {
                if let Err(err) = self.move_node(child, parent, target) {
                    warn!(child = %child, error = %err, "could not reorder generated child");
                }
            }
        }
        dropped
    }

    fn refresh_generated(&mut self, id: &NodeId, spec: NodeSpec) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        let changed = node.name != spec.name || node.source != spec.source;
        if changed {
            node.name = spec.name;
            node.source = spec.source;
            self.emit(CatalogEvent::PropertiesChanged { id: id.clone() });
        }
    }
}
