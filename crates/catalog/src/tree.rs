use std::collections::{HashMap, HashSet};

use runtime::{Event, EventBus};
use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::{CatalogError, Result};
use crate::events::CatalogEvent;
use crate::load::LoadStatus;
use crate::node::{
    CatalogNode, GroupState, NodeId, NodeOrigin, NodeSpec, Source, USER_ADDED_GROUP_ID,
    USER_ADDED_GROUP_NAME,
};

/// Result of inserting a node spec (and its nested items).
#[derive(Debug, Clone, PartialEq)]
pub struct Inserted {
    pub id: NodeId,
    /// Nodes whose spec asked for `isEnabled`; enabling is asynchronous so the
    /// caller finishes the job.
    pub to_enable: Vec<NodeId>,
}

/// The catalog tree: an id-indexed arena of nodes rooted at [`NodeId::root`].
///
/// Groups own the ordering of their children; parents are id lookups. All
/// mutation goes through methods here, each of which emits exactly one
/// [`CatalogEvent`] per change.
#[derive(Debug)]
pub struct CatalogTree {
    nodes: HashMap<NodeId, CatalogNode>,
    share_keys: HashMap<String, NodeId>,
    next_serial: u64,
    events: EventBus<CatalogEvent>,
}

impl Default for CatalogTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogTree {
    pub fn new() -> Self {
        let root = CatalogNode {
            id: NodeId::root(),
            name: "Root Group".to_string(),
            parent: None,
            source: Source::Group,
            share_keys: Vec::new(),
            is_user_supplied: false,
            is_enabled: false,
            is_open: true,
            origin: NodeOrigin::Config,
            has_local_data: false,
            properties: Map::new(),
            group: Some(GroupState::default()),
            load: LoadStatus::default(),
            serial: 0,
        };
        let mut nodes = HashMap::new();
        nodes.insert(root.id.clone(), root);
        Self {
            nodes,
            share_keys: HashMap::new(),
            next_serial: 1,
            events: EventBus::new(),
        }
    }

    /// Builds a tree from base configuration. Requested `isEnabled` flags are
    /// returned rather than applied.
    pub fn from_config(specs: Vec<NodeSpec>) -> Result<(Self, Vec<NodeId>)> {
        let mut tree = Self::new();
        let root = NodeId::root();
        let mut to_enable = Vec::new();
        for spec in specs {
            let inserted = tree.insert(&root, None, spec, NodeOrigin::Config)?;
            to_enable.extend(inserted.to_enable);
        }
        Ok((tree, to_enable))
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<Event<CatalogEvent>> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&mut self, event: CatalogEvent) {
        self.events.emit(event);
    }

    pub fn root(&self) -> &CatalogNode {
        &self.nodes[&NodeId::root()]
    }

    pub fn node(&self, id: &NodeId) -> Option<&CatalogNode> {
        self.nodes.get(id)
    }

    pub fn get(&self, id: &NodeId) -> Result<&CatalogNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }

    pub(crate) fn get_mut(&mut self, id: &NodeId) -> Result<&mut CatalogNode> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes, not counting the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks a node up by id, falling back to its historical share keys.
    pub fn resolve(&self, key: &str) -> Option<&NodeId> {
        let id = NodeId::new(key);
        if let Some(node) = self.nodes.get(&id) {
            return Some(&node.id);
        }
        self.share_keys.get(key)
    }

    /// Parent chain of `id`, nearest first, excluding the root.
    pub fn ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.nodes.get(id).and_then(|n| n.parent.clone());
        while let Some(parent) = cursor {
            if parent.is_root() {
                break;
            }
            cursor = self.nodes.get(&parent).and_then(|n| n.parent.clone());
            out.push(parent);
        }
        out
    }

    pub fn is_every_ancestor_open(&self, id: &NodeId) -> bool {
        self.ancestors(id)
            .iter()
            .all(|a| self.nodes.get(a).is_some_and(|n| n.is_open))
    }

    /// Pre-order ids below `id`, not including `id` itself.
    pub fn descendants(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .nodes
            .get(id)
            .map(|n| n.items().iter().rev().cloned().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get(&next) {
                stack.extend(node.items().iter().rev().cloned());
            }
            out.push(next);
        }
        out
    }

    /// Every node except the root in display (pre-order) order.
    pub fn walk(&self) -> Vec<&CatalogNode> {
        self.descendants(&NodeId::root())
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    /// Inserts `spec` (and its nested items) under `parent`.
    ///
    /// The whole subtree is validated before anything is inserted, so a
    /// duplicate id deep inside `spec` leaves the tree untouched.
    pub fn insert(
        &mut self,
        parent: &NodeId,
        index: Option<usize>,
        spec: NodeSpec,
        origin: NodeOrigin,
    ) -> Result<Inserted> {
        let parent_node = self.get(parent)?;
        if !parent_node.is_group() {
            return Err(CatalogError::NotAGroup(parent.clone()));
        }
        let inherit_user = parent_node.is_user_supplied && origin == NodeOrigin::Generated;

        let mut planned = HashSet::new();
        self.check_ids(parent, &spec, &mut planned)?;

        let mut to_enable = Vec::new();
        let id = self.insert_unchecked(parent, index, spec, origin, inherit_user, &mut to_enable);
        Ok(Inserted { id, to_enable })
    }

    fn check_ids(
        &self,
        parent: &NodeId,
        spec: &NodeSpec,
        planned: &mut HashSet<NodeId>,
    ) -> Result<()> {
        let id = spec_id(parent, spec);
        if self.nodes.contains_key(&id) || id.is_root() || !planned.insert(id.clone()) {
            return Err(CatalogError::DuplicateId(id));
        }
        if !spec.items.is_empty() && !spec.source.member_type().is_group() {
            return Err(CatalogError::NotAGroup(id));
        }
        for child in &spec.items {
            self.check_ids(&id, child, planned)?;
        }
        Ok(())
    }

    fn insert_unchecked(
        &mut self,
        parent: &NodeId,
        index: Option<usize>,
        spec: NodeSpec,
        origin: NodeOrigin,
        inherit_user: bool,
        to_enable: &mut Vec<NodeId>,
    ) -> NodeId {
        let id = spec_id(parent, &spec);
        let is_group = spec.source.member_type().is_group();
        let is_user_supplied = spec.is_user_supplied || origin == NodeOrigin::User || inherit_user;

        let node = CatalogNode {
            id: id.clone(),
            name: spec.name,
            parent: Some(parent.clone()),
            source: spec.source,
            share_keys: spec.share_keys,
            is_user_supplied,
            is_enabled: false,
            is_open: spec.is_open,
            origin,
            has_local_data: false,
            properties: spec.properties,
            group: is_group.then(|| GroupState {
                items: Vec::new(),
                blacklist: spec.blacklist,
                item_properties: spec.item_properties,
            }),
            load: LoadStatus::default(),
            serial: self.next_serial,
        };
        self.next_serial += 1;

        for key in &node.share_keys {
            self.share_keys.insert(key.clone(), id.clone());
        }
        if spec.is_enabled {
            to_enable.push(id.clone());
        }
        self.nodes.insert(id.clone(), node);

        if let Some(group) = self.nodes.get_mut(parent).and_then(|p| p.group.as_mut()) {
            let at = index.unwrap_or(group.items.len()).min(group.items.len());
            group.items.insert(at, id.clone());
        }
        self.emit(CatalogEvent::NodeAdded {
            id: id.clone(),
            parent: parent.clone(),
        });

        for child in spec.items {
            self.insert_unchecked(&id, None, child, origin, is_user_supplied, to_enable);
        }
        id
    }

    /// Detaches `id` and its whole subtree. Returns the removed nodes in
    /// pre-order so the caller can release whatever they had attached.
    pub fn remove(&mut self, id: &NodeId) -> Result<Vec<CatalogNode>> {
        if id.is_root() {
            return Err(CatalogError::RootIsFixed);
        }
        let parent = self.get(id)?.parent.clone();
        if let Some(group) = parent
            .as_ref()
            .and_then(|p| self.nodes.get_mut(p))
            .and_then(|p| p.group.as_mut())
        {
            group.items.retain(|child| child != id);
        }

        let mut order = vec![id.clone()];
        order.extend(self.descendants(id));

        let mut removed = Vec::with_capacity(order.len());
        for nid in order {
            if let Some(node) = self.nodes.remove(&nid) {
                for key in &node.share_keys {
                    if self.share_keys.get(key) == Some(&nid) {
                        self.share_keys.remove(key);
                    }
                }
                self.emit(CatalogEvent::NodeRemoved { id: nid });
                removed.push(node);
            }
        }
        Ok(removed)
    }

    /// Moves `id` under `new_parent` at `index` (clamped). Ids never change.
    pub fn move_node(&mut self, id: &NodeId, new_parent: &NodeId, index: usize) -> Result<()> {
        if id.is_root() {
            return Err(CatalogError::RootIsFixed);
        }
        let old_parent = self
            .get(id)?
            .parent
            .clone()
            .ok_or(CatalogError::RootIsFixed)?;
        if !self.get(new_parent)?.is_group() {
            return Err(CatalogError::NotAGroup(new_parent.clone()));
        }
        if new_parent == id || self.descendants(id).contains(new_parent) {
            return Err(CatalogError::WouldCreateCycle {
                id: id.clone(),
                parent: new_parent.clone(),
            });
        }

        if let Some(group) = self.nodes.get_mut(&old_parent).and_then(|p| p.group.as_mut()) {
            group.items.retain(|child| child != id);
        }
        let mut at = index;
        if let Some(group) = self.nodes.get_mut(new_parent).and_then(|p| p.group.as_mut()) {
            at = index.min(group.items.len());
            group.items.insert(at, id.clone());
        }
        self.get_mut(id)?.parent = Some(new_parent.clone());
        self.emit(CatalogEvent::NodeMoved {
            id: id.clone(),
            parent: new_parent.clone(),
            index: at,
        });
        Ok(())
    }

    /// Returns whether the flag changed.
    pub fn set_open(&mut self, id: &NodeId, open: bool) -> Result<bool> {
        let node = self.get_mut(id)?;
        if node.is_open == open {
            return Ok(false);
        }
        node.is_open = open;
        let id = id.clone();
        self.emit(if open {
            CatalogEvent::Opened { id }
        } else {
            CatalogEvent::Closed { id }
        });
        Ok(true)
    }

    pub(crate) fn set_enabled(&mut self, id: &NodeId, enabled: bool) -> Result<bool> {
        let node = self.get_mut(id)?;
        if node.is_enabled == enabled {
            return Ok(false);
        }
        node.is_enabled = enabled;
        let id = id.clone();
        self.emit(if enabled {
            CatalogEvent::Enabled { id }
        } else {
            CatalogEvent::Disabled { id }
        });
        Ok(true)
    }

    /// Creates the "User-Added Data" group under the root if it is missing.
    pub fn ensure_user_added_group(&mut self) -> Result<NodeId> {
        let id = NodeId::user_added_group();
        if !self.contains(&id) {
            let spec = NodeSpec::group(USER_ADDED_GROUP_NAME)
                .with_id(USER_ADDED_GROUP_ID)
                .opened();
            self.insert(&NodeId::root(), None, spec, NodeOrigin::Config)?;
        }
        Ok(id)
    }

    pub(crate) fn mark_local_data(&mut self, id: &NodeId) -> Result<()> {
        self.get_mut(id)?.has_local_data = true;
        Ok(())
    }

    /// Generic property update used for configuration overrides, inherited
    /// `itemProperties` and shared-state replay.
    ///
    /// Known keys update the typed fields (`name`, `url`, `layers`, `isOpen`,
    /// `blacklist`, `itemProperties`); `isEnabled` is ignored because enabling
    /// is asynchronous; everything else lands in the free-form property map,
    /// where `null` deletes.
    pub fn set_properties(&mut self, id: &NodeId, props: &Map<String, Value>) -> Result<()> {
        let mut open_change = None;
        {
            let node = self.get_mut(id)?;
            for (key, value) in props {
                match (key.as_str(), value) {
                    ("name", Value::String(name)) => node.name = name.clone(),
                    ("url", Value::String(url)) => {
                        node.source.set_url(url.clone());
                    }
                    ("layers", Value::String(layers)) => {
                        if let Source::EsriMapServer { layers: l, .. } = &mut node.source {
                            *l = Some(layers.clone());
                        }
                    }
                    ("isOpen", Value::Bool(open)) => open_change = Some(*open),
                    ("isEnabled", _) => {}
                    ("blacklist", Value::Array(names)) => {
                        let names = names
                            .iter()
                            .filter_map(|n| n.as_str().map(str::to_string))
                            .collect();
                        if let Some(group) = node.group.as_mut() {
                            group.blacklist = names;
                        }
                    }
                    ("itemProperties", Value::Object(map)) => {
                        if let Some(group) = node.group.as_mut() {
                            group.item_properties = map.clone();
                        }
                    }
                    (_, Value::Null) => {
                        node.properties.remove(key);
                    }
                    _ => {
                        node.properties.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        self.emit(CatalogEvent::PropertiesChanged { id: id.clone() });
        if let Some(open) = open_change {
            self.set_open(id, open)?;
        }
        Ok(())
    }
}

fn spec_id(parent: &NodeId, spec: &NodeSpec) -> NodeId {
    match &spec.id {
        Some(id) => NodeId::new(id.clone()),
        None => parent.child(&spec.name),
    }
}

#[cfg(test)]
mod tests {
    use super::CatalogTree;
    use crate::error::CatalogError;
    use crate::events::CatalogEvent;
    use crate::node::{NodeId, NodeOrigin, NodeSpec, Source};
    use pretty_assertions::assert_eq;
    use runtime::drain_ready;
    use serde_json::json;

    fn sample() -> CatalogTree {
        let (tree, _) = CatalogTree::from_config(vec![
            NodeSpec::group("A").opened().with_items(vec![
                NodeSpec::group("B").with_items(vec![NodeSpec::new(
                    "C",
                    Source::GeoJson {
                        url: Some("https://example.com/c.geojson".into()),
                        data: None,
                    },
                )]),
            ]),
            NodeSpec::group("D"),
        ])
        .expect("build tree");
        tree
    }

    #[test]
    fn ids_follow_parent_paths() {
        let tree = sample();
        assert!(tree.contains(&NodeId::new("A/B/C")));
        assert_eq!(
            tree.get(&NodeId::new("A/B/C")).unwrap().parent(),
            Some(&NodeId::new("A/B"))
        );
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn walk_is_preorder() {
        let tree = sample();
        let ids: Vec<&str> = tree.walk().iter().map(|n| n.id().as_str()).collect();
        assert_eq!(ids, vec!["A", "A/B", "A/B/C", "D"]);
    }

    #[test]
    fn ancestors_exclude_root_and_track_open_state() {
        let tree = sample();
        let c = NodeId::new("A/B/C");
        assert_eq!(tree.ancestors(&c), vec![NodeId::new("A/B"), NodeId::new("A")]);
        assert!(!tree.is_every_ancestor_open(&c));
        assert!(tree.is_every_ancestor_open(&NodeId::new("A/B")));
    }

    #[test]
    fn duplicate_ids_leave_tree_untouched() {
        let mut tree = sample();
        let spec = NodeSpec::group("X").with_items(vec![NodeSpec::group("dup").with_id("D")]);
        let err = tree
            .insert(&NodeId::root(), None, spec, NodeOrigin::Config)
            .expect_err("duplicate");
        assert_eq!(err, CatalogError::DuplicateId(NodeId::new("D")));
        assert!(!tree.contains(&NodeId::new("X")));
    }

    #[test]
    fn items_cannot_own_children() {
        let mut tree = CatalogTree::new();
        let spec = NodeSpec::new("csv", Source::Csv { url: None, data: Some("lat,lon".into()) })
            .with_items(vec![NodeSpec::group("nope")]);
        assert!(matches!(
            tree.insert(&NodeId::root(), None, spec, NodeOrigin::Config),
            Err(CatalogError::NotAGroup(_))
        ));
    }

    #[test]
    fn remove_takes_the_subtree_and_announces_each_node() {
        let mut tree = sample();
        let mut rx = tree.subscribe();
        let removed = tree.remove(&NodeId::new("A/B")).expect("remove");
        assert_eq!(removed.len(), 2);
        assert!(!tree.contains(&NodeId::new("A/B/C")));
        assert!(tree.get(&NodeId::new("A")).unwrap().items().is_empty());

        let events: Vec<CatalogEvent> = drain_ready(&mut rx).into_iter().map(|e| e.payload).collect();
        assert_eq!(
            events,
            vec![
                CatalogEvent::NodeRemoved { id: NodeId::new("A/B") },
                CatalogEvent::NodeRemoved { id: NodeId::new("A/B/C") },
            ]
        );
    }

    #[test]
    fn root_cannot_be_removed() {
        let mut tree = sample();
        assert_eq!(tree.remove(&NodeId::root()), Err(CatalogError::RootIsFixed));
    }

    #[test]
    fn move_reorders_and_rejects_cycles() {
        let mut tree = sample();
        tree.move_node(&NodeId::new("D"), &NodeId::root(), 0).expect("move");
        assert_eq!(tree.root().items()[0], NodeId::new("D"));

        tree.move_node(&NodeId::new("A/B"), &NodeId::new("D"), 9).expect("reparent");
        assert_eq!(tree.get(&NodeId::new("A/B")).unwrap().parent(), Some(&NodeId::new("D")));
        assert_eq!(tree.get(&NodeId::new("D")).unwrap().items(), &[NodeId::new("A/B")]);

        let err = tree
            .move_node(&NodeId::new("D"), &NodeId::new("A/B"), 0)
            .expect_err("cycle");
        assert!(matches!(err, CatalogError::WouldCreateCycle { .. }));
    }

    #[test]
    fn share_keys_resolve_to_current_ids() {
        let mut tree = CatalogTree::new();
        let mut spec = NodeSpec::group("Renamed");
        spec.share_keys = vec!["Old Name".into()];
        tree.insert(&NodeId::root(), None, spec, NodeOrigin::Config).unwrap();
        assert_eq!(tree.resolve("Old Name"), Some(&NodeId::new("Renamed")));
        assert_eq!(tree.resolve("Renamed"), Some(&NodeId::new("Renamed")));
        assert_eq!(tree.resolve("missing"), None);
    }

    #[test]
    fn set_properties_updates_typed_and_free_fields() {
        let mut tree = sample();
        let c = NodeId::new("A/B/C");
        let props = json!({"url": "https://example.com/other.geojson", "opacity": 0.4, "isOpen": true});
        tree.set_properties(&c, props.as_object().unwrap()).unwrap();

        let node = tree.get(&c).unwrap();
        assert_eq!(node.url(), Some("https://example.com/other.geojson"));
        assert_eq!(node.properties().get("opacity"), Some(&json!(0.4)));
        assert!(node.is_open());

        let clear = json!({"opacity": null});
        tree.set_properties(&c, clear.as_object().unwrap()).unwrap();
        assert!(tree.get(&c).unwrap().properties().get("opacity").is_none());
    }
}
