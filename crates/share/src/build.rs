//! Flattening of the live catalog and view into a [`ShareDocument`].

use std::collections::{BTreeMap, HashSet};

use catalog::{CatalogNode, CatalogTree, NodeId, NodeOrigin, NodeSpec, USER_ADDED_GROUP_ID};
use serde_json::Value;
use tracing::debug;

use crate::document::{InitFragment, InitSource, ShareDocument, SharedMember};
use crate::picking::picked_features;
use crate::view::{ViewState, view_fragment};

/// Why a node was left out of a share document.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    /// Data read from a local file cannot travel in a link.
    LocalData,
    /// The node's shareable state could not be projected.
    Unserializable(String),
    /// Turned away by a caller-supplied [`ItemFilter`].
    Excluded(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShareRejection {
    pub id: NodeId,
    pub name: String,
    pub reason: RejectionReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShareBuild {
    pub document: ShareDocument,
    pub rejections: Vec<ShareRejection>,
}

/// Outcome of one [`ItemFilter`] for one user-added node.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterVerdict {
    Keep,
    /// Leave the node out without telling the user.
    Skip,
    /// Leave the node out and report it.
    Reject(RejectionReason),
}

/// One rule deciding whether a user-added node travels in the `catalog`
/// fragment. Filters run in order and the first verdict other than
/// [`FilterVerdict::Keep`] wins.
pub trait ItemFilter: Send + Sync {
    fn check(&self, tree: &CatalogTree, node: &CatalogNode) -> FilterVerdict;
}

impl<F> ItemFilter for F
where
    F: Fn(&CatalogTree, &CatalogNode) -> FilterVerdict + Send + Sync,
{
    fn check(&self, tree: &CatalogTree, node: &CatalogNode) -> FilterVerdict {
        self(tree, node)
    }
}

/// Local files cannot be fetched by whoever opens the link.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocalData;

impl ItemFilter for NoLocalData {
    fn check(&self, _tree: &CatalogTree, node: &CatalogNode) -> FilterVerdict {
        if node.has_local_data() {
            FilterVerdict::Reject(RejectionReason::LocalData)
        } else {
            FilterVerdict::Keep
        }
    }
}

/// Configured nodes travel as shared members, not as catalog entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserSupplied;

impl ItemFilter for UserSupplied {
    fn check(&self, _tree: &CatalogTree, node: &CatalogNode) -> FilterVerdict {
        if node.is_user_supplied() {
            FilterVerdict::Keep
        } else {
            FilterVerdict::Skip
        }
    }
}

/// A node generated by the load of a URL-backed parent is recreated when
/// that parent loads again, so only the parent travels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotRegeneratedOnLoad;

impl ItemFilter for NotRegeneratedOnLoad {
    fn check(&self, tree: &CatalogTree, node: &CatalogNode) -> FilterVerdict {
        let regenerated = node.origin() == NodeOrigin::Generated
            && node
                .parent()
                .and_then(|p| tree.node(p))
                .is_some_and(|parent| parent.url().is_some());
        if regenerated {
            FilterVerdict::Skip
        } else {
            FilterVerdict::Keep
        }
    }
}

/// Builds share documents, running user-added nodes through a chain of
/// [`ItemFilter`]s.
pub struct ShareBuilder {
    filters: Vec<Box<dyn ItemFilter>>,
}

impl Default for ShareBuilder {
    fn default() -> Self {
        Self {
            filters: vec![
                Box::new(NoLocalData),
                Box::new(UserSupplied),
                Box::new(NotRegeneratedOnLoad),
            ],
        }
    }
}

impl ShareBuilder {
    /// Builder with the default filters: no local data, user supplied, not
    /// regenerated by its parent's load.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `filter` after the existing ones.
    pub fn filter(mut self, filter: impl ItemFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    fn verdict(&self, tree: &CatalogTree, node: &CatalogNode) -> FilterVerdict {
        self.filters
            .iter()
            .map(|f| f.check(tree, node))
            .find(|v| *v != FilterVerdict::Keep)
            .unwrap_or(FilterVerdict::Keep)
    }

    /// Captures `tree` and `view` as a share document.
    ///
    /// The tree is only read. Nodes that cannot be shared are listed in
    /// [`ShareBuild::rejections`] so the caller can tell the user.
    pub fn build(&self, tree: &CatalogTree, view: &ViewState) -> ShareBuild {
        let mut rejections = Vec::new();
        let mut sources: Vec<InitSource> = Vec::new();

        let user_roots = self.user_added_roots(tree, &mut rejections);
        if !user_roots.is_empty() {
            sources.push(InitFragment::catalog(user_roots).into());
        }

        let members = shared_members(tree, &mut rejections);
        if !members.is_empty() {
            sources.push(InitFragment::shared_members(members).into());
        }

        sources.push(view_fragment(view).into());

        if let Some(picked) = view
            .picked
            .as_ref()
            .and_then(|pick| picked_features(pick, view.current_time))
        {
            sources.push(InitFragment::picked(picked).into());
        }
        if let Some(marker) = &view.location_marker {
            sources.push(InitFragment::marker(marker.clone()).into());
        }

        for rejection in &rejections {
            debug!(
                id = %rejection.id,
                reason = ?rejection.reason,
                "node left out of share document"
            );
        }
        ShareBuild {
            document: ShareDocument::new(sources),
            rejections,
        }
    }

    fn user_added_roots(
        &self,
        tree: &CatalogTree,
        rejections: &mut Vec<ShareRejection>,
    ) -> Vec<NodeSpec> {
        tree.walk()
            .into_iter()
            .filter(|node| node.is_user_supplied())
            .filter(|node| {
                !node
                    .parent()
                    .and_then(|p| tree.node(p))
                    .is_some_and(CatalogNode::is_user_supplied)
            })
            .filter_map(|node| self.user_spec(tree, node, rejections))
            .collect()
    }

    fn user_spec(
        &self,
        tree: &CatalogTree,
        node: &CatalogNode,
        rejections: &mut Vec<ShareRejection>,
    ) -> Option<NodeSpec> {
        match self.verdict(tree, node) {
            FilterVerdict::Keep => {}
            FilterVerdict::Skip => return None,
            FilterVerdict::Reject(reason) => {
                reject(rejections, node, reason);
                return None;
            }
        }

        // Replay assigns fresh ids; the user flag is implied by the fragment.
        let mut spec = node.to_spec();
        spec.id = None;
        spec.share_keys.clear();
        spec.is_user_supplied = false;
        spec.items = node
            .items()
            .iter()
            .filter_map(|child| tree.node(child))
            .filter_map(|child| self.user_spec(tree, child, rejections))
            .collect();
        Some(spec)
    }
}

/// Captures `tree` and `view` with the default filters.
pub fn build_share_document(tree: &CatalogTree, view: &ViewState) -> ShareBuild {
    ShareBuilder::default().build(tree, view)
}

fn reject(rejections: &mut Vec<ShareRejection>, node: &CatalogNode, reason: RejectionReason) {
    rejections.push(ShareRejection {
        id: node.id().clone(),
        name: node.name().to_string(),
        reason,
    });
}

fn project(node: &CatalogNode) -> Result<SharedMember, String> {
    let opacity = match node.properties().get("opacity") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_f64()
                .ok_or_else(|| format!("opacity must be a number, found {value}"))?,
        ),
    };
    Ok(SharedMember {
        is_enabled: node.is_enabled().then_some(true),
        is_open: node.is_open().then_some(true),
        opacity,
    })
}

fn shared_members(
    tree: &CatalogTree,
    rejections: &mut Vec<ShareRejection>,
) -> BTreeMap<String, SharedMember> {
    let mut entries: Vec<(NodeId, SharedMember)> = Vec::new();
    for node in tree.walk() {
        if node.is_user_supplied() || node.id().as_str() == USER_ADDED_GROUP_ID {
            continue;
        }
        if !node.is_enabled() && !node.is_open() {
            continue;
        }
        if node.has_local_data() {
            reject(rejections, node, RejectionReason::LocalData);
            continue;
        }
        match project(node) {
            Ok(member) => entries.push((node.id().clone(), member)),
            Err(message) => reject(rejections, node, RejectionReason::Unserializable(message)),
        }
    }

    // `walk` is pre-order, so an ancestor's fate is settled before its
    // descendants are looked at and removals cascade.
    let mut present: HashSet<NodeId> = entries.iter().map(|(id, _)| id.clone()).collect();
    let mut members = BTreeMap::new();
    for (id, mut member) in entries {
        if member.is_open.is_some() && tree.ancestors(&id).iter().any(|a| !present.contains(a)) {
            member.is_open = None;
            if member.is_empty() {
                present.remove(&id);
                continue;
            }
        }
        members.insert(id.to_string(), member);
    }
    members
}

#[cfg(test)]
mod tests {
    use super::{FilterVerdict, RejectionReason, ShareBuilder, build_share_document};
    use crate::document::{InitSource, SharedMember};
    use crate::view::ViewState;
    use catalog::{CatalogNode, CatalogTree, NodeId, NodeOrigin, NodeSpec};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn member(enabled: bool, open: bool) -> SharedMember {
        SharedMember {
            is_enabled: enabled.then_some(true),
            is_open: open.then_some(true),
            opacity: None,
        }
    }

    fn tree(specs: serde_json::Value) -> CatalogTree {
        let specs: Vec<NodeSpec> = serde_json::from_value(specs).expect("node specs");
        CatalogTree::from_config(specs).expect("config tree").0
    }

    #[test]
    fn closed_ancestors_prune_open_descendants() {
        let tree = tree(json!([
            {"name": "A", "type": "group", "isOpen": true, "items": [
                {"name": "B", "type": "group", "items": [
                    {"name": "C", "type": "group", "isOpen": true}
                ]}
            ]}
        ]));
        let build = build_share_document(&tree, &ViewState::default());
        let members = build.document.fragments().find_map(|f| f.shared_catalog_members.clone());
        let members = members.expect("shared members");
        assert_eq!(members.len(), 1);
        assert_eq!(members["A"], member(false, true));
    }

    #[test]
    fn user_data_nests_without_ids() {
        let mut tree = CatalogTree::new();
        let group = tree.ensure_user_added_group().unwrap();
        let spec: NodeSpec = serde_json::from_value(json!({
            "name": "Uploads", "type": "group", "id": "__User-Added_Data__/up",
            "items": [{"name": "My CSV", "type": "csv", "data": "lat,lon\n1,2"}]
        }))
        .unwrap();
        tree.insert(&group, None, spec, NodeOrigin::User).unwrap();

        let build = build_share_document(&tree, &ViewState::default());
        let InitSource::Fragment(first) = &build.document.init_sources[0] else {
            panic!("expected a fragment first");
        };
        let roots = first.catalog.as_ref().expect("catalog fragment");
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, None);
        assert_eq!(roots[0].items[0].name, "My CSV");
        assert!(build.rejections.is_empty());
        // The user group itself never shows up as a shared member.
        assert!(
            build
                .document
                .fragments()
                .all(|f| f.shared_catalog_members.is_none())
        );
    }

    #[test]
    fn badly_typed_opacity_is_reported() {
        let mut tree = tree(json!([{"name": "g", "type": "group", "isOpen": true}]));
        tree.set_properties(&NodeId::new("g"), json!({"opacity": "half"}).as_object().unwrap())
            .unwrap();
        let build = build_share_document(&tree, &ViewState::default());
        assert_eq!(build.rejections.len(), 1);
        assert!(matches!(
            build.rejections[0].reason,
            RejectionReason::Unserializable(_)
        ));
    }

    #[test]
    fn extra_filters_compose_with_the_defaults() {
        let mut tree = CatalogTree::new();
        let group = tree.ensure_user_added_group().unwrap();
        for (id, name) in [("draft", "Draft survey"), ("final", "Final survey")] {
            let spec: NodeSpec = serde_json::from_value(json!({
                "name": name, "type": "csv", "id": format!("__User-Added_Data__/{id}"),
                "data": "lat,lon\n1,2"
            }))
            .unwrap();
            tree.insert(&group, None, spec, NodeOrigin::User).unwrap();
        }

        let no_drafts = |_: &CatalogTree, node: &CatalogNode| {
            if node.name().starts_with("Draft") {
                FilterVerdict::Reject(RejectionReason::Excluded("draft".into()))
            } else {
                FilterVerdict::Keep
            }
        };
        let build = ShareBuilder::new()
            .filter(no_drafts)
            .build(&tree, &ViewState::default());

        assert_eq!(build.rejections.len(), 1);
        assert_eq!(build.rejections[0].id, NodeId::new("__User-Added_Data__/draft"));
        assert_eq!(
            build.rejections[0].reason,
            RejectionReason::Excluded("draft".into())
        );
        let roots = build
            .document
            .fragments()
            .find_map(|f| f.catalog.clone())
            .expect("catalog fragment");
        let names: Vec<&str> = roots.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Final survey"]);
    }
}
