//! Rehydration of a share document into a live catalog and view.

use std::collections::BTreeMap;

use catalog::{BoxFuture, Catalog, NodeId, NodeSpec};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::document::{InitFragment, InitSource, ShareDocument, SharedMember};
use crate::error::ShareError;
use crate::view::{ViewState, apply_view};

/// Init files may reference further init files; this bounds the chain.
pub const MAX_INIT_FILE_DEPTH: usize = 8;

/// A shared member that resolved but could not be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberFailure {
    pub key: String,
    pub message: String,
}

/// What a replay did, for the caller to report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    /// Set when the document was written by a newer major version.
    pub newer_version: Option<String>,
    /// Init files fetched, in order.
    pub init_files: Vec<String>,
    /// Nodes created from `catalog` fragments.
    pub added: Vec<NodeId>,
    /// Shared member keys that matched a node.
    pub resolved: Vec<NodeId>,
    /// Shared member keys that matched nothing, even after loading ancestors.
    pub unresolved: Vec<String>,
    pub failed: Vec<MemberFailure>,
    /// Fragment keys nobody handles.
    pub ignored_keys: Vec<String>,
}

impl ReplayReport {
    fn fail(&mut self, key: impl Into<String>, message: impl ToString) {
        let key = key.into();
        let message = message.to_string();
        warn!(key = %key, error = %message, "could not apply shared state");
        self.failed.push(MemberFailure { key, message });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provenance {
    /// Fragments from a link: catalog nodes are user data.
    Link,
    /// Fragments from an init file: catalog nodes are base configuration.
    InitFile,
}

/// Applies `document` to `catalog` and `view`.
///
/// Best effort: problems with individual nodes or init files are collected in
/// the report and replay carries on.
pub async fn replay(
    document: &ShareDocument,
    catalog: &Catalog,
    view: &mut ViewState,
) -> Result<ReplayReport, ShareError> {
    let mut report = ReplayReport::default();
    replay_document(document, Provenance::Link, catalog, view, &mut report, 0).await?;
    info!(
        added = report.added.len(),
        resolved = report.resolved.len(),
        unresolved = report.unresolved.len(),
        failed = report.failed.len(),
        "share document replayed"
    );
    Ok(report)
}

fn replay_document<'a>(
    document: &'a ShareDocument,
    provenance: Provenance,
    catalog: &'a Catalog,
    view: &'a mut ViewState,
    report: &'a mut ReplayReport,
    depth: usize,
) -> BoxFuture<'a, Result<(), ShareError>> {
    Box::pin(async move {
        if document.is_newer_than_supported() {
            warn!(
                version = %document.version,
                "share document is from a newer version; applying what is understood"
            );
            report.newer_version = Some(document.version.clone());
        }
        for source in &document.init_sources {
            match source {
                InitSource::Url(url) => {
                    replay_init_file(url, catalog, view, report, depth).await?;
                }
                InitSource::Fragment(fragment) => {
                    apply_fragment(fragment, provenance, catalog, view, report).await;
                }
            }
        }
        Ok(())
    })
}

async fn replay_init_file(
    url: &str,
    catalog: &Catalog,
    view: &mut ViewState,
    report: &mut ReplayReport,
    depth: usize,
) -> Result<(), ShareError> {
    if depth >= MAX_INIT_FILE_DEPTH {
        return Err(ShareError::Decode(format!(
            "init files nested more than {MAX_INIT_FILE_DEPTH} deep at {url}"
        )));
    }
    debug!(url, "fetching init file");
    let value = match catalog.transport().fetch_json(url).await {
        Ok(value) => value,
        Err(err) => {
            report.fail(url, err);
            return Ok(());
        }
    };
    report.init_files.push(url.to_string());

    if value.get("initSources").is_some() {
        let nested = match ShareDocument::from_value(value) {
            Ok(doc) => doc,
            Err(err) => {
                report.fail(url, err);
                return Ok(());
            }
        };
        return replay_document(&nested, Provenance::InitFile, catalog, view, report, depth + 1)
            .await;
    }

    match serde_json::from_value::<InitFragment>(value) {
        Ok(fragment) => {
            apply_fragment(&fragment, Provenance::InitFile, catalog, view, report).await
        }
        Err(err) => report.fail(url, err),
    }
    Ok(())
}

async fn apply_fragment(
    fragment: &InitFragment,
    provenance: Provenance,
    catalog: &Catalog,
    view: &mut ViewState,
    report: &mut ReplayReport,
) {
    if let Some(nodes) = &fragment.catalog {
        add_nodes(nodes, provenance, catalog, report).await;
    }
    if let Some(members) = &fragment.shared_catalog_members {
        apply_members(members, catalog, report).await;
    }
    if fragment.has_view_settings() {
        apply_view(fragment, view);
    }
    if let Some(picked) = &fragment.picked_features {
        // The map re-runs the pick and selects by hash once layers are up.
        view.pending_pick = Some(picked.clone());
    }
    if let Some(marker) = &fragment.location_marker {
        view.location_marker = Some(marker.clone());
    }
    for key in fragment.unknown.keys() {
        debug!(key = %key, "ignoring unknown share fragment");
        report.ignored_keys.push(key.clone());
    }
}

fn strip_ids(spec: &mut NodeSpec) {
    spec.id = None;
    spec.share_keys.clear();
    for child in &mut spec.items {
        strip_ids(child);
    }
}

async fn add_nodes(
    nodes: &[NodeSpec],
    provenance: Provenance,
    catalog: &Catalog,
    report: &mut ReplayReport,
) {
    for spec in nodes {
        let name = spec.name.clone();
        let added = match provenance {
            Provenance::InitFile => catalog
                .add_config(vec![spec.clone()])
                .await
                .map(|ids| ids.into_iter().next()),
            Provenance::Link => {
                let mut spec = spec.clone();
                strip_ids(&mut spec);
                catalog.add_user_data(spec).await.map(Some)
            }
        };
        match added {
            Ok(Some(id)) => report.added.push(id),
            Ok(None) => {}
            Err(err) => report.fail(name, err),
        }
    }
}

/// Finds the node for a shared key, loading ancestor groups along the key's
/// `/`-separated prefixes until it appears.
async fn resolve_member(catalog: &Catalog, key: &str) -> Option<NodeId> {
    let lookup = |k: &str| catalog.read(|tree| tree.resolve(k).cloned());
    if let Some(id) = lookup(key) {
        return Some(id);
    }
    for prefix in NodeId::new(key).ancestor_prefixes() {
        let Some(ancestor) = lookup(prefix.as_str()) else {
            continue;
        };
        let is_group = catalog.read(|tree| tree.node(&ancestor).is_some_and(|n| n.is_group()));
        if is_group {
            if let Err(err) = catalog.load(&ancestor).await {
                debug!(id = %ancestor, error = %err, "ancestor of a shared member did not load");
            }
        }
        if let Some(id) = lookup(key) {
            return Some(id);
        }
    }
    None
}

async fn apply_members(
    members: &BTreeMap<String, SharedMember>,
    catalog: &Catalog,
    report: &mut ReplayReport,
) {
    for (key, member) in members {
        let Some(id) = resolve_member(catalog, key).await else {
            warn!(key = %key, "shared catalog member not found");
            report.unresolved.push(key.clone());
            continue;
        };

        let opened = match member.is_open {
            Some(true) => catalog.open(&id),
            Some(false) => catalog.close(&id),
            None => Ok(()),
        };
        if let Err(err) = opened {
            report.fail(key.as_str(), err);
        }

        let enabled = match member.is_enabled {
            Some(true) => catalog.enable(&id).await,
            Some(false) => catalog.disable(&id),
            None => Ok(()),
        };
        if let Err(err) = enabled {
            report.fail(key.as_str(), err);
        }

        if let Some(opacity) = member.opacity {
            let props = json!({ "opacity": opacity });
            if let Some(props) = props.as_object() {
                if let Err(err) = catalog.set_properties(&id, props) {
                    report.fail(key.as_str(), err);
                }
            }
        }
        report.resolved.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::{ReplayReport, replay};
    use crate::document::ShareDocument;
    use crate::view::{ViewState, ViewerMode};
    use catalog::{Catalog, MemoryTransport, NodeId};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn unknown_fragments_are_reported_not_fatal() {
        let catalog = Catalog::new(Arc::new(MemoryTransport::new()));
        let doc = ShareDocument::from_value(json!({
            "version": "9.0.0",
            "initSources": [
                {"timeline": {"playing": true}},
                {"viewerMode": "2d"}
            ]
        }))
        .unwrap();

        let mut view = ViewState::default();
        let report = replay(&doc, &catalog, &mut view).await.unwrap();
        assert_eq!(report.ignored_keys, vec!["timeline".to_string()]);
        assert_eq!(report.newer_version.as_deref(), Some("9.0.0"));
        assert_eq!(view.viewer_mode, ViewerMode::TwoD);
    }

    #[tokio::test]
    async fn missing_members_are_listed() {
        let catalog = Catalog::new(Arc::new(MemoryTransport::new()));
        let doc = ShareDocument::from_value(json!({
            "version": "8.0.0",
            "initSources": [{"sharedCatalogMembers": {"nowhere/x": {"isEnabled": true}}}]
        }))
        .unwrap();
        let report = replay(&doc, &catalog, &mut ViewState::default())
            .await
            .unwrap();
        assert_eq!(
            report,
            ReplayReport {
                unresolved: vec!["nowhere/x".to_string()],
                ..ReplayReport::default()
            }
        );
        assert!(!catalog.read(|tree| tree.contains(&NodeId::new("nowhere"))));
    }
}
