//! Shared, asynchronous handle over a [`CatalogTree`].

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use runtime::Event;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, LoadError, Result};
use crate::events::CatalogEvent;
use crate::load::{LoadPlan, LoadRequest};
use crate::map::{DetachedMap, MapContext};
use crate::node::{MemberType, NodeId, NodeOrigin, NodeSpec, Source};
use crate::providers::function::parse_results;
use crate::providers::{LoadContext, Provider, ProviderRegistry};
use crate::proxy::{ProxyConfig, ProxyHints, UrlProxy};
use crate::transport::Transport;
use crate::tree::CatalogTree;

type LoadHandle = Shared<BoxFuture<'static, std::result::Result<(), LoadError>>>;

struct State {
    tree: CatalogTree,
    /// In-flight loads keyed by node, tagged with the insertion serial they
    /// were started for.
    inflight: HashMap<NodeId, (u64, LoadHandle)>,
}

struct Inner {
    state: Mutex<State>,
    transport: Arc<dyn Transport>,
    proxy: UrlProxy,
    registry: ProviderRegistry,
    map: Arc<dyn MapContext>,
}

pub struct CatalogBuilder {
    transport: Arc<dyn Transport>,
    proxy: UrlProxy,
    registry: ProviderRegistry,
    map: Arc<dyn MapContext>,
    tree: CatalogTree,
}

impl CatalogBuilder {
    pub fn proxy(mut self, config: ProxyConfig) -> Self {
        self.proxy = UrlProxy::new(config);
        self
    }

    pub fn map(mut self, map: Arc<dyn MapContext>) -> Self {
        self.map = map;
        self
    }

    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Registers (or replaces) a single provider.
    pub fn provider(mut self, member_type: MemberType, provider: Arc<dyn Provider>) -> Self {
        self.registry.register(member_type, provider);
        self
    }

    pub fn tree(mut self, tree: CatalogTree) -> Self {
        self.tree = tree;
        self
    }

    pub fn build(self) -> Catalog {
        Catalog {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    tree: self.tree,
                    inflight: HashMap::new(),
                }),
                transport: self.transport,
                proxy: self.proxy,
                registry: self.registry,
                map: self.map,
            }),
        }
    }
}

/// Cloneable handle to the live catalog.
///
/// The tree sits behind a mutex that is never held across an `.await`.
/// Loads are single-flight: concurrent callers share one provider call.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<Inner>,
}

impl Catalog {
    pub fn builder(transport: Arc<dyn Transport>) -> CatalogBuilder {
        CatalogBuilder {
            transport,
            proxy: UrlProxy::default(),
            registry: ProviderRegistry::with_defaults(),
            map: Arc::new(DetachedMap),
            tree: CatalogTree::new(),
        }
    }

    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::builder(transport).build()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn proxy(&self) -> &UrlProxy {
        &self.inner.proxy
    }

    /// Runs `f` against a consistent view of the tree.
    pub fn read<R>(&self, f: impl FnOnce(&CatalogTree) -> R) -> R {
        f(&self.inner.state.lock().tree)
    }

    pub fn subscribe(&self) -> UnboundedReceiver<Event<CatalogEvent>> {
        self.inner.state.lock().tree.subscribe()
    }

    /// Adds base-configuration nodes under the root and enables those that
    /// ask for it.
    pub async fn add_config(&self, specs: Vec<NodeSpec>) -> Result<Vec<NodeId>> {
        let mut ids = Vec::with_capacity(specs.len());
        let mut to_enable = Vec::new();
        {
            let mut state = self.inner.state.lock();
            let root = NodeId::root();
            for spec in specs {
                let inserted = state.tree.insert(&root, None, spec, NodeOrigin::Config)?;
                ids.push(inserted.id);
                to_enable.extend(inserted.to_enable);
            }
        }
        self.enable_requested(to_enable).await;
        Ok(ids)
    }

    /// Adds `spec` under `parent`.
    pub async fn add(&self, parent: &NodeId, spec: NodeSpec) -> Result<NodeId> {
        let inserted = self
            .inner
            .state
            .lock()
            .tree
            .insert(parent, None, spec, NodeOrigin::Config)?;
        self.enable_requested(inserted.to_enable).await;
        Ok(inserted.id)
    }

    /// Adds user data under the "User-Added Data" group with a fresh id.
    pub async fn add_user_data(&self, spec: NodeSpec) -> Result<NodeId> {
        self.insert_user_data(spec, false).await
    }

    /// Like [`Catalog::add_user_data`] for data read from a local file; such
    /// nodes are never shared.
    pub async fn add_local_file(&self, spec: NodeSpec) -> Result<NodeId> {
        self.insert_user_data(spec, true).await
    }

    async fn insert_user_data(&self, mut spec: NodeSpec, local: bool) -> Result<NodeId> {
        let group = NodeId::user_added_group();
        spec.id = Some(group.child(&uuid::Uuid::new_v4().to_string()).to_string());
        spec.is_user_supplied = true;
        let inserted = {
            let mut state = self.inner.state.lock();
            state.tree.ensure_user_added_group()?;
            let inserted = state.tree.insert(&group, None, spec, NodeOrigin::User)?;
            if local {
                state.tree.mark_local_data(&inserted.id)?;
            }
            inserted
        };
        info!(id = %inserted.id, "user data added");
        self.enable_requested(inserted.to_enable).await;
        Ok(inserted.id)
    }

    /// Removes `id` and its subtree, detaching anything that was enabled.
    pub fn remove(&self, id: &NodeId) -> Result<()> {
        let removed = {
            let mut state = self.inner.state.lock();
            let removed = state.tree.remove(id)?;
            for node in &removed {
                state.inflight.remove(node.id());
            }
            removed
        };
        for node in removed.iter().filter(|n| n.is_enabled()) {
            self.inner.map.detach(node.id());
        }
        Ok(())
    }

    pub fn move_to(&self, id: &NodeId, new_parent: &NodeId, index: usize) -> Result<()> {
        self.inner
            .state
            .lock()
            .tree
            .move_node(id, new_parent, index)
    }

    /// Expands `id`. Does not load.
    pub fn open(&self, id: &NodeId) -> Result<()> {
        self.inner.state.lock().tree.set_open(id, true).map(|_| ())
    }

    pub fn close(&self, id: &NodeId) -> Result<()> {
        self.inner.state.lock().tree.set_open(id, false).map(|_| ())
    }

    /// Opens a group and loads it, which is what expanding it in a UI does.
    pub async fn open_and_load(&self, id: &NodeId) -> Result<()> {
        let is_group = {
            let mut state = self.inner.state.lock();
            state.tree.set_open(id, true)?;
            state.tree.get(id)?.is_group()
        };
        if is_group {
            self.load(id).await?;
        }
        Ok(())
    }

    pub fn set_properties(&self, id: &NodeId, props: &Map<String, Value>) -> Result<()> {
        self.inner.state.lock().tree.set_properties(id, props)
    }

    /// Loads `id` if it is not already loaded against its current
    /// load-influencing values.
    pub async fn load(&self, id: &NodeId) -> std::result::Result<(), LoadError> {
        let handle = {
            let mut state = self.inner.state.lock();
            if let Some((_, handle)) = state.inflight.get(id) {
                debug!(id = %id, "joining in-flight load");
                handle.clone()
            } else {
                match state.tree.begin_load(id)? {
                    LoadPlan::Ready => return Ok(()),
                    LoadPlan::Failed(err) => return Err(err),
                    LoadPlan::Start {
                        request,
                        serial,
                        key,
                    } => {
                        let handle = self.start_load(request, serial, key);
                        state.inflight.insert(id.clone(), (serial, handle.clone()));
                        handle
                    }
                }
            }
        };
        handle.await
    }

    fn start_load(&self, request: LoadRequest, serial: u64, key: String) -> LoadHandle {
        let inner = Arc::clone(&self.inner);
        async move {
            let id = request.id.clone();
            let result = match inner.registry.get(request.source.member_type()) {
                Ok(provider) => {
                    let ctx = LoadContext {
                        transport: inner.transport.as_ref(),
                        proxy: &inner.proxy,
                        registry: &inner.registry,
                    };
                    provider.load(&ctx, &request).await
                }
                Err(err) => Err(err),
            };

            let finished = {
                let mut state = inner.state.lock();
                if state.inflight.get(&id).is_some_and(|(s, _)| *s == serial) {
                    state.inflight.remove(&id);
                }
                state.tree.finish_load(&id, serial, key, result)
            };
            let dropped = match finished {
                Ok(dropped) => dropped,
                Err(err) => return Err(err),
            };
            for id in &dropped {
                inner.map.detach(id);
            }
            Ok::<(), LoadError>(())
        }
        .boxed()
        .shared()
    }

    /// `Failed -> NotLoaded`, then loads again.
    pub async fn retry(&self, id: &NodeId) -> std::result::Result<(), LoadError> {
        self.inner.state.lock().tree.reset_failed(id)?;
        self.load(id).await
    }

    /// Loads the item and attaches it to the map.
    pub async fn enable(&self, id: &NodeId) -> Result<()> {
        {
            let state = self.inner.state.lock();
            let node = state.tree.get(id)?;
            if node.is_group() {
                return Err(CatalogError::NotAnItem(id.clone()));
            }
            if node.is_enabled() {
                return Ok(());
            }
        }

        self.load(id).await?;

        let attach = {
            let mut state = self.inner.state.lock();
            if state.tree.set_enabled(id, true)? {
                state.tree.get(id)?.renderable().cloned()
            } else {
                None
            }
        };
        if let Some(renderable) = attach {
            self.inner.map.attach(id, &renderable);
        }
        Ok(())
    }

    pub fn disable(&self, id: &NodeId) -> Result<()> {
        let changed = {
            let mut state = self.inner.state.lock();
            if state.tree.get(id)?.is_group() {
                return Err(CatalogError::NotAnItem(id.clone()));
            }
            state.tree.set_enabled(id, false)?
        };
        if changed {
            self.inner.map.detach(id);
        }
        Ok(())
    }

    async fn enable_requested(&self, ids: Vec<NodeId>) {
        for id in ids {
            let is_item = self.read(|tree| tree.node(&id).is_some_and(|n| !n.is_group()));
            if !is_item {
                continue;
            }
            if let Err(err) = self.enable(&id).await {
                warn!(id = %id, error = %err, "could not enable catalog item");
            }
        }
    }

    /// Runs a function item with `inputs` and adds its results as user data.
    /// Returns the ids of the added nodes.
    pub async fn invoke_function(
        &self,
        id: &NodeId,
        inputs: Map<String, Value>,
    ) -> Result<Vec<NodeId>> {
        self.load(id).await?;
        let (url, hints, description) = self.read(|tree| -> Result<_> {
            let node = tree.get(id)?;
            let Source::Function { url } = node.source() else {
                return Err(CatalogError::NotAnItem(id.clone()));
            };
            let description = node
                .function()
                .cloned()
                .ok_or_else(|| CatalogError::Invalid(format!("{id} has no description")))?;
            Ok((
                url.clone(),
                ProxyHints::from_properties(node.properties()),
                description,
            ))
        })?;

        let missing = description.missing_inputs(&inputs);
        if !missing.is_empty() {
            return Err(CatalogError::Invalid(format!(
                "missing required inputs: {}",
                missing.join(", ")
            )));
        }

        let endpoint = self.inner.proxy.proxy_url(&hints, &url, Some("0d"));
        let body = json!({ "inputs": inputs });
        let reply = self
            .inner
            .transport
            .post_json(&endpoint, &body)
            .await
            .map_err(LoadError::from)?;
        let results = parse_results(&url, reply)?;

        let mut added = Vec::with_capacity(results.len());
        for mut spec in results {
            spec.is_enabled = !spec.source.member_type().is_group();
            added.push(self.add_user_data(spec).await?);
        }
        info!(id = %id, results = added.len(), "function invoked");
        Ok(added)
    }
}
