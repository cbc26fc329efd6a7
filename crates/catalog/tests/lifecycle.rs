//! Integration tests for the load / enable lifecycle of the catalog handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use catalog::{
    BoxFuture, Catalog, CatalogError, CatalogEvent, LoadContext, LoadError, LoadOutcome,
    LoadRequest, LoadState, MapContext, MemberType, MemoryTransport, NodeId, NodeSpec, Provider,
    Renderable, RenderableKind, Source,
};
use futures_util::poll;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use runtime::drain_ready;
use serde_json::json;
use tokio::sync::Notify;

const MAP_SERVER: &str = "https://example.com/arcgis/rest/services/Roads/MapServer";

/// Counts calls and, when gated, waits for a permit before answering.
#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl CountingProvider {
    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gate: Some(gate),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Provider for CountingProvider {
    fn load<'a>(
        &'a self,
        _ctx: &'a LoadContext<'a>,
        _request: &'a LoadRequest,
    ) -> BoxFuture<'a, Result<LoadOutcome, LoadError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(LoadOutcome::Renderable(Renderable::new(RenderableKind::Csv)))
        })
    }
}

#[derive(Default)]
struct RecordingMap {
    calls: Mutex<Vec<String>>,
}

impl MapContext for RecordingMap {
    fn attach(&self, id: &NodeId, _renderable: &Renderable) {
        self.calls.lock().push(format!("attach {id}"));
    }

    fn detach(&self, id: &NodeId) {
        self.calls.lock().push(format!("detach {id}"));
    }
}

fn csv_spec(name: &str) -> NodeSpec {
    NodeSpec::new(
        name,
        Source::Csv {
            url: Some(format!("https://example.com/{name}.csv")),
            data: None,
        },
    )
}

fn state_of(catalog: &Catalog, id: &NodeId) -> LoadState {
    catalog.read(|tree| tree.get(id).expect("node").load_status().state())
}

#[tokio::test]
async fn concurrent_loads_share_one_provider_call() {
    let gate = Arc::new(Notify::new());
    let provider = Arc::new(CountingProvider::gated(gate.clone()));
    let catalog = Catalog::builder(Arc::new(MemoryTransport::new()))
        .provider(MemberType::Csv, provider.clone())
        .build();
    catalog.add_config(vec![csv_spec("sites")]).await.unwrap();
    let id = NodeId::new("sites");

    let mut first = std::pin::pin!(catalog.load(&id));
    assert!(poll!(first.as_mut()).is_pending());
    let mut second = std::pin::pin!(catalog.load(&id));
    assert!(poll!(second.as_mut()).is_pending());
    assert_eq!(provider.calls(), 1);
    assert_eq!(state_of(&catalog, &id), LoadState::Loading);

    gate.notify_one();
    let (a, b) = tokio::join!(first, second);
    assert_eq!(a, Ok(()));
    assert_eq!(b, Ok(()));
    assert_eq!(provider.calls(), 1);
    assert_eq!(state_of(&catalog, &id), LoadState::Loaded);
}

#[tokio::test]
async fn changing_a_load_influencing_value_reloads() {
    let provider = Arc::new(CountingProvider::default());
    let catalog = Catalog::builder(Arc::new(MemoryTransport::new()))
        .provider(MemberType::Csv, provider.clone())
        .build();
    catalog.add_config(vec![csv_spec("sites")]).await.unwrap();
    let id = NodeId::new("sites");

    catalog.load(&id).await.unwrap();
    catalog.load(&id).await.unwrap();
    assert_eq!(provider.calls(), 1);

    // Free-form properties do not influence the load.
    let cosmetic = json!({"description": "Monitoring sites"});
    catalog.set_properties(&id, cosmetic.as_object().unwrap()).unwrap();
    catalog.load(&id).await.unwrap();
    assert_eq!(provider.calls(), 1);

    let moved = json!({"url": "https://example.com/sites-v2.csv"});
    catalog.set_properties(&id, moved.as_object().unwrap()).unwrap();
    let mut events = catalog.subscribe();
    catalog.load(&id).await.unwrap();
    assert_eq!(provider.calls(), 2);

    let states: Vec<LoadState> = drain_ready(&mut events)
        .into_iter()
        .filter_map(|e| match e.payload {
            CatalogEvent::LoadStateChanged { state, .. } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![LoadState::NotLoaded, LoadState::Loading, LoadState::Loaded]
    );
}

#[tokio::test]
async fn results_for_a_removed_node_are_discarded() {
    let gate = Arc::new(Notify::new());
    let provider = Arc::new(CountingProvider::gated(gate.clone()));
    let catalog = Catalog::builder(Arc::new(MemoryTransport::new()))
        .provider(MemberType::Csv, provider.clone())
        .build();
    catalog.add_config(vec![csv_spec("sites")]).await.unwrap();
    let id = NodeId::new("sites");

    let mut stale = std::pin::pin!(catalog.load(&id));
    assert!(poll!(stale.as_mut()).is_pending());

    catalog.remove(&id).unwrap();
    catalog.add_config(vec![csv_spec("sites")]).await.unwrap();

    gate.notify_one();
    assert_eq!(stale.await, Err(LoadError::Detached(id.clone())));
    assert_eq!(state_of(&catalog, &id), LoadState::NotLoaded);

    gate.notify_one();
    catalog.load(&id).await.unwrap();
    assert_eq!(provider.calls(), 2);
    assert_eq!(state_of(&catalog, &id), LoadState::Loaded);
}

#[tokio::test]
async fn failures_are_cached_until_retry() {
    let url = "https://example.com/broken.geojson";
    let transport = Arc::new(MemoryTransport::new().with_status(url, 500));
    let catalog = Catalog::new(transport.clone());
    let spec = NodeSpec::new(
        "broken",
        Source::GeoJson {
            url: Some(url.into()),
            data: None,
        },
    );
    catalog.add_config(vec![spec]).await.unwrap();
    let id = NodeId::new("broken");
    let mut events = catalog.subscribe();

    let err = catalog.load(&id).await.unwrap_err();
    assert!(matches!(err, LoadError::Transport { .. }));
    assert_eq!(catalog.load(&id).await, Err(err.clone()));
    assert_eq!(transport.request_count(url), 1);
    assert_eq!(state_of(&catalog, &id), LoadState::Failed);

    let failed = drain_ready(&mut events)
        .into_iter()
        .find_map(|e| match e.payload {
            CatalogEvent::LoadFailed { remediation, .. } => Some(remediation),
            _ => None,
        })
        .expect("failure notification");
    assert!(failed.contains("CORS"));

    transport.insert_json(url, json!({"type": "FeatureCollection", "features": []}));
    catalog.retry(&id).await.unwrap();
    assert_eq!(transport.request_count(url), 2);
    assert_eq!(state_of(&catalog, &id), LoadState::Loaded);
}

#[tokio::test]
async fn enable_loads_then_attaches_and_removal_detaches() {
    let map = Arc::new(RecordingMap::default());
    let transport = Arc::new(MemoryTransport::new());
    let catalog = Catalog::builder(transport).map(map.clone()).build();
    let spec = NodeSpec::new(
        "inline",
        Source::Csv {
            url: None,
            data: Some("lat,lon\n-33.9,151.2\n".into()),
        },
    );
    catalog
        .add_config(vec![NodeSpec::group("g").with_items(vec![spec])])
        .await
        .unwrap();
    let id = NodeId::new("g/inline");

    catalog.enable(&id).await.unwrap();
    catalog.enable(&id).await.unwrap();
    assert_eq!(state_of(&catalog, &id), LoadState::Loaded);
    let renderable = catalog.read(|t| t.get(&id).unwrap().renderable().cloned());
    assert_eq!(renderable.and_then(|r| r.feature_count), Some(1));

    catalog.disable(&id).unwrap();
    catalog.enable(&id).await.unwrap();
    catalog.remove(&NodeId::new("g")).unwrap();

    assert_eq!(
        *map.calls.lock(),
        vec![
            "attach g/inline".to_string(),
            "detach g/inline".to_string(),
            "attach g/inline".to_string(),
            "detach g/inline".to_string(),
        ]
    );
}

#[tokio::test]
async fn groups_cannot_be_enabled() {
    let catalog = Catalog::new(Arc::new(MemoryTransport::new()));
    catalog.add_config(vec![NodeSpec::group("g")]).await.unwrap();
    assert_eq!(
        catalog.enable(&NodeId::new("g")).await,
        Err(CatalogError::NotAnItem(NodeId::new("g")))
    );
}

#[tokio::test]
async fn opening_a_service_group_populates_children_in_order() {
    let transport = Arc::new(MemoryTransport::new().with_json(
        format!("{MAP_SERVER}?f=json"),
        json!({"layers": [{"id": 0, "name": "Highways"}, {"id": 1, "name": "Local_Roads"}]}),
    ));
    let catalog = Catalog::new(transport.clone());
    let spec = NodeSpec::new(
        "Roads",
        Source::EsriMapServerGroup {
            url: MAP_SERVER.into(),
        },
    );
    catalog.add_config(vec![spec]).await.unwrap();
    let mut events = catalog.subscribe();
    let g = NodeId::new("Roads");

    catalog.open(&g).unwrap();
    assert_eq!(state_of(&catalog, &g), LoadState::NotLoaded);
    catalog.open_and_load(&g).await.unwrap();

    let items = catalog.read(|t| t.get(&g).unwrap().items().to_vec());
    assert_eq!(
        items,
        vec![NodeId::new("Roads/Highways"), NodeId::new("Roads/Local Roads")]
    );

    let seen: Vec<CatalogEvent> = drain_ready(&mut events).into_iter().map(|e| e.payload).collect();
    assert_eq!(
        seen,
        vec![
            CatalogEvent::Opened { id: g.clone() },
            CatalogEvent::LoadStateChanged {
                id: g.clone(),
                state: LoadState::Loading
            },
            CatalogEvent::NodeAdded {
                id: NodeId::new("Roads/Highways"),
                parent: g.clone()
            },
            CatalogEvent::NodeAdded {
                id: NodeId::new("Roads/Local Roads"),
                parent: g.clone()
            },
            CatalogEvent::LoadStateChanged {
                id: g.clone(),
                state: LoadState::Loaded
            },
        ]
    );

    // A second load of an unchanged upstream is a no-op.
    catalog.load(&g).await.unwrap();
    assert_eq!(transport.request_count(&format!("{MAP_SERVER}?f=json")), 1);
}

#[tokio::test]
async fn auto_nodes_record_what_they_resolved_to() {
    let transport = Arc::new(MemoryTransport::new().with_json(
        format!("{MAP_SERVER}?f=json"),
        json!({"layers": [{"id": 4, "name": "Bridges"}]}),
    ));
    let catalog = Catalog::new(transport);
    let id = catalog
        .add_user_data(NodeSpec::new(
            "Pasted URL",
            Source::Auto {
                url: MAP_SERVER.into(),
            },
        ))
        .await
        .unwrap();

    catalog.load(&id).await.unwrap();
    let (resolved, children, user_supplied) = catalog.read(|t| {
        let node = t.get(&id).unwrap();
        let child = t.get(&node.items()[0]).unwrap();
        (
            node.load_status().resolved_type(),
            node.items().len(),
            child.is_user_supplied(),
        )
    });
    assert_eq!(resolved, Some(MemberType::EsriMapServerGroup));
    assert_eq!(children, 1);
    assert!(user_supplied);
    assert!(id.as_str().starts_with("__User-Added_Data__/"));
}

#[tokio::test]
async fn invoking_a_function_adds_enabled_results() {
    let fn_url = "https://example.com/wps/buffer";
    let out_url = "https://example.com/out/buffer.geojson";
    let transport = Arc::new(
        MemoryTransport::new()
            .with_json(
                fn_url,
                json!({"name": "Buffer", "parameters": [{"id": "distance", "type": "number", "required": true}]}),
            )
            .with_json(out_url, json!({"type": "FeatureCollection", "features": [{}]})),
    );
    let catalog = Catalog::new(transport.clone());
    catalog
        .add_config(vec![NodeSpec::new(
            "Buffer",
            Source::Function { url: fn_url.into() },
        )])
        .await
        .unwrap();
    let id = NodeId::new("Buffer");

    let err = catalog
        .invoke_function(&id, serde_json::Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Invalid(_)));

    // Reuse the same URL for the invocation reply.
    transport.insert_json(
        fn_url,
        json!({"results": [{"name": "Buffered", "type": "geojson", "url": out_url}]}),
    );
    let inputs = json!({"distance": 250}).as_object().unwrap().clone();
    let added = catalog.invoke_function(&id, inputs).await.unwrap();

    assert_eq!(added.len(), 1);
    let (enabled, user_supplied) =
        catalog.read(|t| {
            let n = t.get(&added[0]).unwrap();
            (n.is_enabled(), n.is_user_supplied())
        });
    assert!(enabled && user_supplied);
    assert_eq!(transport.posts()[0].1, json!({"inputs": {"distance": 250}}));
}
