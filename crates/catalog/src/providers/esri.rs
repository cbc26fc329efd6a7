//! ArcGIS REST providers: services directories, MapServer services and
//! individual MapServer layers.

use serde_json::Value;
use tracing::debug;

use crate::error::LoadError;
use crate::load::{LoadOutcome, LoadRequest};
use crate::map::{Renderable, RenderableKind};
use crate::node::{NodeSpec, Source};
use crate::providers::{LoadContext, Provider, child_display_name, json_endpoint};
use crate::transport::BoxFuture;

const SERVICES_MARKER: &str = "/rest/services";

/// Splits a services-directory URL into the directory root (through
/// `/rest/services`) and the folder path below it.
pub fn services_root(url: &str) -> Option<(String, String)> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let trimmed = without_query.trim_end_matches('/');
    let idx = trimmed.find(SERVICES_MARKER)?;
    let end = idx + SERVICES_MARKER.len();
    let folder = trimmed[end..].trim_matches('/').to_string();
    Some((trimmed[..end].to_string(), folder))
}

/// Service path of a MapServer URL relative to the services root, e.g.
/// `Transport/Roads` for `.../rest/services/Transport/Roads/MapServer`.
fn service_path(url: &str) -> String {
    services_root(url)
        .map(|(_, path)| {
            path.trim_end_matches("MapServer")
                .trim_matches('/')
                .to_string()
        })
        .unwrap_or_default()
}

/// Extent in degrees when the spatial reference is geographic WGS84.
fn wgs84_extent(extent: Option<&Value>) -> Option<[f64; 4]> {
    let extent = extent?;
    let wkid = extent
        .get("spatialReference")
        .and_then(|sr| sr.get("latestWkid").or_else(|| sr.get("wkid")))
        .and_then(Value::as_u64)?;
    if wkid != 4326 {
        return None;
    }
    let coord = |key: &str| extent.get(key).and_then(Value::as_f64);
    Some([coord("xmin")?, coord("ymin")?, coord("xmax")?, coord("ymax")?])
}

async fn fetch(
    ctx: &LoadContext<'_>,
    request: &LoadRequest,
    url: &str,
    extra: &[&str],
) -> Result<Value, LoadError> {
    let endpoint = json_endpoint(url, extra)?;
    let value = ctx
        .transport
        .fetch_json(&ctx.outbound(request, &endpoint))
        .await?;
    // ArcGIS reports failures in a 200 body.
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("service error");
        return Err(LoadError::format(endpoint, message));
    }
    Ok(value)
}

fn required_url(request: &LoadRequest) -> Result<&str, LoadError> {
    request
        .source
        .url()
        .ok_or_else(|| LoadError::format("", format!("{} has no url", request.id)))
}

/// `esri-group`: one child per folder and per MapServer service.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServicesDirectoryProvider;

impl Provider for ServicesDirectoryProvider {
    fn load<'a>(
        &'a self,
        ctx: &'a LoadContext<'a>,
        request: &'a LoadRequest,
    ) -> BoxFuture<'a, Result<LoadOutcome, LoadError>> {
        Box::pin(async move {
            let url = required_url(request)?;
            let (root, folder) = services_root(url).ok_or_else(|| {
                LoadError::format(url, "not an ArcGIS REST services directory")
            })?;
            let value = fetch(ctx, request, url, &[]).await?;

            let folders = value.get("folders").and_then(Value::as_array);
            let services = value.get("services").and_then(Value::as_array);
            if folders.is_none() && services.is_none() {
                return Err(LoadError::format(
                    url,
                    "expected `folders` or `services` in the directory listing",
                ));
            }

            let mut children = Vec::new();
            for sub in folders.into_iter().flatten().filter_map(Value::as_str) {
                children.push(NodeSpec::new(
                    child_display_name(&folder, sub),
                    Source::EsriGroup {
                        url: format!("{root}/{sub}"),
                    },
                ));
            }
            for service in services.into_iter().flatten() {
                let Some(name) = service.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let kind = service.get("type").and_then(Value::as_str).unwrap_or("");
                if kind != "MapServer" {
                    debug!(service = name, kind, "skipping unsupported service type");
                    continue;
                }
                children.push(NodeSpec::new(
                    child_display_name(&folder, name),
                    Source::EsriMapServerGroup {
                        url: format!("{root}/{name}/MapServer"),
                    },
                ));
            }
            Ok(LoadOutcome::Children(children))
        })
    }
}

/// `esri-mapServer-group`: one `esri-mapServer` child per layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapServerGroupProvider;

impl Provider for MapServerGroupProvider {
    fn load<'a>(
        &'a self,
        ctx: &'a LoadContext<'a>,
        request: &'a LoadRequest,
    ) -> BoxFuture<'a, Result<LoadOutcome, LoadError>> {
        Box::pin(async move {
            let url = required_url(request)?;
            let value = fetch(ctx, request, url, &[]).await?;
            let layers = value
                .get("layers")
                .and_then(Value::as_array)
                .ok_or_else(|| missing_layers(url))?;

            let prefix = service_path(url);
            let service_url = url.trim_end_matches('/').to_string();
            let children = layers
                .iter()
                .filter_map(|layer| {
                    let id = layer.get("id").and_then(Value::as_i64)?;
                    let name = layer.get("name").and_then(Value::as_str)?;
                    Some(NodeSpec::new(
                        child_display_name(&prefix, name),
                        Source::EsriMapServer {
                            url: service_url.clone(),
                            layers: Some(id.to_string()),
                        },
                    ))
                })
                .collect();
            Ok(LoadOutcome::Children(children))
        })
    }
}

/// `esri-mapServer`: validates the layer (or whole service) and produces a
/// renderable.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapServerLayerProvider;

impl Provider for MapServerLayerProvider {
    fn load<'a>(
        &'a self,
        ctx: &'a LoadContext<'a>,
        request: &'a LoadRequest,
    ) -> BoxFuture<'a, Result<LoadOutcome, LoadError>> {
        Box::pin(async move {
            let url = required_url(request)?;
            let requested: Vec<String> = match &request.source {
                Source::EsriMapServer {
                    layers: Some(layers),
                    ..
                } => layers
                    .split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            };

            let mut renderable = Renderable::new(RenderableKind::EsriMapServer);
            renderable.url = Some(url.trim_end_matches('/').to_string());

            if let Some(first) = requested.first() {
                let value = fetch(ctx, request, url, &[first.as_str()]).await?;
                if value.get("name").and_then(Value::as_str).is_none() {
                    return Err(LoadError::format(url, format!("layer {first} has no name")));
                }
                renderable.extent = wgs84_extent(value.get("extent"));
                renderable.layers = requested;
            } else {
                let value = fetch(ctx, request, url, &[]).await?;
                let layers = value
                    .get("layers")
                    .and_then(Value::as_array)
                    .ok_or_else(|| missing_layers(url))?;
                renderable.layers = layers
                    .iter()
                    .filter_map(|l| l.get("id").and_then(Value::as_i64))
                    .map(|id| id.to_string())
                    .collect();
                renderable.extent = wgs84_extent(value.get("fullExtent"));
            }
            Ok(LoadOutcome::Renderable(renderable))
        })
    }
}

fn missing_layers(url: &str) -> LoadError {
    LoadError::format(url, "expected `layers` in the MapServer description")
}
