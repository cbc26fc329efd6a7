//! `auto` nodes: the concrete type is worked out from the URL, or failing
//! that from the shape of the response, and the load is handed to that
//! type's provider.

use serde_json::Value;
use tracing::debug;

use crate::error::LoadError;
use crate::load::{LoadOutcome, LoadRequest};
use crate::node::{NodeSpec, Source};
use crate::providers::esri::services_root;
use crate::providers::geojson::is_geojson;
use crate::providers::{LoadContext, Provider};
use crate::transport::BoxFuture;

/// Resolves a source from URL suffixes alone.
pub fn resolve_by_url(url: &str) -> Option<Source> {
    let path = url.split(['?', '#']).next().unwrap_or(url).trim_end_matches('/');
    let lower = path.to_ascii_lowercase();

    if lower.ends_with("/mapserver") {
        return Some(Source::EsriMapServerGroup {
            url: path.to_string(),
        });
    }
    if let Some((service, layer)) = path.rsplit_once('/') {
        let is_layer = !layer.is_empty() && layer.bytes().all(|b| b.is_ascii_digit());
        if is_layer && service.to_ascii_lowercase().ends_with("/mapserver") {
            return Some(Source::EsriMapServer {
                url: service.to_string(),
                layers: Some(layer.to_string()),
            });
        }
    }
    if let Some((_, folder)) = services_root(path) {
        let names_a_service = folder
            .rsplit('/')
            .next()
            .is_some_and(|last| last.to_ascii_lowercase().ends_with("server"));
        if !names_a_service {
            return Some(Source::EsriGroup {
                url: path.to_string(),
            });
        }
    }
    if lower.ends_with(".geojson") || lower.ends_with(".json") {
        return Some(Source::GeoJson {
            url: Some(url.to_string()),
            data: None,
        });
    }
    if lower.ends_with(".csv") {
        return Some(Source::Csv {
            url: Some(url.to_string()),
            data: None,
        });
    }
    None
}

/// Resolves a source from what `url` returned.
pub fn resolve_by_response(url: &str, response: &Value) -> Option<Source> {
    if response.get("layers").is_some_and(Value::is_array) {
        return Some(Source::EsriMapServerGroup {
            url: url.to_string(),
        });
    }
    if response.get("folders").is_some() || response.get("services").is_some() {
        return Some(Source::EsriGroup {
            url: url.to_string(),
        });
    }
    if is_geojson(response) {
        return Some(Source::GeoJson {
            url: Some(url.to_string()),
            data: None,
        });
    }
    None
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AutoProvider;

impl Provider for AutoProvider {
    fn load<'a>(
        &'a self,
        ctx: &'a LoadContext<'a>,
        request: &'a LoadRequest,
    ) -> BoxFuture<'a, Result<LoadOutcome, LoadError>> {
        Box::pin(async move {
            let Source::Auto { url } = &request.source else {
                return Err(LoadError::format("", format!("{} is not an auto node", request.id)));
            };

            let resolved = match resolve_by_url(url) {
                Some(source) => source,
                None => {
                    let response = ctx.transport.fetch_json(&ctx.outbound(request, url)).await?;
                    resolve_by_response(url, &response).ok_or_else(|| {
                        LoadError::format(url.as_str(), "could not determine the service type")
                    })?
                }
            };
            let resolved_type = resolved.member_type();
            debug!(id = %request.id, resolved = %resolved_type, "dispatching auto node");

            if !resolved_type.is_group() {
                // Items live below the auto node as its only child.
                return Ok(LoadOutcome::Dispatched {
                    resolved: resolved_type,
                    children: vec![NodeSpec::new(request.name.clone(), resolved)],
                });
            }

            let provider = ctx.registry.get(resolved_type)?;
            let delegated = LoadRequest {
                source: resolved,
                ..request.clone()
            };
            let children = match provider.load(ctx, &delegated).await? {
                LoadOutcome::Children(children)
                | LoadOutcome::Dispatched { children, .. } => children,
                LoadOutcome::Renderable(_) | LoadOutcome::Function(_) | LoadOutcome::Unchanged => {
                    Vec::new()
                }
            };
            Ok(LoadOutcome::Dispatched {
                resolved: resolved_type,
                children,
            })
        })
    }
}
