use serde_json::Value;

use crate::error::LoadError;
use crate::load::{LoadOutcome, LoadRequest};
use crate::map::{Renderable, RenderableKind};
use crate::node::Source;
use crate::providers::{LoadContext, Provider};
use crate::transport::BoxFuture;

const GEOMETRY_TYPES: [&str; 7] = [
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

/// Number of features in a GeoJSON document, or `None` if it is not one.
pub fn feature_count(value: &Value) -> Option<usize> {
    match value.get("type").and_then(Value::as_str)? {
        "FeatureCollection" => value.get("features").and_then(Value::as_array).map(Vec::len),
        "Feature" => Some(1),
        other if GEOMETRY_TYPES.contains(&other) => Some(1),
        _ => None,
    }
}

pub fn is_geojson(value: &Value) -> bool {
    feature_count(value).is_some()
}

fn bbox(value: &Value) -> Option<[f64; 4]> {
    let b = value.get("bbox")?.as_array()?;
    if b.len() != 4 {
        return None;
    }
    Some([b[0].as_f64()?, b[1].as_f64()?, b[2].as_f64()?, b[3].as_f64()?])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonProvider;

impl Provider for GeoJsonProvider {
    fn load<'a>(
        &'a self,
        ctx: &'a LoadContext<'a>,
        request: &'a LoadRequest,
    ) -> BoxFuture<'a, Result<LoadOutcome, LoadError>> {
        Box::pin(async move {
            let (url, document) = match &request.source {
                Source::GeoJson {
                    data: Some(data), url, ..
                } => (url.clone(), data.clone()),
                Source::GeoJson {
                    url: Some(url),
                    data: None,
                } => {
                    let fetched = ctx.transport.fetch_json(&ctx.outbound(request, url)).await?;
                    (Some(url.clone()), fetched)
                }
                _ => {
                    return Err(LoadError::format(
                        "",
                        format!("{} needs either `url` or `data`", request.id),
                    ));
                }
            };

            let origin = url.clone().unwrap_or_else(|| request.id.to_string());
            let count = feature_count(&document).ok_or_else(|| {
                LoadError::format(origin, "expected a FeatureCollection, Feature or geometry")
            })?;

            let mut renderable = Renderable::new(RenderableKind::GeoJson);
            renderable.url = url;
            renderable.feature_count = Some(count);
            renderable.extent = bbox(&document);
            Ok(LoadOutcome::Renderable(renderable))
        })
    }
}
