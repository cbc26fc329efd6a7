//! Provider adapters.
//!
//! Each node type is served by a [`Provider`] registered under its
//! [`MemberType`]. Providers do network I/O through the [`Transport`],
//! validate the response shape and return a [`LoadOutcome`]; applying it to
//! the tree is left to the generic population routine in `load`.

pub mod auto;
pub mod csv;
pub mod esri;
pub mod function;
pub mod geojson;
pub mod group;

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use crate::error::LoadError;
use crate::load::{LoadOutcome, LoadRequest};
use crate::node::MemberType;
use crate::proxy::UrlProxy;
use crate::transport::{BoxFuture, Transport};

/// Collaborators handed to a provider for one load.
#[derive(Clone, Copy)]
pub struct LoadContext<'a> {
    pub transport: &'a dyn Transport,
    pub proxy: &'a UrlProxy,
    pub registry: &'a ProviderRegistry,
}

impl LoadContext<'_> {
    /// Applies the node's proxy preferences to `url`.
    pub fn outbound(&self, request: &LoadRequest, url: &str) -> String {
        self.proxy.proxy_url(&request.proxy_hints, url, None)
    }
}

/// Trait for node providers.
///
/// Implementations must be `Send + Sync`; the registry shares them between
/// concurrent loads.
pub trait Provider: Send + Sync {
    fn load<'a>(
        &'a self,
        ctx: &'a LoadContext<'a>,
        request: &'a LoadRequest,
    ) -> BoxFuture<'a, Result<LoadOutcome, LoadError>>;
}

/// Maps node types to their providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<MemberType, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a provider for every built-in node type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(MemberType::Group, Arc::new(group::StaticGroupProvider));
        registry.register(MemberType::EsriGroup, Arc::new(esri::ServicesDirectoryProvider));
        registry.register(MemberType::EsriMapServerGroup, Arc::new(esri::MapServerGroupProvider));
        registry.register(MemberType::EsriMapServer, Arc::new(esri::MapServerLayerProvider));
        registry.register(MemberType::GeoJson, Arc::new(geojson::GeoJsonProvider));
        registry.register(MemberType::Csv, Arc::new(csv::CsvProvider));
        registry.register(MemberType::Function, Arc::new(function::FunctionProvider));
        registry.register(MemberType::Auto, Arc::new(auto::AutoProvider));
        registry
    }

    /// Registers (or replaces) the provider for `member_type`.
    pub fn register(&mut self, member_type: MemberType, provider: Arc<dyn Provider>) {
        self.providers.insert(member_type, provider);
    }

    pub fn get(&self, member_type: MemberType) -> Result<&Arc<dyn Provider>, LoadError> {
        self.providers
            .get(&member_type)
            .ok_or(LoadError::NoProvider(member_type))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.providers.keys().collect();
        types.sort();
        f.debug_struct("ProviderRegistry")
            .field("types", &types)
            .finish()
    }
}

/// Display name for a child discovered under `parent_path`.
///
/// Upstream ids often repeat the parent's path (`Parent/Child_Layer`); that
/// prefix is stripped and underscores become spaces.
pub fn child_display_name(parent_path: &str, upstream_id: &str) -> String {
    let prefix = parent_path.trim_matches('/');
    let mut name = upstream_id.trim_matches('/');
    if !prefix.is_empty() {
        if let Some(rest) = name.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
            name = rest;
        }
    }
    name.replace('_', " ")
}

/// `url` with `extra` path segments appended and `f=json` in the query.
pub(crate) fn json_endpoint(url: &str, extra: &[&str]) -> Result<String, LoadError> {
    let mut parsed =
        Url::parse(url).map_err(|e| LoadError::format(url, format!("invalid URL: {e}")))?;
    if !extra.is_empty() {
        let mut segments = parsed
            .path_segments_mut()
            .map_err(|_| LoadError::format(url, "URL cannot carry a path"))?;
        segments.pop_if_empty();
        segments.extend(extra);
    }
    parsed.query_pairs_mut().append_pair("f", "json");
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{ProviderRegistry, child_display_name, json_endpoint};
    use crate::error::LoadError;
    use crate::node::MemberType;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_names_drop_the_parent_path() {
        assert_eq!(child_display_name("Transport", "Transport/Road_Network"), "Road Network");
        assert_eq!(child_display_name("Transport", "Elsewhere/Rail_Lines"), "Elsewhere/Rail Lines");
        assert_eq!(child_display_name("", "Water_Bodies"), "Water Bodies");
        assert_eq!(child_display_name("/a/b/", "a/b/c_d"), "c d");
    }

    #[test]
    fn json_endpoints_append_segments_and_format() {
        assert_eq!(
            json_endpoint("https://example.com/arcgis/rest/services/Roads/MapServer", &["3"]).unwrap(),
            "https://example.com/arcgis/rest/services/Roads/MapServer/3?f=json"
        );
        assert_eq!(
            json_endpoint("https://example.com/arcgis/rest/services/", &[]).unwrap(),
            "https://example.com/arcgis/rest/services/?f=json"
        );
        assert!(matches!(json_endpoint("not a url", &[]), Err(LoadError::Format { .. })));
    }

    #[test]
    fn defaults_cover_every_type() {
        let registry = ProviderRegistry::with_defaults();
        for t in [
            MemberType::Group,
            MemberType::EsriGroup,
            MemberType::EsriMapServerGroup,
            MemberType::EsriMapServer,
            MemberType::GeoJson,
            MemberType::Csv,
            MemberType::Function,
            MemberType::Auto,
        ] {
            assert!(registry.get(t).is_ok(), "missing provider for {t}");
        }
        assert!(matches!(
            ProviderRegistry::new().get(MemberType::Csv),
            Err(LoadError::NoProvider(MemberType::Csv))
        ));
    }
}
