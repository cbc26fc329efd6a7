use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::load::LoadStatus;
use crate::map::Renderable;
use crate::providers::function::FunctionDescription;

/// Id of the implicit root group.
pub const ROOT_ID: &str = "/";

/// Id and name of the group that receives user-added data.
pub const USER_ADDED_GROUP_ID: &str = "__User-Added_Data__";
pub const USER_ADDED_GROUP_NAME: &str = "User-Added Data";

/// Stable node identity. Doubles as the share key.
///
/// Ids of nested nodes are built as `"{parent}/{name}"`, so the `/`-separated
/// prefixes of an id name its ancestors. Children of the root use the bare name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    pub fn user_added_group() -> Self {
        Self(USER_ADDED_GROUP_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    /// Id for a child called `name` under this node.
    pub fn child(&self, name: &str) -> NodeId {
        if self.is_root() {
            NodeId::new(name)
        } else {
            NodeId::new(format!("{}/{}", self.0, name))
        }
    }

    /// Proper prefixes of the id, outermost first: `"a/b/c"` yields `a`, `a/b`.
    pub fn ancestor_prefixes(&self) -> Vec<NodeId> {
        self.0
            .match_indices('/')
            .filter(|(idx, _)| *idx > 0)
            .map(|(idx, _)| NodeId::new(&self.0[..idx]))
            .collect()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::new(s)
    }
}

/// Provider tag of a node. Selects the adapter in the `ProviderRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemberType {
    #[serde(rename = "group")]
    Group,
    #[serde(rename = "esri-group")]
    EsriGroup,
    #[serde(rename = "esri-mapServer-group")]
    EsriMapServerGroup,
    #[serde(rename = "esri-mapServer")]
    EsriMapServer,
    #[serde(rename = "geojson")]
    GeoJson,
    #[serde(rename = "csv")]
    Csv,
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "auto")]
    Auto,
}

impl MemberType {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberType::Group => "group",
            MemberType::EsriGroup => "esri-group",
            MemberType::EsriMapServerGroup => "esri-mapServer-group",
            MemberType::EsriMapServer => "esri-mapServer",
            MemberType::GeoJson => "geojson",
            MemberType::Csv => "csv",
            MemberType::Function => "function",
            MemberType::Auto => "auto",
        }
    }

    /// Whether nodes of this type own children.
    pub fn is_group(self) -> bool {
        matches!(
            self,
            MemberType::Group
                | MemberType::EsriGroup
                | MemberType::EsriMapServerGroup
                | MemberType::Auto
        )
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a node's content comes from. Each variant carries only what its
/// provider needs; the serde tag is the wire `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Source {
    #[serde(rename = "group")]
    Group,
    #[serde(rename = "esri-group")]
    EsriGroup { url: String },
    #[serde(rename = "esri-mapServer-group")]
    EsriMapServerGroup { url: String },
    #[serde(rename = "esri-mapServer")]
    EsriMapServer {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        layers: Option<String>,
    },
    #[serde(rename = "geojson")]
    GeoJson {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename = "csv")]
    Csv {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    #[serde(rename = "function")]
    Function { url: String },
    #[serde(rename = "auto")]
    Auto { url: String },
}

impl Source {
    pub fn member_type(&self) -> MemberType {
        match self {
            Source::Group => MemberType::Group,
            Source::EsriGroup { .. } => MemberType::EsriGroup,
            Source::EsriMapServerGroup { .. } => MemberType::EsriMapServerGroup,
            Source::EsriMapServer { .. } => MemberType::EsriMapServer,
            Source::GeoJson { .. } => MemberType::GeoJson,
            Source::Csv { .. } => MemberType::Csv,
            Source::Function { .. } => MemberType::Function,
            Source::Auto { .. } => MemberType::Auto,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Source::Group => None,
            Source::EsriGroup { url }
            | Source::EsriMapServerGroup { url }
            | Source::EsriMapServer { url, .. }
            | Source::Function { url }
            | Source::Auto { url } => Some(url),
            Source::GeoJson { url, .. } | Source::Csv { url, .. } => url.as_deref(),
        }
    }

    /// Replaces the URL. Returns `false` for sources that have none.
    pub fn set_url(&mut self, new_url: String) -> bool {
        match self {
            Source::Group => false,
            Source::EsriGroup { url }
            | Source::EsriMapServerGroup { url }
            | Source::EsriMapServer { url, .. }
            | Source::Function { url }
            | Source::Auto { url } => {
                *url = new_url;
                true
            }
            Source::GeoJson { url, .. } | Source::Csv { url, .. } => {
                *url = Some(new_url);
                true
            }
        }
    }

    /// True for items whose content is embedded rather than fetched.
    pub fn has_inline_data(&self) -> bool {
        matches!(
            self,
            Source::GeoJson { data: Some(_), .. } | Source::Csv { data: Some(_), .. }
        )
    }
}

/// How a node came to be in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeOrigin {
    /// Defined by the base configuration.
    Config,
    /// Created by the parent's provider while it loaded.
    Generated,
    /// Added by the user at runtime.
    User,
}

/// Child bookkeeping carried by group nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupState {
    pub(crate) items: Vec<NodeId>,
    pub(crate) blacklist: Vec<String>,
    pub(crate) item_properties: Map<String, Value>,
}

/// A node in the live catalog tree.
///
/// Nodes are owned by the `CatalogTree`; `parent` is an id lookup, never an
/// owning link. Mutation goes through the tree so that every change is
/// announced on its event bus.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogNode {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) source: Source,
    pub(crate) share_keys: Vec<String>,
    pub(crate) is_user_supplied: bool,
    pub(crate) is_enabled: bool,
    pub(crate) is_open: bool,
    pub(crate) origin: NodeOrigin,
    pub(crate) has_local_data: bool,
    pub(crate) properties: Map<String, Value>,
    pub(crate) group: Option<GroupState>,
    pub(crate) load: LoadStatus,
    /// Insertion serial, distinguishes a re-added node from the one a stale
    /// load was started for.
    pub(crate) serial: u64,
}

impl CatalogNode {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&NodeId> {
        self.parent.as_ref()
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn member_type(&self) -> MemberType {
        self.source.member_type()
    }

    pub fn url(&self) -> Option<&str> {
        self.source.url()
    }

    pub fn share_keys(&self) -> &[String] {
        &self.share_keys
    }

    pub fn is_user_supplied(&self) -> bool {
        self.is_user_supplied
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn origin(&self) -> NodeOrigin {
        self.origin
    }

    pub fn has_local_data(&self) -> bool {
        self.has_local_data
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn is_group(&self) -> bool {
        self.group.is_some()
    }

    /// Ordered child ids; empty for items.
    pub fn items(&self) -> &[NodeId] {
        self.group.as_ref().map(|g| g.items.as_slice()).unwrap_or(&[])
    }

    pub fn blacklist(&self) -> &[String] {
        self.group
            .as_ref()
            .map(|g| g.blacklist.as_slice())
            .unwrap_or(&[])
    }

    pub fn item_properties(&self) -> Option<&Map<String, Value>> {
        self.group.as_ref().map(|g| &g.item_properties)
    }

    pub fn load_status(&self) -> &LoadStatus {
        &self.load
    }

    pub fn renderable(&self) -> Option<&Renderable> {
        self.load.renderable.as_ref()
    }

    pub fn function(&self) -> Option<&FunctionDescription> {
        self.load.function.as_ref()
    }

    /// Digest over every value whose change invalidates a finished load.
    pub fn load_key(&self) -> String {
        let group = self.group.as_ref();
        let influence = serde_json::json!({
            "source": &self.source,
            "blacklist": group.map(|g| &g.blacklist),
            "itemProperties": group.map(|g| &g.item_properties),
        });
        // serde_json maps are ordered, so the encoding is canonical.
        let bytes = serde_json::to_vec(&influence).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    /// Rebuilds the wire form of this node, without children.
    pub fn to_spec(&self) -> NodeSpec {
        NodeSpec {
            name: self.name.clone(),
            source: self.source.clone(),
            id: Some(self.id.as_str().to_string()),
            share_keys: self.share_keys.clone(),
            is_enabled: self.is_enabled,
            is_open: self.is_open,
            is_user_supplied: self.is_user_supplied,
            blacklist: self.blacklist().to_vec(),
            item_properties: self.item_properties().cloned().unwrap_or_default(),
            properties: self.properties.clone(),
            items: Vec::new(),
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Wire and configuration form of a node.
///
/// Used for base configuration files, for children produced by providers, and
/// for the user-added `catalog` share fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub name: String,
    #[serde(flatten)]
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub share_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_enabled: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_open: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_user_supplied: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blacklist: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub item_properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            source,
            id: None,
            share_keys: Vec::new(),
            is_enabled: false,
            is_open: false,
            is_user_supplied: false,
            blacklist: Vec::new(),
            item_properties: Map::new(),
            properties: Map::new(),
            items: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, Source::Group)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_items(mut self, items: Vec<NodeSpec>) -> Self {
        self.items = items;
        self
    }

    pub fn enabled(mut self) -> Self {
        self.is_enabled = true;
        self
    }

    pub fn opened(mut self) -> Self {
        self.is_open = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{MemberType, NodeId, NodeSpec, Source};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn child_ids_use_slash_paths() {
        let root = NodeId::root();
        let g = root.child("g");
        assert_eq!(g.as_str(), "g");
        assert_eq!(g.child("i").as_str(), "g/i");
    }

    #[test]
    fn ancestor_prefixes_are_outermost_first() {
        let id = NodeId::new("a/b/c");
        assert_eq!(
            id.ancestor_prefixes(),
            vec![NodeId::new("a"), NodeId::new("a/b")]
        );
        assert!(NodeId::new("solo").ancestor_prefixes().is_empty());
    }

    #[test]
    fn spec_reads_typed_sources() {
        let spec: NodeSpec = serde_json::from_value(json!({
            "name": "Roads",
            "type": "esri-mapServer",
            "url": "https://example.com/arcgis/rest/services/Roads/MapServer",
            "layers": "3",
            "isEnabled": true
        }))
        .expect("parse spec");

        assert_eq!(spec.source.member_type(), MemberType::EsriMapServer);
        assert_eq!(
            spec.source,
            Source::EsriMapServer {
                url: "https://example.com/arcgis/rest/services/Roads/MapServer".into(),
                layers: Some("3".into()),
            }
        );
        assert!(spec.is_enabled);
    }

    #[test]
    fn spec_omits_defaults_when_written() {
        let spec = NodeSpec::group("Empty");
        let v = serde_json::to_value(&spec).expect("serialize");
        assert_eq!(v, json!({"name": "Empty", "type": "group"}));
    }
}
