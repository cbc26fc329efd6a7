//! Wire form of a share document.

use std::collections::BTreeMap;

use catalog::NodeSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ShareError;
use crate::picking::PickedFeatures;
use crate::view::{CameraView, JulianTime, LocationMarker, ViewerMode};

/// Version written into new documents.
pub const SHARE_VERSION: &str = "8.0.0";

/// Highest major version this crate knows how to read.
pub const SUPPORTED_MAJOR: u64 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareDocument {
    pub version: String,
    #[serde(default)]
    pub init_sources: Vec<InitSource>,
}

impl ShareDocument {
    pub fn new(init_sources: Vec<InitSource>) -> Self {
        Self {
            version: SHARE_VERSION.to_string(),
            init_sources,
        }
    }

    pub fn major_version(&self) -> Option<u64> {
        self.version.split('.').next()?.trim().parse().ok()
    }

    pub fn is_newer_than_supported(&self) -> bool {
        self.major_version().is_some_and(|major| major > SUPPORTED_MAJOR)
    }

    pub fn to_json_string(&self) -> Result<String, ShareError> {
        serde_json::to_string(self).map_err(|e| ShareError::Encode(e.to_string()))
    }

    pub fn from_json_str(json: &str) -> Result<Self, ShareError> {
        serde_json::from_str(json).map_err(|e| ShareError::Decode(e.to_string()))
    }

    pub fn from_value(value: Value) -> Result<Self, ShareError> {
        serde_json::from_value(value).map_err(|e| ShareError::Decode(e.to_string()))
    }

    /// Fragments in order, skipping init-file references.
    pub fn fragments(&self) -> impl Iterator<Item = &InitFragment> {
        self.init_sources.iter().filter_map(|source| match source {
            InitSource::Fragment(fragment) => Some(fragment.as_ref()),
            InitSource::Url(_) => None,
        })
    }
}

/// One entry of `initSources`: an inline fragment or the URL of an init file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitSource {
    Url(String),
    Fragment(Box<InitFragment>),
}

impl From<InitFragment> for InitSource {
    fn from(fragment: InitFragment) -> Self {
        InitSource::Fragment(Box::new(fragment))
    }
}

/// Shareable subset of a node's state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedMember {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_open: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

impl SharedMember {
    pub fn is_empty(&self) -> bool {
        self.is_enabled.is_none() && self.is_open.is_none() && self.opacity.is_none()
    }
}

/// A fragment of initial state. Every key is optional; a fragment normally
/// carries one group of keys, and keys this crate does not know are kept in
/// `unknown` so replay can report them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Vec<NodeSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_catalog_members: Option<BTreeMap<String, SharedMember>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_camera: Option<CameraView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_camera: Option<CameraView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_map_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_mode: Option<ViewerMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<JulianTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_splitter: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_position: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picked_features: Option<PickedFeatures>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_marker: Option<LocationMarker>,
    #[serde(flatten)]
    pub unknown: Map<String, Value>,
}

impl InitFragment {
    pub fn catalog(nodes: Vec<NodeSpec>) -> Self {
        Self {
            catalog: Some(nodes),
            ..Self::default()
        }
    }

    pub fn shared_members(members: BTreeMap<String, SharedMember>) -> Self {
        Self {
            shared_catalog_members: Some(members),
            ..Self::default()
        }
    }

    pub fn picked(picked: PickedFeatures) -> Self {
        Self {
            picked_features: Some(picked),
            ..Self::default()
        }
    }

    pub fn marker(marker: LocationMarker) -> Self {
        Self {
            location_marker: Some(marker),
            ..Self::default()
        }
    }

    /// True when any of the view-settings keys is present.
    pub fn has_view_settings(&self) -> bool {
        self.initial_camera.is_some()
            || self.home_camera.is_some()
            || self.base_map_name.is_some()
            || self.viewer_mode.is_some()
            || self.current_time.is_some()
            || self.show_splitter.is_some()
            || self.split_position.is_some()
    }
}
