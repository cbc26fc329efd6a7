//! Picked-feature capture.
//!
//! Features are not shared by value. A link records where the user clicked
//! and a content hash per feature, so that the receiving side can re-run the
//! pick and select the feature with the same hash.

use std::collections::BTreeMap;

use foundation::JulianDate;
use foundation::math::{Ecef, ecef_to_cartographic};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::view::JulianTime;

/// Tile address of a raster pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileCoords {
    pub x: i64,
    pub y: i64,
    pub level: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickCoords {
    pub lat: f64,
    pub lng: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedFeatures {
    #[serde(default)]
    pub provider_coords: BTreeMap<String, TileCoords>,
    pub pick_coords: PickCoords,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<EntityRef>,
    #[serde(default)]
    pub entities: Vec<EntityRef>,
}

/// A feature under the cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct PickedEntity {
    pub name: String,
    /// Visible attributes.
    pub properties: Map<String, Value>,
    /// Raster features come from imagery providers and are re-picked
    /// through `provider_coords` instead of by hash.
    pub is_raster: bool,
}

/// Result of the last pick on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct PickState {
    pub position: Ecef,
    pub provider_coords: BTreeMap<String, TileCoords>,
    pub entities: Vec<PickedEntity>,
    /// Index into `entities` of the selected feature.
    pub selected: Option<usize>,
}

/// Content hash of a picked entity at clock time `time`.
///
/// blake3 over the canonical JSON of name, visible attributes and time.
/// Attribute maps are key-ordered, so equal content hashes equal.
pub fn entity_hash(entity: &PickedEntity, time: JulianDate) -> String {
    let content = json!({
        "name": entity.name,
        "properties": entity.properties,
        "time": JulianTime::from(time),
    });
    let bytes = serde_json::to_vec(&content).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

fn entity_ref(entity: &PickedEntity, time: JulianDate) -> EntityRef {
    EntityRef {
        name: entity.name.clone(),
        hash: entity_hash(entity, time),
    }
}

/// The `pickedFeatures` fragment body, or `None` when nothing was picked.
pub fn picked_features(pick: &PickState, time: JulianDate) -> Option<PickedFeatures> {
    if pick.entities.is_empty() && pick.provider_coords.is_empty() {
        return None;
    }
    let carto = ecef_to_cartographic(pick.position);
    Some(PickedFeatures {
        provider_coords: pick.provider_coords.clone(),
        pick_coords: PickCoords {
            lat: carto.lat_deg,
            lng: carto.lon_deg,
            height: carto.height_m,
        },
        current: pick
            .selected
            .and_then(|i| pick.entities.get(i))
            .map(|entity| entity_ref(entity, time)),
        entities: pick
            .entities
            .iter()
            .filter(|entity| !entity.is_raster)
            .map(|entity| entity_ref(entity, time))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::{PickState, PickedEntity, TileCoords, entity_hash, picked_features};
    use foundation::JulianDate;
    use foundation::math::{Cartographic, geodetic_to_ecef};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn entity(name: &str, population: u64, is_raster: bool) -> PickedEntity {
        PickedEntity {
            name: name.to_string(),
            properties: json!({"population": population, "state": "NSW"})
                .as_object()
                .cloned()
                .unwrap(),
            is_raster,
        }
    }

    #[test]
    fn equal_content_at_equal_time_hashes_equal() {
        let t = JulianDate::new(2_459_000, 100.0);
        assert_eq!(
            entity_hash(&entity("Sydney", 5_000_000, false), t),
            entity_hash(&entity("Sydney", 5_000_000, false), t)
        );
        assert_ne!(
            entity_hash(&entity("Sydney", 5_000_000, false), t),
            entity_hash(&entity("Sydney", 5_000_001, false), t)
        );
        assert_ne!(
            entity_hash(&entity("Sydney", 5_000_000, false), t),
            entity_hash(&entity("Sydney", 5_000_000, false), JulianDate::new(2_459_000, 101.0))
        );
    }

    #[test]
    fn pick_position_is_reported_in_degrees() {
        let position = geodetic_to_ecef(Cartographic::new(-33.86, 151.21, 50.0).to_radians());
        let mut provider_coords = BTreeMap::new();
        provider_coords.insert(
            "https://tiles.example.com/imagery".to_string(),
            TileCoords { x: 7, y: 4, level: 3 },
        );
        let pick = PickState {
            position,
            provider_coords,
            entities: vec![entity("Sydney", 1, false), entity("Tile 7/4", 0, true)],
            selected: Some(1),
        };

        let t = JulianDate::new(2_459_000, 0.0);
        let picked = picked_features(&pick, t).expect("something was picked");
        assert!((picked.pick_coords.lat + 33.86).abs() < 1e-6);
        assert!((picked.pick_coords.lng - 151.21).abs() < 1e-6);
        assert!((picked.pick_coords.height - 50.0).abs() < 1e-3);
        assert_eq!(picked.entities.len(), 1);
        assert_eq!(picked.current.as_ref().map(|c| c.name.as_str()), Some("Tile 7/4"));
    }

    #[test]
    fn empty_picks_write_nothing() {
        let pick = PickState {
            position: foundation::math::Ecef::new(6_378_137.0, 0.0, 0.0),
            provider_coords: BTreeMap::new(),
            entities: Vec::new(),
            selected: None,
        };
        assert_eq!(picked_features(&pick, JulianDate::new(0, 0.0)), None);
    }
}
