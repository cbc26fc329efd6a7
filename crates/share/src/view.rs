//! View state: cameras, clock, base map, viewer mode and split position.

use foundation::math::Ecef;
use foundation::{GeoRect, GeoRectDegrees, JulianDate};
use serde::{Deserialize, Serialize};

use crate::document::InitFragment;
use crate::picking::{PickState, PickedFeatures};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewerMode {
    #[serde(rename = "2d")]
    TwoD,
    #[default]
    #[serde(rename = "3d")]
    ThreeD,
    #[serde(rename = "3dsmooth")]
    ThreeDSmooth,
}

impl ViewerMode {
    pub fn is_3d(self) -> bool {
        !matches!(self, ViewerMode::TwoD)
    }
}

/// A camera as the mapping engine reports it: the visible rectangle plus,
/// in 3D, the eye position and orientation in ECEF metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub rectangle: GeoRect,
    pub position: Option<Ecef>,
    pub direction: Option<Ecef>,
    pub up: Option<Ecef>,
}

impl Camera {
    pub fn from_rectangle(rectangle: GeoRect) -> Self {
        Self {
            rectangle,
            position: None,
            direction: None,
            up: None,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_rectangle(GeoRect::whole_world())
    }
}

/// Wire form of a camera: rectangle in degrees, vectors as `{x, y, z}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraView {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vector3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Vector3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<Vector3>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Ecef> for Vector3 {
    fn from(v: Ecef) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<Vector3> for Ecef {
    fn from(v: Vector3) -> Self {
        Ecef::new(v.x, v.y, v.z)
    }
}

impl CameraView {
    /// Vectors are only written for 3D viewers; 2D viewers only know the
    /// rectangle.
    pub fn from_camera(camera: &Camera, include_3d: bool) -> Self {
        let deg = camera.rectangle.to_degrees();
        let vector = |v: Option<Ecef>| if include_3d { v.map(Vector3::from) } else { None };
        Self {
            west: deg.west,
            south: deg.south,
            east: deg.east,
            north: deg.north,
            position: vector(camera.position),
            direction: vector(camera.direction),
            up: vector(camera.up),
        }
    }

    pub fn to_camera(&self) -> Camera {
        Camera {
            rectangle: GeoRect::from_degrees(GeoRectDegrees::new(
                self.west, self.south, self.east, self.north,
            )),
            position: self.position.map(Ecef::from),
            direction: self.direction.map(Ecef::from),
            up: self.up.map(Ecef::from),
        }
    }
}

/// Wire form of [`JulianDate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JulianTime {
    pub day_number: i64,
    pub seconds_of_day: f64,
}

impl From<JulianDate> for JulianTime {
    fn from(date: JulianDate) -> Self {
        Self {
            day_number: date.day_number,
            seconds_of_day: date.seconds_of_day,
        }
    }
}

impl From<JulianTime> for JulianDate {
    fn from(time: JulianTime) -> Self {
        JulianDate::new(time.day_number, time.seconds_of_day)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMarker {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Everything outside the catalog that a share link captures.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub initial_camera: Camera,
    pub home_camera: Camera,
    pub base_map_name: String,
    pub viewer_mode: ViewerMode,
    pub current_time: JulianDate,
    /// Split position in `0..=1` while the splitter is shown.
    pub split_position: Option<f64>,
    pub picked: Option<PickState>,
    /// Picked features read from a share document, waiting for the map to
    /// re-run the pick.
    pub pending_pick: Option<PickedFeatures>,
    pub location_marker: Option<LocationMarker>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            initial_camera: Camera::default(),
            home_camera: Camera::default(),
            base_map_name: "Positron (Light)".to_string(),
            viewer_mode: ViewerMode::default(),
            current_time: JulianDate::now(),
            split_position: None,
            picked: None,
            pending_pick: None,
            location_marker: None,
        }
    }
}

/// The view-settings fragment for `view`.
pub fn view_fragment(view: &ViewState) -> InitFragment {
    let include_3d = view.viewer_mode.is_3d();
    InitFragment {
        initial_camera: Some(CameraView::from_camera(&view.initial_camera, include_3d)),
        home_camera: Some(CameraView::from_camera(&view.home_camera, include_3d)),
        base_map_name: Some(view.base_map_name.clone()),
        viewer_mode: Some(view.viewer_mode),
        current_time: Some(view.current_time.into()),
        show_splitter: view.split_position.map(|_| true),
        split_position: view.split_position,
        ..InitFragment::default()
    }
}

/// Applies whatever view-settings keys `fragment` carries.
pub fn apply_view(fragment: &InitFragment, view: &mut ViewState) {
    if let Some(camera) = &fragment.initial_camera {
        view.initial_camera = camera.to_camera();
    }
    if let Some(camera) = &fragment.home_camera {
        view.home_camera = camera.to_camera();
    }
    if let Some(name) = &fragment.base_map_name {
        view.base_map_name = name.clone();
    }
    if let Some(mode) = fragment.viewer_mode {
        view.viewer_mode = mode;
    }
    if let Some(time) = fragment.current_time {
        view.current_time = time.into();
    }
    match (fragment.show_splitter, fragment.split_position) {
        (Some(false), _) => view.split_position = None,
        (Some(true), position) => view.split_position = Some(position.unwrap_or(0.5)),
        (None, Some(position)) => view.split_position = Some(position),
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::{Camera, ViewState, ViewerMode, apply_view, view_fragment};
    use foundation::math::Ecef;
    use foundation::{GeoRect, GeoRectDegrees, JulianDate};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn view(mode: ViewerMode) -> ViewState {
        let mut camera = Camera::from_rectangle(GeoRect::from_degrees(GeoRectDegrees::new(
            150.0, -35.0, 152.0, -33.0,
        )));
        camera.position = Some(Ecef::new(1.0, 2.0, 3.0));
        camera.direction = Some(Ecef::new(0.0, 0.0, -1.0));
        camera.up = Some(Ecef::new(0.0, 1.0, 0.0));
        ViewState {
            initial_camera: camera,
            viewer_mode: mode,
            current_time: JulianDate::new(2_459_000, 3_600.0),
            ..ViewState::default()
        }
    }

    #[test]
    fn two_d_views_drop_camera_vectors() {
        let fragment = view_fragment(&view(ViewerMode::TwoD));
        let camera = fragment.initial_camera.unwrap();
        assert!(camera.position.is_none());
        assert!((camera.west - 150.0).abs() < 1e-9);
        assert_eq!(
            serde_json::to_value(fragment.current_time).unwrap(),
            json!({"dayNumber": 2_459_000, "secondsOfDay": 3600.0})
        );
        assert_eq!(serde_json::to_value(fragment.viewer_mode).unwrap(), json!("2d"));
    }

    #[test]
    fn three_d_views_keep_vectors_and_round_trip() {
        let original = view(ViewerMode::ThreeDSmooth);
        let mut fragment = view_fragment(&original);
        assert!(fragment.initial_camera.unwrap().position.is_some());
        fragment.split_position = Some(0.3);
        fragment.show_splitter = Some(true);

        let mut restored = ViewState::default();
        apply_view(&fragment, &mut restored);
        assert_eq!(restored.viewer_mode, ViewerMode::ThreeDSmooth);
        assert_eq!(restored.current_time, original.current_time);
        assert_eq!(restored.split_position, Some(0.3));
        assert_eq!(restored.initial_camera.position, original.initial_camera.position);
        let r = restored.initial_camera.rectangle;
        assert!((r.north - original.initial_camera.rectangle.north).abs() < 1e-12);
    }

    #[test]
    fn splitter_is_only_written_while_active() {
        let mut v = view(ViewerMode::ThreeD);
        assert_eq!(view_fragment(&v).show_splitter, None);
        v.split_position = Some(0.25);
        let fragment = view_fragment(&v);
        assert_eq!(fragment.show_splitter, Some(true));
        assert_eq!(fragment.split_position, Some(0.25));
    }
}
