//! In-memory layer map
//!
//! Keeps whatever the engine currently has drawn, so a headless dashboard can
//! print or export it.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{MarkerStyle, OverlaySink, OverlayStyle};
use crate::model::PointId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedOverlay {
    pub geometry: Value,
    pub style: OverlayStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedMarker {
    pub lat: f64,
    pub lng: f64,
    pub style: MarkerStyle,
}

#[derive(Debug, Default)]
struct Layers {
    overlays: BTreeMap<PointId, RecordedOverlay>,
    markers: BTreeMap<PointId, RecordedMarker>,
    overlays_drawn: usize,
}

#[derive(Debug, Default)]
pub struct RecordingOverlaySink {
    layers: Mutex<Layers>,
}

impl RecordingOverlaySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn layers(&self) -> MutexGuard<'_, Layers> {
        self.layers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn overlay_ids(&self) -> Vec<PointId> {
        self.layers().overlays.keys().copied().collect()
    }

    pub fn marker_ids(&self) -> Vec<PointId> {
        self.layers().markers.keys().copied().collect()
    }

    pub fn overlay(&self, id: PointId) -> Option<RecordedOverlay> {
        self.layers().overlays.get(&id).cloned()
    }

    pub fn marker(&self, id: PointId) -> Option<RecordedMarker> {
        self.layers().markers.get(&id).cloned()
    }

    /// Total `add_overlay` calls seen, including ones later removed
    pub fn overlays_drawn(&self) -> usize {
        self.layers().overlays_drawn
    }

    /// Everything currently drawn as one GeoJSON FeatureCollection.
    ///
    /// Isochrone features are tagged with `point_id`; markers become Point features.
    pub fn to_feature_collection(&self) -> Value {
        let layers = self.layers();
        let mut features = Vec::new();

        for (id, overlay) in &layers.overlays {
            let inner = overlay
                .geometry
                .get("features")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for mut feature in inner {
                if let Some(props) = feature.get_mut("properties").and_then(Value::as_object_mut) {
                    props.insert("point_id".to_string(), json!(id.0));
                }
                features.push(feature);
            }
        }

        for (id, marker) in &layers.markers {
            features.push(json!({
                "type": "Feature",
                "properties": { "point_id": id.0, "kind": "marker" },
                "geometry": { "type": "Point", "coordinates": [marker.lng, marker.lat] }
            }));
        }

        json!({ "type": "FeatureCollection", "features": features })
    }
}

impl OverlaySink for RecordingOverlaySink {
    fn add_overlay(&self, id: PointId, geometry: &Value, style: &OverlayStyle) {
        debug!(point = %id, "Drawing isochrone overlay");
        let mut layers = self.layers();
        layers.overlays_drawn += 1;
        layers.overlays.insert(id, RecordedOverlay { geometry: geometry.clone(), style: style.clone() });
    }

    fn remove_overlay(&self, id: PointId) {
        debug!(point = %id, "Removing isochrone overlay");
        self.layers().overlays.remove(&id);
    }

    fn add_marker(&self, id: PointId, lat: f64, lng: f64, style: &MarkerStyle) {
        debug!(point = %id, lat, lng, "Drawing marker");
        self.layers().markers.insert(id, RecordedMarker { lat, lng, style: style.clone() });
    }

    fn remove_marker(&self, id: PointId) {
        debug!(point = %id, "Removing marker");
        self.layers().markers.remove(&id);
    }
}
