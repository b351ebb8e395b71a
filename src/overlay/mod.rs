//! Overlay Sink
//!
//! The map-rendering capability the engine draws through. Sinks keep no
//! history; the engine tracks which ids it has drawn and removes them itself.

mod recording;

pub use recording::{RecordedMarker, RecordedOverlay, RecordingOverlaySink};

use serde::{Deserialize, Serialize};

use crate::model::PointId;

/// Fill style of an isochrone polygon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    pub color: String,
    pub fill_color: String,
    pub fill_opacity: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: "#6366f1".to_string(),
            fill_color: "#6366f1".to_string(),
            fill_opacity: 0.3,
        }
    }
}

/// Style of the dot drawn where the user clicked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerStyle {
    pub radius: f64,
    pub color: String,
    pub fill_color: String,
    pub fill_opacity: f64,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            radius: 2.0,
            color: "red".to_string(),
            fill_color: "red".to_string(),
            fill_opacity: 1.0,
        }
    }
}

pub trait OverlaySink: Send + Sync {
    fn add_overlay(&self, id: PointId, geometry: &serde_json::Value, style: &OverlayStyle);
    fn remove_overlay(&self, id: PointId);
    fn add_marker(&self, id: PointId, lat: f64, lng: f64, style: &MarkerStyle);
    fn remove_marker(&self, id: PointId);
}
