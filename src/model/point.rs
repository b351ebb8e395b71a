//! Point Registry
//!
//! Ordered collection of the points the user selected on the map.
//! Only bulk clearing is supported; single points cannot be removed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a tracked point
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointId(pub u64);

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A user-selected location. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Default)]
pub struct PointRegistry {
    points: Vec<Point>,
    /// Next identity to mint. Never rewound, so ids stay unique across clears.
    next_id: u64,
}

impl PointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a point with a fresh identity
    pub fn add_point(&mut self, lat: f64, lng: f64) -> PointId {
        let id = PointId(self.next_id);
        self.next_id += 1;
        self.points.push(Point { id, lat, lng });
        id
    }

    /// Remove every point
    pub fn clear_all(&mut self) {
        self.points.clear();
    }

    pub fn get(&self, id: PointId) -> Option<&Point> {
        self.points.iter().find(|p| p.id == id)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
