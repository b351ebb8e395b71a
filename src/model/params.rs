//! Parameter Store
//!
//! Holds the travel-time and speed settings and derives the distance budget
//! the routing oracle is queried with.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive range a UI control may produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub min: u32,
    pub max: u32,
    pub step: u32,
}

impl ParameterBounds {
    pub const fn new(min: u32, max: u32, step: u32) -> Self {
        Self { min, max, step }
    }

    /// Whether `value` is inside the range and on a step boundary
    pub fn contains(&self, value: u32) -> bool {
        if value < self.min || value > self.max {
            return false;
        }
        self.step <= 1 || (value - self.min) % self.step == 0
    }
}

/// How the fractional meter of a budget is dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceRounding {
    /// Drop the fraction (5 min at 50 km/h -> 4166 m)
    #[default]
    Truncate,
    /// Round half away from zero (5 min at 50 km/h -> 4167 m)
    Nearest,
}

/// Distance budget in meters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistanceBudget(pub u64);

impl DistanceBudget {
    pub fn meters(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DistanceBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} m", self.0)
    }
}

/// Current slider values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    /// Travel time in minutes
    pub time_min: u32,
    /// Speed in km/h
    pub speed_kmh: u32,
}

/// `time / 60 * speed * 1000`, rounded per `rounding`
pub fn distance_budget(params: Parameters, rounding: DistanceRounding) -> DistanceBudget {
    // Integer arithmetic so whole-meter budgets never land on x.9999
    let scaled = (params.time_min as u64)
        .saturating_mul(params.speed_kmh as u64)
        .saturating_mul(1000);
    let meters = match rounding {
        DistanceRounding::Truncate => scaled / 60,
        DistanceRounding::Nearest => scaled.saturating_add(30) / 60,
    };
    DistanceBudget(meters)
}

/// One bar of the speed sensitivity chart
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityPoint {
    pub speed_kmh: u32,
    /// Reachable distance in km, rounded to two decimals
    pub distance_km: f64,
}

/// Reachable distance for speeds 10, 20, ..., 150 km/h at the given time budget
pub fn sensitivity_series(time_min: u32) -> Vec<SensitivityPoint> {
    (0..15)
        .map(|i| {
            let speed_kmh = 10 + i * 10;
            let km = time_min as f64 / 60.0 * speed_kmh as f64;
            SensitivityPoint {
                speed_kmh,
                distance_km: (km * 100.0).round() / 100.0,
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ParameterStore {
    params: Parameters,
    rounding: DistanceRounding,
}

impl ParameterStore {
    pub fn new(params: Parameters, rounding: DistanceRounding) -> Self {
        Self { params, rounding }
    }

    /// Set the travel time. Returns true if the value changed.
    pub fn set_time(&mut self, minutes: u32) -> bool {
        let changed = self.params.time_min != minutes;
        self.params.time_min = minutes;
        changed
    }

    /// Set the speed. Returns true if the value changed.
    pub fn set_speed(&mut self, kmh: u32) -> bool {
        let changed = self.params.speed_kmh != kmh;
        self.params.speed_kmh = kmh;
        changed
    }

    pub fn parameters(&self) -> Parameters {
        self.params
    }

    pub fn distance_budget(&self) -> DistanceBudget {
        distance_budget(self.params, self.rounding)
    }

    pub fn sensitivity(&self) -> Vec<SensitivityPoint> {
        sensitivity_series(self.params.time_min)
    }
}
