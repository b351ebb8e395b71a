//! Model Module
//!
//! User inputs of the dashboard: tracked points and travel parameters.

pub mod params;
pub mod point;

pub use params::{
    distance_budget, sensitivity_series, DistanceBudget, DistanceRounding, ParameterBounds,
    ParameterStore, Parameters, SensitivityPoint,
};
pub use point::{Point, PointId, PointRegistry};
