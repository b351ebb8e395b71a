//! Isochrone Dashboard
//!
//! Tracks points picked on a map, asks a routing service for the region
//! reachable from each within a travel-time budget, and keeps a consistent
//! running total of covered area and population while inputs keep changing:
//! - Debounced fetch generations with last-generation-wins merging
//! - Per-point failure isolation
//! - Pluggable routing oracle and overlay sink

pub mod config;
pub mod engine;
pub mod model;
pub mod oracle;
pub mod overlay;
pub mod utils;

// Re-exports for convenience
pub use config::DashboardConfig;
pub use engine::{AggregationEngine, DashboardSnapshot, EngineEvent, EngineHandle};
pub use model::{DistanceBudget, Point, PointId};
pub use oracle::{FetchError, IsochroneFetcher, IsochroneResult, OpenRouteServiceFetcher};
pub use overlay::{OverlaySink, RecordingOverlaySink};
