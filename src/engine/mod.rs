//! Aggregation Engine Module
//!
//! Debounces input changes into fetch generations and merges the oracle's
//! answers into overlays and running totals.

pub mod aggregator;
pub mod events;
pub mod state;

pub use aggregator::{AggregationEngine, DashboardSnapshot, EngineHandle, Phase, PointView};
pub use events::{EngineEvent, EventBus};
pub use state::{AggregationState, Generation, Merge, PointStatus, Totals};
