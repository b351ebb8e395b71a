//! Engine Event Bus
//!
//! Broadcasts what the aggregation engine does, for dashboards, logs and tests.
//! Each engine owns its own bus; there is no global instance.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::state::{Generation, Totals};
use crate::model::{DistanceBudget, Parameters, Point, PointId};
use crate::oracle::FetchErrorKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    /// A point was selected on the map and its marker drawn
    PointAdded { point: Point },
    /// Time or speed changed
    ParametersChanged { parameters: Parameters, budget: DistanceBudget },
    /// Overlays were cleared and one request per point was issued
    GenerationStarted { generation: Generation, budget: DistanceBudget, points: Vec<PointId> },
    PointMerged { generation: Generation, point: PointId, area_km2: f64, population: u64 },
    PointFailed { generation: Generation, point: PointId, kind: FetchErrorKind, message: String },
    /// A response from a superseded generation was dropped
    ResultDiscarded { generation: Generation, current: Generation, point: PointId },
    /// Every request of the generation has an outcome
    GenerationSettled { generation: Generation, totals: Totals, failed: usize },
    /// All points, markers and overlays were removed
    Cleared,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
