//! Aggregation State
//!
//! Per-generation bookkeeping: which points are still pending, which merged,
//! which failed. Totals are always derived from the merged entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{DistanceBudget, PointId};
use crate::oracle::{FetchError, FetchErrorKind, IsochroneResult};

pub type Generation = u64;

/// Running totals shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub area_km2: f64,
    pub population: u64,
}

impl Totals {
    /// Area the way the dashboard prints it, e.g. `"2.00"`
    pub fn area_display(&self) -> String {
        format!("{:.2}", self.area_km2)
    }
}

/// What the dashboard knows about one point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PointStatus {
    /// Added after the current generation started; waits for the next one
    Queued,
    /// Request in flight
    Pending,
    Ready { area_km2: f64, population: u64 },
    Failed { kind: FetchErrorKind, message: String },
}

#[derive(Debug)]
enum Slot {
    Pending,
    Ready(IsochroneResult),
    Failed(FetchError),
}

/// Result of offering a response to the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Accepted,
    /// Tagged with an older generation
    Stale,
    /// The point already has an outcome in this generation, or is unknown
    Rejected,
}

#[derive(Debug, Default)]
pub struct AggregationState {
    generation: Generation,
    slots: BTreeMap<PointId, Slot>,
    outstanding: usize,
    budget: Option<DistanceBudget>,
    started_at: Option<DateTime<Utc>>,
}

impl AggregationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Budget the current generation was started with
    pub fn budget(&self) -> Option<DistanceBudget> {
        self.budget
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn is_settled(&self) -> bool {
        self.outstanding == 0
    }

    /// Points whose overlay is currently drawn
    pub fn drawn(&self) -> Vec<PointId> {
        self.slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn result(&self, id: PointId) -> Option<&IsochroneResult> {
        match self.slots.get(&id) {
            Some(Slot::Ready(result)) => Some(result),
            _ => None,
        }
    }

    pub fn failures(&self) -> usize {
        self.slots.values().filter(|s| matches!(s, Slot::Failed(_))).count()
    }

    /// Start a new generation over `points`. Every previous entry is dropped.
    pub fn begin<I>(&mut self, points: I, budget: DistanceBudget) -> Generation
    where
        I: IntoIterator<Item = PointId>,
    {
        self.generation += 1;
        self.slots = points.into_iter().map(|id| (id, Slot::Pending)).collect();
        self.outstanding = self.slots.len();
        self.budget = Some(budget);
        self.started_at = Some(Utc::now());
        self.generation
    }

    /// Drop everything and retire the current generation
    pub fn reset(&mut self) -> Generation {
        self.generation += 1;
        self.slots.clear();
        self.outstanding = 0;
        self.budget = None;
        self.started_at = None;
        self.generation
    }

    /// Record the outcome of one request
    pub fn merge(
        &mut self,
        generation: Generation,
        id: PointId,
        outcome: Result<IsochroneResult, FetchError>,
    ) -> Merge {
        if generation != self.generation {
            return Merge::Stale;
        }
        let Some(slot) = self.slots.get_mut(&id) else {
            return Merge::Rejected;
        };
        if !matches!(slot, Slot::Pending) {
            return Merge::Rejected;
        }
        *slot = match outcome {
            Ok(result) => Slot::Ready(result),
            Err(e) => Slot::Failed(e),
        };
        self.outstanding -= 1;
        Merge::Accepted
    }

    /// Sum over merged entries in id order, so arrival order never changes the result
    pub fn totals(&self) -> Totals {
        self.slots.values().fold(Totals::default(), |acc, slot| match slot {
            Slot::Ready(r) => Totals {
                area_km2: acc.area_km2 + r.area_km2(),
                population: acc.population.saturating_add(r.population),
            },
            _ => acc,
        })
    }

    pub fn status(&self, id: PointId) -> PointStatus {
        match self.slots.get(&id) {
            None => PointStatus::Queued,
            Some(Slot::Pending) => PointStatus::Pending,
            Some(Slot::Ready(r)) => PointStatus::Ready {
                area_km2: r.area_km2(),
                population: r.population,
            },
            Some(Slot::Failed(e)) => PointStatus::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}
