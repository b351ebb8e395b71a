//! Aggregation Engine
//!
//! A single control task owns the parameters, the registry, the aggregation
//! state and the overlay sink. Input changes arrive as commands, are debounced
//! into generations, and every generation fans out one oracle request per
//! point. Responses are merged on the control task only, so no locks guard the
//! state. A new generation or a clear aborts the fetch tasks of older ones; a
//! response that finished before the abort is dropped by its generation tag.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::events::{EngineEvent, EventBus};
use super::state::{AggregationState, Generation, Merge, PointStatus, Totals};
use crate::config::{DashboardConfig, StyleConfig};
use crate::model::{
    DistanceBudget, ParameterStore, Parameters, Point, PointId, PointRegistry, SensitivityPoint,
};
use crate::oracle::{FetchError, IsochroneFetcher, IsochroneResult};
use crate::overlay::OverlaySink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing pending
    Idle,
    /// A trigger arrived; waiting for the quiet window to elapse
    Debouncing,
    /// Requests of the current generation are in flight
    Fetching,
}

/// One tracked point and what the dashboard knows about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointView {
    #[serde(flatten)]
    pub point: Point,
    #[serde(flatten)]
    pub status: PointStatus,
}

/// Read-only view of the dashboard at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub phase: Phase,
    pub generation: Generation,
    pub parameters: Parameters,
    /// Budget for the current parameters
    pub distance_budget: DistanceBudget,
    /// Budget the displayed overlays were requested with
    pub generation_budget: Option<DistanceBudget>,
    pub generation_started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub points: Vec<PointView>,
    pub totals: Totals,
    pub sensitivity: Vec<SensitivityPoint>,
}

enum Command {
    SetTime(u32),
    SetSpeed(u32),
    AddPoint { lat: f64, lng: f64, reply: oneshot::Sender<PointId> },
    ClearAll,
    Snapshot(oneshot::Sender<DashboardSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

struct FetchCompletion {
    generation: Generation,
    point: PointId,
    outcome: Result<IsochroneResult, FetchError>,
}

pub struct AggregationEngine {
    store: ParameterStore,
    registry: PointRegistry,
    state: AggregationState,
    /// Points whose marker is drawn
    markers: BTreeSet<PointId>,
    fetcher: Arc<dyn IsochroneFetcher>,
    sink: Arc<dyn OverlaySink>,
    styles: StyleConfig,
    events: EventBus,
    debounce: Duration,
    debounce_deadline: Option<Instant>,
    limiter: Option<Arc<Semaphore>>,
    in_flight: JoinSet<FetchCompletion>,
}

impl AggregationEngine {
    pub fn new(config: &DashboardConfig, fetcher: Arc<dyn IsochroneFetcher>, sink: Arc<dyn OverlaySink>) -> Self {
        Self {
            store: ParameterStore::new(config.parameters.initial(), config.engine.distance_rounding),
            registry: PointRegistry::new(),
            state: AggregationState::new(),
            markers: BTreeSet::new(),
            fetcher,
            sink,
            styles: config.style.clone(),
            events: EventBus::new(),
            debounce: Duration::from_millis(config.engine.debounce_ms),
            debounce_deadline: None,
            limiter: config.engine.max_concurrent_fetches.map(|n| Arc::new(Semaphore::new(n))),
            in_flight: JoinSet::new(),
        }
    }

    /// Move the engine onto its own task and return a handle to drive it
    pub fn spawn(self) -> EngineHandle {
        let (tx, rx) = mpsc::channel(256);
        let events = self.events.clone();
        tokio::spawn(self.run(rx));
        EngineHandle { tx, events }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(debounce_ms = self.debounce.as_millis() as u64, "Aggregation engine started");

        loop {
            let deadline = self.debounce_deadline;
            tokio::select! {
                // Commands first: a clear queued behind a finished fetch must retire it
                biased;

                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.debounce_deadline = None;
                    self.start_generation();
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    match joined {
                        Ok(completion) => self.merge(completion),
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => error!("Isochrone fetch task panicked: {}", e),
                    }
                }
            }
        }

        info!("Aggregation engine stopped");
    }

    /// Apply one command. Returns false once the engine should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::SetTime(minutes) => {
                if self.store.set_time(minutes) {
                    self.parameters_changed();
                }
            }
            Command::SetSpeed(kmh) => {
                if self.store.set_speed(kmh) {
                    self.parameters_changed();
                }
            }
            Command::AddPoint { lat, lng, reply } => {
                let id = self.registry.add_point(lat, lng);
                self.sink.add_marker(id, lat, lng, &self.styles.marker);
                self.markers.insert(id);
                debug!(point = %id, lat, lng, "Point added");
                self.events.publish(EngineEvent::PointAdded { point: Point { id, lat, lng } });
                let _ = reply.send(id);
                self.trigger();
            }
            Command::ClearAll => self.clear_all(),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown(ack) => {
                self.shutdown();
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    fn parameters_changed(&mut self) {
        let parameters = self.store.parameters();
        let budget = self.store.distance_budget();
        debug!(time_min = parameters.time_min, speed_kmh = parameters.speed_kmh, budget_m = budget.meters(), "Parameters changed");
        self.events.publish(EngineEvent::ParametersChanged { parameters, budget });
        self.trigger();
    }

    /// (Re-)arm the quiet window
    fn trigger(&mut self) {
        self.debounce_deadline = Some(Instant::now() + self.debounce);
    }

    fn start_generation(&mut self) {
        let points = self.registry.points().to_vec();
        if points.is_empty() {
            debug!("Quiet window elapsed with no points; nothing to fetch");
            return;
        }

        let budget = self.store.distance_budget();
        self.retire_in_flight();
        for id in self.state.drawn() {
            self.sink.remove_overlay(id);
        }
        let generation = self.state.begin(points.iter().map(|p| p.id), budget);

        info!(generation, budget_m = budget.meters(), points = points.len(), "Starting isochrone generation");
        self.events.publish(EngineEvent::GenerationStarted {
            generation,
            budget,
            points: points.iter().map(|p| p.id).collect(),
        });

        for point in points {
            let fetcher = self.fetcher.clone();
            let limiter = self.limiter.clone();

            self.in_flight.spawn(async move {
                let _permit = match limiter {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                let outcome = fetcher.fetch(&point, budget).await;
                FetchCompletion { generation, point: point.id, outcome }
            });
        }
    }

    fn merge(&mut self, completion: FetchCompletion) {
        let FetchCompletion { generation, point, outcome } = completion;
        let current = self.state.generation();

        let failure = outcome.as_ref().err().cloned();
        match self.state.merge(generation, point, outcome) {
            Merge::Stale => {
                debug!(generation, current, point = %point, "Discarding stale isochrone result");
                self.events.publish(EngineEvent::ResultDiscarded { generation, current, point });
                return;
            }
            Merge::Rejected => {
                warn!(generation, point = %point, "Ignoring unexpected isochrone result");
                return;
            }
            Merge::Accepted => {}
        }

        match failure {
            None => {
                if let Some(result) = self.state.result(point) {
                    self.sink.add_overlay(point, &result.geometry, &self.styles.overlay);
                    debug!(generation, point = %point, area_km2 = result.area_km2(), population = result.population, "Merged isochrone");
                    self.events.publish(EngineEvent::PointMerged {
                        generation,
                        point,
                        area_km2: result.area_km2(),
                        population: result.population,
                    });
                }
            }
            Some(e) => {
                warn!(generation, point = %point, "Isochrone request failed: {}", e);
                self.events.publish(EngineEvent::PointFailed {
                    generation,
                    point,
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }

        if self.state.is_settled() {
            let totals = self.state.totals();
            let failed = self.state.failures();
            info!(generation, area_km2 = %totals.area_display(), population = totals.population, failed, "Generation settled");
            self.events.publish(EngineEvent::GenerationSettled { generation, totals, failed });
        }
    }

    fn clear_all(&mut self) {
        self.debounce_deadline = None;
        for id in self.state.drawn() {
            self.sink.remove_overlay(id);
        }
        for id in std::mem::take(&mut self.markers) {
            self.sink.remove_marker(id);
        }
        self.retire_in_flight();
        let generation = self.state.reset();
        self.registry.clear_all();

        info!(generation, "Cleared all isochrones");
        self.events.publish(EngineEvent::Cleared);
    }

    /// Abort requests of older generations so their concurrency permits free up.
    /// Tasks that already finished still come out of `join_next` and are merged
    /// as stale.
    fn retire_in_flight(&mut self) {
        if !self.in_flight.is_empty() {
            debug!(tasks = self.in_flight.len(), "Aborting superseded isochrone requests");
            self.in_flight.abort_all();
        }
    }

    fn shutdown(&mut self) {
        self.debounce_deadline = None;
        self.in_flight.abort_all();
    }

    fn phase(&self) -> Phase {
        if self.debounce_deadline.is_some() {
            Phase::Debouncing
        } else if !self.state.is_settled() {
            Phase::Fetching
        } else {
            Phase::Idle
        }
    }

    fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            phase: self.phase(),
            generation: self.state.generation(),
            parameters: self.store.parameters(),
            distance_budget: self.store.distance_budget(),
            generation_budget: self.state.budget(),
            generation_started_at: self.state.started_at(),
            points: self
                .registry
                .points()
                .iter()
                .map(|p| PointView { point: *p, status: self.state.status(p.id) })
                .collect(),
            totals: self.state.totals(),
            sensitivity: self.store.sensitivity(),
        }
    }
}

/// Cloneable front door to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
    events: EventBus,
}

impl EngineHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow!("Aggregation engine has stopped"))
    }

    pub async fn set_time(&self, minutes: u32) -> Result<()> {
        self.send(Command::SetTime(minutes)).await
    }

    pub async fn set_speed(&self, kmh: u32) -> Result<()> {
        self.send(Command::SetSpeed(kmh)).await
    }

    /// Track a point selected on the map
    pub async fn add_point(&self, lat: f64, lng: f64) -> Result<PointId> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddPoint { lat, lng, reply }).await?;
        rx.await.map_err(|_| anyhow!("Aggregation engine dropped the request"))
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.send(Command::ClearAll).await
    }

    pub async fn snapshot(&self) -> Result<DashboardSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| anyhow!("Aggregation engine dropped the request"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Stop the engine: pending debounce cancelled, in-flight requests aborted
    pub async fn shutdown(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.send(Command::Shutdown(ack)).await?;
        rx.await.map_err(|_| anyhow!("Aggregation engine dropped the request"))
    }
}
