#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

use isochrone_dashboard::config::DashboardConfig;
use isochrone_dashboard::engine::{AggregationEngine, EngineEvent, EngineHandle, Totals};
use isochrone_dashboard::model::{DistanceBudget, Point};
use isochrone_dashboard::oracle::{FetchError, IsochroneFetcher, IsochroneResult};
use isochrone_dashboard::overlay::RecordingOverlaySink;

/// A request the engine issued, waiting for the test to answer it
pub struct PendingCall {
    pub point: Point,
    pub budget: DistanceBudget,
    respond: oneshot::Sender<Result<IsochroneResult, FetchError>>,
}

impl PendingCall {
    pub fn respond(self, outcome: Result<IsochroneResult, FetchError>) {
        let _ = self.respond.send(outcome);
    }

    /// Resolves once the engine has dropped the request
    pub async fn cancelled(&mut self) {
        tokio::time::timeout(Duration::from_secs(60), self.respond.closed())
            .await
            .expect("request was never cancelled");
    }
}

/// Oracle stand-in: hands every call to the test and waits for its answer
pub struct ScriptedFetcher {
    calls: mpsc::UnboundedSender<PendingCall>,
}

#[async_trait]
impl IsochroneFetcher for ScriptedFetcher {
    async fn fetch(&self, point: &Point, budget: DistanceBudget) -> Result<IsochroneResult, FetchError> {
        let (respond, rx) = oneshot::channel();
        let _ = self.calls.send(PendingCall { point: *point, budget, respond });
        rx.await
            .unwrap_or_else(|_| Err(FetchError::NetworkFailure("test dropped the call".to_string())))
    }
}

pub struct Harness {
    pub handle: EngineHandle,
    pub sink: Arc<RecordingOverlaySink>,
    pub calls: mpsc::UnboundedReceiver<PendingCall>,
    pub events: broadcast::Receiver<EngineEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(DashboardConfig::default())
    }

    pub fn with_config(config: DashboardConfig) -> Self {
        let (tx, calls) = mpsc::unbounded_channel();
        let sink = Arc::new(RecordingOverlaySink::new());
        let handle = AggregationEngine::new(&config, Arc::new(ScriptedFetcher { calls: tx }), sink.clone()).spawn();
        let events = handle.subscribe();
        Self { handle, sink, calls, events }
    }

    pub async fn next_call(&mut self) -> PendingCall {
        tokio::time::timeout(Duration::from_secs(60), self.calls.recv())
            .await
            .expect("no oracle call issued")
            .expect("fetcher gone")
    }

    /// Wait for the next event matching `pred`
    pub async fn wait_for<F>(&mut self, mut pred: F) -> EngineEvent
    where
        F: FnMut(&EngineEvent) -> bool,
    {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(60), self.events.recv())
                .await
                .expect("timed out waiting for engine event")
                .expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    }

    pub async fn wait_settled(&mut self) -> (u64, Totals, usize) {
        match self.wait_for(|e| matches!(e, EngineEvent::GenerationSettled { .. })).await {
            EngineEvent::GenerationSettled { generation, totals, failed } => (generation, totals, failed),
            _ => unreachable!(),
        }
    }

    /// Events already published, without waiting
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn isochrone(area_m2: f64, population: u64) -> IsochroneResult {
    IsochroneResult {
        area_m2,
        population,
        geometry: json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "area": area_m2, "total_pop": population },
                "geometry": { "type": "Polygon", "coordinates": [] }
            }]
        }),
    }
}
