//! Isochrone Dashboard
//!
//! Interactive console stand-in for the map dashboard: sliders become `time`
//! and `speed` commands, map clicks become `add`, and the clear button is `clear`.
//! Totals are printed whenever a generation settles.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use isochrone_dashboard::config::DashboardConfig;
use isochrone_dashboard::engine::{AggregationEngine, DashboardSnapshot, EngineEvent, EngineHandle, PointStatus};
use isochrone_dashboard::oracle::OpenRouteServiceFetcher;
use isochrone_dashboard::overlay::RecordingOverlaySink;
use isochrone_dashboard::utils::init_telemetry;

const HELP: &str = "Commands: time <min> | speed <km/h> | add <lat> <lng> | clear | status | chart | json | export <file> | quit";

// ──────────────────────────────────────────────────────────────────────────────
// OUTPUT
// ──────────────────────────────────────────────────────────────────────────────

fn print_status(snapshot: &DashboardSnapshot) {
    println!("{}", "─".repeat(50));
    println!(
        "Time: {} min | Speed: {} km/h | Budget: {} | Phase: {:?} | Generation: {}",
        snapshot.parameters.time_min,
        snapshot.parameters.speed_kmh,
        snapshot.distance_budget,
        snapshot.phase,
        snapshot.generation
    );
    println!("Total area: {} km² | Population: {}", snapshot.totals.area_display(), snapshot.totals.population);
    for view in &snapshot.points {
        let status = match &view.status {
            PointStatus::Queued => "queued".to_string(),
            PointStatus::Pending => "pending".to_string(),
            PointStatus::Ready { area_km2, population } => format!("{:.2} km², {} people", area_km2, population),
            PointStatus::Failed { message, .. } => format!("failed: {}", message),
        };
        println!("   {} ({:.5}, {:.5}) {}", view.point.id, view.point.lat, view.point.lng, status);
    }
    println!("{}", "─".repeat(50));
}

fn print_chart(snapshot: &DashboardSnapshot) {
    let max = snapshot
        .sensitivity
        .iter()
        .map(|s| s.distance_km)
        .fold(0.0_f64, f64::max)
        .max(f64::EPSILON);
    println!("Reachable distance in {} min:", snapshot.parameters.time_min);
    for bar in &snapshot.sensitivity {
        let width = (bar.distance_km / max * 40.0).round() as usize;
        println!("{:>4} km/h {:>7.2} km {}", bar.speed_kmh, bar.distance_km, "█".repeat(width));
    }
}

/// Print totals each time a generation settles
fn spawn_event_printer(handle: &EngineHandle) {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::GenerationSettled { generation, totals, failed }) => {
                    println!(
                        "\n✅ Generation {}: {} km², {} people{}",
                        generation,
                        totals.area_display(),
                        totals.population,
                        if failed > 0 { format!(" ({} point(s) failed)", failed) } else { String::new() }
                    );
                }
                Ok(EngineEvent::PointFailed { point, message, .. }) => {
                    println!("\n⚠️  {}: {}", point, message);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("Event printer skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

// ──────────────────────────────────────────────────────────────────────────────
// COMMANDS
// ──────────────────────────────────────────────────────────────────────────────

fn parse_number<T: std::str::FromStr>(arg: Option<&str>, what: &str) -> Result<T> {
    arg.with_context(|| format!("missing {}", what))?
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a number", what))
}

/// Run one console command. Returns false on quit.
async fn dispatch(line: &str, handle: &EngineHandle, sink: &RecordingOverlaySink, config: &DashboardConfig) -> Result<bool> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(true);
    };

    match command.to_lowercase().as_str() {
        "quit" | "exit" | "q" => return Ok(false),
        "help" | "?" => println!("{}", HELP),
        "time" => {
            let minutes: u32 = parse_number(parts.next(), "minutes")?;
            let bounds = config.parameters.time;
            if !bounds.contains(minutes) {
                anyhow::bail!("time must be in {}..={} (step {})", bounds.min, bounds.max, bounds.step);
            }
            handle.set_time(minutes).await?;
        }
        "speed" => {
            let kmh: u32 = parse_number(parts.next(), "speed")?;
            let bounds = config.parameters.speed;
            if !bounds.contains(kmh) {
                anyhow::bail!("speed must be in {}..={} (step {})", bounds.min, bounds.max, bounds.step);
            }
            handle.set_speed(kmh).await?;
        }
        "add" => {
            let lat: f64 = parse_number(parts.next(), "latitude")?;
            let lng: f64 = parse_number(parts.next(), "longitude")?;
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                anyhow::bail!("coordinates out of range");
            }
            let id = handle.add_point(lat, lng).await?;
            println!("📍 Added point {}", id);
        }
        "clear" => {
            handle.clear_all().await?;
            println!("🗑️  All isochrones cleared.");
        }
        "status" => print_status(&handle.snapshot().await?),
        "chart" => print_chart(&handle.snapshot().await?),
        "json" => println!("{}", serde_json::to_string_pretty(&handle.snapshot().await?)?),
        "export" => {
            let path = parts.next().context("missing file name")?;
            let json = serde_json::to_string_pretty(&sink.to_feature_collection())?;
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write {}", path))?;
            println!("💾 Overlays written to {}", path);
        }
        other => println!("Unknown command '{}'. {}", other, HELP),
    }
    Ok(true)
}

// ──────────────────────────────────────────────────────────────────────────────
// MAIN ENTRY POINT
// ──────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let config = DashboardConfig::load()?;
    let _telemetry = init_telemetry(&config.telemetry).context("Failed to initialise logging")?;

    let fetcher = Arc::new(OpenRouteServiceFetcher::new(&config.oracle)?);
    let sink = Arc::new(RecordingOverlaySink::new());
    let handle = AggregationEngine::new(&config, fetcher, sink.clone()).spawn();
    spawn_event_printer(&handle);

    info!(oracle = %config.oracle.base_url, profile = %config.oracle.profile, "Dashboard ready");
    println!("\n{}", "═".repeat(60));
    println!("🚑 Isochrone Dashboard");
    println!("{}", "═".repeat(60));
    println!("{}\n", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match dispatch(line.trim(), &handle, &sink, &config).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("❌ {}", e),
        }
    }

    handle.shutdown().await?;
    println!("\n👋 Goodbye!\n");
    Ok(())
}
