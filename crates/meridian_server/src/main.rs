//! # Meridian Server
//!
//! Headless host for the MERIDIAN tick scheduler. Populates a demo world
//! of zones, regions and agents, then drives it at the configured rate.
//!
//! ## Usage
//!
//! ```bash
//! meridian_server --config config/meridian.toml --duration 30 --zones 8 --agents 64
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

mod world;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use meridian_core::{SchedulerConfig, SchedulerResult, UpdateManager};
use parking_lot::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::world::{World, WorldShape};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Command line options.
struct Options {
    config: Option<PathBuf>,
    duration_secs: Option<u64>,
    shape: WorldShape,
}

/// Monitor output accumulated between status lines.
#[derive(Default)]
struct MonitorTotals {
    samples: u64,
    tick_time_ms: f64,
    acquisition_time_ms: f64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let Some(options) = parse_args() else {
        return ExitCode::SUCCESS;
    };

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "server failed");
            ExitCode::FAILURE
        }
    }
}

/// Simple flag parsing. Returns `None` when only help was requested.
fn parse_args() -> Option<Options> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        config: None,
        duration_secs: None,
        shape: WorldShape {
            zones: 4,
            regions_per_side: 4,
            agents_per_zone: 32,
            seed: 0x4d45_5249,
        },
    };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--config" | "-c" => {
                options.config = value.map(PathBuf::from);
                i += 1;
            }
            "--duration" | "-d" => {
                options.duration_secs = value.and_then(|v| v.parse().ok());
                i += 1;
            }
            "--zones" | "-z" => {
                options.shape.zones = value.and_then(|v| v.parse().ok()).unwrap_or(options.shape.zones);
                i += 1;
            }
            "--agents" | "-a" => {
                options.shape.agents_per_zone = value
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(options.shape.agents_per_zone);
                i += 1;
            }
            "--seed" => {
                options.shape.seed = value.and_then(|v| v.parse().ok()).unwrap_or(options.shape.seed);
                i += 1;
            }
            "--help" | "-h" => {
                println!("Usage: meridian_server [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>        Scheduler config (TOML), defaults if omitted");
                println!("  -d, --duration <SECS>      Run for N seconds then exit");
                println!("  -z, --zones <NUM>          Number of zones (default: 4)");
                println!("  -a, --agents <NUM>         Agents per zone (default: 32)");
                println!("      --seed <NUM>           Seed for agent behaviour");
                println!("  -h, --help                 Show this help");
                return None;
            }
            other => {
                tracing::warn!(argument = other, "ignoring unknown argument");
            }
        }
        i += 1;
    }

    Some(options)
}

fn run(options: &Options) -> SchedulerResult<()> {
    let config = match &options.config {
        Some(path) => SchedulerConfig::load(path)?,
        None => SchedulerConfig::default(),
    };
    info!(
        tick_ms = config.tick_ms,
        threads = config.threads,
        strategy = ?config.strategy,
        wait_monitoring = config.wait_monitoring,
        "scheduler configured"
    );

    let manager = UpdateManager::new(config)?;
    let world = World::populate(&manager, options.shape);

    let totals = Arc::new(Mutex::new(MonitorTotals::default()));
    let sink = Arc::clone(&totals);
    manager.add_tick_monitor(move |monitor| {
        let mut totals = sink.lock();
        totals.samples += 1;
        totals.tick_time_ms += monitor.tick_time_ms;
        totals.acquisition_time_ms += monitor.acquisition_time_ms;
    });

    manager.start()?;
    info!(provider = manager.provider_name(), workers = manager.worker_count(), "server started");

    let start = Instant::now();
    let deadline = options.duration_secs.map(|secs| start + Duration::from_secs(secs));

    loop {
        let next_status = Instant::now() + STATUS_INTERVAL;
        let wake = deadline.map_or(next_status, |deadline| deadline.min(next_status));
        thread::sleep(wake.saturating_duration_since(Instant::now()));

        log_status(&manager, &world, &totals, start);

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
    }

    manager.shutdown();

    let stats = manager.stats();
    info!(
        total_ticks = stats.total_ticks,
        avg_tick_us = stats.avg_tick_us,
        min_tick_us = stats.min_tick_us,
        max_tick_us = stats.max_tick_us,
        late_ticks = stats.late_ticks,
        "server shutdown"
    );
    Ok(())
}

fn log_status(manager: &UpdateManager, world: &World, totals: &Mutex<MonitorTotals>, start: Instant) {
    let stats = manager.stats();
    let summary = world.summary(&manager.acquisition_context());
    let (avg_tick_ms, avg_wait_ms) = {
        let mut totals = totals.lock();
        let averages = if totals.samples == 0 {
            (0.0, 0.0)
        } else {
            #[allow(clippy::cast_precision_loss)]
            let samples = totals.samples as f64;
            (totals.tick_time_ms / samples, totals.acquisition_time_ms / samples)
        };
        *totals = MonitorTotals::default();
        averages
    };

    info!(
        tick = manager.tick_count(),
        uptime_s = start.elapsed().as_secs(),
        objects = manager.object_count(),
        avg_tick_us = stats.avg_tick_us,
        late_ticks = stats.late_ticks,
        avg_tick_ms,
        avg_wait_ms,
        "status"
    );
    info!(
        zone_ticks = summary.zone_ticks,
        visits = summary.visits,
        resources = summary.resources,
        harvested = summary.harvested,
        trips = summary.trips,
        "world"
    );
}
