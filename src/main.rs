//! `fleetwatch` -- instrument fleet monitoring daemon.
//!
//! Polls an instrument status source, mirrors last-seen timestamps,
//! and escalates email/SMS notifications for silent instruments. The
//! status source is either a JSON file exported by the operations
//! database or the built-in simulator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetwatch::config::MonitorConfig;
use fleetwatch::model::InstrumentState;
use fleetwatch::notify::LogDispatcher;
use fleetwatch::runner::Monitor;
use fleetwatch::source::{seed_fleet, FileSource, InstrumentSource, SimSource};
use fleetwatch::store::memory::{MemoryCampaignStore, MemoryEntityStore, MemoryTimeSeriesStore};

#[derive(Parser, Debug)]
#[command(name = "fleetwatch")]
#[command(about = "Health monitor and escalating notifier for instrument fleets")]
struct Args {
    /// Path to a config file (TOML); FLEETWATCH_* env vars override
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Poll observations from a JSON file
    #[arg(short, long, conflicts_with = "sim")]
    file: Option<PathBuf>,

    /// Run against a simulated fleet
    #[arg(long, conflicts_with = "file")]
    sim: bool,

    /// Simulated fleet size (with --sim)
    #[arg(long, default_value = "16")]
    fleet_size: usize,

    /// Run one forced escalation pass, print the transcript, and exit
    #[arg(long)]
    test_notifications: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = MonitorConfig::load(args.config.as_deref())?;

    let entities = Arc::new(MemoryEntityStore::new());
    let campaigns = Arc::new(MemoryCampaignStore::new());
    let series = Arc::new(MemoryTimeSeriesStore::new());
    let dispatcher = Arc::new(LogDispatcher::new(config.utc_offset_hours));

    let mut source: Box<dyn InstrumentSource> = match &args.file {
        Some(path) => Box::new(FileSource::new(path)),
        None => Box::new(SimSource::new(args.fleet_size)),
    };

    if args.file.is_some() {
        // A file-fed run has no host entity store to mirror into;
        // adopt the fleet from the first snapshot.
        let observations = source.fetch_all().await?;
        for obs in &observations {
            entities.add_instrument(InstrumentState {
                entry_id: format!("entry-{}", obs.instrument_id),
                site_id: obs.site_id.clone(),
                kind: obs.kind,
                instrument_id: obs.instrument_id,
                name: obs.site_id.clone(),
                monitoring_enabled: true,
                last_network: None,
                last_data: None,
                last_ldm: None,
            });
        }
        tracing::info!(count = observations.len(), "adopted fleet from file");
    } else {
        seed_fleet(&entities, args.fleet_size);
    }

    tracing::info!(
        source = source.description(),
        fleet = entities.len(),
        poll_interval_minutes = config.poll_interval_minutes,
        notification_poll_interval_minutes = config.notification_poll_interval_minutes,
        monitoring_enabled = config.monitoring_enabled,
        "starting fleetwatch"
    );

    let mut monitor = Monitor::new(config, source, entities, campaigns, series, dispatcher);

    if args.test_notifications {
        // Prime campaigns with one reconcile pass, then force sends.
        monitor.poll_once().await?;
        let transcript = monitor.escalator().test_pass(chrono::Utc::now()).await?;
        print!("{}", transcript);
        return Ok(());
    }

    let handle = monitor.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    handle.stop();
    handle.wait().await;
    Ok(())
}
