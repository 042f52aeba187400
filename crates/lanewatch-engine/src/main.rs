//! Lanewatch traffic event binary.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lanewatch_delivery::{replay_stored, DeliveryConfig, DeliveryPipeline, FallbackStore, IngestClient};
use lanewatch_engine::{
    CaptureGate, EngineConfig, EventLog, FrameProcessor, FrameReader, ProcessorParts, TrackRegistry,
};
use lanewatch_models::payload_schema;

/// Lane classification, speed estimation and reliable event delivery
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process tracked frames (JSON Lines) and deliver captured events
    ///
    /// Ctrl-C is checked between frames. When reading stdin, shutdown starts
    /// once the next line arrives or the input is closed.
    Run {
        /// Input file; reads stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Re-send locally stored events once
    Replay,
    /// Print the JSON schema of the ingestion payload
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;

    match Cli::parse().command {
        Command::Run { input } => run(input).await,
        Command::Replay => replay().await,
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&payload_schema())?);
            Ok(())
        }
    }
}

/// Colored output for dev, JSON for production.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("lanewatch=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn run(input: Option<PathBuf>) -> anyhow::Result<()> {
    info!("Starting lanewatch");

    let config = EngineConfig::from_env();
    info!("Engine config: {:?}", config);

    if let Some(port) = config.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .context("Failed to start Prometheus exporter")?;
        info!("Serving metrics on port {}", port);
    }

    let scene = config.load_scene().context("Failed to load scene")?;
    scene.validate()?;
    let registry = Arc::new(TrackRegistry::new(scene.speed.clone(), scene.homography()?));

    let store = FallbackStore::new(&config.fallback_dir);
    store.ensure_dirs().await?;

    let client = IngestClient::from_env()?;
    info!("Delivering events to {}", client.endpoint());
    let pipeline = Arc::new(DeliveryPipeline::start(DeliveryConfig::from_env(), Arc::new(client), store));

    let mut processor = FrameProcessor::new(ProcessorParts {
        classifier: scene.classifier(),
        registry: Arc::clone(&registry),
        gate: CaptureGate::new(),
        event_log: EventLog::open(&config.event_log_path)?,
        delivery: pipeline.clone(),
        config: config.clone(),
    });

    // Ctrl-C stops reading new frames; queued deliveries still drain. A
    // blocked stdin read is not interrupted.
    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            stop_signal.store(true, Ordering::SeqCst);
        }
    });

    let frame_loop = tokio::task::spawn_blocking(move || -> anyhow::Result<u64> {
        let reader: Box<dyn BufRead> = match &input {
            Some(path) => Box::new(BufReader::new(
                File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
            )),
            None => Box::new(BufReader::new(std::io::stdin())),
        };

        let mut frames = FrameReader::new(reader);
        if let Some(dir) = input.as_ref().and_then(|p| p.parent()) {
            frames = frames.with_base_dir(dir);
        }

        let mut processed = 0;
        for frame in frames {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            processor.process_frame(&frame);
            processed += 1;
        }
        Ok(processed)
    });

    let frames = frame_loop.await.context("Frame loop failed")??;

    let stats = pipeline.shutdown().await;
    let summary = registry.snapshot();

    for lane in &summary.lanes {
        info!(
            lane = lane.lane + 1,
            total = lane.total,
            classes = ?lane.classes,
            "Lane totals"
        );
    }
    info!(
        frames,
        tracks = summary.tracks,
        captured = summary.captured,
        delivered = stats.delivered,
        persisted = stats.persisted,
        lost = stats.lost,
        "Run complete"
    );
    if stats.lost > 0 {
        warn!("{} events could not be delivered or stored", stats.lost);
    }

    Ok(())
}

async fn replay() -> anyhow::Result<()> {
    let config = EngineConfig::from_env();
    let store = FallbackStore::new(&config.fallback_dir);
    let client = IngestClient::from_env()?;

    info!("Replaying {} to {}", store.root().display(), client.endpoint());
    let summary = replay_stored(&store, &client).await?;

    if summary.failed > 0 {
        warn!("{} stored events are still pending", summary.failed);
    }
    Ok(())
}
