// ABOUTME: Entry point for the tarotfan binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and runs one scripted reading and export headlessly.

mod config;
mod headless;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use rand::{Rng, SeedableRng};
use tarotfan_core::{
    Catalog, EventPayload, SessionPhase, TableConfig, TableHandle, TapTarget, Timings,
};
use tarotfan_export::{ExportConfig, ExportHost, ExportPipeline, SurfaceHandle};
use tokio::sync::broadcast;

use crate::config::{AppConfig, ShareMode};
use crate::headless::{FsDownloader, LocalAssetLoader, LogNotifier, PngRasterizer, Scene, ScriptedShare};

/// Extra time allowed past the longest animation before a step is declared stuck.
const STEP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "tarotfan", version, about = "Deal, reveal and export a tarot reading")]
struct Cli {
    /// Card to select after the shuffle (default: random)
    #[arg(long)]
    pick: Option<usize>,

    /// Cards per hand
    #[arg(long)]
    hand_size: Option<usize>,

    /// RNG seed for reproducible deals
    #[arg(long)]
    seed: Option<u64>,

    /// Multiplier applied to every animation duration
    #[arg(long)]
    time_scale: Option<f64>,

    /// Directory downloaded images are written to
    #[arg(long)]
    out: Option<PathBuf>,

    /// JSON catalog replacing the built-in deck
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Share sheet to simulate: none, text, or files
    #[arg(long)]
    share: Option<ShareMode>,
}

impl Cli {
    fn apply(self, config: &mut AppConfig) {
        if let Some(hand_size) = self.hand_size {
            config.hand_size = hand_size;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(time_scale) = self.time_scale {
            config.time_scale = time_scale;
        }
        if let Some(out) = self.out {
            config.output_dir = out;
        }
        if let Some(catalog) = self.catalog {
            config.catalog = Some(catalog);
        }
        if let Some(share) = self.share {
            config.share = share;
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "tarotfan=debug,tarotfan_core=debug,tarotfan_export=debug",
                )
            }),
        )
        .init();

    let cli = Cli::parse();
    let pick = cli.pick;
    let mut config = AppConfig::from_env()?;
    cli.apply(&mut config);
    config.validate()?;

    tracing::info!(?config, "tarotfan starting up");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(config, pick))
}

fn load_catalog(config: &AppConfig) -> anyhow::Result<Catalog> {
    match &config.catalog {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read catalog {}", path.display()))?;
            Catalog::from_json(&json).with_context(|| format!("invalid catalog {}", path.display()))
        }
        None => Ok(Catalog::major_arcana()),
    }
}

async fn run(config: AppConfig, pick: Option<usize>) -> anyhow::Result<()> {
    let catalog = Arc::new(load_catalog(&config)?);
    let timings = Timings::default().scaled(config.time_scale);
    let table_config = TableConfig {
        hand_size: config.hand_size,
        timings,
        seed: config.seed,
    };

    let scene = Arc::new(Scene::phone());
    let table = tarotfan_core::spawn(table_config, catalog, scene.clone())?;
    let mut events = table.subscribe();
    tracing::info!(session_id = %table.session_id, "table ready");

    table.start_shuffle().await?;
    wait_for(&mut events, timings.shuffle_end, |p| {
        matches!(p, EventPayload::ShuffleCompleted { .. })
    })
    .await?;

    let index = pick.unwrap_or_else(|| random_pick(config.seed, config.hand_size));
    table.select_card(index).await?;
    wait_for(&mut events, timings.flight, |p| {
        matches!(p, EventPayload::SelectionFlightCompleted { .. })
    })
    .await?;

    table.tap_card(index, TapTarget::Card).await?;
    wait_for(&mut events, timings.detail_flip, |p| {
        matches!(p, EventPayload::DetailRevealCompleted { .. })
    })
    .await?;

    let (instance_id, heading) = {
        let state = table.read_state().await;
        let slot = state
            .selected_slot()
            .context("no card selected after the reveal")?;
        (slot.card.instance_id, slot.card.payload.heading.clone())
    };
    tracing::info!(index, %heading, "prediction revealed");

    let host = ExportHost {
        document: scene.clone(),
        rasterizer: Arc::new(PngRasterizer::new(scene.clone())),
        assets: Arc::new(LocalAssetLoader),
        share: Arc::new(ScriptedShare::new(config.share)),
        downloader: Arc::new(FsDownloader::new(config.output_dir.clone())),
        notifier: Arc::new(LogNotifier),
    };
    let pipeline = ExportPipeline::new(host, ExportConfig::default());
    let result = pipeline.export(&SurfaceHandle(instance_id)).await;
    println!("{}", serde_json::to_string(&result)?);
    if scene.mounted_clones() > 0 {
        tracing::warn!(clones = scene.mounted_clones(), "export left clones mounted");
    }

    new_reading(&table, &mut events, timings.return_flight).await?;
    Ok(())
}

async fn new_reading(
    table: &TableHandle,
    events: &mut broadcast::Receiver<tarotfan_core::Event>,
    return_flight: Duration,
) -> anyhow::Result<()> {
    table.request_new_reading().await?;
    wait_for(events, return_flight, |p| matches!(p, EventPayload::SessionLocked)).await?;

    let phase = table.read_state().await.phase();
    if phase != SessionPhase::Locked {
        bail!("table did not lock after the new reading request: {phase:?}");
    }
    tracing::info!("table locked; shuffle to read again");
    Ok(())
}

fn random_pick(seed: Option<u64>, hand_size: usize) -> usize {
    match seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed).gen_range(0..hand_size),
        None => rand::thread_rng().gen_range(0..hand_size),
    }
}

/// Log events until one matches `done`, giving up after `expected` plus a
/// grace period.
async fn wait_for<F>(
    events: &mut broadcast::Receiver<tarotfan_core::Event>,
    expected: Duration,
    done: F,
) -> anyhow::Result<()>
where
    F: Fn(&EventPayload) -> bool,
{
    let deadline = tokio::time::Instant::now() + expected + STEP_GRACE;
    loop {
        let event = match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                tracing::warn!(skipped, "event log fell behind");
                continue;
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => bail!("table closed unexpectedly"),
            Err(_) => bail!("timed out waiting for the table"),
        };
        tracing::debug!(event_id = event.event_id, payload = ?event.payload, "event");
        if done(&event.payload) {
            return Ok(());
        }
    }
}
