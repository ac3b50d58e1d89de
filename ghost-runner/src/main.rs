//! Ghost Replay Runner
//!
//! Headless host: loads the replay library and races a ghost against a
//! simulated player lap.

use anyhow::{Context, Result};
use clap::Parser;
use ghost_core::config::Settings;
use ghost_core::model::{format_millis_time, Vector3};
use ghost_replay::codec;
use ghost_runner::manager::{self, RunnerConfig};
use ghost_runner::state::RunnerState;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "ghost-runner", version, about)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Replay directory
    #[arg(long)]
    replays: Option<PathBuf>,

    /// Track directory; gates are used for start/finish when the track is found
    #[arg(long)]
    tracks: Option<PathBuf>,

    /// Replay to race, by name
    #[arg(long)]
    run: Option<String>,

    /// Race the fastest replay on this track
    #[arg(long)]
    track: Option<String>,

    /// Player speed relative to the recording
    #[arg(long, default_value_t = 1.0)]
    pace: f64,

    /// Stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,

    /// Stop after the player finishes this many laps (0 = no limit)
    #[arg(long, default_value_t = 1)]
    laps: u32,

    /// Sideways drift injected into the ghost (m/s)
    #[arg(long, default_value_t = 0.0)]
    drift: f32,

    /// List replays and exit
    #[arg(long)]
    list: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

fn list_replays(dir: &std::path::Path) -> Result<()> {
    for path in codec::list_replays(dir)? {
        match codec::read_meta(&path) {
            Ok(meta) => println!(
                "{}\t{}\t{}",
                meta.track,
                meta.name,
                format_millis_time(meta.lap_time().unwrap_or(0.0))
            ),
            Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    info!("Starting Ghost Replay Runner");

    let settings = match cli.settings.clone().or_else(Settings::default_path) {
        Some(path) => Settings::load_or_default(&path),
        None => Settings::default(),
    };

    let replays = cli
        .replays
        .clone()
        .or_else(Settings::replays_dir)
        .context("No replay directory given and no data directory available")?;

    if cli.list {
        return list_replays(&replays);
    }

    let state = RunnerState::new(settings);

    let cancel = state.cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                cancel.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    state.load_replays(&replays).await?;
    if state.cancel.is_cancelled() {
        return Ok(());
    }

    let run = state.pick_run(cli.run.as_deref(), cli.track.as_deref())?;

    let track_dir = cli.tracks.clone().or_else(Settings::tracks_dir);
    let track = match track_dir {
        Some(dir) if dir.is_dir() => codec::load_tracks(&dir)?
            .into_iter()
            .find(|t| t.name == run.meta.track),
        _ => None,
    };
    if track.is_none() {
        info!("No gates for track {}, using lap wraps", run.meta.track);
    }

    let config = RunnerConfig {
        pace: cli.pace,
        max_ticks: cli.ticks,
        laps: (cli.laps > 0).then_some(cli.laps),
        drift: Vector3::new(cli.drift, 0.0, 0.0),
        ..Default::default()
    };

    let summary = manager::run(&state, run, track, config).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
