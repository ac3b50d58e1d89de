//! Runner state shared between the tick loop and the signal handler

use anyhow::{anyhow, bail, Context, Result};
use ghost_core::config::Settings;
use ghost_core::run::Run;
use ghost_replay::ReplayLibrary;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct RunnerState {
    pub library: Arc<ReplayLibrary>,
    pub settings: Arc<Settings>,
    /// Cancelled on Ctrl-C; stops loading and the tick loop
    pub cancel: CancellationToken,
}

impl RunnerState {
    pub fn new(settings: Settings) -> Self {
        Self {
            library: Arc::new(ReplayLibrary::new()),
            settings: Arc::new(settings),
            cancel: CancellationToken::new(),
        }
    }

    /// Load all replays in `dir` and wait for the loader to finish.
    ///
    /// Returns the number of runs in the library afterwards.
    pub async fn load_replays(&self, dir: &Path) -> Result<usize> {
        let handle = self.library.load_dir(dir)?;

        let mut poll = tokio::time::interval(LOAD_POLL_INTERVAL);
        while self.library.is_locked() {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Cancelled, stopping replay loader");
                    self.library.stop_loading();
                    break;
                }
                _ = poll.tick() => {
                    if let Some(name) = self.library.current_loading() {
                        debug!(
                            "Loading {} ({}/{})",
                            name,
                            self.library.loaded(),
                            self.library.total()
                        );
                    }
                }
            }
        }

        tokio::task::spawn_blocking(move || handle.join())
            .await
            .context("Replay loader task failed")?
            .map_err(|_| anyhow!("Replay loader panicked"))?;

        let count = self.library.runs().len();
        info!("{} replays loaded", count);
        Ok(count)
    }

    /// Pick a run by exact name, or the fastest run on `track`.
    pub fn pick_run(&self, name: Option<&str>, track: Option<&str>) -> Result<Arc<Run>> {
        match (name, track) {
            (Some(name), _) => self
                .library
                .find(name)
                .with_context(|| format!("No replay named {}", name)),
            (None, Some(track)) => self
                .library
                .fastest(track)
                .with_context(|| format!("No complete replay on track {}", track)),
            (None, None) => {
                let runs = self.library.runs();
                let Some(run) = runs
                    .into_iter()
                    .filter(|r| r.is_complete())
                    .filter_map(|r| r.lap_time().map(|t| (t, r)))
                    .min_by(|(a, _), (b, _)| a.total_cmp(b))
                    .map(|(_, r)| r)
                else {
                    bail!("No replays available");
                };
                Ok(run)
            }
        }
    }
}
