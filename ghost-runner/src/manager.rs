//! Ghost session loop
//!
//! Races a ghost against a simulated player:
//! - The player replays the same run at `pace`, looping laps
//! - Lap boundaries become start/finish signals (or track gate crossings)
//! - The ghost is a `SimEntity` integrated every tick, so drift shows up
//!   and gets corrected the way it would in the game

use crate::state::RunnerState;
use anyhow::{bail, Result};
use ghost_core::model::{format_millis_time, Vector3};
use ghost_core::run::Run;
use ghost_core::series::{Lookup, NodeSeries};
use ghost_core::track::Track;
use ghost_core::units::Seconds;
use ghost_replay::interpolate;
use ghost_replay::{ReplayVehicle, SimEntity};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const FRAME_INTERVAL: Duration = Duration::from_millis(16); // ~60Hz

/// Drift above this fraction of the sync distance is reported
const DRIFT_WARN_RATIO: f32 = 0.8;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Player speed relative to the recording
    pub pace: f64,
    /// Wall-clock time between ticks
    pub tick: Duration,
    /// Simulated session time per tick (ms)
    pub tick_ms: f64,
    pub max_ticks: Option<u64>,
    /// Stop once the player has finished this many laps
    pub laps: Option<u32>,
    /// Constant velocity error injected into the ghost (m/s)
    pub drift: Vector3,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pace: 1.0,
            tick: FRAME_INTERVAL,
            tick_ms: 16.0,
            max_ticks: None,
            laps: Some(1),
            drift: Vector3::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub run: String,
    pub track: String,
    pub lap_time: String,
    pub ticks: u64,
    pub laps: u32,
    pub ghost_starts: u32,
    pub max_drift: f32,
    pub mean_drift: f32,
    pub teleports: usize,
    pub cancelled: bool,
}

/// Start/finish signals for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerTick {
    pub position: Vector3,
    pub start: bool,
    pub finish: bool,
}

/// Simulated player driving the recorded lap on a loop
pub struct Player {
    series: Arc<NodeSeries>,
    pace: f64,
    lap: Option<u64>,
    position: Option<Vector3>,
}

impl Player {
    pub fn new(series: Arc<NodeSeries>, pace: f64) -> Self {
        Self {
            series,
            pace: if pace.is_finite() && pace > 0.0 { pace } else { 1.0 },
            lap: None,
            position: None,
        }
    }

    fn position_at(&self, t: f64) -> Vector3 {
        match self.series.lookup(t, 0) {
            Lookup::Within { prev, next } => {
                match (self.series.get(prev), self.series.get(next)) {
                    (Some(a), Some(b)) => interpolate::sample(a, b, t).position,
                    _ => Vector3::ZERO,
                }
            }
            Lookup::BeforeStart => self.series.first().map(|n| n.position).unwrap_or_default(),
            Lookup::Finished => self.series.last().map(|n| n.position).unwrap_or_default(),
            Lookup::Empty => Vector3::ZERO,
        }
    }

    /// Move the player to session time `session_ms`.
    ///
    /// Without a track the first tick starts a lap and every lap wrap
    /// finishes one and starts the next. With a track, gate crossings
    /// decide instead.
    pub fn advance(&mut self, session_ms: f64, track: Option<&Track>) -> PlayerTick {
        let duration = self.series.duration();
        let start_ts = self.series.first().map(|n| n.timestamp).unwrap_or(0.0);
        let driven = (session_ms * self.pace).max(0.0);
        let (lap, within) = if duration > 0.0 {
            ((driven / duration).floor() as u64, driven % duration)
        } else {
            (0, 0.0)
        };

        let position = self.position_at(start_ts + within);
        let previous = self.position.replace(position);
        let previous_lap = self.lap.replace(lap);

        let (start, finish) = match track {
            Some(track) => match previous {
                Some(prev) => {
                    let gates = track.gate_signals(prev, position);
                    (gates.start_passed, gates.finish_passed)
                }
                None => (false, false),
            },
            None => match previous_lap {
                None => (true, false),
                Some(prev) if prev != lap => (true, true),
                Some(_) => (false, false),
            },
        };

        PlayerTick {
            position,
            start,
            finish,
        }
    }
}

/// Drive one ghost session until the lap limit, tick limit or cancellation.
pub async fn run(
    state: &RunnerState,
    run: Arc<Run>,
    track: Option<Track>,
    config: RunnerConfig,
) -> Result<RunSummary> {
    let Some(series) = run.playable() else {
        bail!("Replay {} is not playable", run.meta.name);
    };
    let lap_ms = series.last().map(|n| n.timestamp).unwrap_or(0.0);

    let entity = SimEntity::new()
        .with_display_name(format!("{:08X}", run.meta.vehicle_model))
        .with_drift(config.drift, 0.0);
    let mut ghost = ReplayVehicle::new(entity, &run, &state.settings);
    let mut player = Player::new(series, config.pace);
    let sync_distance = state.settings.replay.sync_distance;

    let mut summary = RunSummary {
        run: run.meta.name.clone(),
        track: run.meta.track.clone(),
        lap_time: format_millis_time(lap_ms),
        ..Default::default()
    };
    let mut drift_total = 0.0f64;
    let mut drift_samples = 0u64;
    let mut near_limit = false;

    info!(
        "Racing ghost {} ({}) at pace {:.2}",
        summary.run, summary.lap_time, config.pace
    );

    let mut interval = tokio::time::interval(config.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut session_ms = 0.0;

    loop {
        tokio::select! {
            biased;
            _ = state.cancel.cancelled() => {
                info!("Session cancelled");
                summary.cancelled = true;
                break;
            }
            _ = interval.tick() => {}
        }

        let tick = player.advance(session_ms, track.as_ref());
        if tick.finish {
            summary.laps += 1;
            info!(lap = summary.laps, "Player finished lap at {:.0} ms", session_ms);
        }

        if ghost.update_playback(session_ms, tick.start, tick.finish) {
            summary.ghost_starts += 1;
            info!("Ghost started at {:.0} ms", session_ms);
        }

        if let Some(pos) = ghost.pos() {
            let drift = pos.distance(&ghost.entity().position);
            summary.max_drift = summary.max_drift.max(drift);
            drift_total += f64::from(drift);
            drift_samples += 1;
            let near = drift > sync_distance * DRIFT_WARN_RATIO;
            if near && !near_limit {
                warn!(drift, "Ghost is close to the sync limit");
            }
            near_limit = near;
            debug!(drift, progress = ghost.replay_progress(), "Ghost tick");
        }

        ghost.entity_mut().step(Seconds(config.tick_ms / 1000.0));
        session_ms += config.tick_ms;
        summary.ticks += 1;

        if config.laps.is_some_and(|laps| summary.laps >= laps) {
            info!("Lap limit reached");
            break;
        }
        if config.max_ticks.is_some_and(|max| summary.ticks >= max) {
            info!("Tick limit reached");
            break;
        }
    }

    if drift_samples > 0 {
        summary.mean_drift = (drift_total / drift_samples as f64) as f32;
    }
    summary.teleports = ghost.entity().teleports;

    if summary.cancelled {
        // The host owns the entity from here on
        ghost_replay::set_unloading(true);
    }
    drop(ghost);

    Ok(summary)
}
