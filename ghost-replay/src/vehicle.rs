//! Ghost vehicle playback state machine
//!
//! A `ReplayVehicle` drives one host entity through a recorded run:
//!
//! ```text
//! Idle --start--> Playing --past last node / finish--> Idle
//!                   ^  |
//!          resume   |  v   pause
//!                  Paused --finish--> Idle
//! ```
//!
//! Finish and start in the same tick restart the ghost. The run is held
//! weakly; once it is dropped, unloaded or found empty the ghost parks
//! itself and stays idle.

use crate::cursor::{Cursor, PlaybackState};
use crate::interpolate::{self, Pose};
use crate::is_unloading;
use crate::sync::{FrameContext, SyncPolicy, Synchronizer};
use ghost_core::config::{ForceRoof, MainSettings, ReplaySettings, Settings};
use ghost_core::entity::ReplayEntity;
use ghost_core::model::{format_millis_time, joaat, RunMeta, Vector3};
use ghost_core::run::Run;
use ghost_core::series::{Lookup, NodeSeries};
use ghost_core::units::Seconds;
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// Height a hidden ghost is lifted to, out of harm's way
const PARK_HEIGHT: f32 = 100.0;

/// Map label shown for an active ghost
pub fn marker_label(vehicle: &str, lap_time_ms: f64) -> String {
    format!("Replay - {} ({})", vehicle, format_millis_time(lap_time_ms))
}

/// Convert a 0-100 alpha setting to the host's 0-255 range; 100 resets it.
pub fn host_alpha(alpha: u8) -> Option<u8> {
    if alpha >= 100 {
        None
    } else {
        Some((u32::from(alpha) * 255 / 100) as u8)
    }
}

/// Pick the model to spawn for a run
///
/// Uses the recorded model unless the fallback is forced or `is_valid`
/// rejects it. Returns `None` when neither model can be spawned.
pub fn resolve_model(
    meta: &RunMeta,
    settings: &ReplaySettings,
    is_valid: impl Fn(u32) -> bool,
) -> Option<u32> {
    let fallback = joaat(&settings.fallback_model);
    let model = if settings.force_fallback_model {
        fallback
    } else {
        meta.vehicle_model
    };

    if model != 0 && is_valid(model) {
        return Some(model);
    }

    warn!(
        "[Replay] Couldn't find model 0x{:08X}. Falling back to ({})",
        model, settings.fallback_model
    );
    if is_valid(fallback) {
        Some(fallback)
    } else {
        error!("[Replay] Failed to find fallback model {}", settings.fallback_model);
        None
    }
}

pub struct ReplayVehicle<E: ReplayEntity> {
    entity: E,
    run: Weak<Run>,
    vehicle_name: String,
    main: MainSettings,
    replay: ReplaySettings,
    sync: Synchronizer,
    cursor: Cursor,
    last_pose: Option<Pose>,
    entity_missing: bool,
}

impl<E: ReplayEntity> ReplayVehicle<E> {
    /// Take control of `entity` for replaying `run`. The entity starts hidden.
    pub fn new(entity: E, run: &Arc<Run>, settings: &Settings) -> Self {
        let offset = Seconds(settings.replay.offset_seconds).to_millis().0;
        let vehicle_name = entity.display_name();
        let mut vehicle = Self {
            entity,
            run: Arc::downgrade(run),
            vehicle_name,
            main: settings.main.clone(),
            replay: settings.replay.clone(),
            sync: Synchronizer::from_settings(&settings.replay),
            cursor: Cursor::new(run.nodes(), offset),
            last_pose: None,
            entity_missing: false,
        };

        if vehicle.replay.enable_drivers && vehicle.entity_ready() {
            vehicle.entity.set_driver(true);
        }
        vehicle.hide();
        vehicle
    }

    pub fn entity(&self) -> &E {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut E {
        &mut self.entity
    }

    /// Run this ghost replays, if its owner still holds it
    pub fn run(&self) -> Option<Arc<Run>> {
        self.run.upgrade()
    }

    fn snapshot(&self) -> Option<Arc<NodeSeries>> {
        self.run.upgrade().and_then(|run| run.playable())
    }

    fn playable(&mut self) -> Option<Arc<NodeSeries>> {
        let series = self.snapshot()?;
        self.cursor.rebind(Arc::clone(&series));
        Some(series)
    }

    /// Advance playback to input time `time` (ms).
    ///
    /// Returns whether the ghost (re)started this tick.
    pub fn update_playback(&mut self, time: f64, start_passed: bool, finish_passed: bool) -> bool {
        let Some(series) = self.playable() else {
            if self.cursor.state() != PlaybackState::Idle {
                debug!("[Replay] Run no longer available, stopping ghost");
                self.stop_replay();
            }
            return false;
        };

        let mut started = false;
        let was_active = self.cursor.state() != PlaybackState::Idle;
        match self.cursor.state() {
            PlaybackState::Idle => {
                if start_passed {
                    self.start_replay(Some(time));
                    started = true;
                }
            }
            PlaybackState::Paused => self.show_paused(&series),
            PlaybackState::Playing => self.advance(&series, time),
        }

        // A finished player ends the ghost's lap too, restarting it if the
        // start line was crossed in the same tick. This includes a ghost that
        // ran out of nodes on this very tick.
        if finish_passed && !started && was_active {
            if self.cursor.state() != PlaybackState::Idle {
                self.stop_replay();
            }
            if start_passed {
                self.start_replay(Some(time));
                started = true;
            }
        }

        started
    }

    /// Timestamp (ms) of the displayed node
    pub fn replay_progress(&self) -> f64 {
        if self.snapshot().is_none() {
            return 0.0;
        }
        self.cursor.progress()
    }

    pub fn toggle_pause(&mut self, pause: bool) {
        if self.playable().is_none() {
            return;
        }
        match self.cursor.state() {
            PlaybackState::Idle => self.start_replay(None),
            PlaybackState::Paused if !pause => self.cursor.resync(),
            _ => {}
        }
        self.cursor.set_state(if pause {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        });
    }

    /// Scrub to replay time `time` (ms).
    ///
    /// While playing, scrubbing onto the last node ends the ghost's lap.
    pub fn set_replay_time(&mut self, time: f64) {
        let Some(series) = self.playable() else {
            return;
        };
        let lower = series.lower_bound(time);

        if self.cursor.state() == PlaybackState::Playing && lower + 1 >= series.len() {
            debug!("[Replay] Scrubbed past the end, stopping ghost");
            self.stop_replay();
            return;
        }

        self.cursor.seek(lower.saturating_sub(1));
    }

    /// Scrub `replay.scrub_distance_seconds` away from the displayed node.
    pub fn scrub(&mut self, forward: bool) {
        let distance = Seconds(self.replay.scrub_distance_seconds).to_millis().0;
        let progress = self.replay_progress();
        let target = if forward {
            progress + distance
        } else {
            progress - distance
        };
        self.set_replay_time(target);
    }

    /// Step one node back; returns the time stepped over (ms).
    pub fn frame_prev(&mut self) -> f64 {
        let Some(series) = self.playable() else {
            return 0.0;
        };
        let index = self.cursor.index();
        if index == 0 {
            return 0.0;
        }
        match (series.get(index), series.get(index - 1)) {
            (Some(curr), Some(prev)) => {
                let delta = curr.timestamp - prev.timestamp;
                self.cursor.seek(index - 1);
                delta
            }
            _ => 0.0,
        }
    }

    /// Step one node forward; returns the time stepped over (ms).
    pub fn frame_next(&mut self) -> f64 {
        let Some(series) = self.playable() else {
            return 0.0;
        };
        let index = self.cursor.index();
        match (series.get(index), series.get(index + 1)) {
            (Some(curr), Some(next)) => {
                let delta = next.timestamp - curr.timestamp;
                self.cursor.seek(index + 1);
                delta
            }
            _ => 0.0,
        }
    }

    pub fn num_frames(&self) -> usize {
        self.snapshot().map(|s| s.len()).unwrap_or(0)
    }

    pub fn frame_index(&self) -> usize {
        if self.snapshot().is_none() {
            return 0;
        }
        self.cursor.index()
    }

    pub fn state(&self) -> PlaybackState {
        self.cursor.state()
    }

    /// Ideal pose rendered on the last tick, `None` while idle
    pub fn last_pose(&self) -> Option<&Pose> {
        self.last_pose.as_ref()
    }

    pub fn pos(&self) -> Option<Vector3> {
        self.last_pose.as_ref().map(|p| p.position)
    }

    pub fn rot(&self) -> Option<Vector3> {
        self.last_pose.as_ref().map(|p| p.rotation)
    }

    /// End playback and park the entity.
    pub fn stop_replay(&mut self) {
        self.cursor.reset();
        self.last_pose = None;
        self.hide();
    }

    pub fn update_collision(&mut self, enable: bool) {
        self.replay.enable_collision = enable;
        if self.cursor.state() != PlaybackState::Idle && self.entity_ready() {
            let enabled = self.collision_enabled();
            self.entity.set_collision(enabled);
        }
    }

    pub fn has_collision(&self) -> bool {
        self.entity.exists() && self.entity.has_collision()
    }

    pub fn toggle_driver(&mut self, enable: bool) {
        self.replay.enable_drivers = enable;
        if self.entity_ready() {
            self.entity.set_driver(enable);
        }
    }

    fn collision_enabled(&self) -> bool {
        self.replay.enable_collision && self.sync.policy.allows_collision()
    }

    /// Checks the entity, logging once whenever it disappears or returns.
    fn entity_ready(&mut self) -> bool {
        let exists = self.entity.exists();
        if exists == self.entity_missing {
            if exists {
                debug!("[Replay] Entity is back, resuming actuation");
            } else {
                debug!("[Replay] Entity is gone, skipping actuation");
            }
            self.entity_missing = !exists;
        }
        exists
    }

    fn start_replay(&mut self, time: Option<f64>) {
        self.cursor.restart(time);
        self.unhide();
    }

    fn advance(&mut self, series: &NodeSeries, time: f64) {
        let t = self.cursor.replay_time(time);
        match series.lookup(t, self.cursor.index()) {
            Lookup::Empty => self.stop_replay(),
            Lookup::BeforeStart => {
                self.cursor.advance_to(0);
                let start = series.first().map(|n| n.timestamp).unwrap_or(0.0);
                self.show(series, 0, 0, start, false);
            }
            Lookup::Within { prev, next } => {
                self.cursor.advance_to(prev);
                self.show(series, prev, next, t, false);
            }
            Lookup::Finished => {
                debug!("[Replay] Ghost reached the end of the recording");
                self.stop_replay();
            }
        }
    }

    /// Paused frames render the displayed node through a real bracket so
    /// velocity stays defined; on the last node the bracket looks backwards.
    fn show_paused(&mut self, series: &NodeSeries) {
        let index = self.cursor.index();
        let (prev, next) = if index + 1 < series.len() {
            (index, index + 1)
        } else if index > 0 {
            (index - 1, index)
        } else {
            (index, index)
        };
        let t = self.cursor.progress();
        self.show(series, prev, next, t, true);
    }

    fn show(&mut self, series: &NodeSeries, prev: usize, next: usize, t: f64, paused: bool) {
        let (Some(a), Some(b)) = (series.get(prev), series.get(next)) else {
            return;
        };
        let pose = interpolate::sample(a, b, t);

        if self.entity_ready() {
            let frame = FrameContext {
                fresh: self.cursor.is_fresh() || prev == 0,
                paused,
            };
            let decision = self.sync.apply(&mut self.entity, &pose, frame);
            if decision.snap
                && !frame.fresh
                && !paused
                && self.sync.policy != SyncPolicy::Constant
            {
                debug!(
                    drift = decision.drift,
                    t, "[Replay] Drift over limit, snapping ghost"
                );
            }
            self.cursor.clear_fresh();
        }

        self.last_pose = Some(pose);
    }

    fn hide(&mut self) {
        if !self.entity_ready() {
            return;
        }
        let parked = self.entity.position() + Vector3::new(0.0, 0.0, PARK_HEIGHT);

        let entity = &mut self.entity;
        entity.set_marker(None);
        entity.set_visible(false);
        entity.set_alpha(Some(0));
        entity.set_collision(false);
        entity.set_engine_on(false);
        entity.set_frozen(true);
        entity.set_position(parked);
        entity.set_velocity(Vector3::ZERO);
        entity.set_rpm(0.0);
        entity.set_siren(false);
    }

    fn unhide(&mut self) {
        if !self.entity_ready() {
            return;
        }
        let series = Arc::clone(self.cursor.series());
        let collision = self.collision_enabled();

        let entity = &mut self.entity;
        entity.set_visible(true);
        entity.set_alpha(host_alpha(self.replay.vehicle_alpha));
        entity.set_collision(collision);
        entity.set_engine_on(true);
        entity.set_frozen(false);

        if entity.roof_state().is_some() {
            match self.replay.force_roof {
                ForceRoof::ForceUp => entity.raise_roof(true),
                ForceRoof::ForceDown => entity.lower_roof(true),
                ForceRoof::Default => match series.first().and_then(|n| n.roof) {
                    Some(roof) if roof.is_up() => entity.raise_roof(true),
                    Some(_) => entity.lower_roof(true),
                    None => {}
                },
            }
        }

        if self.main.ghost_blips {
            let lap_time = series.last().map(|n| n.timestamp).unwrap_or(0.0);
            let label = marker_label(&self.vehicle_name, lap_time);
            entity.set_marker(Some(&label));
        }
    }
}

impl<E: ReplayEntity> Drop for ReplayVehicle<E> {
    fn drop(&mut self) {
        // The host tears entities down itself while unloading
        if is_unloading() {
            return;
        }
        if self.entity.exists() {
            self.entity.set_marker(None);
            self.entity.set_driver(false);
            self.entity.delete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimEntity;
    use ghost_core::config::SyncType;
    use ghost_core::model::{Node, RoofState};

    fn line_run(timestamps: &[f64]) -> Arc<Run> {
        let nodes = timestamps
            .iter()
            .map(|&t| Node::at(t, Vector3::new((t / 100.0) as f32, 0.0, 0.0), Vector3::ZERO))
            .collect();
        let meta = RunMeta {
            name: "Docks - Elegy - 0:01.000".to_string(),
            ..Default::default()
        };
        Arc::new(Run::loaded(meta, NodeSeries::from_nodes(nodes).unwrap()))
    }

    fn ghost(run: &Arc<Run>) -> ReplayVehicle<SimEntity> {
        ReplayVehicle::new(SimEntity::new(), run, &Settings::default())
    }

    #[test]
    fn test_spawned_ghost_is_hidden() {
        let run = line_run(&[0.0, 1000.0]);
        let g = ghost(&run);
        let e = g.entity();
        assert_eq!(g.state(), PlaybackState::Idle);
        assert!(!e.visible);
        assert_eq!(e.alpha, Some(0));
        assert!(e.frozen);
        assert!(!e.collision);
        assert_eq!(e.position.z, PARK_HEIGHT);
    }

    #[test]
    fn test_start_unhides_and_marks() {
        let run = line_run(&[0.0, 1000.0]);
        let mut g = ghost(&run);
        assert!(g.update_playback(5000.0, true, false));
        let e = g.entity();
        assert_eq!(g.state(), PlaybackState::Playing);
        assert!(e.visible);
        assert_eq!(e.alpha, None);
        assert!(!e.frozen);
        assert!(e.engine_on);
        // Collision is off by default
        assert!(!g.has_collision());
        assert_eq!(
            e.marker.as_deref(),
            Some("Replay - Elegy (0:01.000)")
        );
    }

    #[test]
    fn test_marker_shows_host_display_name() {
        let run = line_run(&[0.0, 2500.0]);
        let entity = SimEntity::new().with_display_name("Banshee");
        let mut g = ReplayVehicle::new(entity, &run, &Settings::default());
        g.update_playback(0.0, true, false);
        assert_eq!(
            g.entity().marker.as_deref(),
            Some("Replay - Banshee (0:02.500)")
        );
    }

    #[test]
    fn test_playing_follows_replay_time() {
        let run = line_run(&[0.0, 500.0, 1000.0]);
        let mut g = ghost(&run);
        g.update_playback(2000.0, true, false);
        g.update_playback(2750.0, false, false);
        assert_eq!(g.frame_index(), 1);
        assert_eq!(g.replay_progress(), 500.0);
        let pos = g.pos().unwrap();
        assert!((pos.x - 7.5).abs() < 1e-4);
        assert_eq!(g.entity().position, pos);
    }

    #[test]
    fn test_running_past_the_end_parks() {
        let run = line_run(&[0.0, 1000.0]);
        let mut g = ghost(&run);
        g.update_playback(0.0, true, false);
        g.update_playback(500.0, false, false);
        g.update_playback(1000.0, false, false);
        assert_eq!(g.state(), PlaybackState::Idle);
        assert!(!g.entity().visible);
        assert!(g.entity().marker.is_none());
        assert!(g.last_pose().is_none());
    }

    #[test]
    fn test_finish_and_start_same_tick_restarts() {
        let run = line_run(&[0.0, 1000.0, 2000.0]);
        let mut g = ghost(&run);
        g.update_playback(0.0, true, false);
        g.update_playback(1500.0, false, false);
        assert_eq!(g.frame_index(), 1);

        assert!(g.update_playback(1600.0, true, true));
        assert_eq!(g.state(), PlaybackState::Playing);
        assert_eq!(g.frame_index(), 0);

        g.update_playback(1700.0, false, false);
        assert_eq!(g.replay_progress(), 0.0);
    }

    #[test]
    fn test_restart_when_ghost_ends_on_the_lap_wrap() {
        let run = line_run(&[0.0, 1000.0]);
        let mut g = ghost(&run);
        g.update_playback(0.0, true, false);
        g.update_playback(900.0, false, false);

        assert!(g.update_playback(1008.0, true, true));
        assert_eq!(g.state(), PlaybackState::Playing);
        g.update_playback(1108.0, false, false);
        assert!((g.pos().unwrap().x - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_finish_alone_stops() {
        let run = line_run(&[0.0, 1000.0, 2000.0]);
        let mut g = ghost(&run);
        g.update_playback(0.0, true, false);
        assert!(!g.update_playback(100.0, false, true));
        assert_eq!(g.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_paused_on_last_node_uses_previous_bracket() {
        let run = line_run(&[0.0, 1000.0, 2000.0]);
        let mut g = ghost(&run);
        g.toggle_pause(true);
        g.set_replay_time(5000.0);
        assert_eq!(g.frame_index(), 2);

        g.update_playback(0.0, false, false);
        let pose = g.last_pose().unwrap();
        assert_eq!(pose.progress, 1.0);
        assert_eq!(pose.position, Vector3::new(20.0, 0.0, 0.0));
        assert_eq!(pose.velocity, Vector3::new(10.0, 0.0, 0.0));
        // Zero velocity on pause is the default
        assert_eq!(g.entity().velocity, Vector3::ZERO);
    }

    #[test]
    fn test_scrub_uses_configured_distance() {
        let timestamps: Vec<f64> = (0..=20).map(|i| f64::from(i) * 100.0).collect();
        let run = line_run(&timestamps);
        let mut g = ghost(&run);
        g.toggle_pause(true);

        g.scrub(true);
        assert_eq!(g.replay_progress(), 900.0);
        g.scrub(true);
        assert_eq!(g.replay_progress(), 1800.0);
        g.scrub(false);
        assert_eq!(g.replay_progress(), 700.0);
        g.scrub(false);
        assert_eq!(g.replay_progress(), 0.0);
    }

    #[test]
    fn test_frame_stepping() {
        let run = line_run(&[0.0, 16.0, 40.0]);
        let mut g = ghost(&run);
        g.toggle_pause(true);
        assert_eq!(g.frame_prev(), 0.0);
        assert_eq!(g.frame_next(), 16.0);
        assert_eq!(g.frame_next(), 24.0);
        assert_eq!(g.frame_next(), 0.0);
        assert_eq!(g.frame_index(), 2);
        assert_eq!(g.frame_prev(), 24.0);
        assert_eq!(g.num_frames(), 3);
    }

    #[test]
    fn test_dropped_run_fails_safe() {
        let run = line_run(&[0.0, 1000.0, 2000.0]);
        let mut g = ghost(&run);
        g.update_playback(0.0, true, false);
        g.update_playback(500.0, false, false);
        drop(run);

        assert!(!g.update_playback(600.0, true, false));
        assert_eq!(g.state(), PlaybackState::Idle);
        assert!(!g.entity().visible);
        assert_eq!(g.num_frames(), 0);
        assert_eq!(g.replay_progress(), 0.0);
    }

    #[test]
    fn test_missing_entity_skips_actuation() {
        let run = line_run(&[0.0, 1000.0, 2000.0]);
        let mut g = ghost(&run);
        g.update_playback(0.0, true, false);
        g.entity_mut().exists = false;
        let teleports = g.entity().teleports;

        g.update_playback(500.0, false, false);
        assert_eq!(g.entity().teleports, teleports);
        assert!(g.last_pose().is_some());

        g.entity_mut().exists = true;
        g.update_playback(600.0, false, false);
        assert!(g.entity().teleports > teleports);
    }

    #[test]
    fn test_collision_follows_setting_and_policy() {
        let run = line_run(&[0.0, 1000.0]);
        let mut g = ghost(&run);
        g.update_playback(0.0, true, false);
        g.update_collision(true);
        assert!(g.has_collision());

        let mut settings = Settings::default();
        settings.replay.sync_type = SyncType::Constant;
        settings.replay.enable_collision = true;
        let mut g = ReplayVehicle::new(SimEntity::new(), &run, &settings);
        g.update_playback(0.0, true, false);
        assert!(!g.has_collision());
    }

    #[test]
    fn test_unhide_applies_recorded_initial_roof() {
        let mut first = Node::at(0.0, Vector3::ZERO, Vector3::ZERO);
        first.roof = Some(RoofState::Lowered);
        let last = Node::at(1000.0, Vector3::ZERO, Vector3::ZERO);
        let run = Arc::new(Run::loaded(
            RunMeta::default(),
            NodeSeries::from_nodes(vec![first, last]).unwrap(),
        ));
        let entity = SimEntity::new().convertible(RoofState::Raised);
        let mut g = ReplayVehicle::new(entity, &run, &Settings::default());
        g.update_playback(0.0, true, false);
        assert_eq!(g.entity().roof, Some(RoofState::Lowered));
    }

    #[test]
    fn test_alpha_and_driver() {
        assert_eq!(host_alpha(100), None);
        assert_eq!(host_alpha(0), Some(0));
        assert_eq!(host_alpha(50), Some(127));

        let run = line_run(&[0.0, 1000.0]);
        let mut g = ghost(&run);
        g.toggle_driver(true);
        assert!(g.entity().driver);
        g.toggle_driver(false);
        assert!(!g.entity().driver);
    }

    #[test]
    fn test_resolve_model_falls_back() {
        let meta = RunMeta {
            vehicle_model: 1234,
            ..Default::default()
        };
        let mut settings = ReplaySettings::default();
        let sultan = joaat("sultan");

        assert_eq!(resolve_model(&meta, &settings, |_| true), Some(1234));
        assert_eq!(resolve_model(&meta, &settings, |m| m == sultan), Some(sultan));
        assert_eq!(resolve_model(&meta, &settings, |_| false), None);

        settings.force_fallback_model = true;
        assert_eq!(resolve_model(&meta, &settings, |_| true), Some(sultan));
    }

    #[test]
    fn test_drop_deletes_entity() {
        let run = line_run(&[0.0, 1000.0]);
        let mut entity = SimEntity::new();
        let deleted = entity.deletion_probe();
        let g = ReplayVehicle::new(entity, &run, &Settings::default());
        drop(g);
        assert!(deleted.load(std::sync::atomic::Ordering::SeqCst));
    }
}
