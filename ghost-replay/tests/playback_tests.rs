//! Ghost playback scenarios driven through the public API

use ghost_core::config::Settings;
use ghost_core::model::{Node, RunMeta, Vector3};
use ghost_core::run::Run;
use ghost_core::series::NodeSeries;
use ghost_core::units::Seconds;
use ghost_replay::{PlaybackState, ReplayLibrary, ReplayVehicle, SimEntity};
use std::sync::Arc;

const TICK_MS: f64 = 16.0;

/// Straight line along X at 10 m/s, one node every `step_ms`
fn straight_run(duration_ms: f64, step_ms: f64) -> Run {
    let mut nodes = Vec::new();
    let mut t = 0.0;
    while t <= duration_ms {
        nodes.push(Node::at(
            t,
            Vector3::new((t / 100.0) as f32, 0.0, 0.0),
            Vector3::ZERO,
        ));
        t += step_ms;
    }
    let meta = RunMeta {
        name: "Docks - Elegy - straight".to_string(),
        track: "Docks".to_string(),
        ..Default::default()
    };
    Run::loaded(meta, NodeSeries::from_nodes(nodes).unwrap())
}

fn ghost(run: &Arc<Run>) -> ReplayVehicle<SimEntity> {
    ReplayVehicle::new(SimEntity::new(), run, &Settings::default())
}

#[test]
fn test_midpoint_pose() {
    let run = Arc::new(straight_run(1000.0, 1000.0));
    let mut g = ghost(&run);

    assert!(g.update_playback(0.0, true, false));
    assert_eq!(g.state(), PlaybackState::Playing);

    assert!(!g.update_playback(500.0, false, false));
    let pose = g.last_pose().unwrap();
    assert_eq!(pose.position, Vector3::new(5.0, 0.0, 0.0));
    assert_eq!(pose.velocity, Vector3::new(10.0, 0.0, 0.0));
    assert_eq!(g.entity().position, Vector3::new(5.0, 0.0, 0.0));
}

#[test]
fn test_progress_never_decreases_while_playing() {
    let run = Arc::new(straight_run(3000.0, 100.0));
    let mut g = ghost(&run);
    g.update_playback(10_000.0, true, false);

    let mut last = 0.0;
    let mut time = 10_000.0;
    while g.state() == PlaybackState::Playing {
        time += TICK_MS;
        g.update_playback(time, false, false);
        let progress = g.replay_progress();
        if g.state() == PlaybackState::Playing {
            assert!(progress >= last, "{} went back to {}", last, progress);
            last = progress;
        }
    }
    assert!(last >= 2900.0);
}

#[test]
fn test_pause_then_resume_preserves_progress() {
    let run = Arc::new(straight_run(2000.0, 100.0));
    let mut g = ghost(&run);
    g.update_playback(0.0, true, false);
    g.update_playback(450.0, false, false);
    assert_eq!(g.replay_progress(), 400.0);

    g.toggle_pause(true);
    g.update_playback(2000.0, false, false);
    assert_eq!(g.state(), PlaybackState::Paused);
    assert_eq!(g.replay_progress(), 400.0);
    assert_eq!(g.entity().velocity, Vector3::ZERO);

    g.toggle_pause(false);
    g.update_playback(3000.0, false, false);
    assert_eq!(g.replay_progress(), 400.0);
    g.update_playback(3100.0, false, false);
    assert_eq!(g.replay_progress(), 500.0);
}

#[test]
fn test_scrub_to_end_then_advance_goes_idle_once() {
    let run = Arc::new(straight_run(1000.0, 100.0));
    let mut g = ghost(&run);
    g.update_playback(0.0, true, false);
    g.toggle_pause(true);
    g.set_replay_time(1000.0);
    assert_eq!(g.frame_index(), 9);
    g.toggle_pause(false);

    let mut stops = 0;
    let mut time = 5000.0;
    for _ in 0..50 {
        let before = g.state();
        g.update_playback(time, false, false);
        if before != PlaybackState::Idle && g.state() == PlaybackState::Idle {
            stops += 1;
        }
        time += TICK_MS;
    }
    assert_eq!(stops, 1);

    // Idle ticks leave the parked entity alone
    let teleports = g.entity().teleports;
    g.update_playback(time, false, false);
    assert_eq!(g.entity().teleports, teleports);
    assert!(!g.entity().visible);
}

#[test]
fn test_scrub_to_end_while_playing_stops() {
    let run = Arc::new(straight_run(1000.0, 100.0));
    let mut g = ghost(&run);
    g.update_playback(0.0, true, false);
    g.set_replay_time(1000.0);
    assert_eq!(g.state(), PlaybackState::Idle);
}

#[test]
fn test_finish_and_start_in_one_tick_keeps_playing() {
    let run = Arc::new(straight_run(2000.0, 100.0));
    let mut g = ghost(&run);
    g.update_playback(0.0, true, false);
    g.update_playback(1200.0, false, false);

    assert!(g.update_playback(1300.0, true, true));
    assert_eq!(g.state(), PlaybackState::Playing);
    g.update_playback(1350.0, false, false);
    assert_eq!(g.replay_progress(), 0.0);
}

#[test]
fn test_empty_run_stays_idle() {
    let run = Arc::new(Run::loaded(RunMeta::default(), NodeSeries::new()));
    let mut g = ghost(&run);
    assert!(!g.update_playback(0.0, true, false));
    assert_eq!(g.state(), PlaybackState::Idle);
    g.toggle_pause(false);
    assert_eq!(g.state(), PlaybackState::Idle);
}

#[test]
fn test_incomplete_run_waits_for_loader() {
    let run = Arc::new(Run::pending(RunMeta::default()));
    run.append(straight_run(1000.0, 100.0).nodes().nodes().to_vec())
        .unwrap();
    let mut g = ghost(&run);

    assert!(!g.update_playback(0.0, true, false));
    assert_eq!(g.state(), PlaybackState::Idle);

    run.mark_complete();
    assert!(g.update_playback(16.0, true, false));
    assert_eq!(g.num_frames(), 11);
}

#[test]
fn test_removed_from_library_parks_ghost() {
    let library = ReplayLibrary::new();
    let run = library.add(straight_run(2000.0, 100.0));
    let mut g = ghost(&run);
    drop(run);

    g.update_playback(0.0, true, false);
    g.update_playback(300.0, false, false);
    assert!(g.entity().visible);

    library.remove("Docks - Elegy - straight");
    assert!(!g.update_playback(400.0, false, false));
    assert_eq!(g.state(), PlaybackState::Idle);
    assert!(!g.entity().visible);
    assert!(g.run().is_none());
}

#[test]
fn test_drift_is_held_within_sync_distance() {
    let run = Arc::new(straight_run(10_000.0, 100.0));
    let settings = Settings::default();
    let limit = settings.replay.sync_distance;
    let entity = SimEntity::new().with_drift(Vector3::new(0.0, 2.0, 0.0), 0.0);
    let mut g = ReplayVehicle::new(entity, &run, &settings);

    g.update_playback(0.0, true, false);
    let spawn_teleports = g.entity().teleports;

    let mut time = 0.0;
    let mut worst = 0.0f32;
    while g.state() == PlaybackState::Playing {
        time += TICK_MS;
        g.update_playback(time, false, false);
        if let Some(pos) = g.pos() {
            worst = worst.max(pos.distance(&g.entity().position));
        }
        g.entity_mut().step(Seconds(TICK_MS / 1000.0));
    }

    assert!(worst <= limit + 1e-3, "drift reached {}", worst);
    // One snap for the first frame, at least one more to correct drift
    assert!(g.entity().teleports >= spawn_teleports + 2);
}
