//! Replay library loading from disk

use ghost_core::config::Settings;
use ghost_core::model::{Node, RunMeta, Vector3};
use ghost_core::run::Run;
use ghost_core::series::NodeSeries;
use ghost_replay::codec;
use ghost_replay::{PlaybackState, ReplayLibrary, ReplayVehicle, SimEntity};
use std::fs;
use std::sync::Arc;

fn lap(name: &str, track: &str, lap_ms: f64) -> Run {
    let nodes = (0..=20)
        .map(|i| {
            let t = lap_ms * f64::from(i) / 20.0;
            Node::at(t, Vector3::new(i as f32, 0.0, 0.0), Vector3::ZERO)
        })
        .collect();
    let meta = RunMeta {
        timestamp: 1_700_000_000_000,
        name: name.to_string(),
        track: track.to_string(),
        vehicle_model: 42,
        ..Default::default()
    };
    Run::loaded(meta, NodeSeries::from_nodes(nodes).unwrap())
}

#[test]
fn test_load_dir_reads_both_formats_and_skips_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    codec::write_run(dir.path(), &lap("slow", "Docks", 90_000.0), false).unwrap();
    codec::write_run(dir.path(), &lap("fast", "Docks", 80_000.0), true).unwrap();
    codec::write_run(dir.path(), &lap("other", "Airport", 10_000.0), false).unwrap();
    fs::write(dir.path().join("broken.json"), "{\"Name\": ").unwrap();
    fs::write(dir.path().join("notes.txt"), "not a replay").unwrap();

    let library = Arc::new(ReplayLibrary::new());
    let handle = library.load_dir(dir.path()).unwrap();
    handle.join().unwrap();

    assert!(!library.is_locked());
    assert_eq!(library.total(), 4);
    assert_eq!(library.loaded(), 4);
    assert!(library.current_loading().is_none());
    assert_eq!(library.runs().len(), 3);
    assert!(library.runs().iter().all(|r| r.is_complete()));

    let fastest = library.fastest("Docks").unwrap();
    assert_eq!(fastest.meta.name, "fast");
    assert_eq!(fastest.nodes().len(), 21);
    assert_eq!(library.runs_for_track("Airport").len(), 1);
}

#[test]
fn test_second_load_is_rejected_while_locked() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..20 {
        codec::write_run(dir.path(), &lap(&format!("lap {}", i), "Docks", 60_000.0), false)
            .unwrap();
    }

    let library = Arc::new(ReplayLibrary::new());
    let handle = library.load_dir(dir.path()).unwrap();
    if library.is_locked() {
        assert!(library.load_dir(dir.path()).is_err());
    }
    handle.join().unwrap();
    assert_eq!(library.runs().len(), 20);

    // Unlocked again once finished
    library.clear();
    library.load_dir(dir.path()).unwrap().join().unwrap();
    assert_eq!(library.runs().len(), 20);
}

#[test]
fn test_stopped_load_leaves_no_partial_runs() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10 {
        codec::write_run(dir.path(), &lap(&format!("lap {}", i), "Docks", 60_000.0), true)
            .unwrap();
    }

    let library = Arc::new(ReplayLibrary::new());
    let handle = library.load_dir(dir.path()).unwrap();
    library.stop_loading();
    handle.join().unwrap();

    assert!(!library.is_locked());
    assert!(library.runs().len() <= 10);
    assert!(library.runs().iter().all(|r| r.is_complete()));
}

#[test]
fn test_loaded_run_plays() {
    let dir = tempfile::tempdir().unwrap();
    codec::write_run(dir.path(), &lap("ghost", "Docks", 2000.0), false).unwrap();

    let library = Arc::new(ReplayLibrary::new());
    library.load_dir(dir.path()).unwrap().join().unwrap();
    let run = library.find("ghost").unwrap();

    let mut g = ReplayVehicle::new(SimEntity::new(), &run, &Settings::default());
    assert!(g.update_playback(0.0, true, false));
    g.update_playback(250.0, false, false);
    assert_eq!(g.state(), PlaybackState::Playing);
    assert_eq!(g.pos(), Some(Vector3::new(2.5, 0.0, 0.0)));
}

#[test]
fn test_meta_listing_without_sidecars() {
    let dir = tempfile::tempdir().unwrap();
    let path = codec::write_run(dir.path(), &lap("listed", "Docks", 5000.0), false).unwrap();
    fs::remove_file(codec::meta_path(&path)).unwrap();

    let metas: Vec<_> = codec::list_replays(dir.path())
        .unwrap()
        .iter()
        .map(|p| codec::read_meta(p).unwrap())
        .collect();
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0].name, "listed");
    assert_eq!(metas[0].lap_time(), Some(5000.0));
}
