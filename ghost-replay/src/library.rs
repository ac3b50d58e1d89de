//! Replay library
//!
//! Owns every loaded run. Ghosts only hold `Weak<Run>` handles, so removing
//! a run here is enough to make its ghosts park.
//!
//! `load_dir` runs on a worker thread: each file is published as a pending
//! run first and its nodes are streamed in chunks, so a listing can show
//! a run before it is playable.

use crate::codec;
use anyhow::{bail, Context, Result};
use ghost_core::run::Run;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Nodes decoded per published snapshot
const CHUNK_SIZE: usize = 512;

#[derive(Debug, Default)]
pub struct ReplayLibrary {
    runs: RwLock<Vec<Arc<Run>>>,
    total: AtomicUsize,
    loaded: AtomicUsize,
    locked: AtomicBool,
    stop: AtomicBool,
    current: Mutex<Option<String>>,
}

impl ReplayLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every replay in `dir` on a background thread.
    ///
    /// Fails immediately if a load is already in progress or the directory
    /// cannot be listed; per-file failures are logged and skipped.
    pub fn load_dir(self: &Arc<Self>, dir: &Path) -> Result<JoinHandle<()>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            bail!("Replay library is already loading");
        }

        let files = match codec::list_replays(dir) {
            Ok(files) => files,
            Err(e) => {
                self.locked.store(false, Ordering::Release);
                return Err(e);
            }
        };

        self.stop.store(false, Ordering::Release);
        self.total.store(files.len(), Ordering::Release);
        self.loaded.store(0, Ordering::Release);
        info!("[Library] Loading {} replays from {}", files.len(), dir.display());

        let library = Arc::clone(self);
        thread::Builder::new()
            .name("replay-loader".to_string())
            .spawn(move || library.load_files(files))
            .context("Failed to spawn replay loader")
            .inspect_err(|_| self.locked.store(false, Ordering::Release))
    }

    fn load_files(&self, files: Vec<PathBuf>) {
        for path in files {
            if self.stop.load(Ordering::Acquire) {
                info!("[Library] Loading stopped");
                break;
            }
            if let Err(e) = self.load_file(&path) {
                warn!("[Library] Skipping {}: {:#}", path.display(), e);
            }
            self.loaded.fetch_add(1, Ordering::AcqRel);
        }

        self.set_current(None);
        self.locked.store(false, Ordering::Release);
        info!(
            "[Library] Finished loading, {} runs available",
            self.runs_read().len()
        );
    }

    fn load_file(&self, path: &Path) -> Result<()> {
        let raw = codec::read_raw(path)?;
        self.set_current(Some(raw.meta.name.clone()));

        let run = Arc::new(Run::pending(raw.meta));
        self.runs_write().push(Arc::clone(&run));

        let streamed = self.stream_nodes(&run, raw.nodes);
        match streamed {
            Ok(true) => {
                run.mark_complete();
                debug!("[Library] Loaded {} ({} nodes)", run.meta.name, run.nodes().len());
                Ok(())
            }
            Ok(false) => {
                self.discard(&run);
                Ok(())
            }
            Err(e) => {
                self.discard(&run);
                Err(e).with_context(|| format!("Failed to load {}", path.display()))
            }
        }
    }

    /// Returns false if stopped part way.
    fn stream_nodes(&self, run: &Run, values: Vec<serde_json::Value>) -> Result<bool> {
        let mut values = values.into_iter().enumerate().peekable();
        while values.peek().is_some() {
            if self.stop.load(Ordering::Acquire) {
                return Ok(false);
            }
            let chunk = values
                .by_ref()
                .take(CHUNK_SIZE)
                .map(|(i, v)| codec::decode_node(v).with_context(|| format!("Node {}", i)))
                .collect::<Result<Vec<_>>>()?;
            run.append(chunk)?;
        }
        Ok(true)
    }

    fn discard(&self, run: &Arc<Run>) {
        self.runs_write().retain(|r| !Arc::ptr_eq(r, run));
        run.unload();
    }

    fn set_current(&self, name: Option<String>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = name;
    }

    fn runs_read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<Run>>> {
        self.runs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn runs_write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<Run>>> {
        self.runs.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Files found by the current or last load
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// Files processed so far, including skipped ones
    pub fn loaded(&self) -> usize {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Name of the run being loaded
    pub fn current_loading(&self) -> Option<String> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Ask the loader to stop after the current chunk.
    pub fn stop_loading(&self) {
        if self.is_locked() {
            self.stop.store(true, Ordering::Release);
        }
    }

    pub fn runs(&self) -> Vec<Arc<Run>> {
        self.runs_read().clone()
    }

    pub fn runs_for_track(&self, track: &str) -> Vec<Arc<Run>> {
        self.runs_read()
            .iter()
            .filter(|r| r.meta.track == track)
            .cloned()
            .collect()
    }

    /// Complete run with the shortest lap on `track`
    pub fn fastest(&self, track: &str) -> Option<Arc<Run>> {
        self.runs_read()
            .iter()
            .filter(|r| r.meta.track == track && r.is_complete())
            .filter_map(|r| r.lap_time().map(|t| (t, r)))
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, r)| Arc::clone(r))
    }

    pub fn find(&self, name: &str) -> Option<Arc<Run>> {
        self.runs_read().iter().find(|r| r.meta.name == name).cloned()
    }

    pub fn add(&self, run: Run) -> Arc<Run> {
        let run = Arc::new(run);
        self.runs_write().push(Arc::clone(&run));
        run
    }

    /// Remove every run with this name; returns how many were dropped.
    pub fn remove(&self, name: &str) -> usize {
        let mut runs = self.runs_write();
        let before = runs.len();
        runs.retain(|r| r.meta.name != name);
        let removed = before - runs.len();
        if removed > 0 {
            info!("[Library] Removed {}", name);
        }
        removed
    }

    pub fn clear(&self) {
        self.runs_write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghost_core::model::{Node, RunMeta, Vector3};
    use ghost_core::series::NodeSeries;

    fn run(name: &str, track: &str, lap_ms: f64, complete: bool) -> Run {
        let meta = RunMeta {
            name: name.to_string(),
            track: track.to_string(),
            ..Default::default()
        };
        let nodes = vec![
            Node::at(0.0, Vector3::ZERO, Vector3::ZERO),
            Node::at(lap_ms, Vector3::ZERO, Vector3::ZERO),
        ];
        if complete {
            Run::loaded(meta, NodeSeries::from_nodes(nodes).unwrap())
        } else {
            let run = Run::pending(meta);
            run.append(nodes).unwrap();
            run
        }
    }

    #[test]
    fn test_fastest_ignores_incomplete_and_other_tracks() {
        let library = ReplayLibrary::new();
        library.add(run("slow", "Docks", 90_000.0, true));
        library.add(run("fast", "Docks", 80_000.0, true));
        library.add(run("faster but loading", "Docks", 70_000.0, false));
        library.add(run("elsewhere", "Airport", 10_000.0, true));

        assert_eq!(library.fastest("Docks").unwrap().meta.name, "fast");
        assert_eq!(library.runs_for_track("Docks").len(), 3);
        assert!(library.fastest("Nowhere").is_none());
    }

    #[test]
    fn test_remove_drops_ownership() {
        let library = ReplayLibrary::new();
        let weak = Arc::downgrade(&library.add(run("gone", "Docks", 1000.0, true)));
        assert!(library.find("gone").is_some());

        assert_eq!(library.remove("gone"), 1);
        assert!(weak.upgrade().is_none());
        assert_eq!(library.remove("gone"), 0);
    }

    #[test]
    fn test_load_missing_dir_does_not_lock() {
        let library = Arc::new(ReplayLibrary::new());
        assert!(library.load_dir(Path::new("/nonexistent/ghost-replays")).is_err());
        assert!(!library.is_locked());
    }
}
