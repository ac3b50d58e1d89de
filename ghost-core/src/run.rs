//! A recorded run: metadata plus its node series
//!
//! Runs are owned by the replay library (`Arc<Run>`). Loaders may publish a
//! run before all of its nodes are parsed; the series is swapped
//! copy-on-write so readers always hold a consistent snapshot, and playback
//! only starts once `is_complete()` reports true.

use crate::model::{Node, RunMeta};
use crate::series::{NodeSeries, SeriesError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug)]
pub struct Run {
    pub meta: RunMeta,
    nodes: RwLock<Arc<NodeSeries>>,
    complete: AtomicBool,
}

impl Run {
    /// An empty run that a loader will fill in.
    pub fn pending(meta: RunMeta) -> Self {
        Self {
            meta,
            nodes: RwLock::new(Arc::new(NodeSeries::new())),
            complete: AtomicBool::new(false),
        }
    }

    /// A fully loaded run.
    pub fn loaded(meta: RunMeta, series: NodeSeries) -> Self {
        Self {
            meta,
            nodes: RwLock::new(Arc::new(series)),
            complete: AtomicBool::new(true),
        }
    }

    /// Append nodes and publish the result.
    ///
    /// The series grows in place unless a reader still holds the current
    /// snapshot, in which case it is copied first.
    pub fn append<I: IntoIterator<Item = Node>>(&self, nodes: I) -> Result<(), SeriesError> {
        let mut guard = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        Arc::make_mut(&mut *guard).extend(nodes)
    }

    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Drop all nodes and mark the run unplayable.
    pub fn unload(&self) {
        self.complete.store(false, Ordering::Release);
        let mut guard = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(NodeSeries::new());
    }

    /// Current node snapshot, regardless of completeness.
    pub fn nodes(&self) -> Arc<NodeSeries> {
        let guard = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    /// Snapshot usable for playback: complete and non-empty.
    pub fn playable(&self) -> Option<Arc<NodeSeries>> {
        if !self.is_complete() {
            return None;
        }
        let nodes = self.nodes();
        if nodes.is_empty() {
            None
        } else {
            Some(nodes)
        }
    }

    /// Lap duration in milliseconds (last node timestamp)
    pub fn lap_time(&self) -> Option<f64> {
        self.nodes().last().map(|n| n.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Vector3;

    fn node(t: f64) -> Node {
        Node::at(t, Vector3::ZERO, Vector3::ZERO)
    }

    #[test]
    fn test_pending_run_is_not_playable_until_complete() {
        let run = Run::pending(RunMeta::default());
        assert!(run.playable().is_none());

        run.append(vec![node(0.0), node(16.0)]).unwrap();
        assert_eq!(run.nodes().len(), 2);
        assert!(run.playable().is_none());

        run.mark_complete();
        assert_eq!(run.playable().unwrap().len(), 2);
    }

    #[test]
    fn test_snapshot_survives_append() {
        let run = Run::pending(RunMeta::default());
        run.append(vec![node(0.0)]).unwrap();
        let before = run.nodes();
        run.append(vec![node(10.0), node(20.0)]).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(run.nodes().len(), 3);
    }

    #[test]
    fn test_append_without_readers_grows_in_place() {
        let run = Run::pending(RunMeta::default());
        run.append(vec![node(0.0)]).unwrap();
        let published = Arc::as_ptr(&run.nodes());
        for chunk in 1..100 {
            run.append(vec![node(f64::from(chunk) * 10.0)]).unwrap();
        }
        assert_eq!(Arc::as_ptr(&run.nodes()), published);
        assert_eq!(run.nodes().len(), 100);
    }

    #[test]
    fn test_rejected_append_keeps_previous_snapshot() {
        let run = Run::pending(RunMeta::default());
        run.append(vec![node(10.0)]).unwrap();
        assert!(run.append(vec![node(20.0), node(5.0)]).is_err());
        assert_eq!(run.nodes().len(), 1);
    }

    #[test]
    fn test_complete_but_empty_is_not_playable() {
        let run = Run::loaded(RunMeta::default(), NodeSeries::new());
        assert!(run.is_complete());
        assert!(run.playable().is_none());
    }

    #[test]
    fn test_unload() {
        let run = Run::loaded(
            RunMeta::default(),
            NodeSeries::from_nodes(vec![node(0.0), node(1000.0)]).unwrap(),
        );
        assert_eq!(run.lap_time(), Some(1000.0));
        run.unload();
        assert!(run.playable().is_none());
        assert_eq!(run.lap_time(), None);
    }
}
