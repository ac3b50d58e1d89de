//! Run recorder
//!
//! Collects nodes from the host at most every `record.delta_millis` and
//! turns them into a complete run when the lap ends.

use ghost_core::config::RecordSettings;
use ghost_core::model::{format_replay_name, Node, RunMeta};
use ghost_core::run::Run;
use ghost_core::series::NodeSeries;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Recorder {
    meta: RunMeta,
    settings: RecordSettings,
    nodes: NodeSeries,
}

impl Recorder {
    pub fn new(meta: RunMeta, settings: &RecordSettings) -> Self {
        Self {
            meta,
            settings: settings.clone(),
            nodes: NodeSeries::new(),
        }
    }

    /// Record a node. Returns false when it was dropped, either because it
    /// is not later than the last node or because it falls inside the
    /// recording interval.
    pub fn record(&mut self, mut node: Node) -> bool {
        if !node.timestamp.is_finite() {
            return false;
        }
        if let Some(last) = self.nodes.last() {
            let delta = node.timestamp - last.timestamp;
            if delta <= 0.0 || delta < self.settings.delta_millis as f64 {
                return false;
            }
        }

        let optional = &self.settings.optional;
        if !optional.lights {
            node.low_beams = None;
            node.high_beams = None;
        }
        if !optional.indicators {
            node.indicator_left = None;
            node.indicator_right = None;
        }
        if !optional.siren {
            node.siren = None;
        }

        match self.nodes.push(node) {
            Ok(()) => true,
            Err(e) => {
                debug!("[Recorder] Dropped node: {}", e);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Close the recording. Runs without a name are named after the track,
    /// vehicle and lap time; a missing timestamp is set to now.
    pub fn finish(mut self, vehicle_name: &str) -> Run {
        let lap_time = self.nodes.last().map(|n| n.timestamp).unwrap_or(0.0);
        if self.meta.name.is_empty() {
            self.meta.name = format_replay_name(lap_time, &self.meta.track, vehicle_name);
        }
        if self.meta.timestamp == 0 {
            self.meta.timestamp = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        }
        info!(
            "[Recorder] Finished {} with {} nodes",
            self.meta.name,
            self.nodes.len()
        );
        Run::loaded(self.meta, self.nodes)
    }
}
