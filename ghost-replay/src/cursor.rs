//! Playback cursor: position within a node series and the time origin
//!
//! Replay time is `input - origin - offset`. The origin is fixed when a
//! replay starts and recomputed from the displayed node after a resume,
//! scrub or frame step, so playback continues from what is on screen.

use ghost_core::model::Node;
use ghost_core::series::NodeSeries;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone)]
pub struct Cursor {
    series: Arc<NodeSeries>,
    index: usize,
    state: PlaybackState,
    origin: f64,
    offset: f64,
    /// Recompute the origin from the displayed node on the next playing tick
    resync: bool,
    /// First frame of a playback segment; position is always snapped
    fresh: bool,
}

impl Cursor {
    /// `offset_ms` delays replay time relative to the input clock.
    pub fn new(series: Arc<NodeSeries>, offset_ms: f64) -> Self {
        Self {
            series,
            index: 0,
            state: PlaybackState::Idle,
            origin: 0.0,
            offset: if offset_ms.is_finite() { offset_ms } else { 0.0 },
            resync: false,
            fresh: true,
        }
    }

    pub fn series(&self) -> &Arc<NodeSeries> {
        &self.series
    }

    /// Swap in a newer snapshot, keeping the index in range.
    pub fn rebind(&mut self, series: Arc<NodeSeries>) {
        if !Arc::ptr_eq(&self.series, &series) {
            self.series = series;
            self.index = self.index.min(self.series.len().saturating_sub(1));
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn set_state(&mut self, state: PlaybackState) {
        self.state = state;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn node(&self) -> Option<&Node> {
        self.series.get(self.index)
    }

    /// Timestamp of the displayed node, 0 when the series is empty
    pub fn progress(&self) -> f64 {
        self.node().map(|n| n.timestamp).unwrap_or(0.0)
    }

    /// Rewind to the first node and start playing.
    ///
    /// With an input time the origin is fixed immediately, otherwise on the
    /// next playing tick.
    pub fn restart(&mut self, input_time: Option<f64>) {
        self.index = 0;
        self.state = PlaybackState::Playing;
        self.fresh = true;
        match input_time {
            Some(time) => {
                self.origin = time;
                self.resync = false;
            }
            None => self.resync = true,
        }
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.state = PlaybackState::Idle;
        self.resync = false;
        self.fresh = true;
    }

    /// Jump to a node; playback picks up from it on the next tick.
    pub fn seek(&mut self, index: usize) {
        self.index = index.min(self.series.len().saturating_sub(1));
        self.resync = true;
        self.fresh = true;
    }

    /// Follow playback to a new bracket start.
    pub fn advance_to(&mut self, index: usize) {
        self.index = index;
    }

    /// Mark that the displayed node must carry over into playing time.
    pub fn resync(&mut self) {
        self.resync = true;
        self.fresh = true;
    }

    /// Replay time for an input time, applying any pending resync.
    pub fn replay_time(&mut self, input_time: f64) -> f64 {
        if self.resync {
            self.origin = input_time - self.offset - self.progress();
            self.resync = false;
        }
        input_time - self.origin - self.offset
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn clear_fresh(&mut self) {
        self.fresh = false;
    }
}
