//! Ghost playback engine
//!
//! Interpolates recorded runs, keeps a host vehicle on the recorded line and
//! manages the files and library the runs come from.

pub mod codec;
pub mod cursor;
pub mod interpolate;
pub mod library;
pub mod recorder;
pub mod sim;
pub mod sync;
pub mod vehicle;

use std::sync::atomic::{AtomicBool, Ordering};

pub use cursor::PlaybackState;
pub use interpolate::Pose;
pub use library::ReplayLibrary;
pub use recorder::Recorder;
pub use sim::SimEntity;
pub use sync::{SyncPolicy, Synchronizer};
pub use vehicle::ReplayVehicle;

static UNLOADING: AtomicBool = AtomicBool::new(false);

/// Mark the host as shutting down. Ghosts dropped while this is set leave
/// their entities alone.
pub fn set_unloading(unloading: bool) {
    UNLOADING.store(unloading, Ordering::SeqCst);
}

pub fn is_unloading() -> bool {
    UNLOADING.load(Ordering::SeqCst)
}
