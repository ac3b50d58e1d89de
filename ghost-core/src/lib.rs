//! Ghost Replay Core Library
//!
//! This crate provides the recorded node model, the time-indexed node series
//! with its bracket search, settings, track gates and the host entity trait
//! that the playback engine actuates.

pub mod config;
pub mod entity;
pub mod model;
pub mod run;
pub mod series;
pub mod track;
pub mod units;

pub use config::Settings;
pub use entity::ReplayEntity;
pub use model::{Node, RunMeta, Vector3};
pub use run::Run;
pub use series::{Lookup, NodeSeries};
