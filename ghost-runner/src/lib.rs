//! Ghost Replay Runner Library
//!
//! Exposes the runner components for integration testing.

pub mod manager;
pub mod state;
