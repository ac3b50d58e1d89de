//! Type-safe wrappers for physical units
//!
//! The replay engine mixes milliseconds (node timestamps) with seconds
//! (velocities and simulation steps), and wraps wheel rotation in radians.
//! These newtypes keep the conversions in one place.

use std::f32::consts::PI;

/// Milliseconds (node timestamps, replay time)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Millis(pub f64);

impl Millis {
    pub fn to_seconds(self) -> Seconds {
        Seconds(self.0 * 0.001)
    }
}

/// Seconds (durations used for velocity derivation)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Seconds(pub f64);

impl Seconds {
    pub fn to_millis(self) -> Millis {
        Millis(self.0 * 1000.0)
    }
}

/// Radians, as used for wheel rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Radians(pub f32);

impl Radians {
    /// Wrap into [-π, π)
    pub fn wrapped(self) -> Self {
        Self(wrap(self.0, -PI, PI))
    }
}

/// Wrap `value` into the half-open range `[min, max)`.
pub fn wrap(value: f32, min: f32, max: f32) -> f32 {
    let range = max - min;
    if range <= 0.0 || !value.is_finite() {
        return value;
    }
    let wrapped = (value - min).rem_euclid(range) + min;
    // rem_euclid can round up to exactly `range` for tiny negative inputs
    if wrapped >= max {
        min
    } else {
        wrapped
    }
}
