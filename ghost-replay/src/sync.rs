//! Drift correction and entity actuation
//!
//! The synchronizer is the only code that writes per-tick state to the
//! replay entity. Each tick it decides whether to teleport the entity onto
//! the ideal pose or let the host integrate the velocity it is given.

use crate::interpolate::Pose;
use ghost_core::config::{ForceLights, ForceRoof, ReplaySettings, SyncType};
use ghost_core::entity::{Indicator, ReplayEntity};
use ghost_core::model::Vector3;

/// Drift correction policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncPolicy {
    /// Snap once drift exceeds `threshold` meters, otherwise steer with velocity
    Distance { threshold: f32 },
    /// Snap every tick
    Constant,
}

impl SyncPolicy {
    pub fn from_settings(settings: &ReplaySettings) -> Self {
        match settings.sync_type {
            SyncType::Distance => SyncPolicy::Distance {
                threshold: settings.sync_distance,
            },
            SyncType::Constant => SyncPolicy::Constant,
        }
    }

    /// Collision fights the per-tick teleport of the constant policy.
    pub fn allows_collision(&self) -> bool {
        !matches!(self, SyncPolicy::Constant)
    }
}

/// Per-frame facts the decision depends on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameContext {
    /// First frame of a segment (start, scrub, resume, first interval)
    pub fresh: bool,
    pub paused: bool,
}

/// Outcome of one synchronization step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncDecision {
    /// Teleport the entity onto the ideal position
    pub snap: bool,
    /// Velocity handed to the host integrator
    pub velocity: Vector3,
    /// Distance between the ideal and actual position before correction
    pub drift: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Synchronizer {
    pub policy: SyncPolicy,
    pub compensation: f32,
    pub zero_velocity_on_pause: bool,
    pub force_lights: ForceLights,
    pub force_roof: ForceRoof,
}

impl Synchronizer {
    pub fn from_settings(settings: &ReplaySettings) -> Self {
        Self {
            policy: SyncPolicy::from_settings(settings),
            compensation: settings.sync_compensation,
            zero_velocity_on_pause: settings.zero_velocity_on_pause,
            force_lights: settings.force_lights,
            force_roof: settings.force_roof,
        }
    }

    /// Decide position and velocity handling for an entity at `actual`.
    pub fn decide(&self, pose: &Pose, actual: Vector3, frame: FrameContext) -> SyncDecision {
        let drift = if actual.is_finite() {
            pose.position.distance(&actual)
        } else {
            f32::INFINITY
        };

        let snap = frame.fresh
            || frame.paused
            || match self.policy {
                SyncPolicy::Distance { threshold } => drift > threshold,
                SyncPolicy::Constant => true,
            };

        let velocity = if frame.paused && self.zero_velocity_on_pause {
            Vector3::ZERO
        } else if self.policy != SyncPolicy::Constant && actual.is_finite() {
            pose.velocity + (pose.position - actual) * self.compensation
        } else {
            pose.velocity
        };

        SyncDecision {
            snap,
            velocity,
            drift,
        }
    }

    /// Actuate `entity` towards `pose`. The caller checks `exists()` first.
    pub fn apply<E: ReplayEntity + ?Sized>(
        &self,
        entity: &mut E,
        pose: &Pose,
        frame: FrameContext,
    ) -> SyncDecision {
        let decision = self.decide(pose, entity.position(), frame);

        if decision.snap {
            entity.set_position(pose.position);
        }
        entity.set_rotation(pose.rotation);
        entity.set_velocity(decision.velocity);

        self.apply_wheels(entity, pose);

        entity.set_steering_angle(pose.steering_angle);
        entity.set_throttle(pose.throttle);
        entity.set_brake(pose.brake);
        if let Some(drivetrain) = pose.drivetrain {
            entity.set_gear(drivetrain.gear);
            entity.set_rpm(drivetrain.rpm);
        }

        self.apply_lights(entity, pose);
        self.apply_roof(entity, pose);

        decision
    }

    fn apply_wheels<E: ReplayEntity + ?Sized>(&self, entity: &mut E, pose: &Pose) {
        let wheels = entity.wheels();

        if wheels.len() == pose.wheel_rotations.len() {
            for (idx, (geometry, &rotation)) in wheels.iter().zip(&pose.wheel_rotations).enumerate()
            {
                entity.set_wheel_rotation(idx, rotation);
                if geometry.tyre_radius > 0.0 {
                    entity.set_wheel_rotation_speed(
                        idx,
                        -pose.local_velocity.y / geometry.tyre_radius,
                    );
                }
            }
        }

        if wheels.len() == pose.suspension_compressions.len() {
            for (idx, &compression) in pose.suspension_compressions.iter().enumerate() {
                entity.set_wheel_compression(idx, compression);
            }
        }
    }

    fn apply_lights<E: ReplayEntity + ?Sized>(&self, entity: &mut E, pose: &Pose) {
        let discrete = &pose.discrete;
        entity.set_brake_lights(discrete.brake_lights);

        match self.force_lights {
            ForceLights::ForceOn => {
                entity.set_low_beams(true);
                entity.set_high_beams(false);
            }
            ForceLights::ForceOff => {
                entity.set_low_beams(false);
                entity.set_high_beams(false);
            }
            ForceLights::Default => {
                if let Some(on) = discrete.low_beams {
                    entity.set_low_beams(on);
                }
                if let Some(on) = discrete.high_beams {
                    entity.set_high_beams(on);
                }
            }
        }

        if let Some(on) = discrete.indicator_left {
            entity.set_indicator(Indicator::Left, on);
        }
        if let Some(on) = discrete.indicator_right {
            entity.set_indicator(Indicator::Right, on);
        }

        // Toggling an already running siren restarts its sound
        if let Some(on) = discrete.siren {
            if entity.siren_on() != on {
                entity.set_siren(on);
            }
        }
    }

    fn apply_roof<E: ReplayEntity + ?Sized>(&self, entity: &mut E, pose: &Pose) {
        let Some(current) = entity.roof_state() else {
            return;
        };

        match self.force_roof {
            ForceRoof::ForceUp => {
                if !current.is_up() {
                    entity.raise_roof(true);
                }
            }
            ForceRoof::ForceDown => {
                if current.is_up() {
                    entity.lower_roof(true);
                }
            }
            ForceRoof::Default => match pose.discrete.roof {
                Some(recorded) if recorded.is_up() && !current.is_up() => entity.raise_roof(false),
                Some(recorded) if !recorded.is_up() && current.is_up() => entity.lower_roof(false),
                _ => {}
            },
        }
    }
}
