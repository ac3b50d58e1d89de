//! Host entity trait definition

use crate::model::{RoofState, Vector3};

/// Turn indicator side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Left,
    Right,
}

/// Per-wheel geometry needed to convert ground speed into wheel spin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelGeometry {
    pub tyre_radius: f32,
}

/// Trait for the host-owned vehicle a ghost is replayed on
///
/// The host simulation owns the entity and may delete it at any time;
/// callers check `exists()` before actuating and skip the tick otherwise.
/// Setters are fire-and-forget: the host applies what it can.
pub trait ReplayEntity: Send {
    /// Whether the host still knows this entity
    fn exists(&self) -> bool;

    /// Current simulated world position
    fn position(&self) -> Vector3;

    /// Teleport without physics offsetting
    fn set_position(&mut self, position: Vector3);

    /// Euler rotation in degrees
    fn set_rotation(&mut self, rotation: Vector3);

    /// World velocity in m/s, handed to the host integrator
    fn set_velocity(&mut self, velocity: Vector3);

    // === Lifecycle ===
    fn set_visible(&mut self, visible: bool);

    /// `None` resets the host's default alpha
    fn set_alpha(&mut self, alpha: Option<u8>);

    fn set_collision(&mut self, enabled: bool);

    fn has_collision(&self) -> bool;

    fn set_frozen(&mut self, frozen: bool);

    fn set_engine_on(&mut self, on: bool);

    /// Display name of the vehicle model, shown on the map marker
    fn display_name(&self) -> String;

    /// Host-side map marker; `None` removes it
    fn set_marker(&mut self, label: Option<&str>);

    /// Spawn or remove the driver ped
    fn set_driver(&mut self, present: bool);

    /// Release the entity back to the host
    fn delete(&mut self);

    // === Wheels ===
    fn wheels(&self) -> Vec<WheelGeometry>;

    fn set_wheel_rotation(&mut self, index: usize, radians: f32);

    fn set_wheel_rotation_speed(&mut self, index: usize, radians_per_second: f32);

    fn set_wheel_compression(&mut self, index: usize, compression: f32);

    // === Controls ===
    fn set_steering_angle(&mut self, angle: f32);

    fn set_throttle(&mut self, throttle: f32);

    fn set_brake(&mut self, brake: f32);

    fn set_gear(&mut self, gear: u16);

    fn set_rpm(&mut self, rpm: f32);

    // === Lights & accessories ===
    fn set_brake_lights(&mut self, on: bool);

    fn set_low_beams(&mut self, on: bool);

    fn set_high_beams(&mut self, on: bool);

    fn set_indicator(&mut self, side: Indicator, on: bool);

    fn siren_on(&self) -> bool;

    fn set_siren(&mut self, on: bool);

    /// `None` when the vehicle is not a convertible
    fn roof_state(&self) -> Option<RoofState>;

    fn raise_roof(&mut self, instant: bool);

    fn lower_roof(&mut self, instant: bool);
}
