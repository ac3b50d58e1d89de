//! Simulated host vehicle
//!
//! A stand-in for the game's vehicle entity that records everything the
//! playback engine writes and integrates velocity like a (very) simple
//! physics step. Optional drift and drag make the integrated position
//! wander off the recorded line so synchronization has something to correct.

use ghost_core::entity::{Indicator, ReplayEntity, WheelGeometry};
use ghost_core::model::{Node, RoofState, Vector3};
use ghost_core::units::{Radians, Seconds};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Typical passenger car tyre radius (m)
pub const DEFAULT_TYRE_RADIUS: f32 = 0.33;

#[derive(Debug, Clone)]
pub struct SimEntity {
    pub exists: bool,
    pub deleted: bool,
    deletion_probe: Option<Arc<AtomicBool>>,

    // === Physics ===
    pub position: Vector3,
    pub rotation: Vector3,
    pub velocity: Vector3,
    /// Constant velocity error added by the integrator (m/s)
    pub drift: Vector3,
    /// Fraction of velocity lost per second
    pub drag: f32,

    // === Lifecycle ===
    pub visible: bool,
    pub alpha: Option<u8>,
    pub collision: bool,
    pub frozen: bool,
    pub engine_on: bool,
    pub display_name: String,
    pub marker: Option<String>,
    pub driver: bool,

    // === Wheels ===
    pub wheels: Vec<WheelGeometry>,
    pub wheel_rotations: Vec<f32>,
    pub wheel_speeds: Vec<f32>,
    pub wheel_compressions: Vec<f32>,

    // === Controls ===
    pub steering: f32,
    pub throttle: f32,
    pub brake: f32,
    pub gear: u16,
    pub rpm: f32,

    // === Lights & accessories ===
    pub brake_lights: bool,
    pub low_beams: bool,
    pub high_beams: bool,
    pub indicator_left: bool,
    pub indicator_right: bool,
    pub siren: bool,
    pub roof: Option<RoofState>,

    // === Counters ===
    pub teleports: usize,
    pub siren_toggles: usize,
}

impl SimEntity {
    /// A four-wheeled hardtop at the origin
    pub fn new() -> Self {
        Self::with_wheels(4, DEFAULT_TYRE_RADIUS)
    }

    pub fn with_wheels(count: usize, tyre_radius: f32) -> Self {
        Self {
            exists: true,
            deleted: false,
            deletion_probe: None,
            position: Vector3::ZERO,
            rotation: Vector3::ZERO,
            velocity: Vector3::ZERO,
            drift: Vector3::ZERO,
            drag: 0.0,
            visible: true,
            alpha: None,
            collision: true,
            frozen: false,
            engine_on: false,
            display_name: "Elegy".to_string(),
            marker: None,
            driver: false,
            wheels: vec![WheelGeometry { tyre_radius }; count],
            wheel_rotations: vec![0.0; count],
            wheel_speeds: vec![0.0; count],
            wheel_compressions: vec![0.0; count],
            steering: 0.0,
            throttle: 0.0,
            brake: 0.0,
            gear: 0,
            rpm: 0.0,
            brake_lights: false,
            low_beams: false,
            high_beams: false,
            indicator_left: false,
            indicator_right: false,
            siren: false,
            roof: None,
            teleports: 0,
            siren_toggles: 0,
        }
    }

    /// Make this a convertible with the given roof state
    pub fn convertible(mut self, roof: RoofState) -> Self {
        self.roof = Some(roof);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_drift(mut self, drift: Vector3, drag: f32) -> Self {
        self.drift = drift;
        self.drag = drag;
        self
    }

    /// Flag raised when the entity is deleted, readable after the entity
    /// itself has been moved away
    pub fn deletion_probe(&mut self) -> Arc<AtomicBool> {
        let probe = Arc::new(AtomicBool::new(self.deleted));
        self.deletion_probe = Some(Arc::clone(&probe));
        probe
    }

    /// Advance the simulation by `dt`
    pub fn step(&mut self, dt: Seconds) {
        if !self.exists || self.frozen {
            return;
        }
        let dt = dt.0 as f32;

        self.position = self.position + (self.velocity + self.drift) * dt;
        self.velocity = self.velocity * (1.0 - self.drag * dt).max(0.0);

        for (rotation, speed) in self.wheel_rotations.iter_mut().zip(&self.wheel_speeds) {
            *rotation = Radians(*rotation + speed * dt).wrapped().0;
        }

        // Roof animations complete within one step
        self.roof = self.roof.map(|state| match state {
            RoofState::Lowering => RoofState::Lowered,
            RoofState::Raising => RoofState::Raised,
            settled => settled,
        });
    }

    /// Capture the current state as a recording node
    pub fn snapshot(&self, timestamp: f64) -> Node {
        let mut node = Node::at(timestamp, self.position, self.rotation);
        node.wheel_rotations = self.wheel_rotations.clone();
        node.suspension_compressions = self.wheel_compressions.clone();
        node.steering_angle = self.steering;
        node.throttle = self.throttle;
        node.brake = self.brake;
        node.gear = i32::from(self.gear);
        node.rpm = self.rpm;
        node.low_beams = Some(self.low_beams);
        node.high_beams = Some(self.high_beams);
        node.indicator_left = Some(self.indicator_left);
        node.indicator_right = Some(self.indicator_right);
        node.siren = Some(self.siren);
        node.roof = self.roof;
        node
    }
}

impl Default for SimEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayEntity for SimEntity {
    fn exists(&self) -> bool {
        self.exists
    }

    fn position(&self) -> Vector3 {
        self.position
    }

    fn set_position(&mut self, position: Vector3) {
        self.position = position;
        self.teleports += 1;
    }

    fn set_rotation(&mut self, rotation: Vector3) {
        self.rotation = rotation;
    }

    fn set_velocity(&mut self, velocity: Vector3) {
        self.velocity = velocity;
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn set_alpha(&mut self, alpha: Option<u8>) {
        self.alpha = alpha;
    }

    fn set_collision(&mut self, enabled: bool) {
        self.collision = enabled;
    }

    fn has_collision(&self) -> bool {
        self.collision
    }

    fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    fn set_engine_on(&mut self, on: bool) {
        self.engine_on = on;
    }

    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn set_marker(&mut self, label: Option<&str>) {
        self.marker = label.map(str::to_string);
    }

    fn set_driver(&mut self, present: bool) {
        self.driver = present;
    }

    fn delete(&mut self) {
        self.exists = false;
        self.deleted = true;
        if let Some(probe) = &self.deletion_probe {
            probe.store(true, Ordering::SeqCst);
        }
    }

    fn wheels(&self) -> Vec<WheelGeometry> {
        self.wheels.clone()
    }

    fn set_wheel_rotation(&mut self, index: usize, radians: f32) {
        if let Some(r) = self.wheel_rotations.get_mut(index) {
            *r = radians;
        }
    }

    fn set_wheel_rotation_speed(&mut self, index: usize, radians_per_second: f32) {
        if let Some(s) = self.wheel_speeds.get_mut(index) {
            *s = radians_per_second;
        }
    }

    fn set_wheel_compression(&mut self, index: usize, compression: f32) {
        if let Some(c) = self.wheel_compressions.get_mut(index) {
            *c = compression;
        }
    }

    fn set_steering_angle(&mut self, angle: f32) {
        self.steering = angle;
    }

    fn set_throttle(&mut self, throttle: f32) {
        self.throttle = throttle;
    }

    fn set_brake(&mut self, brake: f32) {
        self.brake = brake;
    }

    fn set_gear(&mut self, gear: u16) {
        self.gear = gear;
    }

    fn set_rpm(&mut self, rpm: f32) {
        self.rpm = rpm;
    }

    fn set_brake_lights(&mut self, on: bool) {
        self.brake_lights = on;
    }

    fn set_low_beams(&mut self, on: bool) {
        self.low_beams = on;
    }

    fn set_high_beams(&mut self, on: bool) {
        self.high_beams = on;
    }

    fn set_indicator(&mut self, side: Indicator, on: bool) {
        match side {
            Indicator::Left => self.indicator_left = on,
            Indicator::Right => self.indicator_right = on,
        }
    }

    fn siren_on(&self) -> bool {
        self.siren
    }

    fn set_siren(&mut self, on: bool) {
        if self.siren != on {
            self.siren_toggles += 1;
        }
        self.siren = on;
    }

    fn roof_state(&self) -> Option<RoofState> {
        self.roof
    }

    fn raise_roof(&mut self, instant: bool) {
        if self.roof.is_some() {
            self.roof = Some(if instant {
                RoofState::Raised
            } else {
                RoofState::Raising
            });
        }
    }

    fn lower_roof(&mut self, instant: bool) {
        if self.roof.is_some() {
            self.roof = Some(if instant {
                RoofState::Lowered
            } else {
                RoofState::Lowering
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_integrates_velocity_and_drift() {
        let mut sim = SimEntity::new().with_drift(Vector3::new(0.0, 1.0, 0.0), 0.0);
        sim.velocity = Vector3::new(10.0, 0.0, 0.0);
        sim.step(Seconds(0.5));
        assert_eq!(sim.position, Vector3::new(5.0, 0.5, 0.0));
    }

    #[test]
    fn test_frozen_entity_does_not_move() {
        let mut sim = SimEntity::new();
        sim.velocity = Vector3::new(10.0, 0.0, 0.0);
        sim.set_frozen(true);
        sim.step(Seconds(1.0));
        assert_eq!(sim.position, Vector3::ZERO);
    }

    #[test]
    fn test_drag_bleeds_velocity() {
        let mut sim = SimEntity::new().with_drift(Vector3::ZERO, 0.5);
        sim.velocity = Vector3::new(10.0, 0.0, 0.0);
        sim.step(Seconds(1.0));
        assert_eq!(sim.velocity, Vector3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_roof_animation_settles() {
        let mut sim = SimEntity::new().convertible(RoofState::Raised);
        sim.lower_roof(false);
        assert_eq!(sim.roof, Some(RoofState::Lowering));
        sim.step(Seconds(0.016));
        assert_eq!(sim.roof, Some(RoofState::Lowered));
    }

    #[test]
    fn test_snapshot_captures_channels() {
        let mut sim = SimEntity::new();
        sim.position = Vector3::new(1.0, 2.0, 3.0);
        sim.gear = 4;
        sim.rpm = 0.6;
        sim.siren = true;
        let node = sim.snapshot(120.0);
        assert_eq!(node.timestamp, 120.0);
        assert_eq!(node.position, sim.position);
        assert!(node.has_drivetrain());
        assert_eq!(node.siren, Some(true));
        assert_eq!(node.wheel_rotations.len(), 4);
    }
}
