//! Pose interpolation between two bracketing nodes
//!
//! Continuous channels are blended linearly; rotations take the shorter arc.
//! Discrete channels (lights, indicators, siren, roof, gear) step: they come
//! from `prev` while the blend is below 1 and from `next` once it reaches 1.

use ghost_core::model::{Node, RoofState, Vector3};
use ghost_core::units::{wrap, Millis};
use std::f32::consts::PI;

/// Brake input above which the brake lights are lit
pub const BRAKE_LIGHT_THRESHOLD: f32 = 0.1;

/// Sparse on/off channels; `None` leaves the sub-system untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscreteChannels {
    pub low_beams: Option<bool>,
    pub high_beams: Option<bool>,
    pub indicator_left: Option<bool>,
    pub indicator_right: Option<bool>,
    pub siren: Option<bool>,
    pub roof: Option<RoofState>,
    pub brake_lights: bool,
}

impl DiscreteChannels {
    fn from_node(node: &Node) -> Self {
        Self {
            low_beams: node.low_beams,
            high_beams: node.high_beams,
            indicator_left: node.indicator_left,
            indicator_right: node.indicator_right,
            siren: node.siren,
            roof: node.roof,
            brake_lights: node.brake > BRAKE_LIGHT_THRESHOLD,
        }
    }
}

/// Gear and engine speed, present only when both were recorded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drivetrain {
    pub gear: u16,
    pub rpm: f32,
}

/// Ideal vehicle state at a replay time
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    /// Replay time this pose was sampled at (ms)
    pub timestamp: f64,
    /// Blend factor between the bracketing nodes, in [0, 1]
    pub progress: f32,
    pub position: Vector3,
    /// Euler degrees
    pub rotation: Vector3,
    /// World velocity (m/s) derived from the bracket
    pub velocity: Vector3,
    /// Velocity in the vehicle frame (X right, Y forward, Z up)
    pub local_velocity: Vector3,
    pub wheel_rotations: Vec<f32>,
    pub suspension_compressions: Vec<f32>,
    pub steering_angle: f32,
    pub throttle: f32,
    pub brake: f32,
    pub drivetrain: Option<Drivetrain>,
    pub discrete: DiscreteChannels,
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Lerp along the shorter arc of a circular range, result wrapped into `[min, max)`
///
/// Endpoints are returned as recorded.
pub fn lerp_wrapped(a: f32, b: f32, t: f32, min: f32, max: f32) -> f32 {
    if t <= 0.0 {
        return a;
    }
    if t >= 1.0 {
        return b;
    }
    let half = (max - min) * 0.5;
    let diff = wrap(b - a, -half, half);
    wrap(a + diff * t, min, max)
}

fn lerp_rotation(a: &Vector3, b: &Vector3, t: f32) -> Vector3 {
    Vector3::new(
        lerp_wrapped(a.x, b.x, t, -180.0, 180.0),
        lerp_wrapped(a.y, b.y, t, -180.0, 180.0),
        lerp_wrapped(a.z, b.z, t, -180.0, 180.0),
    )
}

/// Per-wheel blend; mismatched lengths fall back to the discrete source
fn lerp_channel(a: &[f32], b: &[f32], t: f32, wrapped: bool, source: &[f32]) -> Vec<f32> {
    if a.len() != b.len() {
        return source.to_vec();
    }
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            if wrapped {
                lerp_wrapped(x, y, t, -PI, PI)
            } else {
                lerp(x, y, t)
            }
        })
        .collect()
}

/// Blend factor for `t` within `[prev.timestamp, next.timestamp]`
///
/// Zero-width intervals yield 0.
pub fn progress(prev: &Node, next: &Node, t: f64) -> f32 {
    let span = next.timestamp - prev.timestamp;
    if span.is_nan() || span <= 0.0 || !t.is_finite() {
        return 0.0;
    }
    ((t - prev.timestamp) / span).clamp(0.0, 1.0) as f32
}

/// Rotate a world-space vector into the frame of an Euler rotation (degrees)
///
/// The rotation is composed as `Rz(heading) * Rx(pitch) * Ry(roll)`; the
/// transpose maps world into vehicle-local space.
pub fn world_to_local(world: Vector3, rotation: &Vector3) -> Vector3 {
    let (sp, cp) = rotation.x.to_radians().sin_cos();
    let (sr, cr) = rotation.y.to_radians().sin_cos();
    let (sh, ch) = rotation.z.to_radians().sin_cos();

    // Undo heading
    let x1 = ch * world.x + sh * world.y;
    let y1 = -sh * world.x + ch * world.y;
    let z1 = world.z;

    // Undo pitch
    let y2 = cp * y1 + sp * z1;
    let z2 = -sp * y1 + cp * z1;

    // Undo roll
    Vector3::new(cr * x1 - sr * z2, y2, sr * x1 + cr * z2)
}

/// Sample the ideal pose at replay time `t` between `prev` and `next`.
pub fn sample(prev: &Node, next: &Node, t: f64) -> Pose {
    let progress = progress(prev, next, t);
    let source = if progress < 1.0 { prev } else { next };

    let dt = Millis(next.timestamp - prev.timestamp).to_seconds().0 as f32;
    let (velocity, local_velocity) = if dt > 0.0 {
        let delta = next.position - prev.position;
        (
            delta * (1.0 / dt),
            world_to_local(delta, &prev.rotation) * (1.0 / dt),
        )
    } else {
        (Vector3::ZERO, Vector3::ZERO)
    };

    let drivetrain = if source.has_drivetrain() {
        let rpm = if prev.has_drivetrain() && next.has_drivetrain() {
            lerp(prev.rpm, next.rpm, progress)
        } else {
            source.rpm
        };
        u16::try_from(source.gear)
            .ok()
            .map(|gear| Drivetrain { gear, rpm })
    } else {
        None
    };

    Pose {
        timestamp: t,
        progress,
        position: prev.position.lerp(&next.position, progress),
        rotation: lerp_rotation(&prev.rotation, &next.rotation, progress),
        velocity,
        local_velocity,
        wheel_rotations: lerp_channel(
            &prev.wheel_rotations,
            &next.wheel_rotations,
            progress,
            true,
            &source.wheel_rotations,
        ),
        suspension_compressions: lerp_channel(
            &prev.suspension_compressions,
            &next.suspension_compressions,
            progress,
            false,
            &source.suspension_compressions,
        ),
        steering_angle: lerp(prev.steering_angle, next.steering_angle, progress),
        throttle: lerp(prev.throttle, next.throttle, progress),
        brake: lerp(prev.brake, next.brake, progress),
        drivetrain,
        discrete: DiscreteChannels::from_node(source),
    }
}
