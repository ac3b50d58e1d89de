//! Recorded vehicle state model
//!
//! Defines the `Node` sample that the recorder captures and the playback
//! engine interpolates, plus the metadata stored alongside a run.
//! Uses `Option<T>` for channels that older recordings do not carry.
//!
//! Serialized field names follow the replay file format (`T`, `Pos`, `Rot`, ...).
//!
//! Coordinate system: world space, Z up.
//! - Rotation is Euler degrees: X = pitch, Y = roll, Z = heading
//! - Vehicle-local frame: X = right, Y = forward, Z = up

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// 3D vector in world or vehicle-local space
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    #[serde(rename = "X")]
    pub x: f32,
    #[serde(rename = "Y")]
    pub y: f32,
    #[serde(rename = "Z")]
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(&self, other: &Vector3) -> f32 {
        (*self - *other).length()
    }

    pub fn lerp(&self, other: &Vector3, t: f32) -> Vector3 {
        *self + (*other - *self) * t
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vector3 {
    type Output = Vector3;

    fn mul(self, rhs: f32) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;

    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

/// Convertible roof state as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum RoofState {
    Raised,
    Lowering,
    Lowered,
    Raising,
}

impl RoofState {
    /// Whether the roof is up or on its way up
    pub fn is_up(&self) -> bool {
        matches!(self, RoofState::Raised | RoofState::Raising)
    }
}

impl TryFrom<i32> for RoofState {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RoofState::Raised),
            1 => Ok(RoofState::Lowering),
            2 => Ok(RoofState::Lowered),
            3 => Ok(RoofState::Raising),
            other => Err(format!("Unknown roof state: {}", other)),
        }
    }
}

impl From<RoofState> for i32 {
    fn from(state: RoofState) -> i32 {
        match state {
            RoofState::Raised => 0,
            RoofState::Lowering => 1,
            RoofState::Lowered => 2,
            RoofState::Raising => 3,
        }
    }
}

fn unknown_gear() -> i32 {
    -1
}

fn unknown_rpm() -> f32 {
    -1.0
}

/// One captured vehicle-state sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Milliseconds since recording start
    #[serde(rename = "T")]
    pub timestamp: f64,

    /// World position (meters)
    #[serde(rename = "Pos")]
    pub position: Vector3,

    /// Euler rotation (degrees)
    #[serde(rename = "Rot")]
    pub rotation: Vector3,

    /// Per-wheel rotation (radians)
    #[serde(rename = "WheelRotations", default)]
    pub wheel_rotations: Vec<f32>,

    #[serde(rename = "SuspensionCompressions", default)]
    pub suspension_compressions: Vec<f32>,

    #[serde(rename = "Steering", default)]
    pub steering_angle: f32,

    #[serde(rename = "Throttle", default)]
    pub throttle: f32,

    #[serde(rename = "Brake", default)]
    pub brake: f32,

    /// -1 = not recorded
    #[serde(rename = "Gear", default = "unknown_gear")]
    pub gear: i32,

    /// Negative = not recorded
    #[serde(rename = "RPM", default = "unknown_rpm")]
    pub rpm: f32,

    // === Sparse channels, absent in older recordings ===
    #[serde(rename = "LowBeams", default, skip_serializing_if = "Option::is_none")]
    pub low_beams: Option<bool>,

    #[serde(rename = "HighBeams", default, skip_serializing_if = "Option::is_none")]
    pub high_beams: Option<bool>,

    #[serde(rename = "IndicatorLeft", default, skip_serializing_if = "Option::is_none")]
    pub indicator_left: Option<bool>,

    #[serde(rename = "IndicatorRight", default, skip_serializing_if = "Option::is_none")]
    pub indicator_right: Option<bool>,

    #[serde(rename = "Siren", default, skip_serializing_if = "Option::is_none")]
    pub siren: Option<bool>,

    #[serde(rename = "Roof", default, skip_serializing_if = "Option::is_none")]
    pub roof: Option<RoofState>,
}

impl Node {
    /// A node with only time and placement; every other channel is unknown.
    pub fn at(timestamp: f64, position: Vector3, rotation: Vector3) -> Self {
        Self {
            timestamp,
            position,
            rotation,
            wheel_rotations: Vec::new(),
            suspension_compressions: Vec::new(),
            steering_angle: 0.0,
            throttle: 0.0,
            brake: 0.0,
            gear: unknown_gear(),
            rpm: unknown_rpm(),
            low_beams: None,
            high_beams: None,
            indicator_left: None,
            indicator_right: None,
            siren: None,
            roof: None,
        }
    }

    /// Gear and RPM are only applied together, and only when both were recorded.
    pub fn has_drivetrain(&self) -> bool {
        self.gear >= 0 && self.rpm > 0.0
    }
}

/// Driver ped appearance captured with the run
///
/// Only the model and ped type are interpreted here; the remaining
/// appearance data is carried through untouched for the host to apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverAppearance {
    #[serde(rename = "Model", default)]
    pub model: u32,

    #[serde(rename = "Type", default)]
    pub ped_type: i32,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Run metadata, needed once when the ghost entity is spawned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    /// Unix time of the recording in milliseconds
    #[serde(rename = "Timestamp", default)]
    pub timestamp: u64,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Track")]
    pub track: String,

    /// Model hash of the recorded vehicle
    #[serde(rename = "VehicleModel")]
    pub vehicle_model: u32,

    /// Vehicle mods, applied by the host at spawn time
    #[serde(rename = "Mods", default)]
    pub mods: serde_json::Value,

    #[serde(rename = "Driver", default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverAppearance>,
}

impl RunMeta {
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

/// Format a millisecond duration as `m:ss.mmm`
pub fn format_millis_time(total_ms: f64) -> String {
    let total = if total_ms.is_finite() && total_ms > 0.0 {
        total_ms as u64
    } else {
        0
    };
    let millis = total % 1000;
    let seconds = (total / 1000) % 60;
    let minutes = (total / 1000) / 60;
    format!("{}:{:02}.{:03}", minutes, seconds, millis)
}

/// Default display name of a freshly recorded run
pub fn format_replay_name(total_ms: f64, track: &str, vehicle: &str) -> String {
    format!("{} - {} - {}", track, vehicle, format_millis_time(total_ms))
}

/// Jenkins one-at-a-time hash, as used by the host for model names
pub fn joaat(name: &str) -> u32 {
    let mut hash: u32 = 0;
    for byte in name.bytes() {
        hash = hash.wrapping_add(byte.to_ascii_lowercase() as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash.wrapping_add(hash << 15)
}
