//! Track definitions and start/finish gate crossing
//!
//! A gate is a line segment on the ground. A vehicle passes it when the
//! segment between its positions on two consecutive ticks intersects the
//! gate in the horizontal plane, at roughly the gate's height.

use crate::model::Vector3;
use serde::{Deserialize, Serialize};

/// Maximum vertical distance between the vehicle and the gate at the crossing point
pub const GATE_HEIGHT_TOLERANCE: f32 = 10.0;

fn default_description() -> String {
    "None".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LineDef {
    #[serde(rename = "A")]
    pub a: Vector3,
    #[serde(rename = "B")]
    pub b: Vector3,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Description", default = "default_description")]
    pub description: String,

    #[serde(rename = "StartLine")]
    pub start_line: LineDef,

    #[serde(rename = "FinishLine")]
    pub finish_line: LineDef,
}

impl Track {
    /// Start and finish share one gate (circuit rather than sprint)
    pub fn is_circuit(&self) -> bool {
        self.start_line == self.finish_line
    }

    /// Gate signals for a vehicle that moved from `prev` to `curr` this tick
    pub fn gate_signals(&self, prev: Vector3, curr: Vector3) -> GateSignals {
        GateSignals {
            start_passed: self.start_line.passed(prev, curr),
            finish_passed: self.finish_line.passed(prev, curr),
        }
    }
}

/// Per-tick gate crossing output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateSignals {
    pub start_passed: bool,
    pub finish_passed: bool,
}

fn cross2(o: Vector3, a: Vector3, b: Vector3) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

impl LineDef {
    pub fn new(a: Vector3, b: Vector3) -> Self {
        Self { a, b }
    }

    /// Whether the movement `prev -> curr` crosses this gate
    pub fn passed(&self, prev: Vector3, curr: Vector3) -> bool {
        let d1 = cross2(self.a, self.b, prev);
        let d2 = cross2(self.a, self.b, curr);
        let d3 = cross2(prev, curr, self.a);
        let d4 = cross2(prev, curr, self.b);

        // Strictly opposite sides of the gate, touching on one end counts once
        let straddles_gate = (d1 < 0.0 && d2 >= 0.0) || (d1 > 0.0 && d2 <= 0.0);
        let straddles_path = (d3 <= 0.0 && d4 >= 0.0) || (d3 >= 0.0 && d4 <= 0.0);
        if !straddles_gate || !straddles_path {
            return false;
        }

        // Parameter along the movement where it meets the gate line
        let t = d1 / (d1 - d2);
        let at_vehicle = prev.lerp(&curr, t);

        let gate = self.b - self.a;
        let gate_len2 = gate.x * gate.x + gate.y * gate.y;
        let s = if gate_len2 > 0.0 {
            (((at_vehicle.x - self.a.x) * gate.x + (at_vehicle.y - self.a.y) * gate.y) / gate_len2)
                .clamp(0.0, 1.0)
        } else {
            0.0
        };
        let at_gate = self.a.lerp(&self.b, s);

        (at_vehicle.z - at_gate.z).abs() <= GATE_HEIGHT_TOLERANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> LineDef {
        LineDef::new(Vector3::new(0.0, -5.0, 0.0), Vector3::new(0.0, 5.0, 0.0))
    }

    #[test]
    fn test_crossing_detected() {
        let g = gate();
        assert!(g.passed(Vector3::new(-1.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)));
        assert!(g.passed(Vector3::new(1.0, 2.0, 0.0), Vector3::new(-1.0, 2.0, 0.0)));
    }

    #[test]
    fn test_no_crossing_beside_gate() {
        let g = gate();
        assert!(!g.passed(Vector3::new(-1.0, 8.0, 0.0), Vector3::new(1.0, 8.0, 0.0)));
        assert!(!g.passed(Vector3::new(-3.0, 0.0, 0.0), Vector3::new(-1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_landing_on_gate_counts_once() {
        let g = gate();
        let on = Vector3::new(0.0, 0.0, 0.0);
        assert!(g.passed(Vector3::new(-1.0, 0.0, 0.0), on));
        assert!(!g.passed(on, Vector3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_crossing_far_above_gate_ignored() {
        let g = gate();
        assert!(!g.passed(Vector3::new(-1.0, 0.0, 50.0), Vector3::new(1.0, 0.0, 50.0)));
    }

    #[test]
    fn test_track_json_and_signals() {
        let json = r#"{
            "Name": "Docks",
            "StartLine": {"A": {"X": 0, "Y": -5, "Z": 0}, "B": {"X": 0, "Y": 5, "Z": 0}},
            "FinishLine": {"A": {"X": 0, "Y": -5, "Z": 0}, "B": {"X": 0, "Y": 5, "Z": 0}}
        }"#;
        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.description, "None");
        assert!(track.is_circuit());

        let signals = track.gate_signals(Vector3::new(-1.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(signals.start_passed);
        assert!(signals.finish_passed);
    }
}
