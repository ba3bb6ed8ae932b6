// Data model shared by the motion pipeline

use serde::{Deserialize, Serialize};

/// Confirmed arm configuration: joint angles in radians, linear axis in mm.
///
/// Only the motion coordinator holds one; it is replaced wholesale after an
/// acknowledged move and never edited in place.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub theta1: f64,
    pub theta2: f64,
    pub theta3: f64,
    pub z: f64,
}

impl Pose {
    pub const fn new(theta1: f64, theta2: f64, theta3: f64, z: f64) -> Self {
        Self {
            theta1,
            theta2,
            theta3,
            z,
        }
    }

    /// Same pose with joints 1 and 2 replaced.
    pub fn with_joints(&self, theta1: f64, theta2: f64) -> Self {
        Self {
            theta1,
            theta2,
            ..*self
        }
    }
}

/// Cartesian goal for a single move. Positions in metres, phi in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Target {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub phi: f64,
}

impl Target {
    pub const fn new(x: f64, y: f64, z: f64, phi: f64) -> Self {
        Self { x, y, z, phi }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GripperState {
    Open,
    #[default]
    Closed,
}

/// One step of a sequence file. Orientation is given in degrees here because
/// that is what operators write by hand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub phi_deg: f64,
    #[serde(default)]
    pub gripper: GripperState,
}

impl Waypoint {
    pub const fn new(x: f64, y: f64, z: f64, phi_deg: f64, gripper: GripperState) -> Self {
        Self {
            x,
            y,
            z,
            phi_deg,
            gripper,
        }
    }

    /// Planar distance to another waypoint, in metres.
    pub fn planar_distance(&self, other: &Waypoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<&Waypoint> for Target {
    fn from(wp: &Waypoint) -> Self {
        Self {
            x: wp.x,
            y: wp.y,
            z: wp.z,
            phi: wp.phi_deg.to_radians(),
        }
    }
}

/// A single stepper axis command: unsigned step count plus the direction bit
/// exactly as it goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisCommand {
    pub steps: u64,
    pub dir: bool,
}

impl AxisCommand {
    /// Split a signed step delta. `inverted` flips the bit for axes wired the
    /// other way round.
    pub fn from_delta(delta: i64, inverted: bool) -> Self {
        Self {
            steps: delta.unsigned_abs(),
            dir: (delta >= 0) != inverted,
        }
    }

    pub fn dir_byte(&self) -> u8 {
        self.dir as u8
    }
}

/// Servo targets in degrees (0-180).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoPositions {
    pub wrist: u16,
    pub gripper: u16,
}

impl ServoPositions {
    pub const MAX_DEGREES: u16 = 180;

    pub fn new(wrist: u16, gripper: u16) -> Self {
        Self {
            wrist: wrist.min(Self::MAX_DEGREES),
            gripper: gripper.min(Self::MAX_DEGREES),
        }
    }
}

/// Everything one move frame carries. Built once per move and handed to the
/// link protocol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorCommand {
    pub joint1: AxisCommand,
    pub joint2: AxisCommand,
    pub linear: AxisCommand,
    pub servos: ServoPositions,
}
