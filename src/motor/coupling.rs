// Joint-2 coupling compensation
//
// The joint-2 transmission is dragged along by joint 1: moving joint 1 by d1
// turns joint 2 by -d1 * ratio without any motor-2 steps. To land on a desired
// joint-2 angle, motor 2 must be commanded d2_desired + d1 * ratio.

use crate::config::CouplingConfig;
use crate::messages::Pose;

/// Angles as seen by the motors. Joint 2 is in motor space; the others are
/// passed through.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorAngles {
    pub theta1: f64,
    pub theta2: f64,
    pub theta3: f64,
    pub z: f64,
}

/// Start and end of one move in motor space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompensatedMove {
    pub from: MotorAngles,
    pub to: MotorAngles,
}

impl CompensatedMove {
    /// Joint-2 motor travel for this move (radians).
    pub fn joint2_command(&self) -> f64 {
        self.to.theta2 - self.from.theta2
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CouplingCompensator {
    ratio: f64,
}

impl CouplingCompensator {
    pub fn new(ratio: f64) -> Self {
        Self { ratio }
    }

    pub fn from_config(config: &CouplingConfig) -> Self {
        Self::new(config.ratio)
    }

    /// Joint-2 rotation induced by moving joint 1 by `delta_theta1`.
    pub fn coupling_term(&self, delta_theta1: f64) -> f64 {
        delta_theta1 * self.ratio
    }

    /// Motor-2 travel needed to reach (theta1, theta2) from `current`.
    pub fn command_delta(&self, theta1: f64, theta2: f64, current: &Pose) -> f64 {
        (theta2 - current.theta2) + self.coupling_term(theta1 - current.theta1)
    }

    /// Map a pose into motor space. The difference of two mapped poses equals
    /// `command_delta` between them, so absolute step conversion stays exact.
    pub fn motor_angles(&self, pose: &Pose) -> MotorAngles {
        MotorAngles {
            theta1: pose.theta1,
            theta2: pose.theta2 + self.coupling_term(pose.theta1),
            theta3: pose.theta3,
            z: pose.z,
        }
    }

    pub fn compensate(&self, target: &Pose, current: &Pose) -> CompensatedMove {
        CompensatedMove {
            from: self.motor_angles(current),
            to: self.motor_angles(target),
        }
    }
}
