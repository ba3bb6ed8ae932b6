// Joint angles -> stepper step counts
//
// Revolute axes are converted as absolute positions and then subtracted, so
// rounding never accumulates across moves. The linear axis is converted from
// its delta directly.

use std::f64::consts::TAU;

use super::coupling::{CompensatedMove, MotorAngles};
use crate::config::{ArmConfig, AxisConfig, LinearAxisConfig};
use crate::messages::{AxisCommand, MotorCommand, ServoPositions};

/// Absolute step positions of the two arm steppers (home offset and sign
/// already applied). The wrist is a servo and has no step position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbsoluteSteps {
    pub joint1: i64,
    pub joint2: i64,
}

/// Signed step deltas for the three stepper axes of one move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelativeSteps {
    pub joint1: i64,
    pub joint2: i64,
    pub linear: i64,
}

/// `round(angle / 2pi * steps_per_output_rev) * sign + home_offset`
pub fn angle_to_steps(axis: &AxisConfig, angle: f64) -> i64 {
    let raw = (angle / TAU * axis.steps_per_output_revolution()).round() as i64;
    raw * axis.step_sign as i64 + axis.home_offset
}

/// Inverse of [`angle_to_steps`], exact up to one step of resolution.
pub fn steps_to_angle(axis: &AxisConfig, steps: i64) -> f64 {
    let raw = (steps - axis.home_offset) * axis.step_sign as i64;
    raw as f64 * TAU / axis.steps_per_output_revolution()
}

/// Angular size of one step on this axis (radians).
pub fn step_resolution(axis: &AxisConfig) -> f64 {
    TAU / axis.steps_per_output_revolution()
}

pub fn linear_steps(linear: &LinearAxisConfig, delta_z: f64) -> i64 {
    (delta_z / linear.lead * linear.steps_per_revolution as f64).round() as i64
}

#[derive(Debug, Clone)]
pub struct StepConverter {
    joint1: AxisConfig,
    joint2: AxisConfig,
    linear: LinearAxisConfig,
}

impl StepConverter {
    pub fn new(joint1: AxisConfig, joint2: AxisConfig, linear: LinearAxisConfig) -> Self {
        Self {
            joint1,
            joint2,
            linear,
        }
    }

    pub fn from_config(config: &ArmConfig) -> Self {
        Self::new(
            config.joint1.clone(),
            config.joint2.clone(),
            config.linear.clone(),
        )
    }

    pub fn absolute(&self, angles: &MotorAngles) -> AbsoluteSteps {
        AbsoluteSteps {
            joint1: angle_to_steps(&self.joint1, angles.theta1),
            joint2: angle_to_steps(&self.joint2, angles.theta2),
        }
    }

    pub fn relative(&self, from: &MotorAngles, to: &MotorAngles) -> RelativeSteps {
        let start = self.absolute(from);
        let end = self.absolute(to);
        RelativeSteps {
            joint1: end.joint1 - start.joint1,
            joint2: end.joint2 - start.joint2,
            linear: linear_steps(&self.linear, to.z - from.z),
        }
    }

    pub fn relative_move(&self, mv: &CompensatedMove) -> RelativeSteps {
        self.relative(&mv.from, &mv.to)
    }

    /// Split signed deltas into step counts and per-axis direction bits.
    pub fn command(&self, steps: &RelativeSteps, servos: ServoPositions) -> MotorCommand {
        MotorCommand {
            joint1: AxisCommand::from_delta(steps.joint1, self.joint1.invert_direction),
            joint2: AxisCommand::from_delta(steps.joint2, self.joint2.invert_direction),
            linear: AxisCommand::from_delta(steps.linear, self.linear.invert_direction),
            servos,
        }
    }
}
