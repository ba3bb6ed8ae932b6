// Planar inverse kinematics for the two-link SCARA arm
// Converts a Cartesian target (x, y) into the two joint-angle pairs that reach it.

use crate::config::ArmGeometry;

/// Reach tolerance for targets sitting exactly on the workspace boundary.
pub const REACH_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KinematicsError {
    #[error("target unreachable: r = {reach:.4} m outside [{min:.4}, {max:.4}]")]
    UnreachableTarget { reach: f64, min: f64, max: f64 },
}

/// Joint angles (radians) for joints 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IkSolution {
    pub theta1: f64,
    pub theta2: f64,
}

impl IkSolution {
    pub const fn new(theta1: f64, theta2: f64) -> Self {
        Self { theta1, theta2 }
    }
}

/// Both configurations reaching a target. They coincide when the arm is fully
/// extended or fully folded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkSolutions {
    /// Positive-sine elbow. Listed first and preferred on ties.
    pub elbow_down: IkSolution,
    pub elbow_up: IkSolution,
}

impl IkSolutions {
    pub fn as_array(&self) -> [IkSolution; 2] {
        [self.elbow_down, self.elbow_up]
    }
}

/// Solve (x, y) for the reference geometry.
pub fn ik_solve(x: f64, y: f64, geometry: &ArmGeometry) -> Result<IkSolutions, KinematicsError> {
    ik_solve_with_links(x, y, geometry.link1, geometry.link2)
}

/// Solve (x, y) for arbitrary link lengths.
pub fn ik_solve_with_links(
    x: f64,
    y: f64,
    l1: f64,
    l2: f64,
) -> Result<IkSolutions, KinematicsError> {
    let r2 = x * x + y * y;
    let r = r2.sqrt();

    let max = l1 + l2;
    let min = (l1 - l2).abs();
    if r > max + REACH_EPSILON || r < min - REACH_EPSILON {
        return Err(KinematicsError::UnreachableTarget { reach: r, min, max });
    }

    // Law of cosines, clamped against drift at the boundary
    let cos_theta2 = ((r2 - l1 * l1 - l2 * l2) / (2.0 * l1 * l2)).clamp(-1.0, 1.0);
    let sin_theta2 = (1.0 - cos_theta2 * cos_theta2).max(0.0).sqrt();

    let solve = |sin: f64| {
        let theta2 = sin.atan2(cos_theta2);
        let k1 = l1 + l2 * theta2.cos();
        let k2 = l2 * theta2.sin();
        IkSolution::new(y.atan2(x) - k2.atan2(k1), theta2)
    };

    Ok(IkSolutions {
        elbow_down: solve(sin_theta2),
        elbow_up: solve(-sin_theta2),
    })
}

/// End-effector position for the given joint angles.
pub fn forward_kinematics(theta1: f64, theta2: f64, geometry: &ArmGeometry) -> (f64, f64) {
    let (l1, l2) = (geometry.link1, geometry.link2);
    (
        l1 * theta1.cos() + l2 * (theta1 + theta2).cos(),
        l1 * theta1.sin() + l2 * (theta1 + theta2).sin(),
    )
}

/// Wrist angle that yields the absolute orientation `phi`.
pub fn wrist_angle(theta1: f64, theta2: f64, phi: f64) -> f64 {
    phi - (theta1 + theta2)
}
