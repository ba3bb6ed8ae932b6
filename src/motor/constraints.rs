// Joint-limit and coupling-budget checks, and choice between IK candidates

use tracing::debug;

use super::coupling::CouplingCompensator;
use super::kinematics::{IkSolution, IkSolutions};
use crate::config::{CouplingConfig, JointLimits};
use crate::messages::Pose;

/// Why a single candidate was turned down. Not fatal on its own: the other
/// candidate may still be usable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("joint {joint} angle {angle_deg:.1}° outside absolute limits [{min_deg}, {max_deg}]")]
    JointLimitExceeded {
        joint: u8,
        angle_deg: f64,
        min_deg: f64,
        max_deg: f64,
    },

    #[error("coupling compensation too large: {command_deg:.1}° (max: {tolerance_deg}°)")]
    CouplingCompensationExceeded { command_deg: f64, tolerance_deg: f64 },
}

/// Both candidates rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("no IK solution satisfies the motor constraints (elbow-down: {elbow_down}; elbow-up: {elbow_up})")]
pub struct NoValidSolution {
    pub elbow_down: Rejection,
    pub elbow_up: Rejection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSolution {
    pub solution: IkSolution,
    pub verdict: Result<(), Rejection>,
}

impl ValidatedSolution {
    pub fn is_valid(&self) -> bool {
        self.verdict.is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintValidator {
    limits: JointLimits,
    coupling: CouplingCompensator,
    tolerance_degrees: f64,
}

impl ConstraintValidator {
    pub fn new(limits: JointLimits, coupling: &CouplingConfig) -> Self {
        Self {
            limits,
            coupling: CouplingCompensator::from_config(coupling),
            tolerance_degrees: coupling.tolerance_degrees,
        }
    }

    /// Check one candidate against `current`. Order matters: joint 1 limits,
    /// joint 2 limits, then the coupling budget.
    pub fn check(&self, solution: IkSolution, current: &Pose) -> ValidatedSolution {
        let verdict = self.verdict(solution, current);
        if let Err(reason) = &verdict {
            debug!("Rejected {:?}: {}", solution, reason);
        }
        ValidatedSolution { solution, verdict }
    }

    pub fn check_all(&self, solutions: &IkSolutions, current: &Pose) -> [ValidatedSolution; 2] {
        solutions.as_array().map(|s| self.check(s, current))
    }

    fn verdict(&self, solution: IkSolution, current: &Pose) -> Result<(), Rejection> {
        for (joint, angle, range) in [
            (1, solution.theta1, &self.limits.joint1),
            (2, solution.theta2, &self.limits.joint2),
        ] {
            if !range.contains_radians(angle) {
                return Err(Rejection::JointLimitExceeded {
                    joint,
                    angle_deg: angle.to_degrees(),
                    min_deg: range.min_degrees,
                    max_deg: range.max_degrees,
                });
            }
        }

        let command_deg = self
            .coupling
            .command_delta(solution.theta1, solution.theta2, current)
            .to_degrees();
        if command_deg.abs() > self.tolerance_degrees {
            return Err(Rejection::CouplingCompensationExceeded {
                command_deg,
                tolerance_deg: self.tolerance_degrees,
            });
        }

        Ok(())
    }
}

/// Joint travel from `current`, as |d1| + |d2|.
pub fn joint_distance(solution: &IkSolution, current: &Pose) -> f64 {
    (solution.theta1 - current.theta1).abs() + (solution.theta2 - current.theta2).abs()
}

/// Pick the candidate to execute. With two valid candidates the one needing
/// less joint travel wins, the first one on a tie.
pub fn select_solution(
    candidates: &[ValidatedSolution; 2],
    current: &Pose,
) -> Result<IkSolution, NoValidSolution> {
    let [first, second] = candidates;
    match (&first.verdict, &second.verdict) {
        (Ok(()), Err(_)) => {
            debug!("Selected elbow-down solution (only valid option)");
            Ok(first.solution)
        }
        (Err(_), Ok(())) => {
            debug!("Selected elbow-up solution (only valid option)");
            Ok(second.solution)
        }
        (Ok(()), Ok(())) => {
            let dist_first = joint_distance(&first.solution, current);
            let dist_second = joint_distance(&second.solution, current);
            if dist_first <= dist_second {
                debug!("Selected elbow-down solution ({:.4} <= {:.4} rad)", dist_first, dist_second);
                Ok(first.solution)
            } else {
                debug!("Selected elbow-up solution ({:.4} < {:.4} rad)", dist_second, dist_first);
                Ok(second.solution)
            }
        }
        (Err(a), Err(b)) => Err(NoValidSolution {
            elbow_down: a.clone(),
            elbow_up: b.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AngleRange;

    fn validator() -> ConstraintValidator {
        ConstraintValidator::new(JointLimits::default(), &CouplingConfig::default())
    }

    fn wide_validator() -> ConstraintValidator {
        let limits = JointLimits {
            joint1: AngleRange::new(-180.0, 180.0),
            joint2: AngleRange::new(-180.0, 180.0),
        };
        let coupling = CouplingConfig {
            ratio: 0.5,
            tolerance_degrees: 720.0,
        };
        ConstraintValidator::new(limits, &coupling)
    }

    fn deg(d: f64) -> f64 {
        d.to_radians()
    }

    #[test]
    fn test_joint1_limit_checked_first() {
        // both joints out of range: joint 1 reported
        let v = validator().check(IkSolution::new(deg(95.0), deg(170.0)), &Pose::default());
        assert!(matches!(
            v.verdict,
            Err(Rejection::JointLimitExceeded { joint: 1, .. })
        ));
    }

    #[test]
    fn test_joint2_limit() {
        let v = validator().check(IkSolution::new(deg(10.0), deg(-165.0)), &Pose::default());
        assert!(matches!(
            v.verdict,
            Err(Rejection::JointLimitExceeded { joint: 2, .. })
        ));
    }

    #[test]
    fn test_limit_edges() {
        let inside = validator().check(IkSolution::new(deg(79.99), 0.0), &Pose::default());
        // coupling: 0 + 80 * 0.5 = 40 deg, within budget
        assert!(inside.is_valid());

        let outside = validator().check(IkSolution::new(deg(80.01), 0.0), &Pose::default());
        assert!(!outside.is_valid());
    }

    #[test]
    fn test_coupling_budget_rejects_in_range_targets() {
        // joint 2 goes -150 -> 150 (300 deg) while joint 1 stays: both angles
        // in range, but motor 2 travel is too large
        let current = Pose::new(0.0, deg(-150.0), 0.0, 0.0);
        let v = validator().check(IkSolution::new(0.0, deg(150.0)), &current);
        match v.verdict {
            Err(Rejection::CouplingCompensationExceeded { command_deg, tolerance_deg }) => {
                assert!((command_deg - 300.0).abs() < 1e-9);
                assert_eq!(tolerance_deg, 160.0);
            }
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn test_coupling_budget_counts_joint1_drag() {
        // d2 = 125, d1 = 60 -> 125 + 30 = 155: within budget
        let ok = validator().check(IkSolution::new(deg(60.0), deg(125.0)), &Pose::default());
        assert!(ok.is_valid());

        // d2 = 135, d1 = 60 -> 165: over
        let over = validator().check(IkSolution::new(deg(60.0), deg(135.0)), &Pose::default());
        assert!(matches!(
            over.verdict,
            Err(Rejection::CouplingCompensationExceeded { .. })
        ));
    }

    #[test]
    fn test_select_only_valid() {
        let current = Pose::default();
        let good = IkSolution::new(0.1, 0.2);
        let bad = IkSolution::new(deg(100.0), 0.2);
        let v = validator();

        let chosen = select_solution(&[v.check(bad, &current), v.check(good, &current)], &current);
        assert_eq!(chosen.unwrap(), good);

        let chosen = select_solution(&[v.check(good, &current), v.check(bad, &current)], &current);
        assert_eq!(chosen.unwrap(), good);
    }

    #[test]
    fn test_select_closest_when_both_valid() {
        let current = Pose::new(0.5, 0.5, 0.0, 0.0);
        let near = IkSolution::new(0.6, 0.4);
        let far = IkSolution::new(-0.5, -0.5);
        let v = wide_validator();

        let chosen = select_solution(&[v.check(far, &current), v.check(near, &current)], &current);
        assert_eq!(chosen.unwrap(), near);
    }

    #[test]
    fn test_select_tie_prefers_first() {
        let current = Pose::default();
        let a = IkSolution::new(0.3, 0.1);
        let b = IkSolution::new(-0.3, -0.1);
        let v = wide_validator();

        let chosen = select_solution(&[v.check(a, &current), v.check(b, &current)], &current);
        assert_eq!(chosen.unwrap(), a);
    }

    #[test]
    fn test_no_valid_solution_carries_both_reasons() {
        let current = Pose::default();
        let v = validator();
        let candidates = [
            v.check(IkSolution::new(deg(90.0), 0.0), &current),
            v.check(IkSolution::new(0.0, deg(170.0)), &current),
        ];
        let err = select_solution(&candidates, &current).unwrap_err();
        assert!(matches!(err.elbow_down, Rejection::JointLimitExceeded { joint: 1, .. }));
        assert!(matches!(err.elbow_up, Rejection::JointLimitExceeded { joint: 2, .. }));
    }
}
