// Motion pipeline for the SCARA arm
//
// Provides:
// - Planar inverse/forward kinematics
// - Joint-limit and coupling checks, solution selection
// - Joint-2 coupling compensation and step conversion
// - Serial link protocol to the motor controller
// - Motion coordinator tying the stages together
// - Pick-and-place waypoint program

pub mod constraints;
pub mod coupling;
mod driver;
pub mod kinematics;
pub mod protocol;
pub mod sequence;
pub mod steps;

pub use constraints::{ConstraintValidator, NoValidSolution, Rejection, ValidatedSolution};
pub use coupling::{CompensatedMove, CouplingCompensator, MotorAngles};
pub use driver::{MotionCoordinator, MotionState, MoveError, MoveOutcome, SequenceReport};
pub use kinematics::{ik_solve, IkSolution, IkSolutions, KinematicsError};
pub use protocol::{AckPolicy, LinkError, LinkProtocol};
pub use sequence::PickAndPlace;
pub use steps::StepConverter;
