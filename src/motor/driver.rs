// Motion coordinator for the SCARA arm
//
// Runs one move at a time through the pipeline (solve, validate, compensate,
// convert, transmit) and owns the only copy of the confirmed pose. The pose is
// replaced only after the controller acknowledges a move.

use std::io::{Read, Write};
use std::thread::sleep;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::constraints::{select_solution, ConstraintValidator, NoValidSolution};
use super::coupling::CouplingCompensator;
use super::kinematics::{ik_solve, wrist_angle, KinematicsError};
use super::protocol::{LinkError, LinkProtocol};
use super::steps::StepConverter;
use crate::config::{ArmConfig, ArmGeometry, MotionConfig, ServoConfig};
use crate::messages::{AxisCommand, GripperState, MotorCommand, Pose, ServoPositions, Target, Waypoint};

/// Pipeline stage of the move in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    #[default]
    Idle,
    Solving,
    Validating,
    Compensating,
    Converting,
    AwaitingAck,
}

#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    #[error(transparent)]
    Unreachable(#[from] KinematicsError),

    #[error(transparent)]
    NoValidSolution(#[from] NoValidSolution),

    #[error("no acknowledgment from controller within {timeout:?}")]
    NoAcknowledgment { timeout: Duration },

    #[error("link failure: {0}")]
    Link(#[from] LinkError),
}

impl MoveError {
    /// True when the move may have left the arm somewhere unknown, as opposed
    /// to being refused before anything was sent.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, MoveError::NoAcknowledgment { .. } | MoveError::Link(_))
    }
}

/// Result of one move plus the pose the coordinator holds afterwards.
#[derive(Debug)]
pub struct MoveOutcome {
    pub pose: Pose,
    pub result: Result<(), MoveError>,
}

impl MoveOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug)]
pub struct SequenceReport {
    /// Waypoints confirmed before the run stopped.
    pub completed: usize,
    pub pose: Pose,
    /// Index of the failing waypoint and why it failed.
    pub failure: Option<(usize, MoveError)>,
}

impl SequenceReport {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct MotionCoordinator<P> {
    link: LinkProtocol<P>,
    geometry: ArmGeometry,
    validator: ConstraintValidator,
    compensator: CouplingCompensator,
    converter: StepConverter,
    servo: ServoConfig,
    motion: MotionConfig,
    linear_enabled: bool,
    home: Pose,
    pose: Pose,
    state: MotionState,
}

impl<P: Read + Write> MotionCoordinator<P> {
    /// Start at the configured home pose.
    pub fn new(config: &ArmConfig, link: LinkProtocol<P>) -> Self {
        let home = config.home_pose();
        Self {
            link,
            geometry: config.arm,
            validator: ConstraintValidator::new(config.limits, &config.coupling),
            compensator: CouplingCompensator::from_config(&config.coupling),
            converter: StepConverter::from_config(config),
            servo: config.servo,
            motion: config.motion,
            linear_enabled: config.linear.enabled,
            home,
            pose: home,
            state: MotionState::Idle,
        }
    }

    /// Start from a pose other than home.
    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Give the link back, e.g. to close it.
    pub fn into_link(self) -> LinkProtocol<P> {
        self.link
    }

    /// Move the end effector to `target`.
    ///
    /// On failure the pose is left as it was. With `auto_home`, a confirmed
    /// move is followed by a delayed return home; a failed return is logged
    /// and does not change the reported result.
    pub fn move_to(&mut self, target: Target, gripper: GripperState, auto_home: bool) -> MoveOutcome {
        info!(
            "Move to x={:.4} y={:.4} z={:.2} phi={:.1}° gripper={:?}",
            target.x,
            target.y,
            target.z,
            target.phi.to_degrees(),
            gripper
        );

        let result = self.solve_and_send(&target, gripper);
        self.enter(MotionState::Idle);

        match &result {
            Ok(()) => {
                info!("Move confirmed");
                if auto_home {
                    self.auto_home();
                }
            }
            Err(e) => warn!("Move failed: {}", e),
        }

        MoveOutcome {
            pose: self.pose,
            result,
        }
    }

    /// Return to the configured home pose with the servos at their home
    /// positions. No IK involved.
    pub fn go_home(&mut self) -> MoveOutcome {
        info!("Returning home");
        let home = Pose {
            z: self.goal_z(self.home.z),
            ..self.home
        };
        let result = self.send_pose(home, self.servo.home());
        self.enter(MotionState::Idle);

        match &result {
            Ok(()) => info!("Home position reached"),
            Err(e) => warn!("Homing failed: {}", e),
        }

        MoveOutcome {
            pose: self.pose,
            result,
        }
    }

    /// Visit each waypoint in order, stopping at the first failure.
    pub fn run_sequence(&mut self, waypoints: &[Waypoint]) -> SequenceReport {
        info!("Running sequence of {} waypoints", waypoints.len());
        let mut previous: Option<&Waypoint> = None;

        for (index, waypoint) in waypoints.iter().enumerate() {
            if let Some(prev) = previous {
                self.pause_between(prev, waypoint);
            }

            info!(
                "Waypoint {}/{}: ({:.3}, {:.3}, {:.1}) phi={:.1}° {:?}",
                index + 1,
                waypoints.len(),
                waypoint.x,
                waypoint.y,
                waypoint.z,
                waypoint.phi_deg,
                waypoint.gripper
            );

            let outcome = self.move_to(Target::from(waypoint), waypoint.gripper, false);
            if let Err(error) = outcome.result {
                warn!("Sequence stopped at waypoint {}", index + 1);
                return SequenceReport {
                    completed: index,
                    pose: self.pose,
                    failure: Some((index, error)),
                };
            }
            previous = Some(waypoint);
        }

        info!("Sequence complete");
        SequenceReport {
            completed: waypoints.len(),
            pose: self.pose,
            failure: None,
        }
    }

    /// Relative move of joints 1 and 2 in raw motor steps.
    ///
    /// The tracked pose is not updated, so the next planned move starts from
    /// the last confirmed pose. Re-home after jogging.
    pub fn jog(&mut self, steps1: i64, steps2: i64) -> Result<(), MoveError> {
        warn!("Manual jog: M1={} M2={} (pose tracking not updated)", steps1, steps2);
        let command = MotorCommand {
            joint1: AxisCommand::from_delta(steps1, false),
            joint2: AxisCommand::from_delta(steps2, false),
            linear: AxisCommand::default(),
            servos: self.servo.home(),
        };

        self.enter(MotionState::AwaitingAck);
        let result = self.transmit(&command);
        self.enter(MotionState::Idle);
        result
    }

    /// Drive the servos without moving any stepper. `None` leaves a servo
    /// where it is.
    pub fn set_servos(&mut self, wrist: Option<u16>, gripper: Option<u16>) -> Result<(), MoveError> {
        info!("Set servos: wrist={:?} gripper={:?}", wrist, gripper);
        self.enter(MotionState::AwaitingAck);
        let result = self
            .link
            .transact_servo(wrist, gripper)
            .map_err(MoveError::from)
            .and_then(|lines| self.confirm(&lines));
        self.enter(MotionState::Idle);
        result
    }

    fn solve_and_send(&mut self, target: &Target, gripper: GripperState) -> Result<(), MoveError> {
        self.enter(MotionState::Solving);
        let solutions = ik_solve(target.x, target.y, &self.geometry)?;

        self.enter(MotionState::Validating);
        let candidates = self.validator.check_all(&solutions, &self.pose);
        let chosen = select_solution(&candidates, &self.pose)?;
        info!(
            "Selected θ1={:.2}° θ2={:.2}°",
            chosen.theta1.to_degrees(),
            chosen.theta2.to_degrees()
        );

        let theta3 = wrist_angle(chosen.theta1, chosen.theta2, target.phi);
        let goal = Pose::new(chosen.theta1, chosen.theta2, theta3, self.goal_z(target.z));
        let servos = self.servo.positions(theta3, gripper);

        self.send_pose(goal, servos)
    }

    /// Move from the confirmed pose to `goal` and commit it once acknowledged.
    fn send_pose(&mut self, goal: Pose, servos: ServoPositions) -> Result<(), MoveError> {
        self.enter(MotionState::Compensating);
        let mv = self.compensator.compensate(&goal, &self.pose);
        debug!(
            "Motor 2 command: {:.2}°",
            mv.joint2_command().to_degrees()
        );

        self.enter(MotionState::Converting);
        let steps = self.converter.relative_move(&mv);
        let command = self.converter.command(&steps, servos);
        info!(
            "Steps: M1={} M2={} Z={} servos=({}, {})",
            steps.joint1, steps.joint2, steps.linear, servos.wrist, servos.gripper
        );

        self.enter(MotionState::AwaitingAck);
        self.transmit(&command)?;

        self.pose = goal;
        Ok(())
    }

    fn goal_z(&self, z: f64) -> f64 {
        if self.linear_enabled { z } else { self.pose.z }
    }

    fn transmit(&mut self, command: &MotorCommand) -> Result<(), MoveError> {
        let lines = self.link.transact_move(command)?;
        self.confirm(&lines)
    }

    fn confirm(&self, lines: &[String]) -> Result<(), MoveError> {
        let ack = self.link.ack_policy();
        if !ack.accepts(lines) {
            return Err(MoveError::NoAcknowledgment {
                timeout: ack.timeout,
            });
        }
        if !lines.iter().any(|l| l.contains(&ack.completion_marker)) {
            warn!("Controller replied without completion marker; assuming the move finished");
        }
        Ok(())
    }

    fn auto_home(&mut self) {
        let delay = self.motion.auto_home_delay();
        info!("Auto-home in {:?}", delay);
        sleep(delay);

        let outcome = self.go_home();
        if let Err(e) = outcome.result {
            warn!("Auto-home failed, arm left at target: {}", e);
        }
    }

    fn pause_between(&self, previous: &Waypoint, next: &Waypoint) {
        let jump = previous.planar_distance(next);
        if jump > self.motion.settle_distance {
            info!("Large move ({:.3} m), settling for {:?}", jump, self.motion.settle());
            sleep(self.motion.settle());
        }
        sleep(self.motion.pause());
    }

    fn enter(&mut self, state: MotionState) {
        if self.state != state {
            debug!("{:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}
