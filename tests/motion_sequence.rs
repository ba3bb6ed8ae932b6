//! End-to-end tests: coordinator -> link protocol -> in-memory controller.

mod common;

use std::time::{Duration, Instant};

use common::{coordinator, fast_config, frames, steps_field, DONE};
use scara_runtime::config::{parse_config, AngleRange, ArmConfig, JointLimits, MotionConfig};
use scara_runtime::messages::{GripperState, Pose, Target, Waypoint};
use scara_runtime::motor::kinematics::{forward_kinematics, ik_solve};
use scara_runtime::motor::{ConstraintValidator, MoveError, PickAndPlace};

fn deg(rad: f64) -> f64 {
    rad.to_degrees()
}

/// Signed step totals per axis over a run, undoing the per-axis direction
/// convention of the reference arm (joint 2 wired inverted).
fn net_steps(frames: &[Vec<u8>]) -> [i64; 3] {
    let mut net = [0i64; 3];
    for frame in frames.iter().filter(|f| f[0] == 0x01) {
        for (axis, total) in net.iter_mut().enumerate() {
            let forward = (frame[13 + axis] == 1) != (axis == 1);
            let steps = steps_field(frame, axis) as i64;
            *total += if forward { steps } else { -steps };
        }
    }
    net
}

#[test]
fn timeout_leaves_pose_unchanged() {
    let config = fast_config();
    let mut arm = coordinator(&config, &[]);
    let started = Instant::now();

    let outcome = arm.move_to(Target::new(0.2, 0.1, -5.0, 0.0), GripperState::Open, false);

    assert!(started.elapsed() >= Duration::from_millis(40));
    assert!(matches!(outcome.result, Err(MoveError::NoAcknowledgment { .. })));
    assert_eq!(outcome.pose, Pose::default());
    assert_eq!(arm.pose(), Pose::default());
    // the frame did go out
    assert_eq!(frames(arm).len(), 1);
}

#[test]
fn sequence_stops_when_second_waypoint_is_not_acknowledged() {
    let config = fast_config();
    let mut arm = coordinator(&config, &[DONE]);
    let waypoints = [
        Waypoint::new(0.2, 0.1, 0.0, 0.0, GripperState::Open),
        Waypoint::new(0.25, 0.0, -4.0, 0.0, GripperState::Closed),
        Waypoint::new(0.2, -0.1, 0.0, 0.0, GripperState::Open),
    ];

    let report = arm.run_sequence(&waypoints);

    assert_eq!(report.completed, 1);
    let (index, error) = report.failure.as_ref().expect("sequence should fail");
    assert_eq!(*index, 1);
    assert!(error.is_transport_failure());

    // pose is the one confirmed at waypoint 1
    let (x, y) = forward_kinematics(report.pose.theta1, report.pose.theta2, &config.arm);
    assert!((x - 0.2).abs() < 1e-9 && (y - 0.1).abs() < 1e-9);
    assert_eq!(report.pose.z, 0.0);

    // waypoint 3 never transmitted
    assert_eq!(frames(arm).len(), 2);
}

#[test]
fn selector_picks_the_only_candidate_inside_joint1_limits() {
    let config = fast_config();
    let mut arm = coordinator(&config, &[DONE]);

    let outcome = arm.move_to(Target::new(0.11, 0.06, 0.0, 0.0), GripperState::Closed, false);

    assert!(outcome.success());
    // the other elbow needs joint 1 at ~98.2°
    assert!((deg(outcome.pose.theta1) + 41.02).abs() < 0.01);
    assert!((deg(outcome.pose.theta2) - 139.26).abs() < 0.01);
}

#[test]
fn selector_takes_the_shorter_travel_when_both_elbows_fit() {
    let mut config = fast_config();
    config.limits = JointLimits {
        joint1: AngleRange::new(-180.0, 180.0),
        ..JointLimits::default()
    };

    let validator = ConstraintValidator::new(config.limits, &config.coupling);
    let solutions = ik_solve(0.11, 0.06, &config.arm).unwrap();
    let checked = validator.check_all(&solutions, &Pose::default());
    assert!(checked.iter().all(|c| c.verdict.is_ok()), "{:?}", checked);

    let mut arm = coordinator(&config, &[DONE]);
    let outcome = arm.move_to(Target::new(0.11, 0.06, 0.0, 0.0), GripperState::Closed, false);

    assert!(outcome.success());
    // elbow-down travels ~180.3°, elbow-up (98.2°, -139.3°) ~237.5°
    assert!(outcome.pose.theta2 > 0.0);
    assert!((deg(outcome.pose.theta1) + 41.02).abs() < 0.01);
    assert!((deg(outcome.pose.theta2) - 139.26).abs() < 0.01);
}

#[test]
fn full_extension_is_a_null_move_from_home() {
    let config = fast_config();
    let mut arm = coordinator(&config, &[DONE]);

    let outcome = arm.move_to(Target::new(0.36, 0.0, 0.0, 0.0), GripperState::Closed, false);

    assert!(outcome.success());
    assert!(outcome.pose.theta1.abs() < 1e-6);
    assert!(outcome.pose.theta2.abs() < 1e-6);

    let sent = frames(arm);
    assert_eq!(steps_field(&sent[0], 0), 0);
    assert_eq!(steps_field(&sent[0], 1), 0);
    assert_eq!(steps_field(&sent[0], 2), 0);
    assert_eq!(&sent[0][16..18], &[0, 90]);
}

#[test]
fn pick_and_place_then_home_nets_zero_steps() {
    let config = fast_config();
    let mut arm = coordinator(&config, &[DONE; 11]);

    let waypoints = PickAndPlace::new(0.25, 0.05).waypoints();
    let report = arm.run_sequence(&waypoints);
    assert!(report.success(), "failed: {:?}", report.failure);
    assert_eq!(report.completed, 10);

    let (x, y) = forward_kinematics(report.pose.theta1, report.pose.theta2, &config.arm);
    assert!((x - 0.15).abs() < 1e-9 && (y + 0.15).abs() < 1e-9);

    assert!(arm.go_home().success());
    assert_eq!(arm.pose(), config.home_pose());

    let sent = frames(arm);
    assert_eq!(sent.len(), 11);
    assert_eq!(net_steps(&sent), [0, 0, 0]);
}

#[test]
fn auto_home_returns_to_configured_home() {
    let mut config = fast_config();
    config.home.theta1_degrees = 10.0;
    config.home.z = 2.0;
    let mut arm = coordinator(&config, &[DONE, DONE]).with_pose(config.home_pose());

    let outcome = arm.move_to(Target::new(0.2, 0.1, -6.0, 0.0), GripperState::Open, true);

    assert!(outcome.success());
    assert_eq!(outcome.pose, config.home_pose());
    let sent = frames(arm);
    assert_eq!(sent.len(), 2);
    assert_eq!(&sent[1][16..18], &[90, 90]);
}

#[test]
fn direction_convention_follows_config() {
    let config = ArmConfig {
        motion: MotionConfig::immediate(),
        ..parse_config(
            r#"
[joint2]
steps_per_revolution = 200
microsteps = 8
gear_ratio = 2.0
invert_direction = false
"#,
        )
        .expect("config should parse")
    };

    let mut arm = coordinator(&config, &[DONE]);
    assert!(arm.move_to(Target::new(0.2, 0.1, 0.0, 0.0), GripperState::Closed, false).success());
    // positive joint-2 travel, not inverted
    assert!(arm.pose().theta2 > 0.0);
    assert_eq!(frames(arm)[0][14], 1);

    let mut arm = coordinator(&fast_config(), &[DONE]);
    assert!(arm.move_to(Target::new(0.2, 0.1, 0.0, 0.0), GripperState::Closed, false).success());
    assert_eq!(frames(arm)[0][14], 0);
}
