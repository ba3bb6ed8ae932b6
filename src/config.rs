// Arm geometry, axis calibration, link settings and their defaults
//
// The constants describe the reference arm. Every one of them can be
// overridden from a TOML file; sections and fields that are left out keep the
// values below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::messages::{GripperState, Pose, ServoPositions};

// Link lengths (metres)
pub const LINK1_M: f64 = 0.18;
pub const LINK2_M: f64 = 0.18;

// Stepper drive: 200 full steps, 1/8 microstepping
pub const STEPS_PER_REV: u32 = 200;
pub const MICROSTEPS: u16 = 8;
// Joint 2 runs through a 2:1 reduction
pub const JOINT2_GEAR_RATIO: f64 = 2.0;

// Linear (Z) axis: 400 steps per revolution, 2 mm per revolution
pub const LINEAR_STEPS_PER_REV: u32 = 400;
pub const LINEAR_LEAD_MM: f64 = 2.0;

// Absolute joint limits (degrees)
pub const MOTOR1_ABS_MIN_DEG: f64 = -80.0;
pub const MOTOR1_ABS_MAX_DEG: f64 = 80.0;
pub const MOTOR2_ABS_MIN_DEG: f64 = -160.0;
pub const MOTOR2_ABS_MAX_DEG: f64 = 160.0;

// Joint 2 is dragged by half of joint 1's motion
pub const COUPLING_RATIO: f64 = 0.5;
pub const COUPLING_TOLERANCE_DEG: f64 = MOTOR2_ABS_MAX_DEG;

// Servo positions (degrees)
pub const WRIST_SERVO_SCALE: f64 = 0.8;
pub const GRIPPER_OPEN_DEG: u16 = 0;
pub const GRIPPER_CLOSED_DEG: u16 = 90;
pub const HOME_SERVO_DEG: u16 = 90;

// Serial link to the motor controller
pub const SERIAL_PORT: &str = "/dev/ttyUSB0";
pub const BAUD_RATE: u32 = 115_200;
pub const PORT_READ_TIMEOUT_MS: u64 = 100;
pub const LINK_SETTLE_MS: u64 = 2_000;
pub const ACK_TIMEOUT_MS: u64 = 5_000;
pub const ACK_POLL_INTERVAL_MS: u64 = 100;
pub const COMPLETION_MARKER: &str = "Movement Done";

// Sequencing
pub const AUTO_HOME_DELAY_MS: u64 = 5_000;
pub const SETTLE_DISTANCE_M: f64 = 0.1;
pub const LARGE_MOVE_SETTLE_MS: u64 = 2_000;
pub const INTER_MOVE_PAUSE_MS: u64 = 1_000;

const VALID_MICROSTEPS: [u16; 9] = [1, 2, 4, 8, 16, 32, 64, 128, 256];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Complete tunable surface of the arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    pub arm: ArmGeometry,
    #[serde(deserialize_with = "joint1_section")]
    pub joint1: AxisConfig,
    #[serde(deserialize_with = "joint2_section")]
    pub joint2: AxisConfig,
    pub linear: LinearAxisConfig,
    pub limits: JointLimits,
    pub coupling: CouplingConfig,
    pub servo: ServoConfig,
    pub home: HomeConfig,
    pub link: LinkConfig,
    pub motion: MotionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmGeometry {
    pub link1: f64,
    pub link2: f64,
}

impl Default for ArmGeometry {
    fn default() -> Self {
        Self {
            link1: LINK1_M,
            link2: LINK2_M,
        }
    }
}

/// Calibration of one revolute stepper axis.
///
/// In TOML every field is optional; fields left out keep the value that axis
/// has on the reference arm (see [`AxisOverrides`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisConfig {
    pub steps_per_revolution: u32,
    pub microsteps: u16,
    pub gear_ratio: f64,
    pub step_sign: i8,
    pub home_offset: i64,
    pub invert_direction: bool,
}

impl AxisConfig {
    /// 1:1, non-inverted axis with the reference drive resolution.
    pub fn plain() -> Self {
        Self {
            steps_per_revolution: STEPS_PER_REV,
            microsteps: MICROSTEPS,
            gear_ratio: 1.0,
            step_sign: 1,
            home_offset: 0,
            invert_direction: false,
        }
    }

    /// Steps for one full turn of the joint (after microstepping and gearing).
    pub fn steps_per_output_revolution(&self) -> f64 {
        self.steps_per_revolution as f64 * self.microsteps as f64 * self.gear_ratio
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.steps_per_revolution == 0 {
            return Err(invalid(field, "steps_per_revolution must be > 0"));
        }
        if !VALID_MICROSTEPS.contains(&self.microsteps) {
            return Err(invalid(
                field,
                format!(
                    "microsteps {} is not one of {:?}",
                    self.microsteps, VALID_MICROSTEPS
                ),
            ));
        }
        if !positive(self.gear_ratio) {
            return Err(invalid(
                field,
                format!("gear_ratio {} must be > 0", self.gear_ratio),
            ));
        }
        if self.step_sign != 1 && self.step_sign != -1 {
            return Err(invalid(
                field,
                format!("step_sign {} must be 1 or -1", self.step_sign),
            ));
        }
        Ok(())
    }
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self::plain()
    }
}

fn default_joint2() -> AxisConfig {
    AxisConfig {
        gear_ratio: JOINT2_GEAR_RATIO,
        invert_direction: true,
        ..AxisConfig::plain()
    }
}

/// An axis section as written in TOML.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxisOverrides {
    pub steps_per_revolution: Option<u32>,
    pub microsteps: Option<u16>,
    pub gear_ratio: Option<f64>,
    pub step_sign: Option<i8>,
    pub home_offset: Option<i64>,
    pub invert_direction: Option<bool>,
}

impl AxisOverrides {
    pub fn apply(self, base: AxisConfig) -> AxisConfig {
        AxisConfig {
            steps_per_revolution: self.steps_per_revolution.unwrap_or(base.steps_per_revolution),
            microsteps: self.microsteps.unwrap_or(base.microsteps),
            gear_ratio: self.gear_ratio.unwrap_or(base.gear_ratio),
            step_sign: self.step_sign.unwrap_or(base.step_sign),
            home_offset: self.home_offset.unwrap_or(base.home_offset),
            invert_direction: self.invert_direction.unwrap_or(base.invert_direction),
        }
    }
}

fn joint1_section<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AxisConfig, D::Error> {
    AxisOverrides::deserialize(deserializer).map(|o| o.apply(AxisConfig::plain()))
}

fn joint2_section<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AxisConfig, D::Error> {
    AxisOverrides::deserialize(deserializer).map(|o| o.apply(default_joint2()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearAxisConfig {
    pub steps_per_revolution: u32,
    /// Travel per revolution, in the same unit as `Pose::z`.
    pub lead: f64,
    pub invert_direction: bool,
    /// Arms without a Z axis never send linear steps and keep `z` fixed.
    pub enabled: bool,
}

impl Default for LinearAxisConfig {
    fn default() -> Self {
        Self {
            steps_per_revolution: LINEAR_STEPS_PER_REV,
            lead: LINEAR_LEAD_MM,
            invert_direction: false,
            enabled: true,
        }
    }
}

/// Inclusive range in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleRange {
    pub min_degrees: f64,
    pub max_degrees: f64,
}

impl AngleRange {
    pub const fn new(min_degrees: f64, max_degrees: f64) -> Self {
        Self {
            min_degrees,
            max_degrees,
        }
    }

    pub fn contains_degrees(&self, degrees: f64) -> bool {
        degrees >= self.min_degrees && degrees <= self.max_degrees
    }

    pub fn contains_radians(&self, radians: f64) -> bool {
        self.contains_degrees(radians.to_degrees())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointLimits {
    pub joint1: AngleRange,
    pub joint2: AngleRange,
}

impl Default for JointLimits {
    fn default() -> Self {
        Self {
            joint1: AngleRange::new(MOTOR1_ABS_MIN_DEG, MOTOR1_ABS_MAX_DEG),
            joint2: AngleRange::new(MOTOR2_ABS_MIN_DEG, MOTOR2_ABS_MAX_DEG),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingConfig {
    pub ratio: f64,
    pub tolerance_degrees: f64,
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            ratio: COUPLING_RATIO,
            tolerance_degrees: COUPLING_TOLERANCE_DEG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// Wrist servo degrees per degree of |theta3|.
    pub wrist_scale: f64,
    pub gripper_open: u16,
    pub gripper_closed: u16,
    pub home_wrist: u16,
    pub home_gripper: u16,
    /// Without servos every frame carries the home positions.
    pub enabled: bool,
}

impl ServoConfig {
    pub fn home(&self) -> ServoPositions {
        ServoPositions::new(self.home_wrist, self.home_gripper)
    }

    /// Servo bytes for a move ending at wrist angle `theta3`.
    pub fn positions(&self, theta3: f64, gripper: GripperState) -> ServoPositions {
        if !self.enabled {
            return self.home();
        }
        ServoPositions::new(self.wrist_for(theta3), self.gripper(gripper))
    }

    pub fn gripper(&self, state: GripperState) -> u16 {
        match state {
            GripperState::Open => self.gripper_open,
            GripperState::Closed => self.gripper_closed,
        }
    }

    pub fn wrist_for(&self, theta3: f64) -> u16 {
        // truncation, matching the firmware calibration table
        let deg = (self.wrist_scale * theta3.to_degrees().abs()).floor();
        deg.min(u16::MAX as f64) as u16
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            wrist_scale: WRIST_SERVO_SCALE,
            gripper_open: GRIPPER_OPEN_DEG,
            gripper_closed: GRIPPER_CLOSED_DEG,
            home_wrist: HOME_SERVO_DEG,
            home_gripper: HOME_SERVO_DEG,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeConfig {
    pub theta1_degrees: f64,
    pub theta2_degrees: f64,
    pub theta3_degrees: f64,
    pub z: f64,
}

impl HomeConfig {
    pub fn pose(&self) -> Pose {
        Pose::new(
            self.theta1_degrees.to_radians(),
            self.theta2_degrees.to_radians(),
            self.theta3_degrees.to_radians(),
            self.z,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub settle_ms: u64,
    pub ack_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub completion_marker: String,
    /// Treat replies without the completion marker as no acknowledgment.
    pub require_completion_marker: bool,
}

impl LinkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: SERIAL_PORT.to_string(),
            baud_rate: BAUD_RATE,
            read_timeout_ms: PORT_READ_TIMEOUT_MS,
            settle_ms: LINK_SETTLE_MS,
            ack_timeout_ms: ACK_TIMEOUT_MS,
            poll_interval_ms: ACK_POLL_INTERVAL_MS,
            completion_marker: COMPLETION_MARKER.to_string(),
            require_completion_marker: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub auto_home_delay_ms: u64,
    /// Planar jump (metres) above which a sequence waits for the arm to settle.
    pub settle_distance: f64,
    pub settle_ms: u64,
    pub pause_ms: u64,
}

impl MotionConfig {
    /// No waiting anywhere. Used by tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            auto_home_delay_ms: 0,
            settle_distance: SETTLE_DISTANCE_M,
            settle_ms: 0,
            pause_ms: 0,
        }
    }

    pub fn auto_home_delay(&self) -> Duration {
        Duration::from_millis(self.auto_home_delay_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            auto_home_delay_ms: AUTO_HOME_DELAY_MS,
            settle_distance: SETTLE_DISTANCE_M,
            settle_ms: LARGE_MOVE_SETTLE_MS,
            pause_ms: INTER_MOVE_PAUSE_MS,
        }
    }
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self::reference()
    }
}

impl ArmConfig {
    /// The reference arm: every constant at the top of this module.
    pub fn reference() -> Self {
        Self {
            arm: ArmGeometry::default(),
            joint1: AxisConfig::plain(),
            joint2: default_joint2(),
            linear: LinearAxisConfig::default(),
            limits: JointLimits::default(),
            coupling: CouplingConfig::default(),
            servo: ServoConfig::default(),
            home: HomeConfig::default(),
            link: LinkConfig::default(),
            motion: MotionConfig::default(),
        }
    }

    pub fn home_pose(&self) -> Pose {
        self.home.pose()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !positive(self.arm.link1) {
            return Err(invalid("arm.link1", "link length must be > 0"));
        }
        if !positive(self.arm.link2) {
            return Err(invalid("arm.link2", "link length must be > 0"));
        }

        self.joint1.validate("joint1")?;
        self.joint2.validate("joint2")?;

        if self.linear.steps_per_revolution == 0 {
            return Err(invalid("linear.steps_per_revolution", "must be > 0"));
        }
        if !positive(self.linear.lead) {
            return Err(invalid("linear.lead", "must be > 0"));
        }

        for (field, range) in [
            ("limits.joint1", &self.limits.joint1),
            ("limits.joint2", &self.limits.joint2),
        ] {
            if range.min_degrees >= range.max_degrees {
                return Err(invalid(
                    field,
                    format!(
                        "min ({}) must be < max ({})",
                        range.min_degrees, range.max_degrees
                    ),
                ));
            }
        }

        if !self.coupling.ratio.is_finite() {
            return Err(invalid("coupling.ratio", "must be finite"));
        }
        if !positive(self.coupling.tolerance_degrees) {
            return Err(invalid("coupling.tolerance_degrees", "must be > 0"));
        }

        if self.link.ack_timeout_ms == 0 {
            return Err(invalid("link.ack_timeout_ms", "must be > 0"));
        }
        if self.link.completion_marker.trim().is_empty() {
            return Err(invalid("link.completion_marker", "must not be empty"));
        }

        Ok(())
    }
}

/// Load and validate a TOML configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ArmConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate a TOML configuration string. Missing sections keep the
/// reference arm's values.
pub fn parse_config(content: &str) -> Result<ArmConfig, ConfigError> {
    let config: ArmConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}
