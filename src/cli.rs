// Command-line surface of the runtime binary

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::messages::GripperState;
use crate::motor::sequence::{PLACE_DEPTH_MM, PLACE_X_M, PLACE_Y_M, PICK_DEPTH_MM};

#[derive(Debug, Parser)]
#[command(name = "scara-runtime", version, about = "Drive a SCARA arm over its serial motor controller")]
pub struct Cli {
    /// TOML file overriding the reference arm configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Serial device (overrides the config file)
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// Baud rate (overrides the config file)
    #[arg(short, long, global = true)]
    pub baud: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Move the end effector to a Cartesian target
    Move {
        /// X in metres
        #[arg(allow_negative_numbers = true)]
        x: f64,
        /// Y in metres
        #[arg(allow_negative_numbers = true)]
        y: f64,
        /// Linear axis position in mm
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        z: f64,
        /// End-effector orientation in degrees
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        phi: f64,
        #[arg(long, value_enum, default_value_t = Gripper::Closed)]
        gripper: Gripper,
        /// Return home after the move
        #[arg(long)]
        auto_home: bool,
    },

    /// Return to the home pose
    Home,

    /// Run a JSON file of waypoints
    Sequence { file: PathBuf },

    /// Pick a part and drop it at the place position
    PickPlace {
        #[arg(allow_negative_numbers = true)]
        pick_x: f64,
        #[arg(allow_negative_numbers = true)]
        pick_y: f64,
        /// Wrist orientation at the pick point (degrees)
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        phi: f64,
        #[arg(long, default_value_t = PLACE_X_M, allow_negative_numbers = true)]
        place_x: f64,
        #[arg(long, default_value_t = PLACE_Y_M, allow_negative_numbers = true)]
        place_y: f64,
        #[arg(long, default_value_t = PICK_DEPTH_MM, allow_negative_numbers = true)]
        pick_z: f64,
        #[arg(long, default_value_t = PLACE_DEPTH_MM, allow_negative_numbers = true)]
        place_z: f64,
    },

    /// Step joints 1 and 2 by raw motor steps (pose tracking is not updated)
    Jog {
        #[arg(allow_negative_numbers = true)]
        steps1: i64,
        #[arg(allow_negative_numbers = true)]
        steps2: i64,
    },

    /// Set servo positions without moving the steppers
    Servo {
        #[arg(long)]
        wrist: Option<u16>,
        #[arg(long)]
        gripper: Option<u16>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Gripper {
    Open,
    Closed,
}

impl From<Gripper> for GripperState {
    fn from(g: Gripper) -> Self {
        match g {
            Gripper::Open => GripperState::Open,
            Gripper::Closed => GripperState::Closed,
        }
    }
}
