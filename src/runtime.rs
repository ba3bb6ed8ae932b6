// One-shot runtime: load config, open the link, run a command, report the pose
//
// Everything runs on the calling thread. The coordinator blocks on each
// acknowledgment, so at most one move is ever in flight.

use std::error::Error;
use std::io::{Read, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::config::{load_config, ArmConfig};
use crate::messages::{Target, Waypoint};
use crate::motor::{LinkProtocol, MotionCoordinator, PickAndPlace};

pub type RunResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Read a JSON array of waypoints.
pub fn load_sequence<P: AsRef<Path>>(path: P) -> RunResult<Vec<Waypoint>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read sequence {}: {}", path.display(), e))?;
    let waypoints: Vec<Waypoint> = serde_json::from_str(&content)?;
    info!("Loaded {} waypoints from {}", waypoints.len(), path.display());
    Ok(waypoints)
}

/// Config from `--config` (or the reference arm) with CLI overrides applied.
pub fn resolve_config(cli: &Cli) -> RunResult<ArmConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            load_config(path)?
        }
        None => ArmConfig::reference(),
    };
    if let Some(port) = &cli.port {
        config.link.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.link.baud_rate = baud;
    }
    Ok(config)
}

/// Waypoints the command will run, resolved before the port is opened so bad
/// input never touches the hardware.
fn planned_waypoints(command: &Commands) -> RunResult<Option<Vec<Waypoint>>> {
    match command {
        Commands::Sequence { file } => load_sequence(file).map(Some),
        Commands::PickPlace {
            pick_x,
            pick_y,
            phi,
            place_x,
            place_y,
            pick_z,
            place_z,
        } => {
            let program = PickAndPlace::new(*pick_x, *pick_y)
                .pick_phi(*phi)
                .place_at(*place_x, *place_y)
                .depths(*pick_z, *place_z);
            Ok(Some(program.waypoints()))
        }
        _ => Ok(None),
    }
}

/// Run one command against an open coordinator.
pub fn execute<P: Read + Write>(
    coordinator: &mut MotionCoordinator<P>,
    command: &Commands,
    waypoints: Option<Vec<Waypoint>>,
) -> RunResult<()> {
    match command {
        Commands::Move {
            x,
            y,
            z,
            phi,
            gripper,
            auto_home,
        } => {
            let target = Target::new(*x, *y, *z, phi.to_radians());
            coordinator.move_to(target, (*gripper).into(), *auto_home).result?;
        }
        Commands::Home => coordinator.go_home().result?,
        Commands::Sequence { .. } | Commands::PickPlace { .. } => {
            let waypoints = waypoints.unwrap_or_default();
            let report = coordinator.run_sequence(&waypoints);
            info!("Completed {}/{} waypoints", report.completed, waypoints.len());
            if let Some((index, error)) = report.failure {
                warn!("Waypoint {} failed", index + 1);
                return Err(error.into());
            }
        }
        Commands::Jog { steps1, steps2 } => coordinator.jog(*steps1, *steps2)?,
        Commands::Servo { wrist, gripper } => coordinator.set_servos(*wrist, *gripper)?,
    }
    Ok(())
}

pub fn run(cli: Cli) -> RunResult<()> {
    let config = resolve_config(&cli)?;
    let waypoints = planned_waypoints(&cli.command)?;

    info!("Opening motor controller link on {}...", config.link.port);
    let link = LinkProtocol::open(&config.link)?;
    let mut coordinator = MotionCoordinator::new(&config, link);

    let result = execute(&mut coordinator, &cli.command, waypoints);
    finish(coordinator, result)
}

/// Report the final pose and release the port. A command failure outranks
/// anything that goes wrong while closing.
fn finish<P: Read + Write>(coordinator: MotionCoordinator<P>, result: RunResult<()>) -> RunResult<()> {
    match serde_json::to_string(&coordinator.pose()) {
        Ok(pose) => info!("Final pose: {}", pose),
        Err(e) => warn!("Failed to serialize final pose: {}", e),
    }

    match coordinator.into_link().close() {
        Ok(_) => result,
        Err(e) if result.is_err() => {
            warn!("Failed to close link after command error: {}", e);
            result
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use clap::Parser;
    use tempfile::TempDir;

    use super::*;
    use crate::config::MotionConfig;
    use crate::messages::{GripperState, Pose};
    use crate::motor::protocol::testing::ScriptedPort;
    use crate::motor::AckPolicy;

    fn coordinator(replies: &[&str]) -> MotionCoordinator<ScriptedPort> {
        let config = ArmConfig {
            motion: MotionConfig::immediate(),
            ..ArmConfig::reference()
        };
        let mut ack = AckPolicy::from_config(&config.link);
        ack.timeout = Duration::from_millis(20);
        ack.poll_interval = Duration::from_millis(1);
        MotionCoordinator::new(&config, LinkProtocol::new(ScriptedPort::new(replies.iter().copied()), ack))
    }

    /// Port that accepts frames but cannot flush, as when the device is unplugged.
    struct UnpluggedPort;

    impl io::Read for UnpluggedPort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
        }
    }

    impl io::Write for UnpluggedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
        }
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("override.toml");
        std::fs::write(&path, "[link]\nport = \"/dev/ttyS3\"\nbaud_rate = 9600\n").unwrap();
        let config_arg = path.to_string_lossy().to_string();
        let config_arg = config_arg.as_str();

        let cli = Cli::parse_from(["scara-runtime", "--config", config_arg, "home"]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.link.port, "/dev/ttyS3");
        assert_eq!(config.link.baud_rate, 9600);

        let cli = Cli::parse_from(["scara-runtime", "--config", config_arg, "--baud", "57600", "home"]);
        assert_eq!(resolve_config(&cli).unwrap().link.baud_rate, 57600);
    }

    #[test]
    fn test_load_sequence_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seq.json");
        std::fs::write(
            &path,
            r#"[{"x": 0.2, "y": 0.1, "gripper": "open"}, {"x": 0.2, "y": -0.1, "z": -5, "phi_deg": 45}]"#,
        )
        .unwrap();
        let waypoints = load_sequence(&path).unwrap();
        assert_eq!(waypoints.len(), 2);
        assert_eq!(waypoints[0].gripper, GripperState::Open);
        assert_eq!(waypoints[1].z, -5.0);

        assert!(load_sequence("/nonexistent/seq.json").is_err());
    }

    #[test]
    fn test_pick_place_plans_ten_waypoints() {
        let cli = Cli::parse_from(["scara-runtime", "pick-place", "0.25", "0.05"]);
        let waypoints = planned_waypoints(&cli.command).unwrap().unwrap();
        assert_eq!(waypoints.len(), 10);
    }

    #[test]
    fn test_execute_move_then_home() {
        let mut arm = coordinator(&["Movement Done\n", "Movement Done\n"]);
        let cli = Cli::parse_from(["scara-runtime", "move", "0.2", "0.1", "--z", "-3"]);
        execute(&mut arm, &cli.command, None).unwrap();
        assert_eq!(arm.pose().z, -3.0);

        let cli = Cli::parse_from(["scara-runtime", "home"]);
        execute(&mut arm, &cli.command, None).unwrap();
        assert_eq!(arm.pose(), Pose::default());
    }

    #[test]
    fn test_execute_surfaces_move_failure() {
        let mut arm = coordinator(&[]);
        let cli = Cli::parse_from(["scara-runtime", "move", "0.2", "0.1"]);
        let err = execute(&mut arm, &cli.command, None).unwrap_err();
        assert!(err.to_string().contains("no acknowledgment"));
    }

    #[test]
    fn test_finish_keeps_command_error_over_close_error() {
        let config = ArmConfig::reference();
        let unplugged = || {
            let link = LinkProtocol::new(UnpluggedPort, AckPolicy::from_config(&config.link));
            MotionCoordinator::new(&config, link)
        };

        let err = finish(unplugged(), Err("waypoint 2 failed".into())).unwrap_err();
        assert_eq!(err.to_string(), "waypoint 2 failed");

        // with nothing else to report the close failure surfaces
        let err = finish(unplugged(), Ok(())).unwrap_err();
        assert!(err.to_string().contains("device unplugged"));
    }

    #[test]
    fn test_finish_passes_through_on_clean_close() {
        let arm = coordinator(&[]);
        assert!(finish(arm, Ok(())).is_ok());
        let arm = coordinator(&[]);
        assert!(finish(arm, Err("boom".into())).is_err());
    }
}
