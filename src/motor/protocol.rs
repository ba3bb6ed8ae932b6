// Serial protocol to the motor-control microcontroller
//
// Move frame (18 bytes, big-endian):
//   [0x01, steps_j1: i32, steps_j2: i32, steps_lin: i32,
//    dir_j1, dir_j2, dir_lin, servo1, servo2]
// Servo frame (3 bytes):
//   [0x02, servo1 | 0xFF, servo2 | 0xFF]   (0xFF = leave unchanged)
//
// The controller answers with newline-terminated text and prints a completion
// line once the motors have stopped.

use serialport::{self, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::messages::{AxisCommand, MotorCommand, ServoPositions};

pub const MOVE_FRAME_LEN: usize = 18;
pub const SERVO_FRAME_LEN: usize = 3;

/// Servo byte meaning "keep the current position".
pub const SERVO_UNCHANGED: u8 = 0xFF;

const READ_CHUNK: usize = 256;
// upper bound on reads spent draining a chattering port before a frame
const MAX_STALE_READS: usize = 64;

/// Command type byte
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Move = 0x01,
    Servo = 0x02,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{axis} step count {steps} does not fit in a 32-bit frame field")]
    StepOverflow { axis: &'static str, steps: u64 },
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// How acknowledgments are collected after a frame goes out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub completion_marker: String,
    /// Replies without the marker count as no acknowledgment.
    pub require_completion_marker: bool,
}

impl AckPolicy {
    pub fn from_config(config: &LinkConfig) -> Self {
        Self {
            timeout: config.ack_timeout(),
            poll_interval: config.poll_interval(),
            completion_marker: config.completion_marker.clone(),
            require_completion_marker: config.require_completion_marker,
        }
    }

    /// Whether a reply confirms that the move finished.
    pub fn accepts(&self, lines: &[String]) -> bool {
        if self.require_completion_marker {
            lines.iter().any(|l| l.contains(&self.completion_marker))
        } else {
            !lines.is_empty()
        }
    }
}

/// Serial link to the controller. Generic over the transport so tests can run
/// against an in-memory port; in production `P` is `Box<dyn SerialPort>`.
pub struct LinkProtocol<P> {
    port: P,
    ack: AckPolicy,
    // bytes received but not yet terminated by a newline
    pending: Vec<u8>,
}

impl LinkProtocol<Box<dyn SerialPort>> {
    /// Open the configured serial device and wait for the controller to boot.
    pub fn open(config: &LinkConfig) -> Result<Self> {
        Self::open_with_baudrate(config, config.baud_rate)
    }

    pub fn open_with_baudrate(config: &LinkConfig, baudrate: u32) -> Result<Self> {
        let port = serialport::new(&config.port, baudrate)
            .timeout(config.read_timeout())
            .open()?;
        info!("Connected to {} at {} baud", config.port, baudrate);

        // Opening the port resets most boards; give the firmware time to start
        sleep(config.settle());

        Ok(Self::new(port, AckPolicy::from_config(config)))
    }
}

impl<P: Read + Write> LinkProtocol<P> {
    pub fn new(port: P, ack: AckPolicy) -> Self {
        Self {
            port,
            ack,
            pending: Vec::new(),
        }
    }

    pub fn ack_policy(&self) -> &AckPolicy {
        &self.ack
    }

    /// Send a move frame. Nothing is written if the frame cannot be encoded.
    pub fn send_move(&mut self, command: &MotorCommand) -> Result<()> {
        let frame = encode_move_frame(command)?;
        debug!(
            "Move frame: j1={}(d:{}) j2={}(d:{}) lin={}(d:{}) servos=({}, {})",
            command.joint1.steps,
            command.joint1.dir_byte(),
            command.joint2.steps,
            command.joint2.dir_byte(),
            command.linear.steps,
            command.linear.dir_byte(),
            frame[16],
            frame[17]
        );
        self.send_frame(&frame)
    }

    pub fn send_servo(&mut self, wrist: Option<u16>, gripper: Option<u16>) -> Result<()> {
        let frame = encode_servo_frame(wrist, gripper);
        debug!("Servo frame: {:02X?}", frame);
        self.send_frame(&frame)
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.discard_stale_input()?;
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    /// Drop everything received before the next frame goes out, so a reply
    /// that arrived after an earlier exchange timed out cannot acknowledge the
    /// next one.
    fn discard_stale_input(&mut self) -> Result<()> {
        let mut stale = std::mem::take(&mut self.pending);
        let mut chunk = [0u8; READ_CHUNK];

        for _ in 0..MAX_STALE_READS {
            match self.port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => stale.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        if !stale.is_empty() {
            warn!(
                "Discarded {} stale bytes from controller: {:?}",
                stale.len(),
                String::from_utf8_lossy(&stale).trim()
            );
        }
        Ok(())
    }

    /// Collect reply lines until the completion marker or the timeout.
    ///
    /// An empty result means the controller never answered.
    pub fn read_ack(&mut self) -> Result<Vec<String>> {
        let deadline = Instant::now() + self.ack.timeout;
        let mut lines = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        while Instant::now() < deadline {
            match self.port.read(&mut chunk) {
                Ok(0) => sleep(self.ack.poll_interval),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    while let Some(line) = self.next_line() {
                        debug!("Controller: {}", line);
                        let done = line.contains(&self.ack.completion_marker);
                        lines.push(line);
                        if done {
                            return Ok(lines);
                        }
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    sleep(self.ack.poll_interval)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        if lines.is_empty() {
            warn!("No reply from controller within {:?}", self.ack.timeout);
        } else {
            debug!(
                "Completion marker {:?} not seen within {:?}",
                self.ack.completion_marker, self.ack.timeout
            );
        }
        Ok(lines)
    }

    /// Send a move frame and wait for its acknowledgment.
    pub fn transact_move(&mut self, command: &MotorCommand) -> Result<Vec<String>> {
        self.send_move(command)?;
        self.read_ack()
    }

    pub fn transact_servo(&mut self, wrist: Option<u16>, gripper: Option<u16>) -> Result<Vec<String>> {
        self.send_servo(wrist, gripper)?;
        self.read_ack()
    }

    /// Pop the next complete, non-blank line. Bytes that are not valid UTF-8
    /// are dropped.
    fn next_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let text: String = String::from_utf8_lossy(&raw)
                .chars()
                .filter(|&c| c != char::REPLACEMENT_CHARACTER)
                .collect();
            let text = text.trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
        None
    }

    /// Flush and hand back the transport.
    pub fn close(mut self) -> Result<P> {
        self.port.flush()?;
        info!("Serial link closed");
        Ok(self.port)
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

/// Build a move frame
pub fn encode_move_frame(command: &MotorCommand) -> Result<[u8; MOVE_FRAME_LEN]> {
    let mut frame = [0u8; MOVE_FRAME_LEN];
    frame[0] = CommandType::Move as u8;

    let axes = [
        ("joint1", &command.joint1),
        ("joint2", &command.joint2),
        ("linear", &command.linear),
    ];
    for (i, &(axis, cmd)) in axes.iter().enumerate() {
        let start = 1 + 4 * i;
        frame[start..start + 4].copy_from_slice(&encode_steps(axis, cmd)?.to_be_bytes());
        frame[13 + i] = cmd.dir_byte();
    }

    frame[16] = clamp_servo_byte(command.servos.wrist);
    frame[17] = clamp_servo_byte(command.servos.gripper);
    Ok(frame)
}

/// Build a servo-only frame. `None` leaves that servo where it is.
pub fn encode_servo_frame(wrist: Option<u16>, gripper: Option<u16>) -> [u8; SERVO_FRAME_LEN] {
    let byte = |angle: Option<u16>| match angle {
        Some(a) => a.min(ServoPositions::MAX_DEGREES) as u8,
        None => SERVO_UNCHANGED,
    };
    [CommandType::Servo as u8, byte(wrist), byte(gripper)]
}

fn encode_steps(axis: &'static str, cmd: &AxisCommand) -> Result<i32> {
    i32::try_from(cmd.steps).map_err(|_| LinkError::StepOverflow {
        axis,
        steps: cmd.steps,
    })
}

fn clamp_servo_byte(angle: u16) -> u8 {
    angle.min(u8::MAX as u16) as u8
}
