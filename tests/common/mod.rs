//! In-memory controller used by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use scara_runtime::config::{ArmConfig, MotionConfig};
use scara_runtime::motor::{AckPolicy, LinkProtocol, MotionCoordinator};

pub const DONE: &str = "Received\nMoving\nMovement Done\n";

/// Answers each flushed frame with the next scripted reply. Once the script
/// runs out the controller goes silent.
#[derive(Debug, Default)]
pub struct FakeController {
    pub frames: Vec<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl FakeController {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.as_bytes().to_vec()).collect(),
            ..Self::default()
        }
    }
}

impl Read for FakeController {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.rx.is_empty() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for FakeController {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.tx.is_empty() {
            self.frames.push(std::mem::take(&mut self.tx));
            if let Some(reply) = self.replies.pop_front() {
                self.rx.extend(reply);
            }
        }
        Ok(())
    }
}

/// Reference arm with every sequencing delay removed.
pub fn fast_config() -> ArmConfig {
    ArmConfig {
        motion: MotionConfig::immediate(),
        ..ArmConfig::reference()
    }
}

pub fn coordinator(config: &ArmConfig, replies: &[&str]) -> MotionCoordinator<FakeController> {
    let mut ack = AckPolicy::from_config(&config.link);
    ack.timeout = Duration::from_millis(40);
    ack.poll_interval = Duration::from_millis(1);
    MotionCoordinator::new(config, LinkProtocol::new(FakeController::new(replies), ack))
}

pub fn frames(coordinator: MotionCoordinator<FakeController>) -> Vec<Vec<u8>> {
    match coordinator.into_link().close() {
        Ok(port) => port.frames,
        Err(e) => panic!("close failed: {}", e),
    }
}

pub fn steps_field(frame: &[u8], axis: usize) -> i32 {
    let start = 1 + 4 * axis;
    i32::from_be_bytes([frame[start], frame[start + 1], frame[start + 2], frame[start + 3]])
}
