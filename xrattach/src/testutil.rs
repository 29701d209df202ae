//! Scripted test doubles shared by the protocol and bring-up tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::platform::{PowerControl, WakeControl};
use crate::port::{Clear, Port};
use crate::protocol::brom::{HEADER_LEN, MAGIC, flags};
use crate::protocol::checksum;

/// One scripted read outcome.
enum ReadStep {
    /// Serve these bytes (possibly over several reads).
    Data(Vec<u8>),
    /// Pretend the read timed out.
    TimedOut,
}

/// A serial port fed from a script of read steps.
///
/// Reads pull from the front of the script; once it is exhausted every
/// read times out, which is what a silent chip looks like.
pub struct MockPort {
    reads: VecDeque<ReadStep>,
    pending: VecDeque<u8>,
    /// Everything the code under test wrote.
    pub written: Vec<u8>,
    /// How many times the input buffer was cleared.
    pub cleared_input: usize,
    /// History of baud rates set on the port.
    pub baud_changes: Vec<u32>,
    /// History of flow-control switches.
    pub flow_control: Vec<bool>,
    baud: u32,
    timeout: Duration,
}

impl MockPort {
    pub fn new() -> Self {
        Self {
            reads: VecDeque::new(),
            pending: VecDeque::new(),
            written: Vec::new(),
            cleared_input: 0,
            baud_changes: Vec::new(),
            flow_control: Vec::new(),
            baud: 115200,
            timeout: Duration::from_millis(1000),
        }
    }

    /// Queue bytes to be served by upcoming reads.
    pub fn push_read(&mut self, data: Vec<u8>) {
        self.reads.push_back(ReadStep::Data(data));
    }

    /// Queue a read that times out.
    pub fn push_timeout(&mut self) {
        self.reads.push_back(ReadStep::TimedOut);
    }

    /// Queue `count` reads that time out.
    pub fn push_timeouts(&mut self, count: usize) {
        for _ in 0..count {
            self.push_timeout();
        }
    }

    /// Whether the code under test consumed the whole read script.
    pub fn reads_exhausted(&self) -> bool {
        self.reads.is_empty() && self.pending.is_empty()
    }
}

impl Default for MockPort {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.reads.pop_front() {
                Some(ReadStep::Data(data)) => self.pending.extend(data),
                Some(ReadStep::TimedOut) | None => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
                },
            }
        }
        let n = buf.len().min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.pending.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.baud = baud_rate;
        self.baud_changes.push(baud_rate);
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn clear(&mut self, direction: Clear) -> Result<()> {
        if matches!(direction, Clear::Input | Clear::All) {
            self.cleared_input += 1;
        }
        Ok(())
    }

    fn set_flow_control(&mut self, enabled: bool) -> Result<()> {
        self.flow_control.push(enabled);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Power control that records every transition.
#[derive(Default)]
pub struct MockPower {
    /// Sequence of `set_power` arguments.
    pub transitions: Vec<bool>,
}

impl PowerControl for MockPower {
    fn set_power(&mut self, on: bool) -> Result<()> {
        self.transitions.push(on);
        Ok(())
    }
}

/// Wake control that records every call.
#[derive(Default)]
pub struct MockWake {
    pub wake_actions: Vec<crate::platform::lpm::WakeAction>,
    pub lpm_states: Vec<bool>,
}

impl WakeControl for MockWake {
    fn set_wake(&mut self, action: crate::platform::lpm::WakeAction) -> Result<()> {
        self.wake_actions.push(action);
        Ok(())
    }

    fn set_lpm(&mut self, enabled: bool) -> Result<()> {
        self.lpm_states.push(enabled);
        Ok(())
    }
}

fn response_header(flag_bits: u8, payload_len: u32) -> [u8; HEADER_LEN] {
    let mut image = [0u8; HEADER_LEN];
    image[0..4].copy_from_slice(&MAGIC);
    image[4] = flag_bits;
    image[8..12].copy_from_slice(&payload_len.to_le_bytes());
    let cs = checksum::checksum(&image);
    image[6..8].copy_from_slice(&cs.to_le_bytes());
    // host order to wire order
    image[6..8].reverse();
    image[8..12].reverse();
    image
}

/// A well-formed acknowledgment header.
pub fn ack_frame() -> [u8; HEADER_LEN] {
    response_header(flags::ACK | flags::CHECK, 0)
}

/// An acknowledgment that wrongly announces a payload.
pub fn ack_frame_with_payload_len(len: u32) -> [u8; HEADER_LEN] {
    response_header(flags::ACK | flags::CHECK, len)
}

/// An error response carrying the given error code byte.
pub fn error_frame(code: u8) -> Vec<u8> {
    let mut frame = response_header(flags::ERROR | flags::CHECK, 1).to_vec();
    frame.push(code);
    frame
}

/// Flip one bit in the checksum field of a wire header.
pub fn corrupt_checksum(mut frame: [u8; HEADER_LEN]) -> [u8; HEADER_LEN] {
    frame[6] ^= 0x01;
    frame
}
