//! Virtual controller
//!
//! An in-memory stand-in for the serial controller. The [`VirtualLink`] half
//! is handed to the coordinator; the [`VirtualController`] half stays with the
//! caller to inject telemetry, inspect written frames and inject failures.

use super::{LineBuffer, SerialLink};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct VirtualState {
    written: Vec<Bytes>,
    inbound: LineBuffer,
    fail_writes: bool,
    fail_reads: bool,
    echo: bool,
    write_delay: Duration,
}

/// Link half of a virtual controller
pub struct VirtualLink {
    state: Arc<Mutex<VirtualState>>,
}

/// Control half of a virtual controller
#[derive(Clone)]
pub struct VirtualController {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualLink {
    /// Create a connected link/controller pair
    pub fn pair() -> (Self, VirtualController) {
        let state = Arc::new(Mutex::new(VirtualState::default()));
        (
            Self {
                state: state.clone(),
            },
            VirtualController { state },
        )
    }
}

impl SerialLink for VirtualLink {
    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        let delay = {
            let state = self.state.lock();
            if state.fail_writes {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "virtual controller disconnected",
                ));
            }
            state.write_delay
        };

        // Lock released while sleeping so the controller half stays usable
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        state.written.push(Bytes::copy_from_slice(frame));
        if state.echo {
            let mut line = b"RX ".to_vec();
            line.extend_from_slice(frame);
            line.push(b'\n');
            state.inbound.extend(&line);
        }
        Ok(())
    }

    fn read_line(&mut self) -> std::io::Result<Option<String>> {
        let mut state = self.state.lock();
        if state.fail_reads {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "virtual controller disconnected",
            ));
        }
        Ok(state.inbound.next_line())
    }

    fn describe(&self) -> String {
        "virtual controller".to_string()
    }
}

impl VirtualController {
    /// Queue one telemetry line as if the controller had printed it
    pub fn inject_line(&self, line: &str) {
        let mut state = self.state.lock();
        state.inbound.extend(line.as_bytes());
        state.inbound.extend(b"\n");
    }

    /// Queue raw bytes, which may contain partial lines
    pub fn inject_bytes(&self, data: &[u8]) {
        self.state.lock().inbound.extend(data);
    }

    /// Frames written so far, in order
    pub fn written(&self) -> Vec<Bytes> {
        self.state.lock().written.clone()
    }

    /// Number of frames written so far
    pub fn written_count(&self) -> usize {
        self.state.lock().written.len()
    }

    /// Make every following write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Make every following read fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// Answer every written frame with an `RX <frame>` telemetry line
    pub fn set_echo(&self, echo: bool) {
        self.state.lock().echo = echo;
    }

    /// Delay applied to each frame write
    pub fn set_write_delay(&self, delay: Duration) {
        self.state.lock().write_delay = delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_writes_and_serves_lines() {
        let (mut link, controller) = VirtualLink::pair();
        link.write_frame(b"START").unwrap();
        assert_eq!(controller.written(), vec![Bytes::from("START")]);

        assert_eq!(link.read_line().unwrap(), None);
        controller.inject_bytes(b"BAT ");
        assert_eq!(link.read_line().unwrap(), None);
        controller.inject_bytes(b"90\n");
        assert_eq!(link.read_line().unwrap().as_deref(), Some("BAT 90"));
    }

    #[test]
    fn test_echo() {
        let (mut link, controller) = VirtualLink::pair();
        controller.set_echo(true);
        link.write_frame(b"P2").unwrap();
        assert_eq!(link.read_line().unwrap().as_deref(), Some("RX P2"));
    }

    #[test]
    fn test_failures() {
        let (mut link, controller) = VirtualLink::pair();
        controller.set_fail_writes(true);
        assert!(link.write_frame(b"CLEAR").is_err());
        assert_eq!(controller.written_count(), 0);

        controller.set_fail_reads(true);
        assert!(link.read_line().is_err());
    }
}
