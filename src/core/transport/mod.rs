//! Controller link layer
//!
//! Provides:
//! - The [`SerialLink`] abstraction over the single byte stream to the controller
//! - A serialport backed link for real hardware
//! - A virtual controller for simulation and tests
//! - The [`SerialCoordinator`] serializing writers against the telemetry reader

mod coordinator;
mod serial;
mod virtual_link;

pub use coordinator::{LinkStats, SerialCoordinator};
pub use serial::{list_ports, SerialPortLink};
pub use virtual_link::{VirtualController, VirtualLink};

use thiserror::Error;

/// Longest telemetry line kept before it is flushed without a terminator
pub const MAX_TELEMETRY_LINE: usize = 4096;

/// Link setup errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// No serial ports enumerated
    #[error("No serial ports found")]
    NoPorts,

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A byte-stream connection to the controller
///
/// Implementations are driven from blocking threads and are never called
/// concurrently; the coordinator owns the only instance.
#[cfg_attr(test, mockall::automock)]
pub trait SerialLink: Send {
    /// Write one complete frame
    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()>;

    /// Return the next complete line, or `None` when nothing is pending
    ///
    /// Must not wait for data to arrive.
    fn read_line(&mut self) -> std::io::Result<Option<String>>;

    /// Human readable description for logs
    fn describe(&self) -> String;
}

/// Splits inbound bytes into text lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Pop the next non-empty line, trimmed of surrounding whitespace
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let end = match self.pending.iter().position(|&b| b == b'\n') {
                Some(pos) => pos + 1,
                None if self.pending.len() >= MAX_TELEMETRY_LINE => MAX_TELEMETRY_LINE,
                None => return None,
            };
            let raw: Vec<u8> = self.pending.drain(..end).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }

    /// Bytes waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
