//! Serial port link implementation

use super::{LineBuffer, SerialLink, TransportError};
use crate::config::SerialSettings;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// Link to the controller over a real serial port
pub struct SerialPortLink {
    name: String,
    baud_rate: u32,
    port: Box<dyn SerialPort>,
    buffer: LineBuffer,
}

impl SerialPortLink {
    /// Open `name` with the configured line settings (8N1, no flow control)
    pub fn open(name: &str, settings: &SerialSettings) -> Result<Self, TransportError> {
        let port = serialport::new(name, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            // Reads only consume bytes already buffered, so this bounds writes
            .timeout(Duration::from_millis(settings.write_timeout_ms))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(name.to_string()),
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(name.to_string())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        Ok(Self {
            name: name.to_string(),
            baud_rate: settings.baud_rate,
            port,
            buffer: LineBuffer::new(),
        })
    }
}

impl SerialLink for SerialPortLink {
    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()
    }

    fn read_line(&mut self) -> std::io::Result<Option<String>> {
        if let Some(line) = self.buffer.next_line() {
            return Ok(Some(line));
        }

        let available = self.port.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(None);
        }

        let mut chunk = vec![0u8; available.min(super::MAX_TELEMETRY_LINE)];
        match self.port.read(&mut chunk) {
            Ok(0) => Err(std::io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                self.buffer.extend(&chunk[..n]);
                Ok(self.buffer.next_line())
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud (8N1)", self.name, self.baud_rate)
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}
