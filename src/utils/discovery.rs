//! Controller discovery
//!
//! Opens the configured controller port, or the first enumerated port that
//! accepts the connection, and waits for the board to come out of reset.

use crate::config::SerialSettings;
use crate::core::transport::{list_ports, SerialPortLink, TransportError};
use std::time::Duration;
use tracing::{info, warn};

/// Ports to try, in order
///
/// A configured port is the only candidate; otherwise every enumerated port
/// is tried in the order the host lists them.
pub fn candidate_ports(settings: &SerialSettings) -> Result<Vec<String>, TransportError> {
    if let Some(port) = &settings.port {
        return Ok(vec![port.clone()]);
    }

    let names: Vec<String> = list_ports()?.into_iter().map(|p| p.port_name).collect();
    if names.is_empty() {
        return Err(TransportError::NoPorts);
    }
    Ok(names)
}

/// Open the controller link on the first port that accepts the connection
///
/// Returns `None` when no port is available or none can be opened; the
/// gateway then runs without a device.
pub async fn connect_controller(settings: &SerialSettings) -> Option<SerialPortLink> {
    let ports = match candidate_ports(settings) {
        Ok(ports) => ports,
        Err(e) => {
            warn!("No controller: {}", e);
            return None;
        }
    };

    for port in ports {
        info!("Connecting to controller on {}", port);
        match open_port(port.clone(), settings.clone()).await {
            Ok(link) => {
                tokio::time::sleep(Duration::from_millis(settings.settle_ms)).await;
                info!("Controller connected on {}", port);
                return Some(link);
            }
            Err(e) => warn!("Failed to open {}: {}", port, e),
        }
    }

    warn!("No controller port could be opened");
    None
}

async fn open_port(port: String, settings: SerialSettings) -> Result<SerialPortLink, TransportError> {
    tokio::task::spawn_blocking(move || SerialPortLink::open(&port, &settings))
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
}
