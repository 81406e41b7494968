//! Gateway error taxonomy

use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised by the gateway components
///
/// Everything except [`GatewayError::Bind`] and [`GatewayError::Config`] is
/// handled at the component that detects it; sessions and the telemetry loop
/// keep running.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed or out-of-range client input
    #[error("Unrecognized command: {0}")]
    UnrecognizedCommand(String),

    /// No controller link, or the link failed mid-run
    #[error("Device unavailable")]
    DeviceUnavailable,

    /// A client stream errored or closed unexpectedly
    #[error("Client I/O error: {0}")]
    ClientIo(#[from] std::io::Error),

    /// Some sessions could not receive a telemetry line and were pruned
    #[error("Broadcast reached {delivered} session(s), pruned {pruned}")]
    BroadcastPartialFailure {
        /// Sessions that received the line
        delivered: usize,
        /// Sessions removed from the registry
        pruned: usize,
    },

    /// The listener socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Short reason sent back to clients in `ERR` acknowledgements
    pub fn client_reason(&self) -> String {
        match self {
            Self::UnrecognizedCommand(input) => format!("unrecognized command: {input}"),
            Self::DeviceUnavailable => "device unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result alias used across the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;
