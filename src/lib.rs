//! # CareBot Gateway Core Library
//!
//! A TCP gateway in front of a serial-connected delivery robot controller:
//! - Many operator clients send route commands over TCP
//! - Commands are translated to controller opcodes and written to the one
//!   shared serial link without interleaving
//! - Lines the controller prints on its own are relayed to every client
//!
//! ## Example
//!
//! ```rust,no_run
//! use carebot_core::{Gateway, GatewayConfig, VirtualLink};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GatewayConfig::default();
//!     let (link, controller) = VirtualLink::pair();
//!     controller.set_echo(true);
//!
//!     let gateway = Gateway::new(&config, Some(Box::new(link)))?;
//!     let listener = gateway.bind().await?;
//!     gateway.serve(listener).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod utils;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::{ConfigError, GatewayConfig};
pub use crate::core::command::Command;
pub use crate::core::error::{GatewayError, GatewayResult};
pub use crate::core::listener::Gateway;
pub use crate::core::registry::{ConnectionRegistry, SessionHandle, SessionId};
pub use crate::core::route::{PlaceOutcome, RouteScope, RouteSelectionSet};
pub use crate::core::session::{ClientSession, Reply, SessionState};
pub use crate::core::translator::OpcodeTable;
pub use crate::core::transport::{
    SerialCoordinator, SerialLink, SerialPortLink, TransportError, VirtualController, VirtualLink,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
