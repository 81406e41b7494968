//! Core module containing the gateway functionality
//!
//! This module provides:
//! - Controller link layer and the serial transport coordinator
//! - Client command decoding and opcode translation
//! - Route selection state
//! - Connection registry and telemetry fan-out
//! - Client session handling and the TCP listener
//! - Tracing setup

pub mod command;
pub mod context;
pub mod error;
pub mod listener;
pub mod logger;
pub mod registry;
pub mod route;
pub mod session;
pub mod telemetry;
pub mod translator;
pub mod transport;
