//! State shared by every gateway task

use super::registry::ConnectionRegistry;
use super::route::RouteSelectionSet;
use super::translator::OpcodeTable;
use super::transport::SerialCoordinator;
use crate::config::ProtocolConfig;
use parking_lot::Mutex;

/// Gateway counters
#[derive(Debug, Clone, Default)]
pub struct GatewayStats {
    /// Client connections accepted
    pub sessions_accepted: u64,
    /// Commands written to the controller
    pub commands_forwarded: u64,
    /// Commands rejected as unrecognized
    pub commands_rejected: u64,
    /// Commands that failed because the device was unavailable
    pub device_failures: u64,
    /// Telemetry lines relayed to clients
    pub telemetry_lines: u64,
}

/// Components shared by the listener, sessions and telemetry loop
pub struct GatewayContext {
    /// Client protocol settings
    pub protocol: ProtocolConfig,
    /// Opcode table
    pub table: OpcodeTable,
    /// Controller link
    pub coordinator: SerialCoordinator,
    /// Live sessions
    pub registry: ConnectionRegistry,
    /// Route selection used when the scope is the whole gateway
    pub shared_route: Mutex<RouteSelectionSet>,
    /// Counters
    pub stats: Mutex<GatewayStats>,
}

impl GatewayContext {
    /// Assemble the shared state
    pub fn new(protocol: ProtocolConfig, table: OpcodeTable, coordinator: SerialCoordinator) -> Self {
        Self {
            protocol,
            table,
            coordinator,
            registry: ConnectionRegistry::new(),
            shared_route: Mutex::new(RouteSelectionSet::new()),
            stats: Mutex::new(GatewayStats::default()),
        }
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> GatewayStats {
        self.stats.lock().clone()
    }
}
