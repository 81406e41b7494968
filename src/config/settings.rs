//! Gateway settings

use crate::core::command::DEFAULT_DISCONNECT_MESSAGE;
use crate::core::route::RouteScope;
use crate::core::translator::OpcodeTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Client listener settings
    pub server: ServerConfig,
    /// Controller link settings
    pub serial: SerialSettings,
    /// Client protocol settings
    pub protocol: ProtocolConfig,
    /// Controller opcodes
    pub opcodes: OpcodeConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Load config from `path`, or from the default location when `None`
    ///
    /// A missing file at the default location yields the defaults; an
    /// explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match super::config_file() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check values the type system cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind_addr()?;
        if self.server.max_line_length == 0 {
            return Err(ConfigError::Invalid("server.max_line_length must be > 0".into()));
        }
        if self.server.outbound_queue == 0 {
            return Err(ConfigError::Invalid("server.outbound_queue must be > 0".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("serial.baud_rate must be > 0".into()));
        }
        if self.serial.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid("serial.write_timeout_ms must be > 0".into()));
        }
        if self.serial.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("serial.poll_interval_ms must be > 0".into()));
        }
        if self.protocol.disconnect_message.trim().is_empty() {
            return Err(ConfigError::Invalid("protocol.disconnect_message is empty".into()));
        }
        OpcodeTable::from_config(&self.opcodes)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}

/// Client listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Longest accepted client line in bytes
    pub max_line_length: usize,
    /// Outbound lines buffered per client
    pub outbound_queue: usize,
}

impl ServerConfig {
    /// Parsed bind address
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.host `{}` is not an IP address", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 65432,
            max_line_length: 1024,
            outbound_queue: 256,
        }
    }
}

/// Controller link settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port to open instead of the first discovered one
    pub port: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Wait after opening, the board resets when the port opens
    pub settle_ms: u64,
    /// Longest a frame write may block before the link is treated as failed
    pub write_timeout_ms: u64,
    /// Telemetry poll interval
    pub poll_interval_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            settle_ms: 2000,
            write_timeout_ms: 1000,
            poll_interval_ms: 20,
        }
    }
}

/// Client protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Line that ends a session
    pub disconnect_message: String,
    /// Answer each command with `OK`, `READY` or `ERR <reason>`
    pub acknowledge: bool,
    /// Where route selection state lives
    pub route_scope: RouteScope,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            disconnect_message: DEFAULT_DISCONNECT_MESSAGE.to_string(),
            acknowledge: true,
            route_scope: RouteScope::Session,
        }
    }
}

/// Controller opcodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpcodeConfig {
    /// Clear route
    pub clear: String,
    /// Start route
    pub start: String,
    /// Auxiliary instruction
    pub extra: String,
    /// Compartment 1, 2 and 3
    pub compartments: Vec<String>,
    /// Per-location overrides keyed by `room_bed`; others use their number
    pub locations: BTreeMap<String, String>,
}

impl Default for OpcodeConfig {
    fn default() -> Self {
        Self {
            clear: "CLEAR".to_string(),
            start: "START".to_string(),
            extra: "EXTRA".to_string(),
            compartments: vec!["P1".to_string(), "P2".to_string(), "P3".to_string()],
            locations: BTreeMap::new(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.port, 65432);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.protocol.disconnect_message, "!DISCONNECT");
        assert_eq!(config.protocol.route_scope, RouteScope::Session);
    }

    #[test]
    fn test_write_timeout_outlasts_telemetry_poll() {
        let serial = SerialSettings::default();
        assert!(serial.write_timeout_ms >= 1000);
        assert!(serial.write_timeout_ms > serial.poll_interval_ms);

        let mut config = GatewayConfig::default();
        config.serial.write_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 7000

[serial]
port = "/dev/ttyACM0"

[protocol]
route_scope = "gateway"

[opcodes]
compartments = ["1", "2", "3"]

[opcodes.locations]
101 = "1"
"#
        )
        .unwrap();

        let config = GatewayConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.protocol.route_scope, RouteScope::Gateway);
        assert_eq!(config.opcodes.locations.get("101").map(String::as_str), Some("1"));
        assert_eq!(config.opcodes.clear, "CLEAR");
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[opcodes.locations]\n999 = \"X\"").unwrap();
        assert!(matches!(
            GatewayConfig::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nhost = \"not-an-ip\"").unwrap();
        assert!(matches!(
            GatewayConfig::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            GatewayConfig::load(Some(&path)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = GatewayConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: GatewayConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.opcodes.compartments, config.opcodes.compartments);
    }
}
