//! Configuration module
//!
//! Handles gateway settings loaded from TOML

mod settings;

pub use settings::{
    ConfigError, GatewayConfig, LoggingConfig, OpcodeConfig, ProtocolConfig, SerialSettings,
    ServerConfig,
};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the gateway configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "carebot", "CareBot Gateway")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default config file location
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
