//! CLI Exit Codes
//!
//! Process exit codes for the gateway binary.

use crate::config::ConfigError;
use crate::core::error::GatewayError;
use crate::core::logger::LoggingError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Listener could not be bound
    pub const BIND_FAILED: u8 = 3;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Map a fatal startup error to its exit code
    pub fn from_error(err: &anyhow::Error) -> Self {
        let code = if let Some(gateway) = err.downcast_ref::<GatewayError>() {
            match gateway {
                GatewayError::Bind { .. } => ExitCodes::BIND_FAILED,
                GatewayError::Config(_) => ExitCodes::CONFIG_ERROR,
                _ => ExitCodes::INTERNAL_ERROR,
            }
        } else if err.downcast_ref::<ConfigError>().is_some()
            || err.downcast_ref::<LoggingError>().is_some()
        {
            ExitCodes::CONFIG_ERROR
        } else {
            ExitCodes::ERROR
        };
        Self::Error(code, format!("{err:#}"))
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Listener bind failed",
        8 => "Configuration error",
        127 => "Internal error",
        _ => "Unknown error",
    }
}
