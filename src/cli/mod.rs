//! CLI Module
//!
//! Provides command-line interface functionality including:
//! - Exit codes for automation
//! - The operator console used to stop the gateway

pub mod console;
pub mod exit_codes;

pub use console::{run_console, status_report, ConsoleCommand};
pub use exit_codes::{exit_code_description, CliResult, ExitCodes};
