//! Client command decoding
//!
//! Clients send one command per line:
//! - `Borrar` clears the staged route
//! - `Inicio` starts the staged route
//! - `ComandoExtra [args]` sends the auxiliary instruction
//! - `<room_bed>,<compartment>` stages one compartment for a location
//! - the disconnect sentinel (`!DISCONNECT` by default) ends the session

use super::error::GatewayError;
use std::fmt;

/// Keyword for [`Command::Clear`]
pub const CLEAR_KEYWORD: &str = "Borrar";
/// Keyword for [`Command::Start`]
pub const START_KEYWORD: &str = "Inicio";
/// Keyword prefix for [`Command::Extra`]
pub const EXTRA_KEYWORD: &str = "ComandoExtra";
/// Default disconnect sentinel
pub const DEFAULT_DISCONNECT_MESSAGE: &str = "!DISCONNECT";

/// A decoded client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reset route state
    Clear,
    /// Begin executing the staged route
    Start,
    /// Auxiliary instruction with its (possibly empty) arguments
    Extra(String),
    /// Stage one compartment for a physical location
    Place {
        /// `room * 100 + bed`
        room_bed: u16,
        /// Compartment number
        compartment: u8,
    },
    /// Terminate the session
    Disconnect,
}

impl Command {
    /// Decode one line of client input
    ///
    /// Numeric values are only checked for syntax here; range checks belong
    /// to the opcode table.
    pub fn parse(line: &str, disconnect_message: &str) -> Result<Self, GatewayError> {
        let text = line.trim();

        if text == disconnect_message {
            return Ok(Self::Disconnect);
        }
        if text == CLEAR_KEYWORD {
            return Ok(Self::Clear);
        }
        if text == START_KEYWORD {
            return Ok(Self::Start);
        }
        if let Some(rest) = text.strip_prefix(EXTRA_KEYWORD) {
            return Ok(Self::Extra(rest.trim().to_string()));
        }

        let unrecognized = || GatewayError::UnrecognizedCommand(text.to_string());

        let (room_bed, compartment) = text.split_once(',').ok_or_else(unrecognized)?;
        let room_bed = room_bed.trim().parse::<u16>().map_err(|_| unrecognized())?;
        let compartment = compartment.trim().parse::<u8>().map_err(|_| unrecognized())?;

        Ok(Self::Place {
            room_bed,
            compartment,
        })
    }

    /// Command name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Start => "start",
            Self::Extra(_) => "extra",
            Self::Place { .. } => "place",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clear => write!(f, "{CLEAR_KEYWORD}"),
            Self::Start => write!(f, "{START_KEYWORD}"),
            Self::Extra(args) if args.is_empty() => write!(f, "{EXTRA_KEYWORD}"),
            Self::Extra(args) => write!(f, "{EXTRA_KEYWORD} {args}"),
            Self::Place {
                room_bed,
                compartment,
            } => write!(f, "{room_bed},{compartment}"),
            Self::Disconnect => write!(f, "disconnect"),
        }
    }
}
