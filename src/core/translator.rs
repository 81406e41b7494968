//! Command to controller opcode translation
//!
//! The table is the single source of truth for what reaches the controller.
//! Every [`Command`] variant has a translation, `Place` being the only one that
//! can be rejected.

use super::command::Command;
use super::error::GatewayError;
use crate::config::OpcodeConfig;
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::warn;

/// Rooms served by the robot
pub const ROOMS: std::ops::RangeInclusive<u16> = 1..=4;
/// Beds per room
pub const BEDS: std::ops::RangeInclusive<u16> = 1..=4;
/// Compartments on the robot
pub const COMPARTMENTS: std::ops::RangeInclusive<u8> = 1..=3;

/// Every known `room * 100 + bed` location, in ascending order
pub fn known_locations() -> impl Iterator<Item = u16> {
    ROOMS.flat_map(|room| BEDS.map(move |bed| room * 100 + bed))
}

/// Check whether a `room_bed` value names a known location
pub fn is_known_location(room_bed: u16) -> bool {
    ROOMS.contains(&(room_bed / 100)) && BEDS.contains(&(room_bed % 100))
}

/// Lookup table from commands to controller opcodes
#[derive(Debug, Clone)]
pub struct OpcodeTable {
    clear: Bytes,
    start: Bytes,
    extra: Bytes,
    locations: BTreeMap<u16, Bytes>,
    compartments: [Bytes; 3],
}

impl OpcodeTable {
    /// Build the table from configuration
    ///
    /// Locations not overridden in the configuration use their decimal text.
    pub fn from_config(config: &OpcodeConfig) -> Result<Self, GatewayError> {
        let non_empty = |name: &str, value: &str| {
            if value.is_empty() {
                Err(GatewayError::Config(format!("opcode `{name}` is empty")))
            } else {
                Ok(Bytes::copy_from_slice(value.as_bytes()))
            }
        };

        if config.compartments.len() != COMPARTMENTS.len() {
            return Err(GatewayError::Config(format!(
                "expected {} compartment opcodes, got {}",
                COMPARTMENTS.len(),
                config.compartments.len()
            )));
        }

        let mut locations = BTreeMap::new();
        for room_bed in known_locations() {
            locations.insert(room_bed, Bytes::from(room_bed.to_string()));
        }
        for (key, value) in &config.locations {
            let room_bed: u16 = key
                .parse()
                .ok()
                .filter(|value| is_known_location(*value))
                .ok_or_else(|| GatewayError::Config(format!("unknown location `{key}`")))?;
            locations.insert(room_bed, non_empty(key, value)?);
        }

        Ok(Self {
            clear: non_empty("clear", &config.clear)?,
            start: non_empty("start", &config.start)?,
            extra: non_empty("extra", &config.extra)?,
            locations,
            compartments: [
                non_empty("compartment 1", &config.compartments[0])?,
                non_empty("compartment 2", &config.compartments[1])?,
                non_empty("compartment 3", &config.compartments[2])?,
            ],
        })
    }

    /// Opcode for a location, if known
    pub fn location(&self, room_bed: u16) -> Option<&Bytes> {
        self.locations.get(&room_bed)
    }

    /// Opcode for a compartment, if known
    pub fn compartment(&self, compartment: u8) -> Option<&Bytes> {
        if COMPARTMENTS.contains(&compartment) {
            self.compartments.get(usize::from(compartment - 1))
        } else {
            None
        }
    }

    /// Translate a command into the frames to write, in order
    pub fn translate(&self, command: &Command) -> Result<Vec<Bytes>, GatewayError> {
        match command {
            Command::Clear => Ok(vec![self.clear.clone()]),
            Command::Start => Ok(vec![self.start.clone()]),
            Command::Extra(_) => Ok(vec![self.extra.clone()]),
            Command::Disconnect => Ok(Vec::new()),
            Command::Place {
                room_bed,
                compartment,
            } => match (self.location(*room_bed), self.compartment(*compartment)) {
                (Some(location), Some(slot)) => Ok(vec![location.clone(), slot.clone()]),
                _ => {
                    warn!(room_bed, compartment, "Location or compartment not in opcode table");
                    Err(GatewayError::UnrecognizedCommand(command.to_string()))
                }
            },
        }
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self {
            clear: Bytes::from_static(b"CLEAR"),
            start: Bytes::from_static(b"START"),
            extra: Bytes::from_static(b"EXTRA"),
            locations: known_locations()
                .map(|room_bed| (room_bed, Bytes::from(room_bed.to_string())))
                .collect(),
            compartments: [
                Bytes::from_static(b"P1"),
                Bytes::from_static(b"P2"),
                Bytes::from_static(b"P3"),
            ],
        }
    }
}
