//! Port and slot identifiers (`chassis/slot/port`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Identifier of a slot, displayed as `chassis/slot`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId {
    pub chassis: u8,
    pub slot: u8,
}

/// Identifier of a port, displayed as `chassis/slot/port`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId {
    pub chassis: u8,
    pub slot: u8,
    pub port: u16,
}

impl SlotId {
    pub fn new(chassis: u8, slot: u8) -> Self {
        Self { chassis, slot }
    }

    /// Port `port` on this slot.
    pub fn port(&self, port: u16) -> PortId {
        PortId::new(self.chassis, self.slot, port)
    }
}

impl PortId {
    pub fn new(chassis: u8, slot: u8, port: u16) -> Self {
        Self {
            chassis,
            slot,
            port,
        }
    }

    pub fn slot_id(&self) -> SlotId {
        SlotId::new(self.chassis, self.slot)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chassis, self.slot)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.chassis, self.slot, self.port)
    }
}

fn parse_parts(s: &str) -> Option<Vec<u16>> {
    s.trim()
        .split('/')
        .map(|part| part.trim().parse::<u16>().ok())
        .collect()
}

impl FromStr for SlotId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidPortId(s.to_string());
        match parse_parts(s).as_deref() {
            Some([chassis, slot]) => Ok(SlotId::new(
                u8::try_from(*chassis).map_err(|_| invalid())?,
                u8::try_from(*slot).map_err(|_| invalid())?,
            )),
            _ => Err(invalid()),
        }
    }
}

impl FromStr for PortId {
    type Err = ParseError;

    /// Parses `1/1/12`; a bare `slot/port` is read as chassis 1.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidPortId(s.to_string());
        let narrow = |v: u16| u8::try_from(v).map_err(|_| invalid());
        match parse_parts(s).as_deref() {
            Some([chassis, slot, port]) => Ok(PortId::new(narrow(*chassis)?, narrow(*slot)?, *port)),
            Some([slot, port]) => Ok(PortId::new(1, narrow(*slot)?, *port)),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_id() {
        let id: PortId = "1/2/14".parse().unwrap();
        assert_eq!(id, PortId::new(1, 2, 14));
        assert_eq!(id.to_string(), "1/2/14");
        assert_eq!(id.slot_id(), SlotId::new(1, 2));
    }

    #[test]
    fn test_parse_short_port_id() {
        let id: PortId = " 3/7 ".parse().unwrap();
        assert_eq!(id, PortId::new(1, 3, 7));
    }

    #[test]
    fn test_parse_invalid_ids() {
        assert!("1/a/3".parse::<PortId>().is_err());
        assert!("".parse::<PortId>().is_err());
        assert!("1/2/3".parse::<SlotId>().is_err());
        assert!("300/1".parse::<SlotId>().is_err());
    }
}
