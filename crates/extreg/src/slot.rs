//! Reserved extension slots and the device/stream/event value types that
//! backend implementations operate on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Reserved extension identifier shared by all backends bound to it in a
/// given process.
///
/// The host runtime hardwires exactly these identifiers into its dispatch
/// tables; a vendor backend claims one of them at initialization time instead
/// of adding a new enumerated case to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    PrivateUse1,
    PrivateUse2,
    PrivateUse3,
}

impl Slot {
    /// All reserved slots, in dispatch order.
    pub const ALL: [Slot; 3] = [Slot::PrivateUse1, Slot::PrivateUse2, Slot::PrivateUse3];

    /// Reserved lowercase identifier used in messages and default device
    /// strings before a friendly name is bound.
    pub fn reserved_name(self) -> &'static str {
        match self {
            Slot::PrivateUse1 => "privateuse1",
            Slot::PrivateUse2 => "privateuse2",
            Slot::PrivateUse3 => "privateuse3",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Slot::PrivateUse1 => 0,
            Slot::PrivateUse2 => 1,
            Slot::PrivateUse3 => 2,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reserved_name())
    }
}

impl FromStr for Slot {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "privateuse1" => Ok(Slot::PrivateUse1),
            "privateuse2" => Ok(Slot::PrivateUse2),
            "privateuse3" => Ok(Slot::PrivateUse3),
            other => Err(RegistryError::unknown_name(other)),
        }
    }
}

/// Zero-based ordinal of a physical device within one slot's backend.
pub type DeviceIndex = u16;

/// A slot paired with a device ordinal, the address every registry resolves
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub slot: Slot,
    pub index: DeviceIndex,
}

impl Device {
    pub fn new(slot: Slot, index: DeviceIndex) -> Self {
        Self { slot, index }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.slot, self.index)
    }
}

/// Opaque stream identifier owned by a backend's guard implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub u64);

/// Opaque event identifier owned by a backend's guard implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_names_round_trip() {
        for slot in Slot::ALL {
            assert_eq!(slot.reserved_name().parse::<Slot>().unwrap(), slot);
        }
        assert!("cuda".parse::<Slot>().is_err());
    }

    #[test]
    fn device_display() {
        let device = Device::new(Slot::PrivateUse1, 2);
        assert_eq!(device.to_string(), "privateuse1:2");
    }
}
