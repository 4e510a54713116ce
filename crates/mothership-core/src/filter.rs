//! Filter descriptors selecting which errors a notebook tab displays.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::ErrorRecord;

/// Tagged selector over the rack/chassis/valve hierarchy.
///
/// Equality is structural: two descriptors are equal only when they carry the
/// same tag and the same numbers for that tag. `All` always equals `All`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum FilterDescriptor {
    #[default]
    All,
    Rack {
        rack: u32,
    },
    Chassis {
        rack: u32,
        chassis: u32,
    },
    Valve {
        rack: u32,
        chassis: u32,
        valve: u32,
    },
}

impl FilterDescriptor {
    /// Build the narrowest descriptor for optional rack/chassis/valve numbers.
    ///
    /// Lower levels are ignored when a higher one is missing, so
    /// `from_parts(None, Some(2), None)` is `All`.
    pub fn from_parts(rack: Option<u32>, chassis: Option<u32>, valve: Option<u32>) -> Self {
        match (rack, chassis, valve) {
            (Some(rack), Some(chassis), Some(valve)) => Self::Valve {
                rack,
                chassis,
                valve,
            },
            (Some(rack), Some(chassis), None) => Self::Chassis { rack, chassis },
            (Some(rack), None, _) => Self::Rack { rack },
            (None, _, _) => Self::All,
        }
    }

    /// Human-readable tab title.
    pub fn title(&self) -> String {
        match self {
            Self::All => "All".to_string(),
            Self::Rack { rack } => format!("Rack {rack}"),
            Self::Chassis { rack, chassis } => format!("Rack {rack}, Chassis {chassis}"),
            Self::Valve {
                rack,
                chassis,
                valve,
            } => format!("Rack {rack}, Chassis {chassis}, Valve {valve}"),
        }
    }

    pub fn rack(&self) -> Option<u32> {
        match self {
            Self::All => None,
            Self::Rack { rack } | Self::Chassis { rack, .. } | Self::Valve { rack, .. } => {
                Some(*rack)
            }
        }
    }

    pub fn chassis(&self) -> Option<u32> {
        match self {
            Self::All | Self::Rack { .. } => None,
            Self::Chassis { chassis, .. } | Self::Valve { chassis, .. } => Some(*chassis),
        }
    }

    pub fn valve(&self) -> Option<u32> {
        match self {
            Self::Valve { valve, .. } => Some(*valve),
            _ => None,
        }
    }

    /// Returns true when `record` falls inside this descriptor's scope.
    pub fn matches(&self, record: &ErrorRecord) -> bool {
        match self {
            Self::All => true,
            Self::Rack { rack } => record.rack == *rack,
            Self::Chassis { rack, chassis } => record.rack == *rack && record.chassis == *chassis,
            Self::Valve {
                rack,
                chassis,
                valve,
            } => {
                record.rack == *rack && record.chassis == *chassis && record.valve == Some(*valve)
            }
        }
    }
}

impl fmt::Display for FilterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title())
    }
}
