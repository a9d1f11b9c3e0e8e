//! Route source classification.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a routing protocol is interior or exterior.
///
/// IGP next hops are always immediate neighbors, so IGP routes never need
/// next-hop resolution. EGP next hops may be several hops away and have to
/// be resolved through the IGP routes before they can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Interior gateway protocol (static, connected, OSPF, RIP, ...).
    Igp,
    /// Exterior gateway protocol (BGP).
    Egp,
}

impl ProtocolType {
    /// Returns true for interior protocols.
    pub const fn is_igp(&self) -> bool {
        matches!(self, ProtocolType::Igp)
    }

    /// Returns true if routes of this class need their next hop resolved.
    pub const fn needs_nexthop_resolution(&self) -> bool {
        matches!(self, ProtocolType::Egp)
    }

    /// Returns the type as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProtocolType::Igp => "igp",
            ProtocolType::Egp => "egp",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "igp" => Ok(ProtocolType::Igp),
            "egp" => Ok(ProtocolType::Egp),
            _ => Err(ParseError::InvalidProtocolType(s.to_string())),
        }
    }
}
