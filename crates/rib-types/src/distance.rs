//! Administrative distance with per-protocol defaults.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Preference ranking of a route source (0-255, lower wins).
///
/// # Examples
///
/// ```
/// use rib_types::AdminDistance;
///
/// let ospf = AdminDistance::for_protocol("ospf");
/// assert_eq!(ospf.as_u8(), 110);
/// assert!(AdminDistance::STATIC.is_better_than(ospf));
///
/// // Unknown sources get the worst possible distance
/// assert_eq!(AdminDistance::for_protocol("carrier-pigeon"), AdminDistance::UNKNOWN);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct AdminDistance(u8);

impl AdminDistance {
    /// Directly connected networks.
    pub const CONNECTED: AdminDistance = AdminDistance(0);
    /// Statically configured routes.
    pub const STATIC: AdminDistance = AdminDistance(1);
    /// External BGP.
    pub const EBGP: AdminDistance = AdminDistance(20);
    /// OSPF.
    pub const OSPF: AdminDistance = AdminDistance(110);
    /// RIP.
    pub const RIP: AdminDistance = AdminDistance(120);
    /// Internal BGP.
    pub const IBGP: AdminDistance = AdminDistance(200);
    /// Sources nobody configured a distance for.
    pub const UNKNOWN: AdminDistance = AdminDistance(255);

    /// Creates a new admin distance.
    pub const fn new(distance: u8) -> Self {
        AdminDistance(distance)
    }

    /// Returns the distance as a u8.
    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    /// Returns true if routes at this distance win over routes at `other`.
    pub const fn is_better_than(&self, other: AdminDistance) -> bool {
        self.0 < other.0
    }

    /// Returns the default distance for a well-known protocol name.
    pub fn for_protocol(protocol: &str) -> Self {
        let distance = match protocol {
            "connected" => 0,
            "static" => 1,
            "eigrp-summary" => 5,
            "ebgp" => 20,
            "eigrp-internal" => 90,
            "igrp" => 100,
            "ospf" => 110,
            "is-is" => 115,
            "rip" => 120,
            "eigrp-external" => 170,
            "ibgp" => 200,
            "fib2mrib" => 254,
            _ => 255,
        };
        AdminDistance(distance)
    }
}

impl Default for AdminDistance {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for AdminDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AdminDistance {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .map(AdminDistance)
            .map_err(|_| ParseError::InvalidAdminDistance(s.to_string()))
    }
}

impl TryFrom<u32> for AdminDistance {
    type Error = ParseError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map(AdminDistance)
            .map_err(|_| ParseError::InvalidAdminDistance(value.to_string()))
    }
}

impl From<u8> for AdminDistance {
    fn from(distance: u8) -> Self {
        AdminDistance(distance)
    }
}

impl From<AdminDistance> for u32 {
    fn from(distance: AdminDistance) -> u32 {
        distance.0 as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_defaults() {
        assert_eq!(AdminDistance::for_protocol("connected"), AdminDistance::CONNECTED);
        assert_eq!(AdminDistance::for_protocol("static"), AdminDistance::STATIC);
        assert_eq!(AdminDistance::for_protocol("ebgp"), AdminDistance::EBGP);
        assert_eq!(AdminDistance::for_protocol("rip"), AdminDistance::RIP);
        assert_eq!(AdminDistance::for_protocol("ibgp"), AdminDistance::IBGP);
        assert_eq!(AdminDistance::for_protocol("is-is").as_u8(), 115);
        assert_eq!(AdminDistance::for_protocol("nonsense"), AdminDistance::UNKNOWN);
    }

    #[test]
    fn test_ordering() {
        assert!(AdminDistance::STATIC.is_better_than(AdminDistance::EBGP));
        assert!(!AdminDistance::EBGP.is_better_than(AdminDistance::EBGP));
        assert!(AdminDistance::CONNECTED < AdminDistance::UNKNOWN);
    }

    #[test]
    fn test_parse() {
        assert_eq!("20".parse::<AdminDistance>().unwrap(), AdminDistance::EBGP);
        assert!("256".parse::<AdminDistance>().is_err());
        assert!("-1".parse::<AdminDistance>().is_err());
    }

    #[test]
    fn test_serde_bounds() {
        let d: AdminDistance = serde_json::from_str("110").unwrap();
        assert_eq!(d, AdminDistance::OSPF);
        assert!(serde_json::from_str::<AdminDistance>("300").is_err());
        assert_eq!(serde_json::to_string(&AdminDistance::RIP).unwrap(), "120");
    }
}
