//! RIB configuration.

use rib_types::{AdminDistance, ProtocolType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, TableError};

/// Name of the terminal table when none is configured.
pub const DEFAULT_FINAL_TABLE: &str = "final";

/// One routing protocol feeding the RIB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Protocol name, also the tag on its routes.
    pub name: String,
    /// IGP or EGP.
    #[serde(rename = "type")]
    pub protocol_type: ProtocolType,
    /// Overrides the well-known default for `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_distance: Option<AdminDistance>,
    /// Gate routes on next-hop reachability. Defaults to on for EGP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_nexthops: Option<bool>,
}

impl ProtocolConfig {
    /// Creates a protocol entry with defaults.
    pub fn new(name: impl Into<String>, protocol_type: ProtocolType) -> Self {
        Self {
            name: name.into(),
            protocol_type,
            admin_distance: None,
            resolve_nexthops: None,
        }
    }

    /// Sets an explicit admin distance.
    pub fn with_admin_distance(mut self, distance: AdminDistance) -> Self {
        self.admin_distance = Some(distance);
        self
    }

    /// Turns next-hop resolution on or off.
    pub fn with_resolve_nexthops(mut self, resolve: bool) -> Self {
        self.resolve_nexthops = Some(resolve);
        self
    }

    /// The admin distance routes of this protocol get.
    pub fn effective_admin_distance(&self) -> AdminDistance {
        self.admin_distance
            .unwrap_or_else(|| AdminDistance::for_protocol(&self.name))
    }

    /// Whether routes of this protocol wait for next-hop resolution.
    pub fn effective_resolve_nexthops(&self) -> bool {
        self.resolve_nexthops
            .unwrap_or_else(|| self.protocol_type.needs_nexthop_resolution())
    }

    /// Checks the entry on its own.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TableError::invalid_config("protocols.name", "must not be empty"));
        }
        if self.protocol_type.is_igp() && self.resolve_nexthops == Some(true) {
            return Err(TableError::invalid_config(
                format!("protocols.{}.resolve_nexthops", self.name),
                "only egp protocols resolve next hops",
            ));
        }
        Ok(())
    }
}

/// Copy routes of one protocol into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedistConfig {
    /// Source protocol.
    pub from: String,
    /// Target protocol.
    pub into: String,
}

/// Top-level RIB configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RibConfig {
    /// Protocols, in plumbing order.
    pub protocols: Vec<ProtocolConfig>,
    /// Redistribution taps.
    pub redistribute: Vec<RedistConfig>,
    /// Name of the terminal table.
    pub final_table: String,
}

impl Default for RibConfig {
    fn default() -> Self {
        Self {
            protocols: Vec::new(),
            redistribute: Vec::new(),
            final_table: DEFAULT_FINAL_TABLE.to_string(),
        }
    }
}

impl RibConfig {
    /// Checks the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::InvalidConfig`] for empty or duplicate names,
    /// or redistribution naming unknown protocols.
    pub fn validate(&self) -> Result<()> {
        if self.final_table.trim().is_empty() {
            return Err(TableError::invalid_config("final_table", "must not be empty"));
        }

        let mut names = HashSet::new();
        for protocol in &self.protocols {
            protocol.validate()?;
            if !names.insert(protocol.name.as_str()) {
                return Err(TableError::invalid_config(
                    "protocols",
                    format!("duplicate protocol {}", protocol.name),
                ));
            }
        }

        let mut taps = HashSet::new();
        for redist in &self.redistribute {
            for name in [&redist.from, &redist.into] {
                if !names.contains(name.as_str()) {
                    return Err(TableError::invalid_config(
                        "redistribute",
                        format!("unknown protocol {}", name),
                    ));
                }
            }
            if redist.from == redist.into {
                return Err(TableError::invalid_config(
                    "redistribute",
                    format!("{} redistributes into itself", redist.from),
                ));
            }
            if !taps.insert((redist.from.as_str(), redist.into.as_str())) {
                return Err(TableError::invalid_config(
                    "redistribute",
                    format!("duplicate {} -> {}", redist.from, redist.into),
                ));
            }
        }

        Ok(())
    }
}
