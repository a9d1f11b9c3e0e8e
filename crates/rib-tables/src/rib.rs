//! Plumbing a pipeline for a set of routing protocols.
//!
//! ```text
//!  static   rip            ebgp            ibgp
//!    |       |               |               |
//!    |       |           NhLookup        NhLookup
//!     Merged                 |               |
//!       |  (IGP head)          Merged  (EGP head)
//!       |                        |
//!        ------ Merged ----------
//!                 |
//!               final
//! ```
//!
//! Protocols of the same class are merged into a chain. The first protocol
//! of a class joins whatever the other class produced. The result feeds a
//! single [`LogTable`](crate::LogTable) holding the installed routes.

use ipnet::IpNet;
use log::{info, warn};
use rib_types::{AdminDistance, ProtocolType};
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::config::{ProtocolConfig, RibConfig};
use crate::error::{Result, TableError};
use crate::pipeline::{Pipeline, TableInfo};
use crate::resolver::{ResolutionNotice, RibResolver};
use crate::route::{RouteEntry, RouteRange};
use crate::table::{Outcome, RouteEvent, TableId};

/// Tables created for one protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolTables {
    pub protocol_type: ProtocolType,
    pub origin: TableId,
    pub nhlookup: Option<TableId>,
    /// The table this protocol's routes leave through.
    pub tail: TableId,
}

/// A routing information base.
#[derive(Debug)]
pub struct Rib {
    pipeline: Pipeline,
    resolver: RibResolver,
    final_name: String,
    protocols: BTreeMap<String, ProtocolTables>,
    igp_head: Option<TableId>,
    egp_head: Option<TableId>,
    head: Option<TableId>,
    final_table: Option<TableId>,
}

impl Rib {
    /// Builds the pipeline described by `config`.
    pub fn new(config: &RibConfig) -> Result<Self> {
        config.validate()?;

        let mut rib = Self {
            pipeline: Pipeline::new(),
            resolver: RibResolver::new(),
            final_name: config.final_table.clone(),
            protocols: BTreeMap::new(),
            igp_head: None,
            egp_head: None,
            head: None,
            final_table: None,
        };

        for protocol in &config.protocols {
            rib.add_protocol(protocol)?;
        }
        for redist in &config.redistribute {
            rib.add_redistribution(&redist.from, &redist.into)?;
        }

        info!(
            "Rib: Initialized with {} protocols, {} tables",
            rib.protocols.len(),
            rib.pipeline.len()
        );
        Ok(rib)
    }

    /// Plumbs a new protocol in.
    ///
    /// Protocols of the same class are merged in the order they are added,
    /// the earlier one as the preferred parent. Where the IGP and EGP sides
    /// join, the IGP side is always the preferred parent, whichever class
    /// was added first.
    ///
    /// Routes already installed are not replayed through the new tables.
    pub fn add_protocol(&mut self, config: &ProtocolConfig) -> Result<ProtocolTables> {
        config.validate()?;
        if self.protocols.contains_key(&config.name) {
            return Err(TableError::DuplicateProtocol(config.name.clone()));
        }

        let origin = self.pipeline.add_origin(
            &config.name,
            config.effective_admin_distance(),
            config.protocol_type,
        );

        let nhlookup = if config.effective_resolve_nexthops() {
            Some(
                self.pipeline
                    .add_nhlookup(origin, Box::new(self.resolver.clone()))?,
            )
        } else {
            None
        };
        let tail = nhlookup.unwrap_or(origin);

        let class_head = match config.protocol_type {
            ProtocolType::Igp => self.igp_head,
            ProtocolType::Egp => self.egp_head,
        };
        let new_class_head = match (class_head, self.head) {
            (Some(existing), head) => {
                let merged = self.pipeline.add_merged(existing, tail)?;
                if head == Some(existing) {
                    self.head = Some(merged);
                }
                merged
            }
            (None, Some(head)) => {
                // IGP routes win equal-distance ties against EGP ones
                let (a, b) = match config.protocol_type {
                    ProtocolType::Igp => (tail, head),
                    ProtocolType::Egp => (head, tail),
                };
                let joined = self.pipeline.add_merged(a, b)?;
                self.head = Some(joined);
                tail
            }
            (None, None) => {
                self.final_table = Some(self.pipeline.add_log(&self.final_name, tail)?);
                self.head = Some(tail);
                tail
            }
        };
        match config.protocol_type {
            ProtocolType::Igp => self.igp_head = Some(new_class_head),
            ProtocolType::Egp => self.egp_head = Some(new_class_head),
        }

        let tables = ProtocolTables {
            protocol_type: config.protocol_type,
            origin,
            nhlookup,
            tail,
        };
        info!(
            "Rib: Added {} protocol {} (distance {})",
            config.protocol_type,
            config.name,
            config.effective_admin_distance()
        );
        self.protocols.insert(config.name.clone(), tables);
        Ok(tables)
    }

    /// Copies every route of `from` into `into`.
    pub fn add_redistribution(&mut self, from: &str, into: &str) -> Result<TableId> {
        let source = self.tables(from)?.origin;
        let sink = self.tables(into)?.origin;
        let tap = self.pipeline.add_redist(source, sink)?;
        info!("Rib: Redistributing {} into {}", from, into);
        Ok(tap)
    }

    /// The tables plumbed for `protocol`.
    pub fn tables(&self, protocol: &str) -> Result<ProtocolTables> {
        self.protocols
            .get(protocol)
            .copied()
            .ok_or_else(|| TableError::UnknownProtocol(protocol.to_string()))
    }

    /// Configured protocol names.
    pub fn protocols(&self) -> impl Iterator<Item = &str> + '_ {
        self.protocols.keys().map(String::as_str)
    }

    /// Adds a route from `protocol`.
    pub fn add_route(&mut self, protocol: &str, route: RouteEntry) -> Result<Outcome> {
        let origin = self.tables(protocol)?.origin;
        self.pipeline.origin_add(origin, route)
    }

    /// Replaces the route `protocol` holds for the same network.
    pub fn replace_route(&mut self, protocol: &str, route: RouteEntry) -> Result<Outcome> {
        let origin = self.tables(protocol)?.origin;
        self.pipeline.origin_replace(origin, route)
    }

    /// Withdraws the route `protocol` holds for `net`.
    pub fn delete_route(&mut self, protocol: &str, net: &IpNet) -> Result<Outcome> {
        let origin = self.tables(protocol)?.origin;
        self.pipeline.origin_delete(origin, net)
    }

    /// Marks the end of a batch of changes from `protocol`.
    pub fn push_routes(&mut self, protocol: &str) -> Result<Outcome> {
        let origin = self.tables(protocol)?.origin;
        self.pipeline.push_from(origin)
    }

    /// Changes the admin distance for routes `protocol` adds from now on.
    pub fn set_protocol_admin_distance(
        &mut self,
        protocol: &str,
        distance: AdminDistance,
    ) -> Result<()> {
        let origin = self.tables(protocol)?.origin;
        self.pipeline.set_admin_distance(origin, distance)
    }

    /// The installed route `addr` resolves to.
    pub fn lookup_route(&self, addr: IpAddr) -> Option<RouteEntry> {
        self.pipeline
            .lookup_route_by_addr(self.final_table?, addr)
    }

    /// The installed route for `addr` and the interval it covers.
    pub fn lookup_route_range(&self, addr: IpAddr) -> RouteRange {
        match self.final_table {
            Some(table) => self.pipeline.lookup_route_range(table, addr),
            None => RouteRange::unrouted(addr),
        }
    }

    /// Re-checks next hops waited on against the IGP routes.
    ///
    /// The notices returned are meant to be applied on a later turn with
    /// [`apply_resolution`](Rib::apply_resolution).
    pub fn take_resolutions(&self) -> Vec<ResolutionNotice> {
        match self.igp_head {
            Some(igp) => self.resolver.refresh(&self.pipeline, igp),
            None => Vec::new(),
        }
    }

    /// Releases the routes waiting on a resolved next hop.
    pub fn apply_resolution(&mut self, notice: &ResolutionNotice) -> Result<Outcome> {
        self.pipeline.nexthop_resolved(notice)
    }

    /// Number of routes waiting on next-hop resolution.
    pub fn pending_routes(&self) -> usize {
        self.protocols
            .values()
            .filter_map(|t| t.nhlookup)
            .filter_map(|id| self.pipeline.nhlookup(id).ok().map(|gate| gate.pending().len()))
            .sum()
    }

    /// The installed routes, in network order.
    pub fn installed_routes(&self) -> Vec<RouteEntry> {
        self.final_table
            .and_then(|id| self.pipeline.log(id).ok())
            .map(|log| log.routes().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns and forgets the events the final table has seen.
    pub fn take_events(&mut self) -> Vec<RouteEvent> {
        match self.final_table {
            Some(id) => match self.pipeline.log_mut(id) {
                Ok(mut log) => log.take_events(),
                Err(e) => {
                    warn!("Rib: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    /// Lists the tables in the pipeline.
    pub fn describe(&self) -> Vec<TableInfo> {
        self.pipeline.describe()
    }

    /// The underlying pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Drops every protocol's routes without propagating.
    ///
    /// Returns the number of routes dropped.
    pub fn shutdown(&mut self) -> Result<usize> {
        let mut dropped = 0;
        let origins: Vec<TableId> = self.protocols.values().map(|t| t.origin).collect();
        for origin in origins {
            dropped += self.pipeline.origin_delete_all(origin)?;
        }
        info!("Rib: Shut down, dropped {} routes", dropped);
        Ok(dropped)
    }
}
