//! Origin tables: where routes from a routing protocol enter the pipeline.

use ipnet::IpNet;
use log::{debug, info};
use rib_types::{AdminDistance, ProtocolType};
use std::net::IpAddr;
use std::sync::Arc;

use crate::error::{Result, TableError};
use crate::route::{RouteEntry, RouteRange};
use crate::table::{check_caller, Dispatch, GraphView, RouteEvent, RouteTable, TableId, TableKind};
use crate::trie::RouteTrie;

/// Stores the routes of one protocol and announces changes downstream.
///
/// Every route ingested is stamped with the table's admin distance and its
/// name as the protocol tag.
#[derive(Debug)]
pub struct OriginTable {
    name: Arc<str>,
    admin_distance: AdminDistance,
    protocol_type: ProtocolType,
    routes: RouteTrie<RouteEntry>,
    next: Option<TableId>,
}

impl OriginTable {
    /// Creates an empty origin table.
    pub fn new(
        name: impl Into<Arc<str>>,
        admin_distance: AdminDistance,
        protocol_type: ProtocolType,
    ) -> Self {
        Self {
            name: name.into(),
            admin_distance,
            protocol_type,
            routes: RouteTrie::new(),
            next: None,
        }
    }

    /// The admin distance stamped on new routes.
    pub fn admin_distance(&self) -> AdminDistance {
        self.admin_distance
    }

    /// Changes the admin distance for routes added from now on.
    ///
    /// Routes already in the table keep the distance they were added with.
    pub fn set_admin_distance(&mut self, distance: AdminDistance) {
        info!(
            "{}: Admin distance {} -> {}",
            self.name, self.admin_distance, distance
        );
        self.admin_distance = distance;
    }

    /// Whether this is an IGP or EGP table.
    pub fn protocol_type(&self) -> ProtocolType {
        self.protocol_type
    }

    /// Number of routes held.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Iterates over the stored routes.
    pub fn routes(&self) -> impl Iterator<Item = &RouteEntry> + '_ {
        self.routes.iter().map(|(_, r)| r)
    }

    fn stamp(&self, route: RouteEntry) -> RouteEntry {
        let mut route = route;
        route.admin_distance = self.admin_distance;
        route.protocol = Arc::clone(&self.name);
        route
    }

    /// Ingests a route from the protocol.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::AlreadyExists`] if the network is present.
    pub fn add(&mut self, route: RouteEntry) -> Result<Dispatch> {
        let route = self.stamp(route);
        self.routes.insert(route.net, route.clone())?;
        debug!("{}: Added route {}", self.name, route);
        Ok(Dispatch::propagate([RouteEvent::Add(route)]))
    }

    /// Withdraws the route for `net`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NotFound`] if the network is absent.
    pub fn delete(&mut self, net: &IpNet) -> Result<Dispatch> {
        let route = self.routes.erase(&net.trunc())?;
        debug!("{}: Deleted route {}", self.name, route);
        Ok(Dispatch::propagate([RouteEvent::Delete(route)]))
    }

    /// Swaps the stored route for the same network.
    ///
    /// Downstream sees a delete of the old route then an add of the new.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NotFound`] if the network is absent.
    pub fn replace(&mut self, route: RouteEntry) -> Result<Dispatch> {
        let route = self.stamp(route);
        let old = self.routes.erase(&route.net)?;
        self.routes.insert(route.net, route.clone())?;
        debug!("{}: Replaced route {} with {}", self.name, old, route);
        Ok(Dispatch::propagate([
            RouteEvent::Delete(old),
            RouteEvent::Add(route),
        ]))
    }

    /// Drops every route without telling downstream.
    ///
    /// Returns the number of routes dropped.
    pub fn delete_all(&mut self) -> usize {
        let count = self.routes.len();
        self.routes.clear();
        info!("{}: Dropped {} routes", self.name, count);
        count
    }
}

impl RouteTable for OriginTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TableKind {
        TableKind::Origin
    }

    fn next(&self) -> Option<TableId> {
        self.next
    }

    fn set_next(&mut self, next: Option<TableId>) {
        self.next = next;
    }

    fn parents(&self) -> Vec<TableId> {
        Vec::new()
    }

    fn add_route(
        &mut self,
        route: RouteEntry,
        caller: TableId,
        _graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[])?;
        self.add(route)
    }

    fn delete_route(
        &mut self,
        route: RouteEntry,
        caller: TableId,
        _graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[])?;
        self.delete(&route.net)
    }

    fn replace_route(
        &mut self,
        _old: RouteEntry,
        new: RouteEntry,
        caller: TableId,
        _graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[])?;
        self.replace(new)
    }

    fn lookup_route(&self, net: &IpNet, _graph: &dyn GraphView) -> Option<RouteEntry> {
        self.routes.find_exact(net).cloned()
    }

    fn lookup_route_by_addr(&self, addr: IpAddr, _graph: &dyn GraphView) -> Option<RouteEntry> {
        self.routes.find_longest_match(addr).map(|(_, r)| r.clone())
    }

    fn lookup_route_range(&self, addr: IpAddr, _graph: &dyn GraphView) -> RouteRange {
        let (best, range) = self.routes.find_range(addr);
        RouteRange::new(addr, best.map(|(_, r)| r.clone()), range)
    }

    fn replumb(&mut self, old: TableId, _new: TableId, _graph: &dyn GraphView) -> Result<()> {
        Err(TableError::UnknownParent {
            table: self.name.to_string(),
            parent: old,
        })
    }

    fn as_origin(&self) -> Option<&OriginTable> {
        Some(self)
    }

    fn as_origin_mut(&mut self) -> Option<&mut OriginTable> {
        Some(self)
    }
}
