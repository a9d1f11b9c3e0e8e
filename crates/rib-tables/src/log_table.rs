//! The table at the bottom of the pipeline.

use ipnet::IpNet;
use log::debug;
use serde::Serialize;
use std::net::IpAddr;

use crate::error::{Result, TableError};
use crate::route::{RouteEntry, RouteRange};
use crate::table::{check_caller, Dispatch, GraphView, RouteEvent, RouteTable, TableId, TableKind};
use crate::trie::RouteTrie;

/// Event counts seen by a [`LogTable`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LogCounters {
    pub adds: u64,
    pub deletes: u64,
    pub replaces: u64,
    pub pushes: u64,
}

/// Records what reaches it and keeps the resulting route set.
///
/// An add for an installed network, or a delete or replace for one that is
/// not installed, means some stage above broke the add/delete pairing and
/// is reported as a fatal error. Events are passed on if a next table is
/// plumbed.
#[derive(Debug)]
pub struct LogTable {
    name: String,
    parent: TableId,
    next: Option<TableId>,
    routes: RouteTrie<RouteEntry>,
    events: Vec<RouteEvent>,
    counters: LogCounters,
}

impl LogTable {
    /// Creates a log table below `parent`.
    pub fn new(name: impl Into<String>, parent: TableId) -> Self {
        Self {
            name: name.into(),
            parent,
            next: None,
            routes: RouteTrie::new(),
            events: Vec::new(),
            counters: LogCounters::default(),
        }
    }

    /// Events received so far, oldest first.
    pub fn events(&self) -> &[RouteEvent] {
        &self.events
    }

    /// Returns and forgets the events received so far.
    pub fn take_events(&mut self) -> Vec<RouteEvent> {
        std::mem::take(&mut self.events)
    }

    /// The installed routes, in network order.
    pub fn routes(&self) -> impl Iterator<Item = &RouteEntry> + '_ {
        self.routes.iter().map(|(_, r)| r)
    }

    /// Number of installed routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Event counts.
    pub fn counters(&self) -> LogCounters {
        self.counters
    }

    fn record(&mut self, event: RouteEvent) -> Dispatch {
        debug!("{}: {}", self.name, event);
        self.events.push(event.clone());
        Dispatch::propagate([event])
    }

    fn duplicate(&self, net: IpNet) -> TableError {
        TableError::DuplicateInstall {
            table: self.name.clone(),
            net,
        }
    }

    fn missing(&self, net: IpNet) -> TableError {
        TableError::MissingInstall {
            table: self.name.clone(),
            net,
        }
    }
}

impl RouteTable for LogTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TableKind {
        TableKind::Log
    }

    fn next(&self) -> Option<TableId> {
        self.next
    }

    fn set_next(&mut self, next: Option<TableId>) {
        self.next = next;
    }

    fn parents(&self) -> Vec<TableId> {
        vec![self.parent]
    }

    fn add_route(
        &mut self,
        route: RouteEntry,
        caller: TableId,
        _graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[self.parent])?;
        self.routes
            .insert(route.net, route.clone())
            .map_err(|_| self.duplicate(route.net))?;
        self.counters.adds += 1;
        Ok(self.record(RouteEvent::Add(route)))
    }

    fn delete_route(
        &mut self,
        route: RouteEntry,
        caller: TableId,
        _graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[self.parent])?;
        self.routes
            .erase(&route.net)
            .map_err(|_| self.missing(route.net))?;
        self.counters.deletes += 1;
        Ok(self.record(RouteEvent::Delete(route)))
    }

    fn replace_route(
        &mut self,
        old: RouteEntry,
        new: RouteEntry,
        caller: TableId,
        _graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[self.parent])?;
        match self.routes.find_exact_mut(&old.net) {
            Some(installed) => *installed = new.clone(),
            None => return Err(self.missing(old.net)),
        }
        self.counters.replaces += 1;
        Ok(self.record(RouteEvent::Replace { old, new }))
    }

    fn push(&mut self, caller: TableId) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[self.parent])?;
        self.counters.pushes += 1;
        Ok(self.record(RouteEvent::Push))
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

    fn replumb(&mut self, old: TableId, new: TableId, _graph: &dyn GraphView) -> Result<()> {
        if self.parent != old {
            return Err(TableError::UnknownParent {
                table: self.name.clone(),
                parent: old,
            });
        }
        self.parent = new;
        Ok(())
    }

    fn as_log(&self) -> Option<&LogTable> {
        Some(self)
    }

    fn as_log_mut(&mut self) -> Option<&mut LogTable> {
        Some(self)
    }
}
