//! The arena that owns every table and carries events between them.
//!
//! Tables are addressed by [`TableId`]. Each lives in its own `RefCell`
//! slot: a table is borrowed mutably only while it handles one call, and
//! the events it returns are delivered after that borrow ends. Lookups
//! from a running table borrow other slots immutably. A table reached
//! again while it is still running is reported as
//! [`TableError::Reentered`] rather than deadlocking or panicking.

use ipnet::IpNet;
use log::{debug, error, info, warn};
use rib_types::{AdminDistance, ProtocolType};
use serde::Serialize;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::net::IpAddr;

use crate::error::{Result, TableError};
use crate::log_table::LogTable;
use crate::merged::MergedTable;
use crate::nhlookup::NhLookupTable;
use crate::origin::OriginTable;
use crate::redist::RedistTable;
use crate::resolver::{NextHopResolver, ResolutionNotice};
use crate::route::{RouteEntry, RouteRange};
use crate::table::{Dispatch, Emit, GraphView, Outcome, RouteEvent, RouteTable, TableId, TableKind};

/// One row of [`Pipeline::describe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub id: TableId,
    pub name: String,
    pub kind: TableKind,
    pub parents: Vec<TableId>,
    pub next: Option<TableId>,
}

impl fmt::Display for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.id, self.kind, self.name)?;
        if let Some(next) = self.next {
            write!(f, " -> {}", next)?;
        }
        Ok(())
    }
}

/// Owns the table graph.
#[derive(Debug, Default)]
pub struct Pipeline {
    tables: Vec<RefCell<Box<dyn RouteTable>>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if no tables exist.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn next_id(&self) -> TableId {
        TableId::new(self.tables.len())
    }

    fn slot(&self, id: TableId) -> Result<&RefCell<Box<dyn RouteTable>>> {
        self.tables
            .get(id.index())
            .ok_or(TableError::UnknownTable(id))
    }

    fn table(&self, id: TableId) -> Result<Ref<'_, Box<dyn RouteTable>>> {
        self.slot(id)?
            .try_borrow()
            .map_err(|_| TableError::Reentered(id))
    }

    fn table_mut(&self, id: TableId) -> Result<RefMut<'_, Box<dyn RouteTable>>> {
        self.slot(id)?
            .try_borrow_mut()
            .map_err(|_| TableError::Reentered(id))
    }

    fn push_table(&mut self, table: Box<dyn RouteTable>) -> TableId {
        let id = self.next_id();
        info!("Pipeline: Created {} {}", id, table.name());
        self.tables.push(RefCell::new(table));
        id
    }

    // ---- Building the graph ----

    /// Adds an origin table. It has no downstream until something is
    /// plumbed below it.
    pub fn add_origin(
        &mut self,
        name: &str,
        admin_distance: AdminDistance,
        protocol_type: ProtocolType,
    ) -> TableId {
        self.push_table(Box::new(OriginTable::new(
            name,
            admin_distance,
            protocol_type,
        )))
    }

    /// Adds a table merging `a` (preferred on ties) and `b`, spliced in
    /// above whatever they fed.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::AmbiguousPlumbing`] if `a` and `b` feed
    /// different tables.
    pub fn add_merged(&mut self, a: TableId, b: TableId) -> Result<TableId> {
        let (next_a, next_b) = (self.next(a)?, self.next(b)?);
        if let (Some(x), Some(y)) = (next_a, next_b) {
            if x != y {
                return Err(TableError::AmbiguousPlumbing {
                    table: format!("Merged:({})+({})", self.name(a)?, self.name(b)?),
                });
            }
        }
        let table = MergedTable::new(a, b, &*self);
        let id = self.push_table(Box::new(table));
        self.splice(id, &[a, b])?;
        Ok(id)
    }

    /// Adds a redistribution tap below `parent` copying into origin `sink`.
    pub fn add_redist(&mut self, parent: TableId, sink: TableId) -> Result<TableId> {
        self.expect_kind(sink, TableKind::Origin)?;
        let table = RedistTable::new(parent, sink, &*self);
        let id = self.push_table(Box::new(table));
        self.splice(id, &[parent])?;
        Ok(id)
    }

    /// Adds a next-hop gate below `parent`.
    pub fn add_nhlookup(
        &mut self,
        parent: TableId,
        resolver: Box<dyn NextHopResolver>,
    ) -> Result<TableId> {
        self.slot(parent)?;
        let table = NhLookupTable::new(self.next_id(), parent, resolver, &*self);
        let id = self.push_table(Box::new(table));
        self.splice(id, &[parent])?;
        Ok(id)
    }

    /// Adds a log table below `parent`.
    pub fn add_log(&mut self, name: &str, parent: TableId) -> Result<TableId> {
        self.slot(parent)?;
        let id = self.push_table(Box::new(LogTable::new(name, parent)));
        self.splice(id, &[parent])?;
        Ok(id)
    }

    /// Points `parents` at the new table `id`, which takes over their old
    /// downstream.
    fn splice(&mut self, id: TableId, parents: &[TableId]) -> Result<()> {
        let mut inherited = None;
        for &parent in parents {
            let old_next = self.next(parent)?;
            if let Some(down) = old_next {
                self.replumb(down, parent, id)?;
                inherited = Some(down);
            }
            self.table_mut(parent)?.set_next(Some(id));
        }
        self.table_mut(id)?.set_next(inherited);
        Ok(())
    }

    fn expect_kind(&self, id: TableId, kind: TableKind) -> Result<()> {
        if self.table(id)?.kind() != kind {
            return Err(TableError::WrongTableKind {
                table: id,
                expected: kind.as_str(),
            });
        }
        Ok(())
    }

    /// Sets the downstream of `table`.
    pub fn set_next(&mut self, table: TableId, next: Option<TableId>) -> Result<()> {
        if let Some(next) = next {
            self.slot(next)?;
        }
        self.table_mut(table)?.set_next(next);
        Ok(())
    }

    /// The downstream of `table`.
    pub fn next(&self, table: TableId) -> Result<Option<TableId>> {
        Ok(self.table(table)?.next())
    }

    /// The display name of `table`.
    pub fn name(&self, table: TableId) -> Result<String> {
        Ok(self.table(table)?.name().to_string())
    }

    /// Tells `table` that its parent `old` has been replaced by `new`.
    pub fn replumb(&mut self, table: TableId, old: TableId, new: TableId) -> Result<()> {
        let graph: &Pipeline = self;
        let mut guard = graph.table_mut(table)?;
        guard.replumb(old, new, graph)?;
        debug!("Pipeline: Replumbed {} from {} to {}", table, old, new);
        Ok(())
    }

    /// Lists every table.
    pub fn describe(&self) -> Vec<TableInfo> {
        self.tables
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let table = slot.try_borrow().ok()?;
                Some(TableInfo {
                    id: TableId::new(index),
                    name: table.name().to_string(),
                    kind: table.kind(),
                    parents: table.parents(),
                    next: table.next(),
                })
            })
            .collect()
    }

    // ---- Typed access ----

    /// Borrows an origin table.
    pub fn origin(&self, id: TableId) -> Result<Ref<'_, OriginTable>> {
        Ref::filter_map(self.table(id)?, |t| t.as_origin()).map_err(|_| {
            TableError::WrongTableKind {
                table: id,
                expected: TableKind::Origin.as_str(),
            }
        })
    }

    fn origin_mut(&self, id: TableId) -> Result<RefMut<'_, OriginTable>> {
        RefMut::filter_map(self.table_mut(id)?, |t| t.as_origin_mut()).map_err(|_| {
            TableError::WrongTableKind {
                table: id,
                expected: TableKind::Origin.as_str(),
            }
        })
    }

    /// Borrows a next-hop gate.
    pub fn nhlookup(&self, id: TableId) -> Result<Ref<'_, NhLookupTable>> {
        Ref::filter_map(self.table(id)?, |t| t.as_nhlookup()).map_err(|_| {
            TableError::WrongTableKind {
                table: id,
                expected: TableKind::NhLookup.as_str(),
            }
        })
    }

    /// Borrows a redistribution tap.
    pub fn redist(&self, id: TableId) -> Result<Ref<'_, RedistTable>> {
        Ref::filter_map(self.table(id)?, |t| t.as_redist()).map_err(|_| {
            TableError::WrongTableKind {
                table: id,
                expected: TableKind::Redist.as_str(),
            }
        })
    }

    fn redist_mut(&self, id: TableId) -> Result<RefMut<'_, RedistTable>> {
        RefMut::filter_map(self.table_mut(id)?, |t| t.as_redist_mut()).map_err(|_| {
            TableError::WrongTableKind {
                table: id,
                expected: TableKind::Redist.as_str(),
            }
        })
    }

    /// Borrows a log table.
    pub fn log(&self, id: TableId) -> Result<Ref<'_, LogTable>> {
        Ref::filter_map(self.table(id)?, |t| t.as_log()).map_err(|_| {
            TableError::WrongTableKind {
                table: id,
                expected: TableKind::Log.as_str(),
            }
        })
    }

    /// Mutably borrows a log table.
    pub fn log_mut(&mut self, id: TableId) -> Result<RefMut<'_, LogTable>> {
        RefMut::filter_map(self.table_mut(id)?, |t| t.as_log_mut()).map_err(|_| {
            TableError::WrongTableKind {
                table: id,
                expected: TableKind::Log.as_str(),
            }
        })
    }

    // ---- Origin operations ----

    /// Adds a route at an origin table and propagates it.
    pub fn origin_add(&mut self, origin: TableId, route: RouteEntry) -> Result<Outcome> {
        let dispatch = self.origin_mut(origin)?.add(route)?;
        self.deliver(origin, dispatch)
    }

    /// Deletes a route at an origin table and propagates the withdrawal.
    pub fn origin_delete(&mut self, origin: TableId, net: &IpNet) -> Result<Outcome> {
        let dispatch = self.origin_mut(origin)?.delete(net)?;
        self.deliver(origin, dispatch)
    }

    /// Replaces a route at an origin table.
    pub fn origin_replace(&mut self, origin: TableId, route: RouteEntry) -> Result<Outcome> {
        let dispatch = self.origin_mut(origin)?.replace(route)?;
        self.deliver(origin, dispatch)
    }

    /// Drops every route at an origin table without propagating.
    pub fn origin_delete_all(&mut self, origin: TableId) -> Result<usize> {
        Ok(self.origin_mut(origin)?.delete_all())
    }

    /// Changes the admin distance of routes added at `origin` from now on.
    pub fn set_admin_distance(&mut self, origin: TableId, distance: AdminDistance) -> Result<()> {
        self.origin_mut(origin)?.set_admin_distance(distance);
        Ok(())
    }

    // ---- Generic operations ----

    /// Hands `table` an add from `caller`.
    pub fn add_route(&mut self, table: TableId, route: RouteEntry, caller: TableId) -> Result<Outcome> {
        self.send(caller, table, RouteEvent::Add(route))
    }

    /// Hands `table` a delete from `caller`.
    pub fn delete_route(
        &mut self,
        table: TableId,
        route: RouteEntry,
        caller: TableId,
    ) -> Result<Outcome> {
        self.send(caller, table, RouteEvent::Delete(route))
    }

    /// Hands `table` a replace from `caller`.
    pub fn replace_route(
        &mut self,
        table: TableId,
        old: RouteEntry,
        new: RouteEntry,
        caller: TableId,
    ) -> Result<Outcome> {
        self.send(caller, table, RouteEvent::Replace { old, new })
    }

    /// Hands `table` a push from `caller`.
    pub fn push(&mut self, table: TableId, caller: TableId) -> Result<Outcome> {
        self.send(caller, table, RouteEvent::Push)
    }

    /// Sends a push down from `table`, as if it had emitted one.
    pub fn push_from(&mut self, table: TableId) -> Result<Outcome> {
        self.deliver(table, Dispatch::propagate([RouteEvent::Push]))
    }

    /// Delivers a resolver notice to the gate it is addressed to.
    pub fn nexthop_resolved(&mut self, notice: &ResolutionNotice) -> Result<Outcome> {
        let id = notice.subscriber;
        let dispatch = {
            let mut table = self.table_mut(id)?;
            let gate = table.as_nhlookup_mut().ok_or(TableError::WrongTableKind {
                table: id,
                expected: TableKind::NhLookup.as_str(),
            })?;
            gate.on_resolved(notice.nexthop, &notice.nets, notice.success)
        };
        self.deliver(id, dispatch)
    }

    // ---- Lookups ----

    /// Exact lookup in `table`.
    pub fn lookup_route(&self, table: TableId, net: &IpNet) -> Option<RouteEntry> {
        match self.table(table) {
            Ok(t) => t.lookup_route(net, self),
            Err(e) => {
                error!("Pipeline: Lookup of {} failed: {}", net, e);
                None
            }
        }
    }

    /// Longest-match lookup in `table`.
    pub fn lookup_route_by_addr(&self, table: TableId, addr: IpAddr) -> Option<RouteEntry> {
        match self.table(table) {
            Ok(t) => t.lookup_route_by_addr(addr, self),
            Err(e) => {
                error!("Pipeline: Lookup of {} failed: {}", addr, e);
                None
            }
        }
    }

    /// Range lookup in `table`.
    pub fn lookup_route_range(&self, table: TableId, addr: IpAddr) -> RouteRange {
        match self.table(table) {
            Ok(t) => t.lookup_route_range(addr, self),
            Err(e) => {
                error!("Pipeline: Range lookup of {} failed: {}", addr, e);
                RouteRange::unrouted(addr)
            }
        }
    }

    // ---- Delivery ----

    /// Calls `to` with `event` on behalf of `caller`, then delivers
    /// whatever it emits.
    fn send(&self, caller: TableId, to: TableId, event: RouteEvent) -> Result<Outcome> {
        let dispatch = {
            let mut table = self.table_mut(to)?;
            match event {
                RouteEvent::Add(route) => table.add_route(route, caller, self),
                RouteEvent::Delete(route) => table.delete_route(route, caller, self),
                RouteEvent::Replace { old, new } => table.replace_route(old, new, caller, self),
                RouteEvent::Push => table.push(caller),
            }?
        };
        self.deliver(to, dispatch)
    }

    /// Delivers the events `from` emitted, in order. Each is carried all the
    /// way down before the next one starts.
    ///
    /// Returns the outcome at the furthest table the last event reached: a
    /// route parked or absorbed further down reports that, not the
    /// `Propagated` of the tables above it.
    fn deliver(&self, from: TableId, dispatch: Dispatch) -> Result<Outcome> {
        let mut outcome = dispatch.outcome;
        for emit in dispatch.emits {
            match emit {
                Emit::Next(event) => {
                    let next = self.table(from)?.next();
                    match next {
                        Some(to) => outcome = self.send(from, to, event)?,
                        None => debug!("Pipeline: {} has no next table, dropped {}", from, event),
                    }
                }
                Emit::Redistribute { sink, event } => self.redistribute(from, sink, event)?,
            }
        }
        Ok(outcome)
    }

    /// Carries an event `tap` redistributed into origin `sink`.
    ///
    /// Withdrawals reach the sink only for networks the tap put there.
    fn redistribute(&self, tap: TableId, sink: TableId, event: RouteEvent) -> Result<()> {
        match event {
            RouteEvent::Add(route) => self.inject_add(tap, sink, &route),
            RouteEvent::Delete(route) => self.inject_delete(tap, sink, &route.net),
            RouteEvent::Replace { old, new } => {
                self.inject_delete(tap, sink, &old.net)?;
                self.inject_add(tap, sink, &new)
            }
            RouteEvent::Push => self
                .deliver(sink, Dispatch::propagate([RouteEvent::Push]))
                .map(|_| ()),
        }
    }

    /// A redistributed route starts afresh in its new origin.
    fn copy(route: &RouteEntry) -> RouteEntry {
        RouteEntry::new(route.net, route.nexthop).with_metric(route.metric)
    }

    fn inject_add(&self, tap: TableId, sink: TableId, route: &RouteEntry) -> Result<()> {
        if self.inject(sink, |o| o.add(Self::copy(route)))? {
            self.redist_mut(tap)?.record_injected(route.net.trunc());
        }
        Ok(())
    }

    fn inject_delete(&self, tap: TableId, sink: TableId, net: &IpNet) -> Result<()> {
        if !self.redist_mut(tap)?.take_injected(&net.trunc()) {
            debug!("Pipeline: {} holds no copy of {} from {}", sink, net, tap);
            return Ok(());
        }
        self.inject(sink, |o| o.delete(net)).map(|_| ())
    }

    /// Runs `op` on the sink and delivers what it emits. Returns whether
    /// the sink accepted the change.
    fn inject(
        &self,
        sink: TableId,
        op: impl FnOnce(&mut OriginTable) -> Result<Dispatch>,
    ) -> Result<bool> {
        let result = self.origin_mut(sink).and_then(|mut origin| op(&mut origin));
        match result {
            Ok(dispatch) => self.deliver(sink, dispatch).map(|_| true),
            Err(e) if !e.is_fatal() => {
                warn!("Pipeline: Redistribution into {} failed: {}", sink, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

impl GraphView for Pipeline {
    fn lookup_route(&self, table: TableId, net: &IpNet) -> Option<RouteEntry> {
        Pipeline::lookup_route(self, table, net)
    }

    fn lookup_route_by_addr(&self, table: TableId, addr: IpAddr) -> Option<RouteEntry> {
        Pipeline::lookup_route_by_addr(self, table, addr)
    }

    fn lookup_route_range(&self, table: TableId, addr: IpAddr) -> RouteRange {
        Pipeline::lookup_route_range(self, table, addr)
    }

    fn table_name(&self, table: TableId) -> Option<String> {
        self.name(table).ok()
    }
}
