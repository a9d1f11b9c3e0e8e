//! Holding routes back until their next hop is known to be reachable.
//!
//! Every route passing through registers interest in its next hop. If the
//! resolver already knows the answer the route goes straight on; otherwise
//! it is parked in a [`PendingQueue`] and released when the resolver's
//! notice arrives through [`NhLookupTable::on_resolved`].
//!
//! Downstream never sees a route whose next hop is still unknown. While a
//! replace is parked, downstream still holds the route it replaces, and
//! lookups here answer with that route so the two views agree.

use ipnet::IpNet;
use log::{debug, warn};
use std::net::IpAddr;

use crate::error::{Result, TableError};
use crate::pending::{PendingEntry, PendingQueue};
use crate::resolver::NextHopResolver;
use crate::route::{RouteEntry, RouteRange};
use crate::table::{check_caller, Dispatch, GraphView, RouteEvent, RouteTable, TableId, TableKind};

/// Gates routes on next-hop resolution.
#[derive(Debug)]
pub struct NhLookupTable {
    name: String,
    id: TableId,
    parent: TableId,
    next: Option<TableId>,
    resolver: Box<dyn NextHopResolver>,
    queue: PendingQueue,
}

impl NhLookupTable {
    /// Creates a gate below `parent`.
    ///
    /// `id` is the handle this table will live under; the resolver uses it
    /// to address its notices.
    pub fn new(
        id: TableId,
        parent: TableId,
        resolver: Box<dyn NextHopResolver>,
        graph: &dyn GraphView,
    ) -> Self {
        Self {
            name: Self::make_name(parent, graph),
            id,
            parent,
            next: None,
            resolver,
            queue: PendingQueue::new(),
        }
    }

    fn make_name(parent: TableId, graph: &dyn GraphView) -> String {
        format!(
            "NhLookup:{}",
            graph.table_name(parent).unwrap_or_else(|| parent.to_string())
        )
    }

    /// The handle notices must be addressed to.
    pub fn id(&self) -> TableId {
        self.id
    }

    /// The parked routes.
    pub fn pending(&self) -> &PendingQueue {
        &self.queue
    }

    fn resolvable(&self, nexthop: IpAddr) -> bool {
        self.resolver
            .lookup(nexthop)
            .map_or(false, |info| info.resolvable)
    }

    fn register(&mut self, route: &RouteEntry) -> bool {
        self.resolver
            .register_interest(route.nexthop, route.net, self.id)
    }

    fn deregister(&mut self, route: &RouteEntry) {
        self.resolver
            .deregister_interest(route.nexthop, route.net, self.id);
    }

    fn reject_changed(&self, route: &RouteEntry) -> Result<()> {
        if route.changed {
            return Err(TableError::ChangedRoute {
                table: self.name.clone(),
                net: route.net,
            });
        }
        Ok(())
    }

    /// The parent's copy of a route as it went downstream.
    fn stamp(&self, route: RouteEntry) -> RouteEntry {
        let resolvable = self.resolvable(route.nexthop);
        route.resolved(resolvable)
    }

    /// What downstream resolves `addr` to, given the parent's best match.
    ///
    /// A parked add is invisible downstream, which still resolves `addr`
    /// through the longest covering route that is not parked.
    fn mask(
        &self,
        addr: IpAddr,
        route: RouteEntry,
        graph: &dyn GraphView,
    ) -> Option<RouteEntry> {
        match self.queue.get(&route.net) {
            None => Some(self.stamp(route)),
            Some(PendingEntry::Add(_)) => self.covering(addr, route.net.prefix_len(), graph),
            Some(PendingEntry::Replace { prior, .. }) => Some(prior.clone()),
        }
    }

    /// The longest route downstream holds for `addr` shorter than `len`.
    fn covering(&self, addr: IpAddr, len: u8, graph: &dyn GraphView) -> Option<RouteEntry> {
        (0..len).rev().find_map(|shorter| {
            let net = IpNet::new(addr, shorter).ok()?.trunc();
            self.lookup_route(&net, graph)
        })
    }

    /// The parent's range answer for `addr` with the route masked. The
    /// interval is still the parent's.
    fn masked_range(&self, addr: IpAddr, graph: &dyn GraphView) -> RouteRange {
        let mut result = graph.lookup_route_range(self.parent, addr);
        if let Some(route) = result.route().cloned() {
            result.set_route(self.mask(addr, route, graph));
        }
        result
    }

    /// Releases every route waiting on `nexthop`.
    ///
    /// Routes are sent on with `nexthop_resolved` set to `success`, in
    /// network order, followed by a push.
    pub fn on_resolved(&mut self, nexthop: IpAddr, nets: &[IpNet], success: bool) -> Dispatch {
        let mut events = Vec::new();

        for entry in self.queue.drain_nexthop(nexthop) {
            match entry {
                PendingEntry::Add(route) => {
                    debug!("{}: Releasing add {}", self.name, route);
                    events.push(RouteEvent::Add(route.resolved(success)));
                }
                PendingEntry::Replace { prior, route } => {
                    debug!("{}: Releasing replace {} -> {}", self.name, prior, route);
                    self.deregister(&prior);
                    events.push(RouteEvent::Replace {
                        old: prior,
                        new: route.resolved(success),
                    });
                }
            }
        }

        for net in nets {
            if let Some(stale) = self.queue.remove_if_nexthop(net, nexthop) {
                warn!(
                    "{}: Dropping {} left pending on {}",
                    self.name,
                    stale.route(),
                    nexthop
                );
            }
        }

        events.push(RouteEvent::Push);
        Dispatch::propagate(events)
    }
}

impl RouteTable for NhLookupTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TableKind {
        TableKind::NhLookup
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
        self.reject_changed(&route)?;
        if let Some(existing) = self.queue.get(&route.net) {
            return Err(TableError::PendingConflict {
                net: route.net,
                nexthop: existing.nexthop(),
            });
        }

        if self.register(&route) {
            let route = route.resolved(self.resolvable(route.nexthop));
            return Ok(Dispatch::propagate([RouteEvent::Add(route)]));
        }

        debug!("{}: Queued add {}", self.name, route);
        self.queue.insert(PendingEntry::Add(route))?;
        Ok(Dispatch::queued())
    }

    fn delete_route(
        &mut self,
        route: RouteEntry,
        caller: TableId,
        _graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[self.parent])?;
        self.deregister(&route);

        match self.queue.remove(&route.net) {
            None => Ok(Dispatch::propagate([RouteEvent::Delete(route)])),
            Some(PendingEntry::Add(_)) => {
                debug!("{}: Cancelled queued add {}", self.name, route);
                Ok(Dispatch::suppressed())
            }
            Some(PendingEntry::Replace { prior, .. }) => {
                self.deregister(&prior);
                Ok(Dispatch::propagate([RouteEvent::Delete(prior)]))
            }
        }
    }

    fn replace_route(
        &mut self,
        old: RouteEntry,
        new: RouteEntry,
        caller: TableId,
        _graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[self.parent])?;
        self.reject_changed(&new)?;

        // Registering before deregistering keeps the resolver's state for a
        // next hop shared by old and new.
        let resolved = self.register(&new);

        let pending = self.queue.remove(&new.net);
        let prior = match &pending {
            None => Some(old.clone()),
            Some(PendingEntry::Add(_)) => None,
            Some(PendingEntry::Replace { prior, .. }) => Some(prior.clone()),
        };
        if pending.is_some() {
            // Downstream never saw `old`
            self.deregister(&old);
        }

        if resolved {
            let new = new.resolved(self.resolvable(new.nexthop));
            return Ok(match prior {
                Some(prior) => {
                    self.deregister(&prior);
                    Dispatch::propagate([RouteEvent::Replace { old: prior, new }])
                }
                None => Dispatch::propagate([RouteEvent::Add(new)]),
            });
        }

        let entry = match prior {
            Some(prior) => PendingEntry::Replace { prior, route: new },
            None => PendingEntry::Add(new),
        };
        debug!("{}: Queued {:?}", self.name, entry);
        self.queue.insert(entry)?;
        Ok(Dispatch::queued())
    }

    fn lookup_route(&self, net: &IpNet, graph: &dyn GraphView) -> Option<RouteEntry> {
        match self.queue.get(net) {
            None => graph
                .lookup_route(self.parent, net)
                .map(|route| self.stamp(route)),
            Some(PendingEntry::Add(_)) => None,
            Some(PendingEntry::Replace { prior, .. }) => Some(prior.clone()),
        }
    }

    fn lookup_route_by_addr(&self, addr: IpAddr, graph: &dyn GraphView) -> Option<RouteEntry> {
        graph
            .lookup_route_by_addr(self.parent, addr)
            .and_then(|route| self.mask(addr, route, graph))
    }

    /// Parked adds can split what downstream sees as one interval into
    /// several parent intervals, so neighbours answering the same way are
    /// folded back in.
    fn lookup_route_range(&self, addr: IpAddr, graph: &dyn GraphView) -> RouteRange {
        let first = self.masked_range(addr, graph);
        let mut range = first.range();
        let route = first.into_route();

        while let Some(below) = range.before() {
            let next = self.masked_range(below, graph);
            if next.route() != route.as_ref() {
                break;
            }
            range = range.hull(&next.range());
        }
        while let Some(above) = range.after() {
            let next = self.masked_range(above, graph);
            if next.route() != route.as_ref() {
                break;
            }
            range = range.hull(&next.range());
        }

        RouteRange::new(addr, route, range)
    }

    fn replumb(&mut self, old: TableId, new: TableId, graph: &dyn GraphView) -> Result<()> {
        if self.parent != old {
            return Err(TableError::UnknownParent {
                table: self.name.clone(),
                parent: old,
            });
        }
        self.parent = new;
        self.name = Self::make_name(new, graph);
        Ok(())
    }

    fn as_nhlookup_mut(&mut self) -> Option<&mut NhLookupTable> {
        Some(self)
    }

    fn as_nhlookup(&self) -> Option<&NhLookupTable> {
        Some(self)
    }
}
