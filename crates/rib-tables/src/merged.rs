//! Merging two route streams into one.

use ipnet::IpNet;
use log::debug;
use std::net::IpAddr;

use crate::error::{Result, TableError};
use crate::route::{RouteEntry, RouteRange};
use crate::table::{check_caller, Dispatch, GraphView, RouteEvent, RouteTable, TableId, TableKind};

/// Combines two parents, passing on the preferred route for each network.
///
/// Between two routes for the same network the lower admin distance wins.
/// Equal distances go to parent A, so the result does not depend on which
/// route arrived first. The table stores nothing: it asks the other parent
/// what it currently holds whenever it needs to compare.
#[derive(Debug)]
pub struct MergedTable {
    name: String,
    a: TableId,
    b: TableId,
    next: Option<TableId>,
}

impl MergedTable {
    /// Creates a table merging `a` and `b`.
    pub fn new(a: TableId, b: TableId, graph: &dyn GraphView) -> Self {
        Self {
            name: Self::make_name(a, b, graph),
            a,
            b,
            next: None,
        }
    }

    fn make_name(a: TableId, b: TableId, graph: &dyn GraphView) -> String {
        let name = |t: TableId| graph.table_name(t).unwrap_or_else(|| t.to_string());
        format!("Merged:({})+({})", name(a), name(b))
    }

    /// Parent A, which wins ties.
    pub fn parent_a(&self) -> TableId {
        self.a
    }

    /// Parent B.
    pub fn parent_b(&self) -> TableId {
        self.b
    }

    /// The parent that did not make the call.
    fn other(&self, caller: TableId) -> TableId {
        if caller == self.a {
            self.b
        } else {
            self.a
        }
    }

    /// Returns true if `route`, arriving from `caller`, is preferred over
    /// `other` from the opposite parent.
    fn beats(&self, route: &RouteEntry, caller: TableId, other: &RouteEntry) -> bool {
        if route.admin_distance == other.admin_distance {
            caller == self.a
        } else {
            route.is_better_than(other)
        }
    }

    fn pick(&self, from_a: Option<RouteEntry>, from_b: Option<RouteEntry>) -> Option<RouteEntry> {
        match (from_a, from_b) {
            (Some(a), Some(b)) => Some(if b.is_better_than(&a) { b } else { a }),
            (a, b) => a.or(b),
        }
    }
}

impl RouteTable for MergedTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TableKind {
        TableKind::Merged
    }

    fn next(&self) -> Option<TableId> {
        self.next
    }

    fn set_next(&mut self, next: Option<TableId>) {
        self.next = next;
    }

    fn parents(&self) -> Vec<TableId> {
        vec![self.a, self.b]
    }

    fn add_route(
        &mut self,
        route: RouteEntry,
        caller: TableId,
        graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[self.a, self.b])?;

        match graph.lookup_route(self.other(caller), &route.net) {
            None => Ok(Dispatch::propagate([RouteEvent::Add(route)])),
            Some(other) if self.beats(&route, caller, &other) => {
                debug!("{}: {} displaces {}", self.name, route, other);
                Ok(Dispatch::propagate([
                    RouteEvent::Delete(other),
                    RouteEvent::Add(route),
                ]))
            }
            Some(other) => {
                debug!("{}: {} loses to {}", self.name, route, other);
                Ok(Dispatch::suppressed())
            }
        }
    }

    fn delete_route(
        &mut self,
        route: RouteEntry,
        caller: TableId,
        graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[self.a, self.b])?;

        match graph.lookup_route(self.other(caller), &route.net) {
            None => Ok(Dispatch::propagate([RouteEvent::Delete(route)])),
            Some(other) if self.beats(&route, caller, &other) => {
                debug!("{}: {} withdrawn, failing over to {}", self.name, route, other);
                Ok(Dispatch::propagate([
                    RouteEvent::Delete(route),
                    RouteEvent::Add(other),
                ]))
            }
            Some(_) => Ok(Dispatch::suppressed()),
        }
    }

    fn replace_route(
        &mut self,
        old: RouteEntry,
        new: RouteEntry,
        caller: TableId,
        graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[self.a, self.b])?;

        let Some(other) = graph.lookup_route(self.other(caller), &new.net) else {
            return Ok(Dispatch::propagate([RouteEvent::Replace { old, new }]));
        };

        let old_won = self.beats(&old, caller, &other);
        let new_wins = self.beats(&new, caller, &other);
        let event = match (old_won, new_wins) {
            (true, true) => RouteEvent::Replace { old, new },
            (true, false) => RouteEvent::Replace { old, new: other },
            (false, true) => RouteEvent::Replace { old: other, new },
            (false, false) => return Ok(Dispatch::suppressed()),
        };
        Ok(Dispatch::propagate([event]))
    }

    fn lookup_route(&self, net: &IpNet, graph: &dyn GraphView) -> Option<RouteEntry> {
        self.pick(graph.lookup_route(self.a, net), graph.lookup_route(self.b, net))
    }

    fn lookup_route_by_addr(&self, addr: IpAddr, graph: &dyn GraphView) -> Option<RouteEntry> {
        let from_a = graph.lookup_route_by_addr(self.a, addr);
        let from_b = graph.lookup_route_by_addr(self.b, addr);
        match (from_a, from_b) {
            (Some(a), Some(b)) => {
                let (a_len, b_len) = (a.net.prefix_len(), b.net.prefix_len());
                if b_len > a_len || (b_len == a_len && b.is_better_than(&a)) {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (a, b) => a.or(b),
        }
    }

    fn lookup_route_range(&self, addr: IpAddr, graph: &dyn GraphView) -> RouteRange {
        let mut result = graph.lookup_route_range(self.a, addr);
        result.merge(graph.lookup_route_range(self.b, addr));
        result
    }

    fn replumb(&mut self, old: TableId, new: TableId, graph: &dyn GraphView) -> Result<()> {
        if self.a == old {
            self.a = new;
        } else if self.b == old {
            self.b = new;
        } else {
            return Err(TableError::UnknownParent {
                table: self.name.clone(),
                parent: old,
            });
        }
        self.name = Self::make_name(self.a, self.b, graph);
        Ok(())
    }
}
