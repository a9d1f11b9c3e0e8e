//! Redistribution taps.

use ipnet::IpNet;
use log::debug;
use std::net::IpAddr;

use crate::error::{Result, TableError};
use crate::route::{RouteEntry, RouteRange};
use crate::table::{check_caller, Dispatch, GraphView, RouteEvent, RouteTable, TableId, TableKind};
use crate::trie::RouteTrie;

/// Passes every event through unchanged and copies it into another
/// protocol's origin table.
///
/// Copies re-enter the pipeline through the sink's own `add`/`delete`, so
/// they carry the sink's admin distance and protocol tag.
///
/// The tap remembers which networks it actually placed in the sink. A
/// withdrawal only reaches the sink for those, so a route the sink
/// protocol learned on its own is never removed by redistribution.
#[derive(Debug)]
pub struct RedistTable {
    name: String,
    parent: TableId,
    sink: TableId,
    next: Option<TableId>,
    injected: RouteTrie<()>,
}

impl RedistTable {
    /// Creates a tap below `parent` feeding the origin table `sink`.
    pub fn new(parent: TableId, sink: TableId, graph: &dyn GraphView) -> Self {
        Self {
            name: Self::make_name(parent, graph),
            parent,
            sink,
            next: None,
            injected: RouteTrie::new(),
        }
    }

    fn make_name(parent: TableId, graph: &dyn GraphView) -> String {
        format!(
            "Redist:{}",
            graph.table_name(parent).unwrap_or_else(|| parent.to_string())
        )
    }

    /// The origin table receiving the copies.
    pub fn sink(&self) -> TableId {
        self.sink
    }

    /// Notes that the sink accepted a copy of `net`.
    pub fn record_injected(&mut self, net: IpNet) {
        if self.injected.insert(net, ()).is_err() {
            debug!("{}: {} already recorded in {}", self.name, net, self.sink);
        }
    }

    /// Forgets `net`, returning whether the sink holds this tap's copy.
    pub fn take_injected(&mut self, net: &IpNet) -> bool {
        self.injected.erase(net).is_ok()
    }

    /// Number of networks this tap has placed in the sink.
    pub fn injected_count(&self) -> usize {
        self.injected.len()
    }

    fn tap(&self, event: RouteEvent) -> Dispatch {
        debug!("{}: {} (redistributing to {})", self.name, event, self.sink);
        Dispatch::propagate([event.clone()]).with_redistribution(self.sink, event)
    }
}

impl RouteTable for RedistTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TableKind {
        TableKind::Redist
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
        Ok(self.tap(RouteEvent::Add(route)))
    }

    fn delete_route(
        &mut self,
        route: RouteEntry,
        caller: TableId,
        _graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[self.parent])?;
        Ok(self.tap(RouteEvent::Delete(route)))
    }

    fn replace_route(
        &mut self,
        old: RouteEntry,
        new: RouteEntry,
        caller: TableId,
        _graph: &dyn GraphView,
    ) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[self.parent])?;
        Ok(self.tap(RouteEvent::Replace { old, new }))
    }

    fn push(&mut self, caller: TableId) -> Result<Dispatch> {
        check_caller(&self.name, caller, &[self.parent])?;
        Ok(self.tap(RouteEvent::Push))
    }

    fn lookup_route(&self, net: &IpNet, graph: &dyn GraphView) -> Option<RouteEntry> {
        graph.lookup_route(self.parent, net)
    }

    fn lookup_route_by_addr(&self, addr: IpAddr, graph: &dyn GraphView) -> Option<RouteEntry> {
        graph.lookup_route_by_addr(self.parent, addr)
    }

    fn lookup_route_range(&self, addr: IpAddr, graph: &dyn GraphView) -> RouteRange {
        graph.lookup_route_range(self.parent, addr)
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

    fn as_redist(&self) -> Option<&RedistTable> {
        Some(self)
    }

    fn as_redist_mut(&mut self) -> Option<&mut RedistTable> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Emit;
    use crate::testing::{route_d, FakeGraph};
    use pretty_assertions::assert_eq;

    const PARENT: TableId = TableId::new(0);
    const SINK: TableId = TableId::new(3);

    fn setup() -> (RedistTable, FakeGraph) {
        let mut graph = FakeGraph::new();
        graph.name(PARENT, "static");
        (RedistTable::new(PARENT, SINK, &graph), graph)
    }

    #[test]
    fn test_add_forwards_and_redistributes() {
        let (mut t, graph) = setup();
        assert_eq!(t.name(), "Redist:static");

        let r = route_d("10.0.0.0/8", "192.0.2.1", 1, "static");
        let d = t.add_route(r.clone(), PARENT, &graph).unwrap();
        assert_eq!(
            d.emits,
            vec![
                Emit::Next(RouteEvent::Add(r.clone())),
                Emit::Redistribute {
                    sink: SINK,
                    event: RouteEvent::Add(r)
                },
            ]
        );
    }

    #[test]
    fn test_push_is_redistributed() {
        let (mut t, _) = setup();
        let d = t.push(PARENT).unwrap();
        assert_eq!(d.emits.len(), 2);
        assert_eq!(d.emits[0], Emit::Next(RouteEvent::Push));
    }

    #[test]
    fn test_lookups_delegate_to_parent() {
        let (t, mut graph) = setup();
        let r = route_d("10.0.0.0/8", "192.0.2.1", 1, "static");
        graph.insert(PARENT, r.clone());
        assert_eq!(t.lookup_route(&r.net, &graph), Some(r.clone()));
        assert_eq!(
            t.lookup_route_by_addr("10.9.9.9".parse().unwrap(), &graph),
            Some(r)
        );
    }

    #[test]
    fn test_injected_bookkeeping() {
        let (mut t, _) = setup();
        let net: IpNet = "10.0.0.0/8".parse().unwrap();
        assert!(!t.take_injected(&net));

        t.record_injected(net);
        t.record_injected(net);
        assert_eq!(t.injected_count(), 1);
        assert!(t.take_injected(&net));
        assert!(!t.take_injected(&net));
        assert_eq!(t.injected_count(), 0);
    }

    #[test]
    fn test_replumb_renames() {
        let (mut t, mut graph) = setup();
        graph.name(TableId::new(8), "rip");
        t.replumb(PARENT, TableId::new(8), &graph).unwrap();
        assert_eq!(t.name(), "Redist:rip");
        assert!(t.replumb(PARENT, SINK, &graph).is_err());
    }
}
