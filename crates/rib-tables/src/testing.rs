//! Test doubles shared by the unit tests.

use ipnet::IpNet;
use rib_types::AdminDistance;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::rc::Rc;

use crate::resolver::{NextHopInfo, NextHopResolver};
use crate::route::{RouteEntry, RouteRange};
use crate::table::{GraphView, TableId};
use crate::trie::RouteTrie;

pub fn route(net: &str, nexthop: &str) -> RouteEntry {
    RouteEntry::new(net.parse().unwrap(), nexthop.parse().unwrap())
}

pub fn route_d(net: &str, nexthop: &str, distance: u8, protocol: &str) -> RouteEntry {
    route(net, nexthop)
        .with_admin_distance(AdminDistance::new(distance))
        .with_protocol(protocol)
}

/// A graph with no tables in it.
pub struct NoGraph;

impl GraphView for NoGraph {
    fn lookup_route(&self, _table: TableId, _net: &IpNet) -> Option<RouteEntry> {
        None
    }

    fn lookup_route_by_addr(&self, _table: TableId, _addr: IpAddr) -> Option<RouteEntry> {
        None
    }

    fn lookup_route_range(&self, _table: TableId, addr: IpAddr) -> RouteRange {
        RouteRange::unrouted(addr)
    }

    fn table_name(&self, _table: TableId) -> Option<String> {
        None
    }
}

/// A graph whose tables are plain route stores.
#[derive(Default)]
pub struct FakeGraph {
    tables: HashMap<TableId, RouteTrie<RouteEntry>>,
    names: HashMap<TableId, String>,
}

impl FakeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&mut self, table: TableId, name: &str) {
        self.names.insert(table, name.to_string());
    }

    pub fn insert(&mut self, table: TableId, route: RouteEntry) {
        let trie = self.tables.entry(table).or_default();
        let _ = trie.erase(&route.net);
        trie.insert(route.net, route).unwrap();
    }

    pub fn remove(&mut self, table: TableId, net: &IpNet) {
        if let Some(trie) = self.tables.get_mut(&table) {
            let _ = trie.erase(net);
        }
    }
}

impl GraphView for FakeGraph {
    fn lookup_route(&self, table: TableId, net: &IpNet) -> Option<RouteEntry> {
        self.tables.get(&table)?.find_exact(net).cloned()
    }

    fn lookup_route_by_addr(&self, table: TableId, addr: IpAddr) -> Option<RouteEntry> {
        self.tables
            .get(&table)?
            .find_longest_match(addr)
            .map(|(_, r)| r.clone())
    }

    fn lookup_route_range(&self, table: TableId, addr: IpAddr) -> RouteRange {
        match self.tables.get(&table) {
            Some(trie) => {
                let (best, range) = trie.find_range(addr);
                RouteRange::new(addr, best.map(|(_, r)| r.clone()), range)
            }
            None => RouteRange::unrouted(addr),
        }
    }

    fn table_name(&self, table: TableId) -> Option<String> {
        self.names.get(&table).cloned()
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    pub resolved: HashMap<IpAddr, NextHopInfo>,
    pub waiting: HashSet<IpAddr>,
    pub registered: Vec<(IpAddr, IpNet)>,
    pub deregistered: Vec<(IpAddr, IpNet)>,
}

/// Resolver whose answers are set by the test.
///
/// Clones share state, so a test can keep one handle and inspect the
/// registrations made through the one it gave away.
#[derive(Debug, Clone, Default)]
pub struct MockResolver {
    pub state: Rc<RefCell<MockState>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, nexthop: &str, metric: u32) {
        self.state.borrow_mut().resolved.insert(
            nexthop.parse().unwrap(),
            NextHopInfo {
                resolvable: true,
                metric,
            },
        );
    }

    pub fn registered(&self) -> Vec<(IpAddr, IpNet)> {
        self.state.borrow().registered.clone()
    }

    pub fn deregistered(&self) -> Vec<(IpAddr, IpNet)> {
        self.state.borrow().deregistered.clone()
    }

    /// Registrations not yet balanced by a deregistration.
    pub fn outstanding(&self) -> usize {
        let state = self.state.borrow();
        state.registered.len() - state.deregistered.len()
    }
}

impl NextHopResolver for MockResolver {
    fn register_interest(&mut self, nexthop: IpAddr, net: IpNet, _subscriber: TableId) -> bool {
        let mut state = self.state.borrow_mut();
        state.registered.push((nexthop, net));
        if state.resolved.contains_key(&nexthop) {
            true
        } else {
            state.waiting.insert(nexthop);
            false
        }
    }

    fn deregister_interest(&mut self, nexthop: IpAddr, net: IpNet, _subscriber: TableId) {
        self.state.borrow_mut().deregistered.push((nexthop, net));
    }

    fn lookup(&self, nexthop: IpAddr) -> Option<NextHopInfo> {
        self.state.borrow().resolved.get(&nexthop).copied()
    }
}
