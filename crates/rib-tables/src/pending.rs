//! Routes parked until their next hop resolves.

use ipnet::IpNet;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::error::{Result, TableError};
use crate::route::RouteEntry;
use crate::trie::RouteTrie;

/// A parked event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingEntry {
    /// An add nobody downstream has heard of yet.
    Add(RouteEntry),
    /// A replace. `prior` is the route downstream currently holds.
    Replace { prior: RouteEntry, route: RouteEntry },
}

impl PendingEntry {
    /// The route waiting to be announced.
    pub fn route(&self) -> &RouteEntry {
        match self {
            PendingEntry::Add(route) | PendingEntry::Replace { route, .. } => route,
        }
    }

    /// The route downstream still holds, for a pending replace.
    pub fn prior(&self) -> Option<&RouteEntry> {
        match self {
            PendingEntry::Add(_) => None,
            PendingEntry::Replace { prior, .. } => Some(prior),
        }
    }

    /// The next hop being waited on.
    pub fn nexthop(&self) -> IpAddr {
        self.route().nexthop
    }

    /// The network the entry is for.
    pub fn net(&self) -> IpNet {
        self.route().net
    }
}

/// Pending entries indexed both by network and by next hop.
///
/// At most one entry exists per network. Both indices are only ever
/// updated together, so an entry is either in both or in neither.
#[derive(Debug, Default)]
pub struct PendingQueue {
    by_net: RouteTrie<PendingEntry>,
    by_nexthop: BTreeMap<IpAddr, BTreeSet<IpNet>>,
}

impl PendingQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::PendingConflict`] if an entry for the same
    /// network is already parked.
    pub fn insert(&mut self, entry: PendingEntry) -> Result<()> {
        let net = entry.net();
        if let Some(existing) = self.by_net.find_exact(&net) {
            return Err(TableError::PendingConflict {
                net,
                nexthop: existing.nexthop(),
            });
        }
        let nexthop = entry.nexthop();
        self.by_net.insert(net, entry)?;
        self.by_nexthop.entry(nexthop).or_default().insert(net);
        Ok(())
    }

    /// The entry parked for `net`.
    pub fn get(&self, net: &IpNet) -> Option<&PendingEntry> {
        self.by_net.find_exact(net)
    }

    /// Unparks the entry for `net`.
    pub fn remove(&mut self, net: &IpNet) -> Option<PendingEntry> {
        let entry = self.by_net.erase(net).ok()?;
        self.unindex_nexthop(entry.nexthop(), net);
        Some(entry)
    }

    /// Unparks the entry for `net` only if it waits on `nexthop`.
    pub fn remove_if_nexthop(&mut self, net: &IpNet, nexthop: IpAddr) -> Option<PendingEntry> {
        match self.get(net) {
            Some(entry) if entry.nexthop() == nexthop => self.remove(net),
            _ => None,
        }
    }

    /// Unparks every entry waiting on `nexthop`, in network order.
    pub fn drain_nexthop(&mut self, nexthop: IpAddr) -> Vec<PendingEntry> {
        let Some(nets) = self.by_nexthop.remove(&nexthop) else {
            return Vec::new();
        };
        nets.iter()
            .filter_map(|net| self.by_net.erase(net).ok())
            .collect()
    }

    /// Next hops with at least one parked entry.
    pub fn nexthops(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.by_nexthop.keys().copied()
    }

    /// Iterates over the parked entries.
    pub fn iter(&self) -> impl Iterator<Item = &PendingEntry> + '_ {
        self.by_net.iter().map(|(_, entry)| entry)
    }

    /// Number of parked entries.
    pub fn len(&self) -> usize {
        self.by_net.len()
    }

    /// Returns true if nothing is parked.
    pub fn is_empty(&self) -> bool {
        self.by_net.is_empty()
    }

    fn unindex_nexthop(&mut self, nexthop: IpAddr, net: &IpNet) {
        if let Some(nets) = self.by_nexthop.get_mut(&nexthop) {
            nets.remove(net);
            if nets.is_empty() {
                self.by_nexthop.remove(&nexthop);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::route;
    use pretty_assertions::assert_eq;

    fn nh(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_insert_indexes_both_ways() {
        let mut q = PendingQueue::new();
        q.insert(PendingEntry::Add(route("10.0.0.0/8", "192.0.2.1"))).unwrap();
        q.insert(PendingEntry::Add(route("11.0.0.0/8", "192.0.2.1"))).unwrap();
        q.insert(PendingEntry::Add(route("12.0.0.0/8", "192.0.2.2"))).unwrap();

        assert_eq!(q.len(), 3);
        assert_eq!(q.nexthops().collect::<Vec<_>>(), vec![nh("192.0.2.1"), nh("192.0.2.2")]);
        assert!(q.get(&"11.0.0.0/8".parse().unwrap()).is_some());
    }

    #[test]
    fn test_insert_conflict() {
        let mut q = PendingQueue::new();
        q.insert(PendingEntry::Add(route("10.0.0.0/8", "192.0.2.1"))).unwrap();
        let err = q
            .insert(PendingEntry::Add(route("10.0.0.0/8", "192.0.2.2")))
            .unwrap_err();
        assert_eq!(
            err,
            TableError::PendingConflict {
                net: "10.0.0.0/8".parse().unwrap(),
                nexthop: nh("192.0.2.1"),
            }
        );
        assert!(err.is_fatal());
        assert_eq!(q.nexthops().count(), 1);
    }

    #[test]
    fn test_remove_unindexes_nexthop() {
        let mut q = PendingQueue::new();
        let net = "10.0.0.0/8".parse().unwrap();
        q.insert(PendingEntry::Replace {
            prior: route("10.0.0.0/8", "192.0.2.9"),
            route: route("10.0.0.0/8", "192.0.2.1"),
        })
        .unwrap();

        assert!(q.remove_if_nexthop(&net, nh("192.0.2.9")).is_none());
        let entry = q.remove(&net).unwrap();
        assert_eq!(entry.prior().unwrap().nexthop, nh("192.0.2.9"));
        assert!(q.is_empty());
        assert_eq!(q.nexthops().count(), 0);
        assert!(q.remove(&net).is_none());
    }

    #[test]
    fn test_drain_nexthop_in_network_order() {
        let mut q = PendingQueue::new();
        q.insert(PendingEntry::Add(route("12.0.0.0/8", "192.0.2.1"))).unwrap();
        q.insert(PendingEntry::Add(route("10.0.0.0/8", "192.0.2.1"))).unwrap();
        q.insert(PendingEntry::Add(route("11.0.0.0/8", "192.0.2.2"))).unwrap();

        let drained: Vec<String> = q
            .drain_nexthop(nh("192.0.2.1"))
            .iter()
            .map(|e| e.net().to_string())
            .collect();
        assert_eq!(drained, vec!["10.0.0.0/8", "12.0.0.0/8"]);
        assert_eq!(q.len(), 1);
        assert!(q.drain_nexthop(nh("192.0.2.1")).is_empty());
    }
}
