//! Route entries and range lookup results.

use ipnet::IpNet;
use rib_types::{AdminDistance, IpRange};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// A single route as it flows through the table pipeline.
///
/// Entries are values: a stage that needs to change a route publishes a
/// modified copy, it never edits the one it was handed. Cloning is cheap
/// (the protocol tag is shared).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Destination network, host bits cleared.
    pub net: IpNet,
    /// Next-hop router address.
    pub nexthop: IpAddr,
    /// Preference of the source that produced the route.
    pub admin_distance: AdminDistance,
    /// Protocol-specific cost.
    pub metric: u32,
    /// Name of the source table that produced the route.
    pub protocol: Arc<str>,
    /// Set once the next hop has been checked for reachability.
    pub nexthop_resolved: bool,
    /// Set when a stage rewrote the route without caching the result.
    pub changed: bool,
}

impl RouteEntry {
    /// Creates a new route with unknown distance and no source tag.
    ///
    /// The origin table that ingests the route stamps its own distance and
    /// tag on it.
    pub fn new(net: IpNet, nexthop: IpAddr) -> Self {
        Self {
            net: net.trunc(),
            nexthop,
            admin_distance: AdminDistance::UNKNOWN,
            metric: 0,
            protocol: Arc::from(""),
            nexthop_resolved: false,
            changed: false,
        }
    }

    /// Sets the metric.
    pub fn with_metric(mut self, metric: u32) -> Self {
        self.metric = metric;
        self
    }

    /// Sets the admin distance.
    pub fn with_admin_distance(mut self, distance: AdminDistance) -> Self {
        self.admin_distance = distance;
        self
    }

    /// Sets the source tag.
    pub fn with_protocol(mut self, protocol: impl Into<Arc<str>>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Marks the route as rewritten in place.
    pub fn with_changed(mut self) -> Self {
        self.changed = true;
        self
    }

    /// Returns a copy carrying the outcome of next-hop resolution.
    pub fn resolved(&self, resolvable: bool) -> Self {
        let mut route = self.clone();
        route.nexthop_resolved = resolvable;
        route
    }

    /// Returns true if `self` should be preferred over `other` for the
    /// same network. Equal distances prefer neither.
    pub fn is_better_than(&self, other: &RouteEntry) -> bool {
        self.admin_distance.is_better_than(other.admin_distance)
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {} [{}/{}] {}",
            self.net, self.nexthop, self.admin_distance, self.metric, self.protocol
        )
    }
}

/// Result of a range lookup.
///
/// Holds the route the queried address resolves to (if any) and the widest
/// interval around the address in which every address resolves to that same
/// route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRange {
    requested: IpAddr,
    route: Option<RouteEntry>,
    range: IpRange,
}

impl RouteRange {
    /// Creates a range result.
    pub fn new(requested: IpAddr, route: Option<RouteEntry>, range: IpRange) -> Self {
        Self {
            requested,
            route,
            range,
        }
    }

    /// A result covering the whole address family with no route.
    pub fn unrouted(requested: IpAddr) -> Self {
        Self::new(requested, None, IpRange::full(requested))
    }

    /// The address that was looked up.
    pub fn requested(&self) -> IpAddr {
        self.requested
    }

    /// The route the address resolves to.
    pub fn route(&self) -> Option<&RouteEntry> {
        self.route.as_ref()
    }

    /// Consumes the result, returning the route.
    pub fn into_route(self) -> Option<RouteEntry> {
        self.route
    }

    /// The interval of addresses resolving identically.
    pub fn range(&self) -> IpRange {
        self.range
    }

    /// Replaces the route, keeping the interval.
    pub fn set_route(&mut self, route: Option<RouteEntry>) {
        self.route = route;
    }

    /// Folds another answer for the same address into this one.
    ///
    /// The more specific route wins; equal prefix lengths go to the lower
    /// admin distance, and a full tie keeps `self`. The interval becomes the
    /// intersection of both.
    pub fn merge(&mut self, other: RouteRange) {
        debug_assert_eq!(self.requested, other.requested);

        if let Some(theirs) = other.route {
            let take = match &self.route {
                None => true,
                Some(ours) => {
                    let (ours_len, theirs_len) = (ours.net.prefix_len(), theirs.net.prefix_len());
                    theirs_len > ours_len || (theirs_len == ours_len && theirs.is_better_than(ours))
                }
            };
            if take {
                self.route = Some(theirs);
            }
        }

        if let Some(both) = self.range.intersect(&other.range) {
            self.range = both;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn route(net: &str, nexthop: &str, distance: u8) -> RouteEntry {
        RouteEntry::new(net.parse().unwrap(), nexthop.parse().unwrap())
            .with_admin_distance(AdminDistance::new(distance))
    }

    fn range(low: &str, high: &str) -> IpRange {
        IpRange::new(low.parse().unwrap(), high.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_new_truncates_network() {
        let r = RouteEntry::new("10.1.1.1/24".parse().unwrap(), "192.0.2.1".parse().unwrap());
        assert_eq!(r.net.to_string(), "10.1.1.0/24");
        assert_eq!(r.admin_distance, AdminDistance::UNKNOWN);
        assert!(!r.changed);
    }

    #[test]
    fn test_resolved_copy() {
        let r = route("10.0.0.0/8", "192.0.2.1", 20);
        let resolved = r.resolved(true);
        assert!(resolved.nexthop_resolved);
        assert!(!r.nexthop_resolved);
    }

    #[test]
    fn test_display() {
        let r = route("10.0.0.0/8", "192.0.2.1", 20)
            .with_metric(5)
            .with_protocol("ebgp");
        assert_eq!(r.to_string(), "10.0.0.0/8 via 192.0.2.1 [20/5] ebgp");
    }

    #[test]
    fn test_range_merge_prefers_longer_prefix() {
        let addr = "10.1.1.1".parse().unwrap();
        let mut ours = RouteRange::new(
            addr,
            Some(route("10.0.0.0/8", "192.0.2.1", 1)),
            range("10.1.0.0", "10.255.255.255"),
        );
        let theirs = RouteRange::new(
            addr,
            Some(route("10.1.1.0/24", "192.0.2.2", 200)),
            range("10.1.1.0", "10.1.1.255"),
        );
        ours.merge(theirs);

        assert_eq!(ours.route().unwrap().net.to_string(), "10.1.1.0/24");
        assert_eq!(ours.range(), range("10.1.1.0", "10.1.1.255"));
    }

    #[test]
    fn test_range_merge_equal_length_uses_distance() {
        let addr = "10.1.1.1".parse().unwrap();
        let mut ours = RouteRange::new(
            addr,
            Some(route("10.1.1.0/24", "192.0.2.1", 120)),
            range("10.1.1.0", "10.1.1.255"),
        );
        ours.merge(RouteRange::new(
            addr,
            Some(route("10.1.1.0/24", "192.0.2.2", 110)),
            range("10.1.1.0", "10.1.1.127"),
        ));

        assert_eq!(ours.route().unwrap().admin_distance.as_u8(), 110);
        assert_eq!(ours.range(), range("10.1.1.0", "10.1.1.127"));
    }

    #[test]
    fn test_range_merge_with_unrouted() {
        let addr = "10.1.1.1".parse().unwrap();
        let mut ours = RouteRange::unrouted(addr);
        ours.merge(RouteRange::new(
            addr,
            Some(route("10.1.1.0/24", "192.0.2.2", 110)),
            range("10.1.1.0", "10.1.1.255"),
        ));
        assert!(ours.route().is_some());
        assert_eq!(ours.range(), range("10.1.1.0", "10.1.1.255"));
    }
}
