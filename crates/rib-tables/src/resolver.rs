//! Next-hop resolution.
//!
//! A [`NextHopResolver`] answers whether a next hop is reachable. It may
//! not know yet: registering interest returns `false`, and the answer is
//! delivered later as a [`ResolutionNotice`] that the owner of the pipeline
//! hands to [`Pipeline::nexthop_resolved`](crate::Pipeline::nexthop_resolved)
//! on a later turn of its event loop.

use ipnet::IpNet;
use log::{debug, info};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::IpAddr;
use std::rc::Rc;

use crate::table::{GraphView, TableId};

/// What the resolver knows about a next hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NextHopInfo {
    /// Whether the next hop can be reached at all.
    pub resolvable: bool,
    /// Cost of reaching it.
    pub metric: u32,
}

/// Delivered when a next hop that subscribers were waiting on resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionNotice {
    /// The table that registered interest.
    pub subscriber: TableId,
    /// The next hop that resolved.
    pub nexthop: IpAddr,
    /// Networks the subscriber registered against this next hop.
    pub nets: Vec<IpNet>,
    /// Whether resolution succeeded.
    pub success: bool,
}

/// Answers next-hop reachability for [`NhLookupTable`](crate::NhLookupTable).
///
/// Registrations are counted per `(subscriber, nexthop, net)`; every
/// `register_interest` is balanced by exactly one `deregister_interest`.
pub trait NextHopResolver: fmt::Debug {
    /// Registers interest in `nexthop` on behalf of `net`.
    ///
    /// Returns true if the next hop is already resolved.
    fn register_interest(&mut self, nexthop: IpAddr, net: IpNet, subscriber: TableId) -> bool;

    /// Drops one registration made by `register_interest`.
    fn deregister_interest(&mut self, nexthop: IpAddr, net: IpNet, subscriber: TableId);

    /// Returns what is known about `nexthop`, or `None` if unresolved.
    fn lookup(&self, nexthop: IpAddr) -> Option<NextHopInfo>;
}

#[derive(Debug, Default)]
struct ResolverState {
    resolved: HashMap<IpAddr, NextHopInfo>,
    interest: BTreeMap<(IpAddr, TableId), BTreeMap<IpNet, usize>>,
}

impl ResolverState {
    fn has_interest(&self, nexthop: IpAddr) -> bool {
        self.interest.keys().any(|(nh, _)| *nh == nexthop)
    }
}

/// Resolves next hops by longest-match lookup on an IGP table.
///
/// This is a shared handle: clone it into every [`NhLookupTable`] and keep
/// one to call [`refresh`](RibResolver::refresh) after each batch of
/// updates.
///
/// [`NhLookupTable`]: crate::NhLookupTable
#[derive(Debug, Clone, Default)]
pub struct RibResolver {
    state: Rc<RefCell<ResolverState>>,
}

impl RibResolver {
    /// Creates a resolver with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resolved next hops held in the cache.
    pub fn cached(&self) -> usize {
        self.state.borrow().resolved.len()
    }

    /// Total registrations currently held for `nexthop`.
    pub fn interest(&self, nexthop: IpAddr) -> usize {
        self.state
            .borrow()
            .interest
            .iter()
            .filter(|((nh, _), _)| *nh == nexthop)
            .flat_map(|(_, nets)| nets.values())
            .sum()
    }

    /// Re-resolves every next hop with interest against `igp`.
    ///
    /// Next hops that became reachable are cached and a notice is returned
    /// for each subscriber waiting on them. Cached next hops that no longer
    /// resolve are evicted, so later registrations wait again.
    ///
    /// Loss of reachability is not announced: no notice is raised for an
    /// evicted next hop, and routes already released through it keep
    /// `nexthop_resolved = true` downstream until they are replaced or
    /// withdrawn.
    pub fn refresh(&self, graph: &dyn GraphView, igp: TableId) -> Vec<ResolutionNotice> {
        let mut state = self.state.borrow_mut();
        let mut notices = Vec::new();

        let nexthops: Vec<IpAddr> = {
            let mut seen: Vec<IpAddr> = state.interest.keys().map(|(nh, _)| *nh).collect();
            seen.dedup();
            seen
        };

        for nexthop in nexthops {
            let found = graph.lookup_route_by_addr(igp, nexthop);
            match (found, state.resolved.contains_key(&nexthop)) {
                (Some(route), false) => {
                    info!(
                        "RibResolver: Next hop {} resolved via {}",
                        nexthop, route.net
                    );
                    state.resolved.insert(
                        nexthop,
                        NextHopInfo {
                            resolvable: true,
                            metric: route.metric,
                        },
                    );
                    for ((nh, subscriber), nets) in state.interest.range((nexthop, TableId::new(0))..)
                    {
                        if *nh != nexthop {
                            break;
                        }
                        notices.push(ResolutionNotice {
                            subscriber: *subscriber,
                            nexthop,
                            nets: nets.keys().copied().collect(),
                            success: true,
                        });
                    }
                }
                (Some(route), true) => {
                    if let Some(info) = state.resolved.get_mut(&nexthop) {
                        info.metric = route.metric;
                    }
                }
                (None, true) => {
                    info!("RibResolver: Next hop {} no longer resolves", nexthop);
                    state.resolved.remove(&nexthop);
                }
                (None, false) => {}
            }
        }

        notices
    }
}

impl NextHopResolver for RibResolver {
    fn register_interest(&mut self, nexthop: IpAddr, net: IpNet, subscriber: TableId) -> bool {
        let mut state = self.state.borrow_mut();
        *state
            .interest
            .entry((nexthop, subscriber))
            .or_default()
            .entry(net)
            .or_insert(0) += 1;
        let resolved = state.resolved.contains_key(&nexthop);
        debug!(
            "RibResolver: {} registered {} for {} ({})",
            subscriber,
            nexthop,
            net,
            if resolved { "resolved" } else { "pending" }
        );
        resolved
    }

    fn deregister_interest(&mut self, nexthop: IpAddr, net: IpNet, subscriber: TableId) {
        let mut state = self.state.borrow_mut();
        let key = (nexthop, subscriber);
        let Some(nets) = state.interest.get_mut(&key) else {
            debug!(
                "RibResolver: {} deregistered {} for {} without interest",
                subscriber, nexthop, net
            );
            return;
        };
        if let Some(count) = nets.get_mut(&net) {
            *count -= 1;
            if *count == 0 {
                nets.remove(&net);
            }
        }
        if nets.is_empty() {
            state.interest.remove(&key);
        }
        if !state.has_interest(nexthop) && state.resolved.remove(&nexthop).is_some() {
            debug!("RibResolver: Evicted {} from cache", nexthop);
        }
    }

    fn lookup(&self, nexthop: IpAddr) -> Option<NextHopInfo> {
        self.state.borrow().resolved.get(&nexthop).copied()
    }
}
