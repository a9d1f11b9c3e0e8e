//! End-to-end tests of the table graph through the public `Pipeline` API.
//!
//! Each test plumbs a small graph, drives it from the origin tables and
//! checks what the terminal log table saw.

use pretty_assertions::assert_eq;
use rib_tables::{
    Outcome, PendingEntry, Pipeline, RibResolver, RouteEntry, RouteEvent, TableError, TableId,
};
use rib_types::{AdminDistance, IpNet, ProtocolType};

fn net(s: &str) -> IpNet {
    s.parse().unwrap()
}

fn route(n: &str, nexthop: &str) -> RouteEntry {
    RouteEntry::new(net(n), nexthop.parse().unwrap())
}

/// static (A) and ebgp (B) merged straight into a log table.
struct Merge {
    pipeline: Pipeline,
    stat: TableId,
    bgp: TableId,
    merged: TableId,
    log: TableId,
}

impl Merge {
    fn new() -> Self {
        let mut pipeline = Pipeline::new();
        let stat = pipeline.add_origin("static", AdminDistance::STATIC, ProtocolType::Igp);
        let bgp = pipeline.add_origin("ebgp", AdminDistance::EBGP, ProtocolType::Egp);
        let log = pipeline.add_log("final", stat).unwrap();
        let merged = pipeline.add_merged(stat, bgp).unwrap();
        Self {
            pipeline,
            stat,
            bgp,
            merged,
            log,
        }
    }

    fn stored(&self, origin: TableId, n: &str) -> RouteEntry {
        self.pipeline.lookup_route(origin, &net(n)).unwrap()
    }

    fn take_events(&mut self) -> Vec<RouteEvent> {
        self.pipeline.log_mut(self.log).unwrap().take_events()
    }

    fn installed(&self) -> Vec<RouteEntry> {
        self.pipeline.log(self.log).unwrap().routes().cloned().collect()
    }
}

/// static feeding the IGP side, ebgp gated on next hops resolved from it.
struct Gated {
    pipeline: Pipeline,
    resolver: RibResolver,
    stat: TableId,
    bgp: TableId,
    gate: TableId,
    log: TableId,
}

impl Gated {
    fn new() -> Self {
        let resolver = RibResolver::new();
        let mut pipeline = Pipeline::new();
        let stat = pipeline.add_origin("static", AdminDistance::STATIC, ProtocolType::Igp);
        let bgp = pipeline.add_origin("ebgp", AdminDistance::EBGP, ProtocolType::Egp);
        let log = pipeline.add_log("final", stat).unwrap();
        let gate = pipeline
            .add_nhlookup(bgp, Box::new(resolver.clone()))
            .unwrap();
        pipeline.add_merged(stat, gate).unwrap();
        Self {
            pipeline,
            resolver,
            stat,
            bgp,
            gate,
            log,
        }
    }

    /// Runs one resolver pass and applies what it found.
    fn resolve(&mut self) -> usize {
        let notices = self.resolver.refresh(&self.pipeline, self.stat);
        for notice in &notices {
            self.pipeline.nexthop_resolved(notice).unwrap();
        }
        notices.len()
    }

    fn take_events(&mut self) -> Vec<RouteEvent> {
        self.pipeline.log_mut(self.log).unwrap().take_events()
    }

    fn pending(&self) -> usize {
        self.pipeline.nhlookup(self.gate).unwrap().pending().len()
    }
}

#[test]
fn test_better_route_first_propagates_once() {
    let mut m = Merge::new();

    assert_eq!(
        m.pipeline.origin_add(m.stat, route("10.0.0.0/8", "192.0.2.1")).unwrap(),
        Outcome::Propagated
    );
    assert_eq!(
        m.pipeline.origin_add(m.bgp, route("10.0.0.0/8", "192.0.2.2")).unwrap(),
        Outcome::Suppressed
    );

    let a = m.stored(m.stat, "10.0.0.0/8");
    assert_eq!(m.pipeline.lookup_route(m.merged, &a.net), Some(a.clone()));
    assert_eq!(m.take_events(), vec![RouteEvent::Add(a.clone())]);
    assert_eq!(m.installed(), vec![a]);
}

#[test]
fn test_better_route_second_displaces_loser() {
    let mut m = Merge::new();

    m.pipeline
        .origin_add(m.bgp, route("10.0.0.0/8", "192.0.2.2"))
        .unwrap();
    m.pipeline
        .origin_add(m.stat, route("10.0.0.0/8", "192.0.2.1"))
        .unwrap();

    let a = m.stored(m.stat, "10.0.0.0/8");
    let b = m.stored(m.bgp, "10.0.0.0/8");
    assert_eq!(m.pipeline.lookup_route(m.merged, &a.net), Some(a.clone()));
    assert_eq!(
        m.take_events(),
        vec![
            RouteEvent::Add(b.clone()),
            RouteEvent::Delete(b),
            RouteEvent::Add(a.clone()),
        ]
    );
    assert_eq!(m.installed(), vec![a]);
}

#[test]
fn test_deleting_winner_fails_over() {
    let mut m = Merge::new();
    m.pipeline
        .origin_add(m.stat, route("10.0.0.0/8", "192.0.2.1"))
        .unwrap();
    m.pipeline
        .origin_add(m.bgp, route("10.0.0.0/8", "192.0.2.2"))
        .unwrap();
    let a = m.stored(m.stat, "10.0.0.0/8");
    let b = m.stored(m.bgp, "10.0.0.0/8");
    m.take_events();

    m.pipeline.origin_delete(m.stat, &a.net).unwrap();

    assert_eq!(
        m.take_events(),
        vec![RouteEvent::Delete(a), RouteEvent::Add(b.clone())]
    );
    assert_eq!(m.pipeline.lookup_route(m.merged, &b.net), Some(b.clone()));
    assert_eq!(m.installed(), vec![b]);
}

#[test]
fn test_longer_prefix_beats_distance() {
    let mut m = Merge::new();
    m.pipeline
        .origin_add(m.stat, route("10.0.0.0/8", "192.0.2.1"))
        .unwrap();
    m.pipeline
        .origin_add(m.bgp, route("10.1.0.0/16", "192.0.2.2"))
        .unwrap();

    let hit = m
        .pipeline
        .lookup_route_by_addr(m.merged, "10.1.2.3".parse().unwrap())
        .unwrap();
    assert_eq!(hit.net, net("10.1.0.0/16"));
    assert_eq!(&*hit.protocol, "ebgp");

    let hit = m
        .pipeline
        .lookup_route_by_addr(m.merged, "10.2.0.1".parse().unwrap())
        .unwrap();
    assert_eq!(&*hit.protocol, "static");

    // The final table answers the same way
    let hit = m
        .pipeline
        .lookup_route_by_addr(m.log, "10.1.2.3".parse().unwrap())
        .unwrap();
    assert_eq!(hit.net, net("10.1.0.0/16"));
}

#[test]
fn test_origin_rejects_duplicates_and_absent_deletes() {
    let mut m = Merge::new();
    m.pipeline
        .origin_add(m.stat, route("10.0.0.0/8", "192.0.2.1"))
        .unwrap();
    m.take_events();

    let err = m
        .pipeline
        .origin_add(m.stat, route("10.0.0.0/8", "192.0.2.9"))
        .unwrap_err();
    assert_eq!(err, TableError::AlreadyExists(net("10.0.0.0/8")));
    assert!(m.take_events().is_empty());

    let err = m.pipeline.origin_delete(m.bgp, &net("10.0.0.0/8")).unwrap_err();
    assert_eq!(err, TableError::NotFound(net("10.0.0.0/8")));
    assert!(m.take_events().is_empty());
}

#[test]
fn test_static_then_bgp_scenario() {
    let mut m = Merge::new();
    m.pipeline
        .origin_add(m.stat, route("10.0.0.0/8", "192.0.2.1"))
        .unwrap();
    m.pipeline
        .origin_add(m.bgp, route("10.0.0.0/8", "192.0.2.2"))
        .unwrap();
    m.pipeline.origin_delete(m.stat, &net("10.0.0.0/8")).unwrap();

    let counters = m.pipeline.log(m.log).unwrap().counters();
    assert_eq!(counters.adds, 2);
    assert_eq!(counters.deletes, 1);
    assert_eq!(&*m.installed()[0].protocol, "ebgp");
}

#[test]
fn test_range_lookup_intersects_parents() {
    let mut m = Merge::new();
    m.pipeline
        .origin_add(m.stat, route("10.0.0.0/8", "192.0.2.1"))
        .unwrap();
    m.pipeline
        .origin_add(m.bgp, route("10.128.0.0/9", "192.0.2.2"))
        .unwrap();

    let rr = m
        .pipeline
        .lookup_route_range(m.merged, "10.1.0.1".parse().unwrap());
    assert_eq!(rr.route().unwrap().net, net("10.0.0.0/8"));
    assert_eq!(rr.range().low().to_string(), "10.0.0.0");
    assert_eq!(rr.range().high().to_string(), "10.127.255.255");
}

#[test]
fn test_queued_replace_keeps_announced_prior() {
    let mut g = Gated::new();
    g.pipeline
        .origin_add(g.stat, route("192.0.2.0/24", "198.51.100.254"))
        .unwrap();

    assert_eq!(
        g.pipeline
            .origin_add(g.bgp, route("10.0.0.0/8", "192.0.2.1"))
            .unwrap(),
        Outcome::Queued
    );
    assert_eq!(g.resolve(), 1);
    let r0 = g.pipeline.lookup_route(g.log, &net("10.0.0.0/8")).unwrap();
    assert!(r0.nexthop_resolved);
    g.take_events();

    // Two replaces behind next hops nothing resolves yet
    let r1 = route("10.0.0.0/8", "203.0.113.1").with_protocol("ebgp");
    let r2 = route("10.0.0.0/8", "203.0.113.2").with_protocol("ebgp");
    assert_eq!(
        g.pipeline
            .replace_route(g.gate, r0.clone(), r1.clone(), g.bgp)
            .unwrap(),
        Outcome::Queued
    );
    assert_eq!(
        g.pipeline
            .replace_route(g.gate, r1.clone(), r2.clone(), g.bgp)
            .unwrap(),
        Outcome::Queued
    );

    {
        let gate = g.pipeline.nhlookup(g.gate).unwrap();
        assert_eq!(gate.pending().len(), 1);
        assert_eq!(
            gate.pending().get(&r0.net),
            Some(&PendingEntry::Replace {
                prior: r0.clone(),
                route: r2.clone(),
            })
        );
    }
    assert!(g.take_events().is_empty());
    assert_eq!(g.resolver.interest(r1.nexthop), 0);

    g.pipeline
        .origin_add(g.stat, route("203.0.113.0/24", "198.51.100.254"))
        .unwrap();
    g.take_events();
    assert_eq!(g.resolve(), 1);

    assert_eq!(
        g.take_events(),
        vec![
            RouteEvent::Replace {
                old: r0.clone(),
                new: r2.resolved(true),
            },
            RouteEvent::Push,
        ]
    );
    assert_eq!(g.pending(), 0);
    assert_eq!(g.resolver.interest(r0.nexthop), 0);
    assert_eq!(g.resolver.interest(r2.nexthop), 1);
}

#[test]
fn test_delete_before_resolution_cancels_add() {
    let mut g = Gated::new();
    let r = route("10.0.0.0/8", "192.0.2.1");

    assert_eq!(g.pipeline.origin_add(g.bgp, r.clone()).unwrap(), Outcome::Queued);
    assert_eq!(g.pending(), 1);
    assert_eq!(
        g.pipeline.origin_delete(g.bgp, &r.net).unwrap(),
        Outcome::Suppressed
    );

    assert_eq!(g.pending(), 0);
    assert!(g.take_events().is_empty());
    assert_eq!(g.resolver.interest(r.nexthop), 0);
    assert!(g.pipeline.lookup_route(g.gate, &r.net).is_none());
}

#[test]
fn test_one_resolution_drains_every_waiting_net() {
    let mut g = Gated::new();
    let nets = ["10.0.0.0/8", "11.0.0.0/8", "12.0.0.0/8"];
    for n in nets {
        g.pipeline
            .origin_add(g.bgp, route(n, "192.0.2.1"))
            .unwrap();
    }
    assert_eq!(g.pending(), 3);

    // Pending routes are invisible downstream
    assert!(g
        .pipeline
        .lookup_route_by_addr(g.log, "11.1.1.1".parse().unwrap())
        .is_none());

    g.pipeline
        .origin_add(g.stat, route("192.0.2.0/24", "198.51.100.254"))
        .unwrap();
    g.take_events();
    assert_eq!(g.resolve(), 1);

    let events = g.take_events();
    assert_eq!(events.len(), nets.len() + 1);
    for (event, n) in events.iter().zip(nets) {
        match event {
            RouteEvent::Add(r) => {
                assert_eq!(r.net, net(n));
                assert!(r.nexthop_resolved);
            }
            other => panic!("expected add, got {}", other),
        }
    }
    assert_eq!(events.last(), Some(&RouteEvent::Push));
    assert_eq!(g.pending(), 0);
    assert_eq!(g.pipeline.log(g.log).unwrap().counters().pushes, 1);
}

#[test]
fn test_redistribution_copies_into_sink() {
    let mut pipeline = Pipeline::new();
    let stat = pipeline.add_origin("static", AdminDistance::STATIC, ProtocolType::Igp);
    let rip = pipeline.add_origin("rip", AdminDistance::RIP, ProtocolType::Igp);
    let log = pipeline.add_log("final", stat).unwrap();
    pipeline.add_merged(stat, rip).unwrap();
    pipeline.add_redist(stat, rip).unwrap();

    pipeline
        .origin_add(stat, route("10.0.0.0/8", "192.0.2.1").with_metric(3))
        .unwrap();

    let copy = pipeline.lookup_route(rip, &net("10.0.0.0/8")).unwrap();
    assert_eq!(&*copy.protocol, "rip");
    assert_eq!(copy.admin_distance, AdminDistance::RIP);
    assert_eq!(copy.metric, 3);

    // static still wins in the final table
    let installed: Vec<_> = pipeline.log(log).unwrap().routes().cloned().collect();
    assert_eq!(installed.len(), 1);
    assert_eq!(&*installed[0].protocol, "static");

    pipeline.origin_delete(stat, &net("10.0.0.0/8")).unwrap();
    assert!(pipeline.lookup_route(rip, &net("10.0.0.0/8")).is_none());
    assert_eq!(pipeline.log(log).unwrap().route_count(), 0);
}

#[test]
fn test_redistribution_leaves_sink_routes_alone() {
    let mut pipeline = Pipeline::new();
    let stat = pipeline.add_origin("static", AdminDistance::STATIC, ProtocolType::Igp);
    let ospf = pipeline.add_origin("ospf", AdminDistance::OSPF, ProtocolType::Igp);
    let ospf_log = pipeline.add_log("ospf-out", ospf).unwrap();
    let tap = pipeline.add_redist(stat, ospf).unwrap();

    let own = route("10.0.0.0/8", "198.51.100.9");
    pipeline.origin_add(ospf, own.clone()).unwrap();

    // ospf already holds 10/8, so nothing is injected
    pipeline
        .origin_add(stat, route("10.0.0.0/8", "192.0.2.1"))
        .unwrap();
    assert_eq!(pipeline.redist(tap).unwrap().injected_count(), 0);
    pipeline
        .origin_replace(stat, route("10.0.0.0/8", "192.0.2.7"))
        .unwrap();
    pipeline.origin_delete(stat, &net("10.0.0.0/8")).unwrap();

    let kept = pipeline.lookup_route(ospf, &net("10.0.0.0/8")).unwrap();
    assert_eq!(kept.nexthop, own.nexthop);
    let log = pipeline.log(ospf_log).unwrap();
    assert_eq!(log.route_count(), 1);
    assert_eq!(log.counters().deletes, 0);
    drop(log);

    // Once ospf lets go, static's copies flow again and are withdrawn with it
    pipeline.origin_delete(ospf, &net("10.0.0.0/8")).unwrap();
    pipeline
        .origin_add(stat, route("10.0.0.0/8", "192.0.2.1"))
        .unwrap();
    assert_eq!(pipeline.redist(tap).unwrap().injected_count(), 1);
    pipeline.origin_delete(stat, &net("10.0.0.0/8")).unwrap();
    assert!(pipeline.lookup_route(ospf, &net("10.0.0.0/8")).is_none());
    assert_eq!(pipeline.redist(tap).unwrap().injected_count(), 0);
}

#[test]
fn test_gate_lookups_match_what_downstream_holds() {
    let mut g = Gated::new();
    g.pipeline
        .origin_add(g.stat, route("192.0.2.0/24", "198.51.100.254"))
        .unwrap();
    g.pipeline
        .origin_add(g.bgp, route("10.0.0.0/8", "192.0.2.1"))
        .unwrap();
    assert_eq!(g.resolve(), 1);

    // A more specific stuck behind a next hop nothing resolves
    assert_eq!(
        g.pipeline
            .origin_add(g.bgp, route("10.1.0.0/16", "203.0.113.1"))
            .unwrap(),
        Outcome::Queued
    );
    assert_eq!(g.pending(), 1);

    let addr = "10.1.2.3".parse().unwrap();
    let installed = g.pipeline.lookup_route_by_addr(g.log, addr);
    assert_eq!(installed.as_ref().unwrap().net, net("10.0.0.0/8"));
    assert_eq!(g.pipeline.lookup_route_by_addr(g.gate, addr), installed);

    let at_gate = g.pipeline.lookup_route_range(g.gate, addr);
    let at_log = g.pipeline.lookup_route_range(g.log, addr);
    assert_eq!(at_gate.route(), installed.as_ref());
    assert_eq!(at_gate.range(), at_log.range());
}
