//! The operator contract shared by every route table.
//!
//! Tables never call each other directly. A mutating call returns a
//! [`Dispatch`]: the table's own verdict plus the ordered events it wants
//! sent on. The [`Pipeline`](crate::Pipeline) delivers those events once
//! the table's borrow has ended, which lets downstream tables look back up
//! through the graph while an event is still propagating.

use ipnet::IpNet;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use crate::error::{Result, TableError};
use crate::log_table::LogTable;
use crate::nhlookup::NhLookupTable;
use crate::origin::OriginTable;
use crate::redist::RedistTable;
use crate::route::{RouteEntry, RouteRange};

/// Stable handle to a table inside a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableId(usize);

impl TableId {
    /// Creates a handle from a raw slot index.
    pub const fn new(index: usize) -> Self {
        TableId(index)
    }

    /// Returns the raw slot index.
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

/// The kinds of table a pipeline can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Origin,
    Merged,
    Redist,
    NhLookup,
    Log,
}

impl TableKind {
    /// Returns the kind as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TableKind::Origin => "origin",
            TableKind::Merged => "merged",
            TableKind::Redist => "redist",
            TableKind::NhLookup => "nhlookup",
            TableKind::Log => "log",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a table decided to do with an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// One or more events were sent on.
    Propagated,
    /// The event was absorbed; downstream is unaffected.
    Suppressed,
    /// The event is parked until a next hop resolves.
    Queued,
}

/// A change travelling down the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteEvent {
    Add(RouteEntry),
    Delete(RouteEntry),
    Replace { old: RouteEntry, new: RouteEntry },
    /// Flush marker: end of a batch of changes.
    Push,
}

impl RouteEvent {
    /// The network the event is about, if any.
    pub fn net(&self) -> Option<IpNet> {
        match self {
            RouteEvent::Add(r) | RouteEvent::Delete(r) => Some(r.net),
            RouteEvent::Replace { new, .. } => Some(new.net),
            RouteEvent::Push => None,
        }
    }
}

impl fmt::Display for RouteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteEvent::Add(r) => write!(f, "add {}", r),
            RouteEvent::Delete(r) => write!(f, "delete {}", r),
            RouteEvent::Replace { old, new } => write!(f, "replace {} -> {}", old, new),
            RouteEvent::Push => f.write_str("push"),
        }
    }
}

/// Where an emitted event goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emit {
    /// To the emitting table's `next`.
    Next(RouteEvent),
    /// Re-injected into the origin table `sink`.
    Redistribute { sink: TableId, event: RouteEvent },
}

/// The result of a mutating call on a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub outcome: Outcome,
    pub emits: Vec<Emit>,
}

impl Dispatch {
    /// Sends `events` to the next table, in order.
    pub fn propagate(events: impl IntoIterator<Item = RouteEvent>) -> Self {
        Self {
            outcome: Outcome::Propagated,
            emits: events.into_iter().map(Emit::Next).collect(),
        }
    }

    /// Nothing goes downstream.
    pub fn suppressed() -> Self {
        Self {
            outcome: Outcome::Suppressed,
            emits: Vec::new(),
        }
    }

    /// The event has been parked.
    pub fn queued() -> Self {
        Self {
            outcome: Outcome::Queued,
            emits: Vec::new(),
        }
    }

    /// Appends a redistribution of `event` into `sink`.
    pub fn with_redistribution(mut self, sink: TableId, event: RouteEvent) -> Self {
        self.emits.push(Emit::Redistribute { sink, event });
        self
    }
}

/// Read-only access to other tables, handed to a table while it runs.
pub trait GraphView {
    /// Exact lookup in `table`.
    fn lookup_route(&self, table: TableId, net: &IpNet) -> Option<RouteEntry>;

    /// Longest-match lookup in `table`.
    fn lookup_route_by_addr(&self, table: TableId, addr: IpAddr) -> Option<RouteEntry>;

    /// Range lookup in `table`.
    fn lookup_route_range(&self, table: TableId, addr: IpAddr) -> RouteRange;

    /// The display name of `table`.
    fn table_name(&self, table: TableId) -> Option<String>;
}

/// A route table operator.
///
/// Mutating calls name their caller; a table only accepts events from its
/// parents. Lookups answer what this table would currently report to its
/// downstream, asking parents through `graph` where needed.
pub trait RouteTable: fmt::Debug {
    /// Display name.
    fn name(&self) -> &str;

    /// The kind of table.
    fn kind(&self) -> TableKind;

    /// The downstream table, if plumbed.
    fn next(&self) -> Option<TableId>;

    /// Sets the downstream table.
    fn set_next(&mut self, next: Option<TableId>);

    /// The upstream tables.
    fn parents(&self) -> Vec<TableId>;

    /// A route was added upstream.
    fn add_route(
        &mut self,
        route: RouteEntry,
        caller: TableId,
        graph: &dyn GraphView,
    ) -> Result<Dispatch>;

    /// A route was deleted upstream.
    fn delete_route(
        &mut self,
        route: RouteEntry,
        caller: TableId,
        graph: &dyn GraphView,
    ) -> Result<Dispatch>;

    /// A route for the same network changed upstream.
    fn replace_route(
        &mut self,
        old: RouteEntry,
        new: RouteEntry,
        caller: TableId,
        graph: &dyn GraphView,
    ) -> Result<Dispatch>;

    /// End of a batch; forwarded unconditionally.
    fn push(&mut self, caller: TableId) -> Result<Dispatch> {
        check_caller(self.name(), caller, &self.parents())?;
        Ok(Dispatch::propagate([RouteEvent::Push]))
    }

    /// Exact lookup.
    fn lookup_route(&self, net: &IpNet, graph: &dyn GraphView) -> Option<RouteEntry>;

    /// Longest-match lookup.
    fn lookup_route_by_addr(&self, addr: IpAddr, graph: &dyn GraphView) -> Option<RouteEntry>;

    /// Longest-match lookup with the interval it holds for.
    fn lookup_route_range(&self, addr: IpAddr, graph: &dyn GraphView) -> RouteRange;

    /// Swaps parent `old` for `new`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::UnknownParent`] if `old` is not a parent.
    fn replumb(&mut self, old: TableId, new: TableId, graph: &dyn GraphView) -> Result<()>;

    fn as_origin(&self) -> Option<&OriginTable> {
        None
    }

    fn as_origin_mut(&mut self) -> Option<&mut OriginTable> {
        None
    }

    fn as_nhlookup_mut(&mut self) -> Option<&mut NhLookupTable> {
        None
    }

    fn as_nhlookup(&self) -> Option<&NhLookupTable> {
        None
    }

    fn as_redist(&self) -> Option<&RedistTable> {
        None
    }

    fn as_redist_mut(&mut self) -> Option<&mut RedistTable> {
        None
    }

    fn as_log(&self) -> Option<&LogTable> {
        None
    }

    fn as_log_mut(&mut self) -> Option<&mut LogTable> {
        None
    }
}

/// Verifies that `caller` is one of `expected`.
///
/// Only enforced in builds with debug assertions.
pub fn check_caller(table: &str, caller: TableId, expected: &[TableId]) -> Result<()> {
    if cfg!(debug_assertions) && !expected.contains(&caller) {
        let expected = if expected.is_empty() {
            "no caller".to_string()
        } else {
            expected
                .iter()
                .map(TableId::to_string)
                .collect::<Vec<_>>()
                .join(" or ")
        };
        return Err(TableError::CallerMismatch {
            table: table.to_string(),
            caller,
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_id_display() {
        assert_eq!(TableId::new(4).to_string(), "table#4");
        assert_eq!(TableId::new(4).index(), 4);
    }

    #[test]
    fn test_check_caller() {
        let parents = [TableId::new(1), TableId::new(2)];
        assert!(check_caller("Merged", TableId::new(2), &parents).is_ok());

        let err = check_caller("Merged", TableId::new(3), &parents).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Merged: called by table#3, expected table#1 or table#2"
        );

        let err = check_caller("ospf", TableId::new(0), &[]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_dispatch_builders() {
        let d = Dispatch::propagate([RouteEvent::Push]);
        assert_eq!(d.outcome, Outcome::Propagated);
        assert_eq!(d.emits, vec![Emit::Next(RouteEvent::Push)]);

        let d = Dispatch::suppressed().with_redistribution(TableId::new(5), RouteEvent::Push);
        assert_eq!(d.outcome, Outcome::Suppressed);
        assert_eq!(d.emits.len(), 1);
        assert!(Dispatch::queued().emits.is_empty());
    }
}
