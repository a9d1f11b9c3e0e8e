//! Composable route-table pipeline.
//!
//! Routes enter at [`OriginTable`]s, one per routing protocol, and flow
//! down a graph of operators as add/delete/replace events:
//!
//! - [`MergedTable`] picks the preferred of two streams per network
//! - [`RedistTable`] copies a stream into another protocol's origin
//! - [`NhLookupTable`] holds routes until their next hop resolves
//! - [`LogTable`] terminates the graph and keeps the installed routes
//!
//! A [`Pipeline`] owns the operators and carries events between them.
//! [`Rib`] builds a pipeline for a set of protocols from a [`RibConfig`].

mod config;
mod error;
mod log_table;
mod merged;
mod nhlookup;
mod origin;
mod pending;
mod pipeline;
mod redist;
mod resolver;
mod rib;
mod route;
mod table;
mod trie;

#[cfg(test)]
mod testing;

pub use config::{ProtocolConfig, RedistConfig, RibConfig, DEFAULT_FINAL_TABLE};
pub use error::{Result, TableError};
pub use log_table::{LogCounters, LogTable};
pub use merged::MergedTable;
pub use nhlookup::NhLookupTable;
pub use origin::OriginTable;
pub use pending::{PendingEntry, PendingQueue};
pub use pipeline::{Pipeline, TableInfo};
pub use redist::RedistTable;
pub use resolver::{NextHopInfo, NextHopResolver, ResolutionNotice, RibResolver};
pub use rib::{ProtocolTables, Rib};
pub use route::{RouteEntry, RouteRange};
pub use table::{
    check_caller, Dispatch, Emit, GraphView, Outcome, RouteEvent, RouteTable, TableId, TableKind,
};
pub use trie::RouteTrie;
