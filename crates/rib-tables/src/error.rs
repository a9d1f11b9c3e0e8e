//! Error types for the route-table pipeline.
//!
//! Errors fall into two disjoint groups. Integrity violations mean an
//! upstream stage (or the code plumbing the graph) has a bug; the process
//! should not try to carry on after one. Everything else is an ordinary
//! negative result a front end is expected to handle.

use ipnet::IpNet;
use std::net::IpAddr;
use thiserror::Error;

use crate::table::TableId;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, TableError>;

/// Errors raised by route tables and the pipeline that connects them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// The network is already present in an origin table.
    #[error("Route already exists: {0}")]
    AlreadyExists(IpNet),

    /// The network is not present in an origin table.
    #[error("Route not found: {0}")]
    NotFound(IpNet),

    /// No protocol with this name is plumbed into the RIB.
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// A protocol with this name is already plumbed into the RIB.
    #[error("Protocol already exists: {0}")]
    DuplicateProtocol(String),

    /// Configuration failed validation.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// A table was called by something other than one of its parents.
    #[error("{table}: called by {caller}, expected {expected}")]
    CallerMismatch {
        /// Name of the table that was called.
        table: String,
        /// The table that made the call.
        caller: TableId,
        /// The parent the table expected to hear from.
        expected: String,
    },

    /// `replumb` named a parent the table does not have.
    #[error("{table}: {parent} is not a parent of this table")]
    UnknownParent {
        /// Name of the table being replumbed.
        table: String,
        /// The claimed old parent.
        parent: TableId,
    },

    /// A table was entered again while it was still handling a call.
    #[error("Table {0} re-entered while busy (cycle in the table graph?)")]
    Reentered(TableId),

    /// A route rewritten in place reached a stage that does not cache routes.
    #[error("{table}: changed route {net} reached a stage with no upstream cache")]
    ChangedRoute {
        /// Name of the table that received it.
        table: String,
        /// The route's network.
        net: IpNet,
    },

    /// Downstream received a second add for a network it already has.
    #[error("{table}: add for {net} which is already installed")]
    DuplicateInstall {
        /// Name of the table that received it.
        table: String,
        /// The duplicated network.
        net: IpNet,
    },

    /// Downstream received a delete for a network it never saw added.
    #[error("{table}: delete for {net} which was never installed")]
    MissingInstall {
        /// Name of the table that received it.
        table: String,
        /// The missing network.
        net: IpNet,
    },

    /// The pending queue already holds an entry for this network.
    #[error("Pending entry for {net} already queued behind next hop {nexthop}")]
    PendingConflict {
        /// The network that was queued twice.
        net: IpNet,
        /// The next hop of the existing entry.
        nexthop: IpAddr,
    },

    /// No table exists with this handle.
    #[error("Unknown table: {0}")]
    UnknownTable(TableId),

    /// The table exists but cannot perform the requested operation.
    #[error("Table {table} is not {expected}")]
    WrongTableKind {
        /// The table handle.
        table: TableId,
        /// What kind of table the operation needs.
        expected: &'static str,
    },

    /// Splicing a table would join two different downstream paths.
    #[error("Cannot plumb {table}: parents feed different tables")]
    AmbiguousPlumbing {
        /// The table being plumbed.
        table: String,
    },
}

impl TableError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error means the table graph is corrupt.
    ///
    /// Callers must treat fatal errors as bugs: log and stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TableError::AlreadyExists(_)
                | TableError::NotFound(_)
                | TableError::UnknownProtocol(_)
                | TableError::DuplicateProtocol(_)
                | TableError::InvalidConfig { .. }
        )
    }
}
