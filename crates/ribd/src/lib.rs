//! RIB daemon.
//!
//! Loads a [`RibConfig`](rib_tables::RibConfig), builds the route-table
//! pipeline and replays a script of route updates through it on a
//! single-threaded event loop.

pub mod config;
pub mod daemon;
pub mod update;

pub use config::{load_config, parse_config};
pub use daemon::{Command, DaemonStats, RibDaemon};
pub use update::RouteUpdate;
