//! Common types for the RIB route-table pipeline.
//!
//! This crate provides the network primitives shared by every pipeline
//! stage:
//!
//! - [`IpNet`]: IPv4/IPv6 network prefixes (re-exported from `ipnet`)
//! - [`IpRange`]: inclusive address intervals used by range lookups
//! - [`AdminDistance`]: per-source route preference (lower wins)
//! - [`ProtocolType`]: IGP/EGP classification of a route source

mod distance;
mod ip;
mod protocol;

pub use distance::AdminDistance;
pub use ip::{host_net, parse_net, IpNet, IpRange, Ipv4Net, Ipv6Net};
pub use protocol::ProtocolType;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid address range: {0}")]
    InvalidRange(String),

    #[error("invalid admin distance: {0} (must be 0-255)")]
    InvalidAdminDistance(String),

    #[error("invalid protocol type: {0}")]
    InvalidProtocolType(String),
}
