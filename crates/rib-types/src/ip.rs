//! IP prefix helpers and address intervals.
//!
//! Prefixes are `ipnet` types. Everything stored in a route table is kept
//! with its host bits cleared, so `10.1.2.3/24` and `10.1.2.0/24` name the
//! same network.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};

/// Parses a prefix in CIDR notation and clears its host bits.
///
/// # Examples
///
/// ```
/// use rib_types::parse_net;
///
/// let net = parse_net("10.1.2.3/24").unwrap();
/// assert_eq!(net.to_string(), "10.1.2.0/24");
/// ```
pub fn parse_net(s: &str) -> Result<IpNet, ParseError> {
    s.trim()
        .parse::<IpNet>()
        .map(|net| net.trunc())
        .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))
}

/// Returns the host prefix (/32 or /128) covering exactly `addr`.
pub fn host_net(addr: IpAddr) -> IpNet {
    IpNet::from(addr)
}

fn to_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn from_bits(bits: u128, like: IpAddr) -> IpAddr {
    match like {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(bits as u32)),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(bits)),
    }
}

/// An inclusive interval of addresses of a single address family.
///
/// Returned by range lookups: every address inside the interval resolves
/// to the same route (or to no route), so callers can skip re-querying
/// addresses in the same block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpRange {
    low: IpAddr,
    high: IpAddr,
}

impl IpRange {
    /// Creates a new range.
    ///
    /// # Errors
    ///
    /// Returns an error if the bounds belong to different address families
    /// or `low` is greater than `high`.
    pub fn new(low: IpAddr, high: IpAddr) -> Result<Self, ParseError> {
        if low.is_ipv4() != high.is_ipv4() {
            return Err(ParseError::InvalidRange(format!(
                "{} and {} are of different address families",
                low, high
            )));
        }
        if low > high {
            return Err(ParseError::InvalidRange(format!("{} > {}", low, high)));
        }
        Ok(IpRange { low, high })
    }

    /// Returns the range spanned by `net`.
    pub fn from_net(net: &IpNet) -> Self {
        IpRange {
            low: net.network(),
            high: net.broadcast(),
        }
    }

    /// Returns the whole address space of the family of `addr`.
    pub fn full(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => IpRange {
                low: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                high: IpAddr::V4(Ipv4Addr::BROADCAST),
            },
            IpAddr::V6(_) => IpRange {
                low: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
                high: IpAddr::V6(Ipv6Addr::from(u128::MAX)),
            },
        }
    }

    /// Returns the lowest address in the range.
    pub const fn low(&self) -> IpAddr {
        self.low
    }

    /// Returns the highest address in the range.
    pub const fn high(&self) -> IpAddr {
        self.high
    }

    /// Returns true if this is an IPv4 range.
    pub const fn is_ipv4(&self) -> bool {
        self.low.is_ipv4()
    }

    /// Returns true if `addr` lies inside the range.
    pub fn contains(&self, addr: IpAddr) -> bool {
        addr.is_ipv4() == self.is_ipv4() && self.low <= addr && addr <= self.high
    }

    /// Returns the overlap of two ranges, if any.
    pub fn intersect(&self, other: &IpRange) -> Option<IpRange> {
        if self.is_ipv4() != other.is_ipv4() {
            return None;
        }
        let low = self.low.max(other.low);
        let high = self.high.min(other.high);
        (low <= high).then_some(IpRange { low, high })
    }

    /// Shrinks the range around `addr` so that it no longer overlaps `net`.
    ///
    /// `addr` must lie inside the range and outside `net`; nets of the other
    /// address family are ignored.
    pub fn exclude(&mut self, addr: IpAddr, net: &IpNet) {
        if net.network().is_ipv4() != addr.is_ipv4() || net.contains(&addr) {
            return;
        }
        let point = to_bits(addr);
        let net_low = to_bits(net.network());
        let net_high = to_bits(net.broadcast());

        if net_high < point {
            let candidate = from_bits(net_high + 1, addr);
            if candidate > self.low {
                self.low = candidate;
            }
        } else if net_low > point {
            let candidate = from_bits(net_low - 1, addr);
            if candidate < self.high {
                self.high = candidate;
            }
        }
    }

    /// Returns the address just below the range, if there is one.
    pub fn before(&self) -> Option<IpAddr> {
        to_bits(self.low)
            .checked_sub(1)
            .map(|bits| from_bits(bits, self.low))
    }

    /// Returns the address just above the range, if there is one.
    pub fn after(&self) -> Option<IpAddr> {
        let bits = to_bits(self.high);
        let top = to_bits(IpRange::full(self.high).high);
        (bits < top).then(|| from_bits(bits + 1, self.high))
    }

    /// Returns the smallest range covering both. A range of the other
    /// address family leaves `self` unchanged.
    pub fn hull(&self, other: &IpRange) -> IpRange {
        if self.is_ipv4() != other.is_ipv4() {
            return *self;
        }
        IpRange {
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} - {}]", self.low, self.high)
    }
}
