//! Longest-prefix-match store keyed by network.
//!
//! A thin adapter over [`prefix_trie::PrefixMap`] that hides the address
//! family split and gives the route tables the insert/erase semantics they
//! rely on: inserting a present key and erasing an absent one are errors,
//! not silent overwrites.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use prefix_trie::PrefixMap;
use rib_types::{host_net, IpRange};
use std::fmt;
use std::net::IpAddr;

use crate::error::{Result, TableError};

/// LPM map from network to `V`, covering both address families.
pub struct RouteTrie<V> {
    v4: PrefixMap<Ipv4Net, V>,
    v6: PrefixMap<Ipv6Net, V>,
    len: usize,
}

impl<V: fmt::Debug> fmt::Debug for RouteTrie<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<V> Default for RouteTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RouteTrie<V> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            v4: PrefixMap::new(),
            v6: PrefixMap::new(),
            len: 0,
        }
    }

    /// Inserts `value` under `net`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::AlreadyExists`] if `net` is already present; the
    /// existing value is left untouched.
    pub fn insert(&mut self, net: IpNet, value: V) -> Result<()> {
        if self.find_exact(&net).is_some() {
            return Err(TableError::AlreadyExists(net));
        }
        match net {
            IpNet::V4(n) => {
                self.v4.insert(n, value);
            }
            IpNet::V6(n) => {
                self.v6.insert(n, value);
            }
        }
        self.len += 1;
        Ok(())
    }

    /// Removes `net`, returning its value.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NotFound`] if `net` is absent.
    pub fn erase(&mut self, net: &IpNet) -> Result<V> {
        let removed = match net {
            IpNet::V4(n) => self.v4.remove(n),
            IpNet::V6(n) => self.v6.remove(n),
        };
        let value = removed.ok_or(TableError::NotFound(*net))?;
        self.len -= 1;
        Ok(value)
    }

    /// Returns the value stored under exactly `net`.
    pub fn find_exact(&self, net: &IpNet) -> Option<&V> {
        match net {
            IpNet::V4(n) => self.v4.get(n),
            IpNet::V6(n) => self.v6.get(n),
        }
    }

    /// Returns a mutable reference to the value stored under exactly `net`.
    pub fn find_exact_mut(&mut self, net: &IpNet) -> Option<&mut V> {
        match net {
            IpNet::V4(n) => self.v4.get_mut(n),
            IpNet::V6(n) => self.v6.get_mut(n),
        }
    }

    /// Returns the most specific entry covering `addr`.
    pub fn find_longest_match(&self, addr: IpAddr) -> Option<(IpNet, &V)> {
        match host_net(addr) {
            IpNet::V4(h) => self.v4.get_lpm(&h).map(|(n, v)| (IpNet::V4(*n), v)),
            IpNet::V6(h) => self.v6.get_lpm(&h).map(|(n, v)| (IpNet::V6(*n), v)),
        }
    }

    /// Returns the most specific entry covering `addr`, together with the
    /// widest interval around `addr` over which that answer does not change.
    ///
    /// The interval starts as the matched network (or the whole address
    /// space when nothing matches) and is narrowed by every more specific
    /// entry that does not contain `addr`.
    pub fn find_range(&self, addr: IpAddr) -> (Option<(IpNet, &V)>, IpRange) {
        let best = self.find_longest_match(addr);
        let mut range = match &best {
            Some((net, _)) => IpRange::from_net(net),
            None => IpRange::full(addr),
        };

        let holes: Box<dyn Iterator<Item = IpNet> + '_> = match (&best, addr) {
            (Some((IpNet::V4(n), _)), _) => {
                Box::new(self.v4.children(n).map(|(p, _)| IpNet::V4(*p)))
            }
            (Some((IpNet::V6(n), _)), _) => {
                Box::new(self.v6.children(n).map(|(p, _)| IpNet::V6(*p)))
            }
            (None, IpAddr::V4(_)) => Box::new(self.v4.iter().map(|(p, _)| IpNet::V4(*p))),
            (None, IpAddr::V6(_)) => Box::new(self.v6.iter().map(|(p, _)| IpNet::V6(*p))),
        };
        for hole in holes {
            range.exclude(addr, &hole);
        }

        (best, range)
    }

    /// Iterates over all entries, IPv4 first, each family in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = (IpNet, &V)> + '_ {
        self.v4
            .iter()
            .map(|(n, v)| (IpNet::V4(*n), v))
            .chain(self.v6.iter().map(|(n, v)| (IpNet::V6(*n), v)))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
