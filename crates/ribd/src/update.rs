//! Route update script.
//!
//! One JSON object per line:
//!
//! ```text
//! {"op":"add","protocol":"ebgp","net":"10.0.0.0/8","nexthop":"192.0.2.1","metric":5}
//! {"op":"replace","protocol":"ebgp","net":"10.0.0.0/8","nexthop":"192.0.2.7"}
//! {"op":"delete","protocol":"ebgp","net":"10.0.0.0/8"}
//! {"op":"push","protocol":"ebgp"}
//! ```
//!
//! A push without a protocol pushes every protocol.

use rib_tables::{Outcome, Result, Rib, RouteEntry};
use rib_types::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// One line of the update script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RouteUpdate {
    Add {
        protocol: String,
        net: IpNet,
        nexthop: IpAddr,
        #[serde(default)]
        metric: u32,
    },
    Replace {
        protocol: String,
        net: IpNet,
        nexthop: IpAddr,
        #[serde(default)]
        metric: u32,
    },
    Delete {
        protocol: String,
        net: IpNet,
    },
    Push {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        protocol: Option<String>,
    },
}

impl RouteUpdate {
    /// Parses one script line.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// Feeds the update into `rib`.
    ///
    /// A push that names no protocol is sent from every protocol; the
    /// outcome of the last one is returned.
    pub fn apply(&self, rib: &mut Rib) -> Result<Outcome> {
        match self {
            RouteUpdate::Add {
                protocol,
                net,
                nexthop,
                metric,
            } => rib.add_route(protocol, RouteEntry::new(*net, *nexthop).with_metric(*metric)),
            RouteUpdate::Replace {
                protocol,
                net,
                nexthop,
                metric,
            } => rib.replace_route(protocol, RouteEntry::new(*net, *nexthop).with_metric(*metric)),
            RouteUpdate::Delete { protocol, net } => rib.delete_route(protocol, net),
            RouteUpdate::Push {
                protocol: Some(protocol),
            } => rib.push_routes(protocol),
            RouteUpdate::Push { protocol: None } => {
                let names: Vec<String> = rib.protocols().map(str::to_string).collect();
                let mut outcome = Outcome::Propagated;
                for name in names {
                    outcome = rib.push_routes(&name)?;
                }
                Ok(outcome)
            }
        }
    }
}

impl fmt::Display for RouteUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteUpdate::Add {
                protocol,
                net,
                nexthop,
                ..
            } => write!(f, "add {} via {} from {}", net, nexthop, protocol),
            RouteUpdate::Replace {
                protocol,
                net,
                nexthop,
                ..
            } => write!(f, "replace {} via {} from {}", net, nexthop, protocol),
            RouteUpdate::Delete { protocol, net } => write!(f, "delete {} from {}", net, protocol),
            RouteUpdate::Push {
                protocol: Some(protocol),
            } => write!(f, "push {}", protocol),
            RouteUpdate::Push { protocol: None } => f.write_str("push all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rib_tables::{ProtocolConfig, RibConfig};
    use rib_types::ProtocolType;

    fn rib() -> Rib {
        Rib::new(&RibConfig {
            protocols: vec![
                ProtocolConfig::new("static", ProtocolType::Igp),
                ProtocolConfig::new("rip", ProtocolType::Igp),
            ],
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_parse_add() {
        let update = RouteUpdate::parse(
            r#"{"op":"add","protocol":"static","net":"10.0.0.0/8","nexthop":"192.0.2.1","metric":5}"#,
        )
        .unwrap();
        assert_eq!(
            update,
            RouteUpdate::Add {
                protocol: "static".into(),
                net: "10.0.0.0/8".parse().unwrap(),
                nexthop: "192.0.2.1".parse().unwrap(),
                metric: 5,
            }
        );
    }

    #[test]
    fn test_parse_defaults() {
        let update = RouteUpdate::parse(
            r#"{"op":"replace","protocol":"rip","net":"2001:db8::/32","nexthop":"fe80::1"}"#,
        )
        .unwrap();
        assert!(matches!(update, RouteUpdate::Replace { metric: 0, .. }));

        let update = RouteUpdate::parse(r#"{"op":"push"}"#).unwrap();
        assert_eq!(update, RouteUpdate::Push { protocol: None });
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(RouteUpdate::parse(r#"{"op":"flap","protocol":"rip"}"#).is_err());
        assert!(RouteUpdate::parse(r#"{"op":"delete","protocol":"rip","net":"10.0.0.0"}"#).is_err());
        assert!(RouteUpdate::parse("not json").is_err());
    }

    #[test]
    fn test_apply() {
        let mut rib = rib();
        let add = RouteUpdate::parse(
            r#"{"op":"add","protocol":"rip","net":"10.0.0.0/8","nexthop":"192.0.2.1","metric":3}"#,
        )
        .unwrap();
        assert_eq!(add.apply(&mut rib).unwrap(), Outcome::Propagated);

        let installed = rib.installed_routes();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].metric, 3);
        assert_eq!(&*installed[0].protocol, "rip");

        let push = RouteUpdate::Push { protocol: None };
        assert_eq!(push.apply(&mut rib).unwrap(), Outcome::Propagated);

        let delete = RouteUpdate::Delete {
            protocol: "rip".into(),
            net: "10.0.0.0/8".parse().unwrap(),
        };
        delete.apply(&mut rib).unwrap();
        assert!(rib.installed_routes().is_empty());
        assert!(delete.apply(&mut rib).is_err());
    }

    #[test]
    fn test_display() {
        let update = RouteUpdate::Delete {
            protocol: "rip".into(),
            net: "10.0.0.0/8".parse().unwrap(),
        };
        assert_eq!(update.to_string(), "delete 10.0.0.0/8 from rip");
        assert_eq!(RouteUpdate::Push { protocol: None }.to_string(), "push all");
    }
}
