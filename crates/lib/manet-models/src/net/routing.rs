use std::fmt::{Display, Formatter};
use std::str::FromStr;

use log::info;
use serde::Deserialize;

use manet_core::bucket::TimeMS;
use manet_core::error::ConfigError;
use manet_core::node::NodeId;

use crate::net::address::{AddressFamily, AddressPrefix};
use crate::net::channel::NeighborTable;

/// Routing protocols that can be bound to the link fabric.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingKind {
    #[default]
    Aodv,
    Aodv6,
}

impl RoutingKind {
    pub fn family(&self) -> AddressFamily {
        match self {
            RoutingKind::Aodv => AddressFamily::Ipv4,
            RoutingKind::Aodv6 => AddressFamily::Ipv6,
        }
    }
}

impl Display for RoutingKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingKind::Aodv => write!(f, "AODV"),
            RoutingKind::Aodv6 => write!(f, "AODV6"),
        }
    }
}

impl FromStr for RoutingKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aodv" => Ok(RoutingKind::Aodv),
            "aodv6" => Ok(RoutingKind::Aodv6),
            _ => Err(ConfigError::invalid("routing", "aodv or aodv6", s)),
        }
    }
}

/// Nodes a packet visits, source first and destination last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub nodes: Vec<NodeId>,
}

impl Route {
    pub fn hop_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// Consecutive `(sender, receiver)` pairs along the route.
    pub fn links(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.nodes.windows(2).map(|pair| (pair[0], pair[1]))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Cached(Route),
    /// Found by route discovery. `latency_us` is the time the discovery took.
    Discovered { route: Route, latency_us: u64 },
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRow {
    pub destination: NodeId,
    pub next_hop: NodeId,
    pub hops: u32,
    pub seq_no: u32,
    pub expires: TimeMS,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRoutes {
    pub node_id: NodeId,
    pub routes: Vec<RouteRow>,
}

/// Routing tables of every node at one instant, in node order.
#[derive(Debug, Clone)]
pub struct RoutingSnapshot {
    pub at: TimeMS,
    pub protocol: RoutingKind,
    pub tables: Vec<NodeRoutes>,
}

/// Capability of a routing protocol bound to the fabric.
pub trait RoutingProtocol: Send {
    fn kind(&self) -> RoutingKind;
    fn resolve(
        &mut self,
        now: TimeMS,
        source: NodeId,
        destination: NodeId,
        neighbors: &NeighborTable,
    ) -> Resolution;
    fn expire(&mut self, now: TimeMS);
    fn snapshot(&self, now: TimeMS) -> RoutingSnapshot;
}

/// Creates a protocol instance for all nodes of the fabric.
pub trait RoutingInstaller {
    type Protocol: RoutingProtocol;
    fn install(&self, kind: RoutingKind, node_count: u32) -> Self::Protocol;
}

/// The one routing protocol of an experiment together with its dump schedule.
#[derive(Debug)]
pub struct RoutingBinding<P: RoutingProtocol> {
    protocol: P,
    print_routes_at: Option<TimeMS>,
}

impl<P: RoutingProtocol> RoutingBinding<P> {
    pub fn bind<I>(
        installer: &I,
        kind: RoutingKind,
        prefix: &AddressPrefix,
        node_count: u32,
        print_routes_at: Option<TimeMS>,
    ) -> Result<Self, ConfigError>
    where
        I: RoutingInstaller<Protocol = P>,
    {
        if kind.family() != prefix.family() {
            return Err(ConfigError::FamilyMismatch {
                routing: kind.to_string(),
                expected: kind.family().to_string(),
                prefix: prefix.to_string(),
            });
        }
        info!("Installing {} on {} nodes", kind, node_count);
        Ok(Self {
            protocol: installer.install(kind, node_count),
            print_routes_at,
        })
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    pub fn print_routes_at(&self) -> Option<TimeMS> {
        self.print_routes_at
    }

    /// Whether the routing tables are due for a dump in the step `[now, now + step)`.
    pub fn snapshot_due(&self, now: TimeMS, step: TimeMS) -> bool {
        match self.print_routes_at {
            Some(at) => at >= now && at < now + step,
            None => false,
        }
    }
}
