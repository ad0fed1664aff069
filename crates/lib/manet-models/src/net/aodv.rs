use std::collections::{BTreeMap, VecDeque};

use log::{debug, trace};
use serde::Deserialize;

use manet_core::bucket::TimeMS;
use manet_core::node::NodeId;

use crate::net::channel::NeighborTable;
use crate::net::routing::{
    NodeRoutes, Resolution, Route, RouteRow, RoutingInstaller, RoutingKind, RoutingProtocol,
    RoutingSnapshot,
};

fn default_active_route_timeout() -> TimeMS {
    TimeMS::from(3000u64)
}

fn default_node_traversal_time() -> TimeMS {
    TimeMS::from(40u64)
}

fn default_net_diameter() -> u32 {
    35
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AodvSettings {
    #[serde(default = "default_active_route_timeout")]
    pub active_route_timeout: TimeMS,
    #[serde(default = "default_node_traversal_time")]
    pub node_traversal_time: TimeMS,
    #[serde(default = "default_net_diameter")]
    pub net_diameter: u32,
}

impl Default for AodvSettings {
    fn default() -> Self {
        Self {
            active_route_timeout: default_active_route_timeout(),
            node_traversal_time: default_node_traversal_time(),
            net_diameter: default_net_diameter(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RouteEntry {
    next_hop: NodeId,
    hops: u32,
    seq_no: u32,
    expires: TimeMS,
}

/// Hop count shortest path router with AODV style route lifetimes.
///
/// Every node keeps a table from destination to next hop. A lookup follows the cached next
/// hops; if a hop left radio range, the routes of that node through it are invalidated and
/// a new discovery is run. Discovery is a breadth first search that visits neighbours in
/// id order, so ties are broken the same way on every run.
#[derive(Debug, Clone)]
pub struct AodvRouter {
    kind: RoutingKind,
    settings: AodvSettings,
    tables: Vec<BTreeMap<NodeId, RouteEntry>>,
    seq_nos: Vec<u32>,
}

impl AodvRouter {
    pub fn new(kind: RoutingKind, settings: AodvSettings, node_count: u32) -> Self {
        Self {
            kind,
            settings,
            tables: vec![BTreeMap::new(); node_count as usize],
            seq_nos: vec![0; node_count as usize],
        }
    }

    pub fn route_count(&self) -> usize {
        self.tables.iter().map(|table| table.len()).sum()
    }

    fn follow_cache(
        &mut self,
        now: TimeMS,
        source: NodeId,
        destination: NodeId,
        neighbors: &NeighborTable,
    ) -> Option<Route> {
        let mut nodes = vec![source];
        let mut current = source;
        while current != destination {
            if nodes.len() > self.settings.net_diameter as usize + 1 {
                return None;
            }
            let entry = *self.tables.get(current.as_usize())?.get(&destination)?;
            if entry.expires <= now {
                return None;
            }
            if !neighbors.are_neighbors(current, entry.next_hop) {
                self.invalidate_next_hop(current, entry.next_hop);
                return None;
            }
            if nodes.contains(&entry.next_hop) {
                return None;
            }
            nodes.push(entry.next_hop);
            current = entry.next_hop;
        }
        let lifetime = now + self.settings.active_route_timeout;
        for node in nodes.iter() {
            if let Some(entry) = self.tables[node.as_usize()].get_mut(&destination) {
                entry.expires = lifetime;
            }
        }
        Some(Route { nodes })
    }

    fn invalidate_next_hop(&mut self, node_id: NodeId, next_hop: NodeId) {
        let table = &mut self.tables[node_id.as_usize()];
        let before = table.len();
        table.retain(|_, entry| entry.next_hop != next_hop);
        trace!(
            "Link {} -> {} broke, {} routes invalidated",
            node_id,
            next_hop,
            before - table.len()
        );
    }

    fn discover(
        &self,
        source: NodeId,
        destination: NodeId,
        neighbors: &NeighborTable,
    ) -> Option<Route> {
        let node_count = self.tables.len();
        if source.as_usize() >= node_count || destination.as_usize() >= node_count {
            return None;
        }
        let mut parent: Vec<Option<NodeId>> = vec![None; node_count];
        let mut depth: Vec<u32> = vec![0; node_count];
        let mut visited = vec![false; node_count];
        let mut queue = VecDeque::from([source]);
        visited[source.as_usize()] = true;

        while let Some(current) = queue.pop_front() {
            if current == destination {
                break;
            }
            if depth[current.as_usize()] >= self.settings.net_diameter {
                continue;
            }
            for next in neighbors.neighbors_of(current).iter() {
                if visited[next.as_usize()] {
                    continue;
                }
                visited[next.as_usize()] = true;
                parent[next.as_usize()] = Some(current);
                depth[next.as_usize()] = depth[current.as_usize()] + 1;
                queue.push_back(*next);
            }
        }

        if !visited[destination.as_usize()] {
            return None;
        }
        let mut nodes = vec![destination];
        let mut current = destination;
        while let Some(previous) = parent[current.as_usize()] {
            nodes.push(previous);
            current = previous;
        }
        nodes.reverse();
        Some(Route { nodes })
    }

    fn install_route(&mut self, now: TimeMS, route: &Route) {
        let (source, destination) = match (route.nodes.first(), route.nodes.last()) {
            (Some(source), Some(destination)) => (*source, *destination),
            _ => return,
        };
        self.seq_nos[destination.as_usize()] += 1;
        let expires = now + self.settings.active_route_timeout;
        let last = route.nodes.len() - 1;
        for (index, node) in route.nodes.iter().enumerate() {
            if index < last {
                self.tables[node.as_usize()].insert(
                    destination,
                    RouteEntry {
                        next_hop: route.nodes[index + 1],
                        hops: (last - index) as u32,
                        seq_no: self.seq_nos[destination.as_usize()],
                        expires,
                    },
                );
            }
            if index > 0 {
                self.tables[node.as_usize()].insert(
                    source,
                    RouteEntry {
                        next_hop: route.nodes[index - 1],
                        hops: index as u32,
                        seq_no: self.seq_nos[source.as_usize()],
                        expires,
                    },
                );
            }
        }
    }
}

impl RoutingProtocol for AodvRouter {
    fn kind(&self) -> RoutingKind {
        self.kind
    }

    fn resolve(
        &mut self,
        now: TimeMS,
        source: NodeId,
        destination: NodeId,
        neighbors: &NeighborTable,
    ) -> Resolution {
        if let Some(route) = self.follow_cache(now, source, destination, neighbors) {
            return Resolution::Cached(route);
        }
        if let Some(seq_no) = self.seq_nos.get_mut(source.as_usize()) {
            *seq_no += 1;
        }
        match self.discover(source, destination, neighbors) {
            Some(route) => {
                self.install_route(now, &route);
                let latency_us = 2
                    * route.hop_count() as u64
                    * self.settings.node_traversal_time.as_u64()
                    * 1000;
                debug!(
                    "Discovered {} -> {} over {} hops at {}",
                    source,
                    destination,
                    route.hop_count(),
                    now
                );
                Resolution::Discovered { route, latency_us }
            }
            None => Resolution::Unreachable,
        }
    }

    fn expire(&mut self, now: TimeMS) {
        self.tables
            .iter_mut()
            .for_each(|table| table.retain(|_, entry| entry.expires > now));
    }

    fn snapshot(&self, now: TimeMS) -> RoutingSnapshot {
        let tables = self
            .tables
            .iter()
            .enumerate()
            .map(|(index, table)| NodeRoutes {
                node_id: NodeId::from(index),
                routes: table
                    .iter()
                    .map(|(destination, entry)| RouteRow {
                        destination: *destination,
                        next_hop: entry.next_hop,
                        hops: entry.hops,
                        seq_no: entry.seq_no,
                        expires: entry.expires,
                    })
                    .collect(),
            })
            .collect();
        RoutingSnapshot {
            at: now,
            protocol: self.kind,
            tables,
        }
    }
}

/// Installs one [`AodvRouter`] shared by all nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AodvInstaller {
    pub settings: AodvSettings,
}

impl RoutingInstaller for AodvInstaller {
    type Protocol = AodvRouter;

    fn install(&self, kind: RoutingKind, node_count: u32) -> AodvRouter {
        AodvRouter::new(kind, self.settings, node_count)
    }
}
