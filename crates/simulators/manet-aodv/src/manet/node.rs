use std::net::IpAddr;

use manet_core::bucket::TimeMS;
use manet_core::node::NodeId;
use manet_models::mobility::{Point2D, PositionProvider, Trajectory};

/// A wireless node. The address is set once the link fabric is installed.
#[derive(Debug, Clone)]
pub struct Node {
    pub node_id: NodeId,
    pub name: String,
    pub trajectory: Trajectory,
    pub address: Option<IpAddr>,
}

impl Node {
    pub fn new(node_id: NodeId, name_prefix: &str, trajectory: Trajectory) -> Self {
        Self {
            node_id,
            name: format!("{}{}", name_prefix, node_id),
            trajectory,
            address: None,
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self.trajectory, Trajectory::Waypoints(_))
    }
}

impl PositionProvider for Node {
    fn position_at(&self, at: TimeMS) -> Point2D {
        self.trajectory.position_at(at)
    }
}
