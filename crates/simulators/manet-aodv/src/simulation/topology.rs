use log::{debug, info};

use manet_core::bucket::TimeMS;
use manet_core::error::{ConfigError, ExperimentError};
use manet_core::node::NodeId;
use manet_input::trace::read_trace;
use manet_models::dist::{SeedBank, Stream};
use manet_models::mobility::grid::GridAllocator;
use manet_models::mobility::waypoint::RandomWaypoint;
use manet_models::mobility::{MobilitySettings, PositionProvider, Trajectory};

use crate::manet::node::Node;
use crate::simulation::config::ExperimentConfig;

/// The nodes of an experiment in creation order.
#[derive(Debug, Clone)]
pub struct Topology {
    pub nodes: Vec<Node>,
}

impl Topology {
    pub fn node_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn is_mobile(&self) -> bool {
        self.nodes.iter().any(|node| node.is_mobile())
    }

    pub fn trajectories(&self) -> Vec<Trajectory> {
        self.nodes.iter().map(|node| node.trajectory.clone()).collect()
    }
}

fn trajectories_of(
    config: &ExperimentConfig,
    seeds: &SeedBank,
) -> Result<Vec<Trajectory>, ExperimentError> {
    let node_count = config.node_count();
    match &config.base().node_settings.mobility {
        MobilitySettings::StaticGrid {
            min_x,
            min_y,
            delta_x,
            delta_y,
            grid_width,
            layout,
        } => {
            let allocator = GridAllocator {
                min_x: *min_x,
                min_y: *min_y,
                delta_x: *delta_x,
                delta_y: *delta_y,
                grid_width: grid_width.unwrap_or(node_count),
                layout: *layout,
            };
            allocator.validate()?;
            Ok(allocator
                .positions(node_count)
                .into_iter()
                .map(Trajectory::Fixed)
                .collect())
        }
        MobilitySettings::RandomWaypoint {
            min_speed,
            max_speed,
            pause,
        } => {
            let model = RandomWaypoint::new(
                config.base().field_settings,
                *min_speed,
                *max_speed,
                pause,
            )?;
            Ok((0..node_count)
                .map(|index| {
                    let mut rng = seeds.rng(Stream::Mobility(NodeId::from(index)));
                    Trajectory::Waypoints(model.generate(config.duration(), &mut rng))
                })
                .collect())
        }
        MobilitySettings::TraceReplay {
            trace_file,
            trace_format,
        } => read_trace(&config.resolve(trace_file), *trace_format, node_count),
    }
}

/// Creates every node with its trajectory. Nothing is created when any node cannot be placed.
pub fn build_topology(
    config: &ExperimentConfig,
    seeds: &SeedBank,
) -> Result<Topology, ExperimentError> {
    let mobility = &config.base().node_settings.mobility;
    info!(
        "Placing {} nodes with {} mobility",
        config.node_count(),
        mobility.name()
    );
    let trajectories = trajectories_of(config, seeds)?;

    let name_prefix = &config.base().node_settings.name_prefix;
    let nodes: Vec<Node> = trajectories
        .into_iter()
        .enumerate()
        .map(|(index, trajectory)| Node::new(NodeId::from(index), name_prefix, trajectory))
        .collect();

    for node in nodes.iter() {
        let start = node.position_at(TimeMS::default());
        if !start.is_finite() {
            return Err(ConfigError::invalid(
                "initial position",
                "finite",
                format!("{} at ({}, {})", node.name, start.x, start.y),
            )
            .into());
        }
        debug!("{} starts at ({:.2}, {:.2})", node.name, start.x, start.y);
    }
    Ok(Topology { nodes })
}
