use std::path::{Path, PathBuf};

use log::{debug, info};
use typed_builder::TypedBuilder;

use manet_core::bucket::TimeMS;
use manet_core::error::ExperimentError;
use manet_models::dist::{SeedBank, Stream};
use manet_models::mobility::path::WaypointPath;
use manet_models::mobility::waypoint::RandomWaypoint;
use manet_output::ns2::write_movements;

use crate::produce::config::Config;

/// Generates random waypoint movements for every node and writes them as an ns-2 trace.
#[derive(TypedBuilder)]
pub struct Setdest {
    model: RandomWaypoint,
    seeds: SeedBank,
    node_count: u32,
    duration: TimeMS,
    output_file: PathBuf,
}

impl Setdest {
    /// Relative output files are placed next to the configuration file.
    pub fn new(config: &Config, config_dir: &Path) -> Result<Self, ExperimentError> {
        let movement = &config.movement_settings;
        let model = RandomWaypoint::new(
            config.field_settings,
            movement.min_speed,
            movement.max_speed,
            &movement.pause,
        )?;
        let trace = &config.trace_settings;
        Ok(Self::builder()
            .model(model)
            .seeds(SeedBank::new(trace.seed))
            .node_count(trace.node_count)
            .duration(trace.duration)
            .output_file(config_dir.join(&trace.output_file))
            .build())
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    pub fn generate(&self) -> Vec<WaypointPath> {
        (0..self.node_count)
            .map(|node| {
                let mut rng = self.seeds.rng(Stream::Mobility(node.into()));
                let path = self.model.generate(self.duration, &mut rng);
                debug!("Node {} gets {} waypoints", node, path.len());
                path
            })
            .collect()
    }

    pub fn write(&self) -> Result<Vec<WaypointPath>, ExperimentError> {
        let paths = self.generate();
        write_movements(&self.output_file, &paths)?;
        info!(
            "Generated {} ms of movement for {} nodes",
            self.duration, self.node_count
        );
        Ok(paths)
    }
}
