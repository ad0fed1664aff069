use log::debug;
use rand::Rng;
use rand_pcg::Pcg64Mcg;
use typed_builder::TypedBuilder;

use manet_core::bucket::TimeMS;
use manet_core::error::ConfigError;

use crate::dist::{DistParams, DistType};
use crate::mobility::path::WaypointPath;
use crate::mobility::{FieldSettings, Point2D};

/// Upper bound on the number of legs generated per node.
pub const MAX_LEGS: usize = 1_000_000;

/// Random waypoint model: pause, pick a destination and a speed, move there, repeat.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RandomWaypoint {
    pub field: FieldSettings,
    pub min_speed: f64,
    pub max_speed: f64,
    pub pause: DistType,
}

impl RandomWaypoint {
    pub fn new(
        field: FieldSettings,
        min_speed: f64,
        max_speed: f64,
        pause: &DistParams,
    ) -> Result<Self, ConfigError> {
        field.validate()?;
        if !(min_speed.is_finite() && min_speed >= 0.0) {
            return Err(ConfigError::invalid("min_speed", ">= 0", min_speed));
        }
        if !(max_speed.is_finite() && max_speed > 0.0) {
            return Err(ConfigError::invalid("max_speed", "> 0", max_speed));
        }
        if min_speed > max_speed {
            return Err(ConfigError::invalid(
                "min_speed",
                "<= max_speed",
                format!("{} > {}", min_speed, max_speed),
            ));
        }
        Ok(Self {
            field,
            min_speed,
            max_speed,
            pause: DistType::new(pause)?,
        })
    }

    fn random_point(&self, rng: &mut Pcg64Mcg) -> Point2D {
        Point2D {
            x: rng.gen_range(0.0..=self.field.width),
            y: rng.gen_range(0.0..=self.field.height),
        }
    }

    /// Precomputes the path of one node until `until`. Pause samples are in seconds and
    /// are clamped at zero. A zero speed keeps the node where it is for the rest of the run.
    pub fn generate(&self, until: TimeMS, rng: &mut Pcg64Mcg) -> WaypointPath {
        let end = until.as_f64();
        let mut position = self.random_point(rng);
        let mut path = WaypointPath::new(position);
        let mut now = 0.0;

        for _ in 0..MAX_LEGS {
            let pause = self.pause.sample(rng).max(0.0) * 1000.0;
            now += pause;
            path.push(now, position);
            if now >= end {
                break;
            }

            let destination = self.random_point(rng);
            let speed = rng.gen_range(self.min_speed..=self.max_speed);
            if speed <= 0.0 {
                break;
            }
            now += position.distance(&destination) / speed * 1000.0;
            position = destination;
            path.push(now, position);
            if now >= end {
                break;
            }
        }
        debug!("Generated {} waypoints until {}", path.len(), until);
        path
    }
}

#[cfg(test)]
mod tests {
    use manet_core::node::NodeId;

    use crate::dist::{SeedBank, Stream};
    use crate::mobility::PositionProvider;

    use super::*;

    fn model() -> RandomWaypoint {
        RandomWaypoint::new(
            FieldSettings {
                width: 300.0,
                height: 150.0,
            },
            1.0,
            20.0,
            &DistParams::uniform(0.0, 2.0),
        )
        .expect("valid model")
    }

    #[test]
    fn stays_inside_the_field() {
        let model = model();
        let mut rng = SeedBank::new(7).rng(Stream::Mobility(NodeId::from(0u32)));
        let path = model.generate(TimeMS::from(120_000u64), &mut rng);
        assert!(path.last_at() >= 120_000.0);
        for at in (0..=120_000u64).step_by(250) {
            let pos = path.position_at(TimeMS::from(at));
            assert!(pos.is_finite());
            assert!(model.field.contains(&pos), "{:?} left the field", pos);
        }
    }

    #[test]
    fn same_stream_same_path() {
        let model = model();
        let bank = SeedBank::new(11);
        let first = model.generate(
            TimeMS::from(30_000u64),
            &mut bank.rng(Stream::Mobility(NodeId::from(2u32))),
        );
        let second = model.generate(
            TimeMS::from(30_000u64),
            &mut bank.rng(Stream::Mobility(NodeId::from(2u32))),
        );
        assert_eq!(first.waypoints(), second.waypoints());
    }

    #[test]
    fn zero_speed_keeps_node_in_place() {
        let model = RandomWaypoint::new(
            FieldSettings::default(),
            0.0,
            0.0001,
            &DistParams::constant(0.0),
        )
        .expect("valid model");
        let mut rng = SeedBank::new(3).rng(Stream::Mobility(NodeId::from(1u32)));
        let path = model.generate(TimeMS::from(1000u64), &mut rng);
        let start = path.position_at(TimeMS::default());
        assert!(start.distance(&path.position_at(TimeMS::from(1000u64))) < 0.1);
    }

    #[test]
    fn rejects_invalid_speeds() {
        let field = FieldSettings::default();
        let pause = DistParams::constant(1.0);
        assert!(RandomWaypoint::new(field, 5.0, 1.0, &pause).is_err());
        assert!(RandomWaypoint::new(field, 0.0, 0.0, &pause).is_err());
        assert!(RandomWaypoint::new(field, -1.0, 1.0, &pause).is_err());
    }
}
