use std::path::PathBuf;

use serde::Deserialize;
use typed_builder::TypedBuilder;

use manet_core::bucket::TimeMS;
use manet_core::error::ConfigError;

use crate::dist::DistParams;
use crate::mobility::grid::GridLayout;
use crate::mobility::path::WaypointPath;

pub mod grid;
pub mod path;
pub mod waypoint;

#[derive(Clone, Copy, Debug, Default, PartialEq, TypedBuilder)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Point reached after covering `fraction` of the straight line towards `other`.
    pub fn lerp(&self, other: &Point2D, fraction: f64) -> Point2D {
        Point2D {
            x: self.x + (other.x - self.x) * fraction,
            y: self.y + (other.y - self.y) * fraction,
        }
    }
}

/// Anything that can tell where a node is at a given instant.
pub trait PositionProvider {
    fn position_at(&self, at: TimeMS) -> Point2D;
}

/// Trajectory of a single node over the whole run.
#[derive(Clone, Debug)]
pub enum Trajectory {
    Fixed(Point2D),
    Waypoints(WaypointPath),
}

impl PositionProvider for Trajectory {
    fn position_at(&self, at: TimeMS) -> Point2D {
        match self {
            Trajectory::Fixed(point) => *point,
            Trajectory::Waypoints(path) => path.position_at(at),
        }
    }
}

/// Rectangle `[0, width] x [0, height]` the nodes move in.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FieldSettings {
    pub width: f64,
    pub height: f64,
}

impl Default for FieldSettings {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 1000.0,
        }
    }
}

impl FieldSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(ConfigError::invalid("field_settings.width", "> 0", self.width));
        }
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err(ConfigError::invalid("field_settings.height", "> 0", self.height));
        }
        Ok(())
    }

    pub fn contains(&self, point: &Point2D) -> bool {
        (0.0..=self.width).contains(&point.x) && (0.0..=self.height).contains(&point.y)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFormat {
    Ns2,
    Parquet,
}

impl TraceFormat {
    /// Infers the format from the file extension, ns-2 text being the default.
    pub fn from_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("parquet") => TraceFormat::Parquet,
            _ => TraceFormat::Ns2,
        }
    }
}

fn default_delta_x() -> f64 {
    40.0
}

/// Source of node movement, selected in the configuration by `mobility_type`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "mobility_type")]
pub enum MobilitySettings {
    StaticGrid {
        #[serde(default)]
        min_x: f64,
        #[serde(default)]
        min_y: f64,
        #[serde(default = "default_delta_x")]
        delta_x: f64,
        #[serde(default)]
        delta_y: f64,
        grid_width: Option<u32>,
        #[serde(default)]
        layout: GridLayout,
    },
    RandomWaypoint {
        min_speed: f64,
        max_speed: f64,
        pause: DistParams,
    },
    TraceReplay {
        trace_file: PathBuf,
        trace_format: Option<TraceFormat>,
    },
}

impl Default for MobilitySettings {
    fn default() -> Self {
        MobilitySettings::StaticGrid {
            min_x: 0.0,
            min_y: 0.0,
            delta_x: default_delta_x(),
            delta_y: 0.0,
            grid_width: None,
            layout: GridLayout::RowFirst,
        }
    }
}

impl MobilitySettings {
    pub fn name(&self) -> &'static str {
        match self {
            MobilitySettings::StaticGrid { .. } => "static grid",
            MobilitySettings::RandomWaypoint { .. } => "random waypoint",
            MobilitySettings::TraceReplay { .. } => "trace replay",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_and_distance() {
        let start = Point2D::new(0.0, 0.0);
        let end = Point2D::new(30.0, 40.0);
        assert_eq!(start.distance(&end), 50.0);
        assert_eq!(start.lerp(&end, 0.5), Point2D::new(15.0, 20.0));
    }

    #[test]
    fn trace_format_follows_extension() {
        assert_eq!(
            TraceFormat::from_path(std::path::Path::new("a/b.parquet")),
            TraceFormat::Parquet
        );
        assert_eq!(
            TraceFormat::from_path(std::path::Path::new("scen.ns_movements")),
            TraceFormat::Ns2
        );
    }
}
