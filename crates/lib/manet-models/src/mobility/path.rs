use manet_core::bucket::TimeMS;

use crate::mobility::{Point2D, PositionProvider};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Waypoint {
    /// Instant in milliseconds. Fractional values come from travel times.
    pub at: f64,
    pub pos: Point2D,
}

/// Piecewise linear path through time ordered waypoints. Before the first waypoint the node
/// sits at the first position, after the last one it stays at the last position.
#[derive(Clone, Debug, Default)]
pub struct WaypointPath {
    waypoints: Vec<Waypoint>,
}

impl WaypointPath {
    pub fn new(start: Point2D) -> Self {
        Self {
            waypoints: vec![Waypoint { at: 0.0, pos: start }],
        }
    }

    /// Appends a waypoint. A waypoint earlier than the last one is clamped to the last
    /// instant, so the node jumps instead of moving back in time.
    pub fn push(&mut self, at: f64, pos: Point2D) {
        let at = match self.waypoints.last() {
            Some(last) if at < last.at => last.at,
            _ => at,
        };
        self.waypoints.push(Waypoint { at, pos });
    }

    /// Drops every waypoint later than `at`, cutting short a movement still in progress.
    pub fn truncate_after(&mut self, at: f64) {
        let keep = self.waypoints.partition_point(|point| point.at <= at);
        self.waypoints.truncate(keep.max(1));
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn last_at(&self) -> f64 {
        self.waypoints.last().map(|point| point.at).unwrap_or(0.0)
    }

    pub fn interpolate(&self, at: f64) -> Point2D {
        let first = match self.waypoints.first() {
            Some(point) => point,
            None => return Point2D::default(),
        };
        if at <= first.at {
            return first.pos;
        }
        // First waypoint strictly later than `at`.
        let next = self.waypoints.partition_point(|point| point.at <= at);
        if next >= self.waypoints.len() {
            return self.waypoints[self.waypoints.len() - 1].pos;
        }
        let (before, after) = (&self.waypoints[next - 1], &self.waypoints[next]);
        let span = after.at - before.at;
        if span <= 0.0 {
            return after.pos;
        }
        before.pos.lerp(&after.pos, (at - before.at) / span)
    }
}

impl PositionProvider for WaypointPath {
    fn position_at(&self, at: TimeMS) -> Point2D {
        self.interpolate(at.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_waypoints() {
        let mut path = WaypointPath::new(Point2D::new(0.0, 0.0));
        path.push(1000.0, Point2D::new(0.0, 0.0));
        path.push(3000.0, Point2D::new(20.0, 10.0));
        assert_eq!(path.position_at(TimeMS::from(500u64)), Point2D::new(0.0, 0.0));
        assert_eq!(path.position_at(TimeMS::from(2000u64)), Point2D::new(10.0, 5.0));
        assert_eq!(path.position_at(TimeMS::from(9000u64)), Point2D::new(20.0, 10.0));
    }

    #[test]
    fn equal_instants_jump() {
        let mut path = WaypointPath::new(Point2D::new(1.0, 1.0));
        path.push(100.0, Point2D::new(5.0, 5.0));
        path.push(50.0, Point2D::new(7.0, 7.0));
        assert_eq!(path.last_at(), 100.0);
        assert_eq!(path.position_at(TimeMS::from(100u64)), Point2D::new(7.0, 7.0));
    }
}
