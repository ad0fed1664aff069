use rand::Rng;
use rand_pcg::Pcg64Mcg;
use serde::Deserialize;

use manet_core::error::ConfigError;
use manet_core::node::NodeId;

use crate::mobility::Point2D;

const SPEED_OF_LIGHT: f64 = 299_792_458.0;

fn default_range() -> f64 {
    250.0
}

fn default_data_rate() -> f64 {
    2_000_000.0
}

/// Reference unit-disk channel parameters.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ChannelSettings {
    /// Radio range in meters.
    #[serde(default = "default_range")]
    pub range: f64,
    /// Link rate in bit/s.
    #[serde(default = "default_data_rate")]
    pub data_rate: f64,
    /// Probability that a single hop loses the frame.
    #[serde(default)]
    pub frame_error_rate: f64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            range: default_range(),
            data_rate: default_data_rate(),
            frame_error_rate: 0.0,
        }
    }
}

impl ChannelSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.range.is_finite() && self.range > 0.0) {
            return Err(ConfigError::invalid("link_settings.range", "> 0", self.range));
        }
        if !(self.data_rate.is_finite() && self.data_rate > 0.0) {
            return Err(ConfigError::invalid(
                "link_settings.data_rate",
                "> 0",
                self.data_rate,
            ));
        }
        if !(0.0..=1.0).contains(&self.frame_error_rate) {
            return Err(ConfigError::invalid(
                "link_settings.frame_error_rate",
                "within [0, 1]",
                self.frame_error_rate,
            ));
        }
        Ok(())
    }
}

/// Radio neighbours of every node at one instant, each list sorted by node id.
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    neighbors: Vec<Vec<NodeId>>,
}

impl NeighborTable {
    pub fn build(positions: &[Point2D], range: f64) -> Self {
        let mut neighbors: Vec<Vec<NodeId>> = vec![Vec::new(); positions.len()];
        for (this, this_pos) in positions.iter().enumerate() {
            for (other, other_pos) in positions.iter().enumerate().skip(this + 1) {
                if this_pos.distance(other_pos) <= range {
                    neighbors[this].push(NodeId::from(other));
                    neighbors[other].push(NodeId::from(this));
                }
            }
        }
        neighbors.iter_mut().for_each(|list| list.sort());
        Self { neighbors }
    }

    pub fn node_count(&self) -> usize {
        self.neighbors.len()
    }

    pub fn neighbors_of(&self, node_id: NodeId) -> &[NodeId] {
        self.neighbors
            .get(node_id.as_usize())
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    pub fn are_neighbors(&self, this: NodeId, other: NodeId) -> bool {
        self.neighbors_of(this).binary_search(&other).is_ok()
    }

    pub fn link_count(&self) -> usize {
        self.neighbors.iter().map(|list| list.len()).sum::<usize>() / 2
    }
}

/// Shared wireless channel all node interfaces are attached to.
#[derive(Debug, Clone)]
pub struct WirelessChannel {
    pub settings: ChannelSettings,
    rng: Pcg64Mcg,
}

impl WirelessChannel {
    pub fn new(settings: ChannelSettings, rng: Pcg64Mcg) -> Self {
        Self { settings, rng }
    }

    pub fn range(&self) -> f64 {
        self.settings.range
    }

    /// Transmission plus propagation delay of one hop, in microseconds.
    pub fn hop_delay_us(&self, size_bytes: u32, distance: f64) -> u64 {
        let transmission = size_bytes as f64 * 8.0 * 1_000_000.0 / self.settings.data_rate;
        let propagation = distance * 1_000_000.0 / SPEED_OF_LIGHT;
        (transmission + propagation).ceil() as u64
    }

    /// Draws whether a frame is lost on one hop.
    pub fn frame_lost(&mut self) -> bool {
        if self.settings.frame_error_rate <= 0.0 {
            return false;
        }
        self.rng.gen::<f64>() < self.settings.frame_error_rate
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn neighbors_are_symmetric_and_sorted() {
        let positions: Vec<Point2D> = (0..5).map(|i| Point2D::new(i as f64 * 40.0, 0.0)).collect();
        let table = NeighborTable::build(&positions, 90.0);
        assert_eq!(
            table.neighbors_of(NodeId::from(2u32)),
            &[
                NodeId::from(0u32),
                NodeId::from(1u32),
                NodeId::from(3u32),
                NodeId::from(4u32)
            ]
        );
        assert!(table.are_neighbors(NodeId::from(0u32), NodeId::from(2u32)));
        assert!(!table.are_neighbors(NodeId::from(0u32), NodeId::from(3u32)));
        assert_eq!(table.link_count(), 7);
    }

    #[test]
    fn hop_delay_covers_transmission() {
        let channel = WirelessChannel::new(ChannelSettings::default(), Pcg64Mcg::seed_from_u64(1));
        // 1000 bytes at 2 Mbit/s take 4 ms.
        assert_eq!(channel.hop_delay_us(1000, 0.0), 4000);
        assert!(channel.hop_delay_us(1000, 250.0) > 4000);
    }

    #[test]
    fn error_free_channel_never_loses() {
        let mut channel =
            WirelessChannel::new(ChannelSettings::default(), Pcg64Mcg::seed_from_u64(9));
        assert!((0..1000).all(|_| !channel.frame_lost()));
        let mut lossy = WirelessChannel::new(
            ChannelSettings {
                frame_error_rate: 1.0,
                ..ChannelSettings::default()
            },
            Pcg64Mcg::seed_from_u64(9),
        );
        assert!(lossy.frame_lost());
    }
}
