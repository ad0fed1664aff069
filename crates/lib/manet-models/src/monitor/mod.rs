use std::collections::BTreeMap;

use log::{debug, info};
use serde::Deserialize;

use manet_core::bucket::TimeMS;
use manet_core::error::ConfigError;
use manet_core::node::NodeId;

use crate::monitor::histogram::Histogram;
use crate::traffic::flow::FlowDescriptor;
use crate::traffic::packet::{DropReason, FlowId, Packet, PacketId, Transport};

pub mod histogram;

/// Interval of the periodic lost packet check, in microseconds.
pub const CHECK_INTERVAL_US: u64 = 1_000_000;

fn default_bin_width() -> f64 {
    0.01
}

fn default_size_bin_width() -> f64 {
    1.0
}

fn default_max_per_hop_delay() -> TimeMS {
    TimeMS::from(10_000u64)
}

fn default_report_file() -> String {
    "flow-monitor.xml".to_string()
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    /// Width of a delay histogram bin in seconds.
    #[serde(default = "default_bin_width")]
    pub delay_bin_width: f64,
    /// Width of a jitter histogram bin in seconds.
    #[serde(default = "default_bin_width")]
    pub jitter_bin_width: f64,
    /// Width of a packet size histogram bin in bytes.
    #[serde(default = "default_size_bin_width")]
    pub packet_size_bin_width: f64,
    /// Packets in flight for longer than this are counted as lost.
    #[serde(default = "default_max_per_hop_delay")]
    pub max_per_hop_delay: TimeMS,
    #[serde(default = "default_report_file")]
    pub report_file: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            delay_bin_width: default_bin_width(),
            jitter_bin_width: default_bin_width(),
            packet_size_bin_width: default_size_bin_width(),
            max_per_hop_delay: default_max_per_hop_delay(),
            report_file: default_report_file(),
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, width) in [
            ("delay_bin_width", self.delay_bin_width),
            ("jitter_bin_width", self.jitter_bin_width),
            ("packet_size_bin_width", self.packet_size_bin_width),
        ] {
            if !(width.is_finite() && width > 0.0) {
                return Err(ConfigError::invalid(field, "> 0", width));
            }
        }
        if self.max_per_hop_delay.as_u64() == 0 {
            return Err(ConfigError::invalid("max_per_hop_delay", "> 0", 0));
        }
        Ok(())
    }
}

/// Counters of one flow. Times are in microseconds of simulated time.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowStats {
    pub flow_id: FlowId,
    pub source: NodeId,
    pub sink: NodeId,
    pub transport: Transport,
    pub port: u16,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub lost_packets: u64,
    pub times_forwarded: u64,
    pub delay_sum_us: u64,
    pub jitter_sum_us: u64,
    pub last_delay_us: Option<u64>,
    pub first_tx_us: Option<u64>,
    pub last_tx_us: Option<u64>,
    pub first_rx_us: Option<u64>,
    pub last_rx_us: Option<u64>,
    pub delay_histogram: Histogram,
    pub jitter_histogram: Histogram,
    pub packet_size_histogram: Histogram,
    pub drops: BTreeMap<DropReason, u64>,
}

impl FlowStats {
    fn new(flow: &FlowDescriptor, settings: &MonitorSettings) -> Self {
        Self {
            flow_id: flow.flow_id,
            source: flow.source,
            sink: flow.sink,
            transport: flow.transport(),
            port: flow.port,
            tx_packets: 0,
            tx_bytes: 0,
            rx_packets: 0,
            rx_bytes: 0,
            lost_packets: 0,
            times_forwarded: 0,
            delay_sum_us: 0,
            jitter_sum_us: 0,
            last_delay_us: None,
            first_tx_us: None,
            last_tx_us: None,
            first_rx_us: None,
            last_rx_us: None,
            delay_histogram: Histogram::new(settings.delay_bin_width),
            jitter_histogram: Histogram::new(settings.jitter_bin_width),
            packet_size_histogram: Histogram::new(settings.packet_size_bin_width),
            drops: BTreeMap::new(),
        }
    }

    /// Mean one way delay in seconds, 0 without received packets.
    pub fn mean_delay(&self) -> f64 {
        if self.rx_packets == 0 {
            return 0.0;
        }
        self.delay_sum_us as f64 / 1e6 / self.rx_packets as f64
    }

    /// Mean jitter in seconds, 0 with fewer than two received packets.
    pub fn mean_jitter(&self) -> f64 {
        if self.rx_packets < 2 {
            return 0.0;
        }
        self.jitter_sum_us as f64 / 1e6 / (self.rx_packets - 1) as f64
    }

    fn lose(&mut self, reason: DropReason) {
        self.lost_packets += 1;
        *self.drops.entry(reason).or_default() += 1;
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    flow_id: FlowId,
    sent_us: u64,
}

/// Per flow packet accounting. Every transmitted packet ends up either received or lost.
#[derive(Debug)]
pub struct FlowMonitor {
    settings: MonitorSettings,
    flows: BTreeMap<FlowId, FlowStats>,
    in_flight: BTreeMap<PacketId, InFlight>,
    next_check_us: u64,
}

impl FlowMonitor {
    pub fn attach(settings: MonitorSettings, flows: &[FlowDescriptor]) -> Result<Self, ConfigError> {
        settings.validate()?;
        let flows: BTreeMap<FlowId, FlowStats> = flows
            .iter()
            .map(|flow| (flow.flow_id, FlowStats::new(flow, &settings)))
            .collect();
        info!("Flow monitor attached to {} flows", flows.len());
        Ok(Self {
            settings,
            flows,
            in_flight: BTreeMap::new(),
            next_check_us: CHECK_INTERVAL_US,
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self, flow_id: FlowId) -> Option<&FlowStats> {
        self.flows.get(&flow_id)
    }

    pub fn record_tx(&mut self, packet: &Packet) {
        let stats = match self.flows.get_mut(&packet.flow_id) {
            Some(stats) => stats,
            None => return,
        };
        stats.tx_packets += 1;
        stats.tx_bytes += packet.size as u64;
        stats.first_tx_us.get_or_insert(packet.sent_us);
        stats.last_tx_us = Some(packet.sent_us);
        stats.packet_size_histogram.add(packet.size as f64);
        self.in_flight.insert(
            packet.packet_id,
            InFlight {
                flow_id: packet.flow_id,
                sent_us: packet.sent_us,
            },
        );
    }

    /// Counts a packet that reached its sink node after `hops` hops. Packets that were
    /// already declared lost are ignored and `false` is returned.
    pub fn record_rx(&mut self, packet: &Packet, at_us: u64, hops: u32) -> bool {
        if self.in_flight.remove(&packet.packet_id).is_none() {
            return false;
        }
        let stats = match self.flows.get_mut(&packet.flow_id) {
            Some(stats) => stats,
            None => return false,
        };
        let delay_us = at_us.saturating_sub(packet.sent_us);
        stats.rx_packets += 1;
        stats.rx_bytes += packet.size as u64;
        stats.times_forwarded += hops.saturating_sub(1) as u64;
        stats.delay_sum_us += delay_us;
        stats.delay_histogram.add(delay_us as f64 / 1e6);
        if let Some(last_delay_us) = stats.last_delay_us {
            let jitter_us = delay_us.abs_diff(last_delay_us);
            stats.jitter_sum_us += jitter_us;
            stats.jitter_histogram.add(jitter_us as f64 / 1e6);
        }
        stats.last_delay_us = Some(delay_us);
        stats.first_rx_us.get_or_insert(at_us);
        stats.last_rx_us = Some(at_us);
        true
    }

    pub fn record_drop(&mut self, packet: &Packet, reason: DropReason) {
        if self.in_flight.remove(&packet.packet_id).is_none() {
            return;
        }
        if let Some(stats) = self.flows.get_mut(&packet.flow_id) {
            stats.lose(reason);
        }
    }

    /// Runs at most once per check interval. Packets in flight for longer than the maximum
    /// per hop delay are declared lost; their ids are returned so the medium can discard them.
    pub fn check_for_lost_packets(&mut self, now_us: u64) -> Vec<PacketId> {
        if now_us < self.next_check_us {
            return Vec::new();
        }
        while self.next_check_us <= now_us {
            self.next_check_us += CHECK_INTERVAL_US;
        }
        let max_delay_us = self.settings.max_per_hop_delay.as_u64() * 1000;
        let expired: Vec<PacketId> = self
            .in_flight
            .iter()
            .filter(|(_, in_flight)| now_us.saturating_sub(in_flight.sent_us) > max_delay_us)
            .map(|(packet_id, _)| *packet_id)
            .collect();
        for packet_id in expired.iter() {
            if let Some(in_flight) = self.in_flight.remove(packet_id) {
                if let Some(stats) = self.flows.get_mut(&in_flight.flow_id) {
                    stats.lose(DropReason::Timeout);
                }
            }
        }
        if !expired.is_empty() {
            debug!("{} packets timed out at {} us", expired.len(), now_us);
        }
        expired
    }

    /// Declares every packet still in flight as lost and hands out the final counters.
    pub fn reconcile(mut self) -> ReconciledFlows {
        let remaining = std::mem::take(&mut self.in_flight);
        for (_, in_flight) in remaining.into_iter() {
            if let Some(stats) = self.flows.get_mut(&in_flight.flow_id) {
                stats.lose(DropReason::InFlightAtEnd);
            }
        }
        let flows: Vec<FlowStats> = self.flows.into_values().collect();
        for stats in flows.iter() {
            info!(
                "Flow {}: tx {} rx {} lost {}",
                stats.flow_id, stats.tx_packets, stats.rx_packets, stats.lost_packets
            );
        }
        ReconciledFlows { flows }
    }
}

/// Final per flow counters, in flow id order.
#[derive(Debug, Clone)]
pub struct ReconciledFlows {
    pub flows: Vec<FlowStats>,
}

impl ReconciledFlows {
    pub fn flow(&self, flow_id: FlowId) -> Option<&FlowStats> {
        self.flows.iter().find(|stats| stats.flow_id == flow_id)
    }

    /// Whether received plus lost packets equal transmitted packets for every flow.
    pub fn is_balanced(&self) -> bool {
        self.flows
            .iter()
            .all(|stats| stats.rx_packets + stats.lost_packets == stats.tx_packets)
    }
}
