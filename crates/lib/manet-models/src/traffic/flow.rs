use std::collections::BTreeSet;

use log::info;
use serde::Deserialize;
use typed_builder::TypedBuilder;

use manet_core::bucket::TimeMS;
use manet_core::error::ConfigError;
use manet_core::node::NodeId;

use crate::dist::{DistParams, DistType};
use crate::traffic::packet::{FlowId, SocketKey, Transport};

fn default_on_off_rate() -> f64 {
    500_000.0
}

fn default_on_off_size() -> u32 {
    512
}

fn default_on_time() -> DistParams {
    DistParams::constant(1.0)
}

fn default_off_time() -> DistParams {
    DistParams::constant(1.0)
}

fn default_client_size() -> u32 {
    1024
}

fn default_client_interval() -> TimeMS {
    TimeMS::SECOND
}

fn default_client_packets() -> u32 {
    100
}

fn default_port() -> u16 {
    9
}

/// How a source generates its packets. The transport follows from the variant.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "pattern_type")]
pub enum TrafficPattern {
    TcpOnOff {
        /// Sending rate during on periods, in bit/s.
        #[serde(default = "default_on_off_rate")]
        data_rate: f64,
        #[serde(default = "default_on_off_size")]
        packet_size: u32,
        /// On period length in seconds.
        #[serde(default = "default_on_time")]
        on_time: DistParams,
        /// Off period length in seconds.
        #[serde(default = "default_off_time")]
        off_time: DistParams,
        /// Total payload to send, 0 for no limit.
        #[serde(default)]
        max_bytes: u64,
    },
    UdpOnOff {
        #[serde(default = "default_on_off_rate")]
        data_rate: f64,
        #[serde(default = "default_on_off_size")]
        packet_size: u32,
        #[serde(default = "default_on_time")]
        on_time: DistParams,
        #[serde(default = "default_off_time")]
        off_time: DistParams,
        #[serde(default)]
        max_bytes: u64,
    },
    UdpConstantRate {
        #[serde(default = "default_client_size")]
        packet_size: u32,
        #[serde(default = "default_client_interval")]
        interval: TimeMS,
        /// Number of packets to send, 0 for no limit.
        #[serde(default = "default_client_packets")]
        max_packets: u32,
    },
}

impl TrafficPattern {
    pub fn transport(&self) -> Transport {
        match self {
            TrafficPattern::TcpOnOff { .. } => Transport::Tcp,
            TrafficPattern::UdpOnOff { .. } | TrafficPattern::UdpConstantRate { .. } => {
                Transport::Udp
            }
        }
    }

    pub fn packet_size(&self) -> u32 {
        match self {
            TrafficPattern::TcpOnOff { packet_size, .. }
            | TrafficPattern::UdpOnOff { packet_size, .. }
            | TrafficPattern::UdpConstantRate { packet_size, .. } => *packet_size,
        }
    }

    fn validate(&self, flow_id: FlowId) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidFlow {
            flow: flow_id.0,
            reason,
        };
        if self.packet_size() == 0 {
            return Err(invalid("packet_size must be > 0".to_string()));
        }
        match self {
            TrafficPattern::TcpOnOff {
                data_rate,
                on_time,
                off_time,
                ..
            }
            | TrafficPattern::UdpOnOff {
                data_rate,
                on_time,
                off_time,
                ..
            } => {
                if !(data_rate.is_finite() && *data_rate > 0.0) {
                    return Err(invalid(format!("data_rate must be > 0, got {}", data_rate)));
                }
                DistType::new(on_time)?;
                DistType::new(off_time)?;
            }
            TrafficPattern::UdpConstantRate { interval, .. } => {
                if interval.as_u64() == 0 {
                    return Err(invalid("interval must be > 0".to_string()));
                }
            }
        }
        Ok(())
    }
}

/// One `[[flows]]` entry of the configuration file. Times are in milliseconds.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct FlowSettings {
    pub source: u32,
    pub sink: u32,
    #[serde(default = "default_port")]
    pub port: u16,
    pub start: TimeMS,
    pub stop: TimeMS,
    pub sink_start: Option<TimeMS>,
    pub sink_stop: Option<TimeMS>,
    pub pattern: TrafficPattern,
}

/// Validated flow, ready to be turned into a sink and a source.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct FlowDescriptor {
    pub flow_id: FlowId,
    pub source: NodeId,
    pub sink: NodeId,
    pub port: u16,
    pub pattern: TrafficPattern,
    pub start: TimeMS,
    pub stop: TimeMS,
    pub sink_start: TimeMS,
    pub sink_stop: TimeMS,
}

impl FlowDescriptor {
    /// Default lead of a sink over its source.
    pub const SINK_LEAD: TimeMS = TimeMS(1000);

    pub fn from_settings(
        index: usize,
        settings: &FlowSettings,
        node_count: u32,
        duration: TimeMS,
    ) -> Result<Self, ConfigError> {
        let flow_id = FlowId(index as u32 + 1);
        let invalid = |reason: String| ConfigError::InvalidFlow {
            flow: flow_id.0,
            reason,
        };

        for node in [settings.source, settings.sink] {
            if node >= node_count {
                return Err(ConfigError::NodeOutOfRange {
                    flow: flow_id.0,
                    node,
                    node_count,
                });
            }
        }
        if settings.source == settings.sink {
            return Err(ConfigError::SelfFlow {
                flow: flow_id.0,
                node: settings.source,
            });
        }
        if settings.start >= settings.stop {
            return Err(invalid(format!(
                "start {} must be before stop {}",
                settings.start, settings.stop
            )));
        }
        if settings.stop > duration {
            return Err(invalid(format!(
                "stop {} is after the end of the run {}",
                settings.stop, duration
            )));
        }

        let sink_start = settings
            .sink_start
            .unwrap_or(settings.start.saturating_sub(Self::SINK_LEAD));
        let sink_stop = settings.sink_stop.unwrap_or(settings.stop);
        if sink_start >= sink_stop {
            return Err(invalid(format!(
                "sink start {} must be before sink stop {}",
                sink_start, sink_stop
            )));
        }
        if sink_stop > duration {
            return Err(invalid(format!(
                "sink stop {} is after the end of the run {}",
                sink_stop, duration
            )));
        }
        if settings.pattern.transport() == Transport::Tcp && sink_start >= settings.start {
            return Err(invalid(format!(
                "TCP sink start {} must be earlier than the source start {}",
                sink_start, settings.start
            )));
        }
        settings.pattern.validate(flow_id)?;

        Ok(Self {
            flow_id,
            source: NodeId::from(settings.source),
            sink: NodeId::from(settings.sink),
            port: settings.port,
            pattern: settings.pattern.clone(),
            start: settings.start,
            stop: settings.stop,
            sink_start,
            sink_stop,
        })
    }

    pub fn transport(&self) -> Transport {
        self.pattern.transport()
    }

    pub fn socket(&self) -> SocketKey {
        SocketKey {
            node_id: self.sink,
            transport: self.transport(),
            port: self.port,
        }
    }
}

/// Validates every flow of the configuration. Either all flows are valid or none is used.
pub fn plan_flows(
    flows: &[FlowSettings],
    node_count: u32,
    duration: TimeMS,
) -> Result<Vec<FlowDescriptor>, ConfigError> {
    let mut descriptors = Vec::with_capacity(flows.len());
    let mut sockets: BTreeSet<SocketKey> = BTreeSet::new();
    for (index, settings) in flows.iter().enumerate() {
        let descriptor = FlowDescriptor::from_settings(index, settings, node_count, duration)?;
        if !sockets.insert(descriptor.socket()) {
            return Err(ConfigError::InvalidFlow {
                flow: descriptor.flow_id.0,
                reason: format!(
                    "{} port {} on node {} is already used by another flow",
                    descriptor.transport(),
                    descriptor.port,
                    descriptor.sink
                ),
            });
        }
        info!(
            "Flow {}: node {} -> node {} over {} port {}",
            descriptor.flow_id,
            descriptor.source,
            descriptor.sink,
            descriptor.transport(),
            descriptor.port
        );
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_flow(source: u32, sink: u32) -> FlowSettings {
        FlowSettings {
            source,
            sink,
            port: 9,
            start: TimeMS::from(20_000u64),
            stop: TimeMS::from(150_000u64),
            sink_start: Some(TimeMS::from(19_000u64)),
            sink_stop: None,
            pattern: TrafficPattern::TcpOnOff {
                data_rate: default_on_off_rate(),
                packet_size: 512,
                on_time: DistParams::constant(1.0),
                off_time: DistParams::constant(0.0),
                max_bytes: 0,
            },
        }
    }

    const RUN: TimeMS = TimeMS(150_000);

    #[test]
    fn valid_flow_gets_defaults() {
        let descriptor =
            FlowDescriptor::from_settings(0, &tcp_flow(80, 1), 100, RUN).expect("valid flow");
        assert_eq!(descriptor.flow_id, FlowId(1));
        assert_eq!(descriptor.sink_stop, TimeMS::from(150_000u64));
        assert!(descriptor.sink_start < descriptor.start);
        assert_eq!(descriptor.transport(), Transport::Tcp);
    }

    #[test]
    fn sink_outside_node_range_is_named() {
        let error = FlowDescriptor::from_settings(0, &tcp_flow(80, 200), 100, RUN)
            .expect_err("sink 200 does not exist");
        assert!(error.to_string().contains("200"));
    }

    #[test]
    fn tcp_sink_must_start_first() {
        let mut settings = tcp_flow(80, 1);
        settings.sink_start = Some(TimeMS::from(20_000u64));
        assert!(FlowDescriptor::from_settings(0, &settings, 100, RUN).is_err());
        settings.sink_start = None;
        let descriptor =
            FlowDescriptor::from_settings(0, &settings, 100, RUN).expect("default lead");
        assert_eq!(descriptor.sink_start, TimeMS::from(19_000u64));
    }

    #[test]
    fn rejects_self_flows_and_bad_timing() {
        assert!(matches!(
            FlowDescriptor::from_settings(0, &tcp_flow(5, 5), 100, RUN),
            Err(ConfigError::SelfFlow { node: 5, .. })
        ));
        let mut late = tcp_flow(80, 1);
        late.stop = TimeMS::from(200_000u64);
        assert!(FlowDescriptor::from_settings(0, &late, 100, RUN).is_err());
    }

    #[test]
    fn duplicate_sockets_are_rejected() {
        let flows = vec![tcp_flow(80, 1), tcp_flow(70, 1)];
        assert!(plan_flows(&flows, 100, RUN).is_err());
        let mut other_port = tcp_flow(70, 1);
        other_port.port = 10;
        let flows = vec![tcp_flow(80, 1), other_port];
        assert_eq!(plan_flows(&flows, 100, RUN).expect("distinct sockets").len(), 2);
    }

    #[test]
    fn pattern_parses_from_toml() {
        let settings: FlowSettings = toml::from_str(
            r#"
            source = 80
            sink = 1
            start = 20000
            stop = 150000
            [pattern]
            pattern_type = "UdpConstantRate"
            interval = 50
            max_packets = 800
            "#,
        )
        .expect("valid flow table");
        assert_eq!(settings.port, 9);
        assert_eq!(settings.pattern.transport(), Transport::Udp);
        assert_eq!(settings.pattern.packet_size(), 1024);
    }
}
