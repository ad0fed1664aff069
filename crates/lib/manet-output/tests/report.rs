use std::net::{IpAddr, Ipv4Addr};

use manet_core::bucket::TimeMS;
use manet_core::error::ResourceError;
use manet_models::dist::DistParams;
use manet_models::monitor::{FlowMonitor, MonitorSettings, ReconciledFlows};
use manet_models::net::address::AddressFamily;
use manet_models::traffic::flow::{FlowDescriptor, TrafficPattern};
use manet_models::traffic::packet::{FlowId, Packet, PacketId, SocketKey, Transport, TxRequest};
use manet_output::report::FlowReport;

fn descriptor() -> FlowDescriptor {
    FlowDescriptor::builder()
        .flow_id(FlowId(1))
        .source(2u32.into())
        .sink(1u32.into())
        .port(9)
        .pattern(TrafficPattern::TcpOnOff {
            data_rate: 500_000.0,
            packet_size: 512,
            on_time: DistParams::constant(1.0),
            off_time: DistParams::constant(0.0),
            max_bytes: 0,
        })
        .start(TimeMS::from(2_000u64))
        .stop(TimeMS::from(10_000u64))
        .sink_start(TimeMS::from(1_000u64))
        .sink_stop(TimeMS::from(10_000u64))
        .build()
}

fn packet(id: u64, sent_us: u64) -> Packet {
    let request = TxRequest {
        flow_id: FlowId(1),
        source: 2u32.into(),
        socket: SocketKey {
            node_id: 1u32.into(),
            transport: Transport::Tcp,
            port: 9,
        },
        payload: 512,
        sent_us,
    };
    Packet::new(PacketId(id), &request)
}

fn reconciled() -> ReconciledFlows {
    let mut monitor =
        FlowMonitor::attach(MonitorSettings::default(), &[descriptor()]).expect("valid monitor");
    for id in 0..3 {
        monitor.record_tx(&packet(id, 2_000_000 + id * 10_000));
    }
    monitor.record_rx(&packet(0, 2_000_000), 2_004_000, 2);
    monitor.record_rx(&packet(1, 2_010_000), 2_016_000, 2);
    monitor.reconcile()
}

fn addresses() -> Vec<IpAddr> {
    (1..=3)
        .map(|host| IpAddr::V4(Ipv4Addr::new(10, 0, 0, host)))
        .collect()
}

fn render(flows: &ReconciledFlows, addresses: &[IpAddr]) -> String {
    let report = FlowReport::builder()
        .flows(flows)
        .addresses(addresses)
        .family(AddressFamily::Ipv4)
        .build();
    String::from_utf8(report.render().expect("report renders")).expect("utf-8 report")
}

#[test]
fn report_lists_counters_and_classifier() {
    let flows = reconciled();
    let content = render(&flows, &addresses());

    assert!(content.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(content.contains("<FlowMonitor>"));
    assert!(content.contains("txPackets=\"3\""));
    assert!(content.contains("rxPackets=\"2\""));
    assert!(content.contains("lostPackets=\"1\""));
    assert!(content.contains("timesForwarded=\"2\""));
    assert!(content.contains("delaySum=\"+10000000.0ns\""));
    assert!(content.contains("<packetsDropped reason=\"InFlightAtEnd\" number=\"1\"/>"));
    assert!(content.contains("<Ipv4FlowClassifier>"));
    assert!(content.contains("sourceAddress=\"10.0.0.3\""));
    assert!(content.contains("destinationAddress=\"10.0.0.2\""));
    assert!(content.contains("protocol=\"6\""));
    assert!(content.contains("destinationPort=\"9\""));
}

#[test]
fn equal_counters_render_identical_reports() {
    let first = render(&reconciled(), &addresses());
    let second = render(&reconciled(), &addresses());
    assert_eq!(first, second);
}

#[test]
fn unwritable_report_path_is_a_resource_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let flows = reconciled();
    let addresses = addresses();
    let report = FlowReport::builder()
        .flows(&flows)
        .addresses(&addresses)
        .family(AddressFamily::Ipv4)
        .build();

    let missing = dir.path().join("missing").join("flow-monitor.xml");
    let result = report.write_to(&missing);
    assert!(matches!(result, Err(ResourceError::Write { .. })));

    let path = dir.path().join("flow-monitor.xml");
    report.write_to(&path).expect("report written");
    let written = std::fs::read_to_string(&path).expect("report readable");
    assert!(written.contains("<FlowStats>"));
}
