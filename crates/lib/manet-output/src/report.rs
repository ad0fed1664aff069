use std::fs;
use std::net::IpAddr;
use std::path::Path;

use log::info;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use typed_builder::TypedBuilder;

use manet_core::error::ResourceError;
use manet_models::monitor::histogram::Histogram;
use manet_models::monitor::{FlowStats, ReconciledFlows};
use manet_models::net::address::AddressFamily;

/// First ephemeral port, source ports of flows are counted from here.
const EPHEMERAL_PORT_BASE: u32 = 49152;

/// XML flow report in the layout of the ns-3 flow monitor. The output depends only on the
/// reconciled counters, so equal runs produce byte-identical files.
#[derive(TypedBuilder)]
pub struct FlowReport<'a> {
    flows: &'a ReconciledFlows,
    addresses: &'a [IpAddr],
    family: AddressFamily,
}

fn time_ns(time_us: Option<u64>) -> String {
    format!("+{}.0ns", time_us.unwrap_or(0) * 1000)
}

fn duration_ns(duration_us: u64) -> String {
    format!("+{}.0ns", duration_us * 1000)
}

fn real(value: f64) -> String {
    format!("{}", (value * 1e9).round() / 1e9)
}

impl<'a> FlowReport<'a> {
    fn address_of(&self, stats: &FlowStats, sink: bool) -> String {
        let node_id = if sink { stats.sink } else { stats.source };
        match self.addresses.get(node_id.as_usize()) {
            Some(address) => address.to_string(),
            None => node_id.to_string(),
        }
    }

    pub fn render(&self) -> Result<Vec<u8>, ResourceError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_events(&mut writer)
            .map_err(|e| ResourceError::output("flow report", e))?;
        let mut content = writer.into_inner();
        content.push(b'\n');
        Ok(content)
    }

    /// Writes the report to `file_path`. The parent directory must exist.
    pub fn write_to(&self, file_path: &Path) -> Result<(), ResourceError> {
        let content = self.render()?;
        fs::write(file_path, content).map_err(|e| ResourceError::write(file_path, e))?;
        info!(
            "Flow report with {} flows written to {}",
            self.flows.flows.len(),
            file_path.display()
        );
        Ok(())
    }

    fn write_events(&self, writer: &mut Writer<Vec<u8>>) -> std::io::Result<()> {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("FlowMonitor")))?;

        writer.write_event(Event::Start(BytesStart::new("FlowStats")))?;
        for stats in self.flows.flows.iter() {
            self.write_flow(writer, stats)?;
        }
        writer.write_event(Event::End(BytesEnd::new("FlowStats")))?;

        let classifier = match self.family {
            AddressFamily::Ipv4 => "Ipv4FlowClassifier",
            AddressFamily::Ipv6 => "Ipv6FlowClassifier",
        };
        writer.write_event(Event::Start(BytesStart::new(classifier)))?;
        for stats in self.flows.flows.iter() {
            let flow_id = stats.flow_id.to_string();
            let source_address = self.address_of(stats, false);
            let destination_address = self.address_of(stats, true);
            let protocol = stats.transport.protocol_number().to_string();
            let source_port = (EPHEMERAL_PORT_BASE + stats.flow_id.0).to_string();
            let destination_port = stats.port.to_string();

            let mut flow = BytesStart::new("Flow");
            flow.push_attribute(("flowId", flow_id.as_str()));
            flow.push_attribute(("sourceAddress", source_address.as_str()));
            flow.push_attribute(("destinationAddress", destination_address.as_str()));
            flow.push_attribute(("protocol", protocol.as_str()));
            flow.push_attribute(("sourcePort", source_port.as_str()));
            flow.push_attribute(("destinationPort", destination_port.as_str()));
            writer.write_event(Event::Empty(flow))?;
        }
        writer.write_event(Event::End(BytesEnd::new(classifier)))?;

        writer.write_event(Event::End(BytesEnd::new("FlowMonitor")))?;
        Ok(())
    }

    fn write_flow(&self, writer: &mut Writer<Vec<u8>>, stats: &FlowStats) -> std::io::Result<()> {
        let attributes = [
            ("flowId", stats.flow_id.to_string()),
            ("timeFirstTxPacket", time_ns(stats.first_tx_us)),
            ("timeFirstRxPacket", time_ns(stats.first_rx_us)),
            ("timeLastTxPacket", time_ns(stats.last_tx_us)),
            ("timeLastRxPacket", time_ns(stats.last_rx_us)),
            ("delaySum", duration_ns(stats.delay_sum_us)),
            ("jitterSum", duration_ns(stats.jitter_sum_us)),
            ("lastDelay", duration_ns(stats.last_delay_us.unwrap_or(0))),
            ("meanDelay", real(stats.mean_delay())),
            ("meanJitter", real(stats.mean_jitter())),
            ("txBytes", stats.tx_bytes.to_string()),
            ("rxBytes", stats.rx_bytes.to_string()),
            ("txPackets", stats.tx_packets.to_string()),
            ("rxPackets", stats.rx_packets.to_string()),
            ("lostPackets", stats.lost_packets.to_string()),
            ("timesForwarded", stats.times_forwarded.to_string()),
        ];
        let mut flow = BytesStart::new("Flow");
        for (name, value) in attributes.iter() {
            flow.push_attribute((*name, value.as_str()));
        }
        writer.write_event(Event::Start(flow))?;

        write_histogram(writer, "delayHistogram", &stats.delay_histogram)?;
        write_histogram(writer, "jitterHistogram", &stats.jitter_histogram)?;
        write_histogram(writer, "packetSizeHistogram", &stats.packet_size_histogram)?;

        for (reason, count) in stats.drops.iter() {
            let reason = reason.to_string();
            let count = count.to_string();
            let mut dropped = BytesStart::new("packetsDropped");
            dropped.push_attribute(("reason", reason.as_str()));
            dropped.push_attribute(("number", count.as_str()));
            writer.write_event(Event::Empty(dropped))?;
        }

        writer.write_event(Event::End(BytesEnd::new("Flow")))?;
        Ok(())
    }
}

fn write_histogram(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    histogram: &Histogram,
) -> std::io::Result<()> {
    let bins = histogram.bins();
    let n_bins = bins.len().to_string();
    let mut start = BytesStart::new(name);
    start.push_attribute(("nBins", n_bins.as_str()));
    if bins.is_empty() {
        return writer.write_event(Event::Empty(start));
    }
    writer.write_event(Event::Start(start))?;
    for bin in bins.iter() {
        let index = bin.index.to_string();
        let bin_start = real(bin.start);
        let width = real(bin.width);
        let count = bin.count.to_string();
        let mut element = BytesStart::new("bin");
        element.push_attribute(("index", index.as_str()));
        element.push_attribute(("start", bin_start.as_str()));
        element.push_attribute(("width", width.as_str()));
        element.push_attribute(("count", count.as_str()));
        writer.write_event(Event::Empty(element))?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))
}
