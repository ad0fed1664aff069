use std::cmp::Reverse;
use std::net::IpAddr;
use std::path::PathBuf;

use hashbrown::HashMap;
use keyed_priority_queue::KeyedPriorityQueue;
use log::{debug, warn};
use typed_builder::TypedBuilder;

use manet_core::bucket::{Bucket, TimeMS};
use manet_core::error::{ExperimentError, ResourceError};
use manet_models::mobility::{Point2D, PositionProvider, Trajectory};
use manet_models::monitor::FlowMonitor;
use manet_models::net::channel::{NeighborTable, WirelessChannel};
use manet_models::net::routing::{Resolution, Route, RoutingBinding, RoutingProtocol};
use manet_models::traffic::endpoint::PacketMedium;
use manet_models::traffic::packet::{
    DropReason, Packet, PacketId, SocketKey, TxOutcome, TxRequest,
};
use manet_output::capture::{FrameCapture, FrameRecord};
use manet_output::result::Results;
use manet_output::routes::write_routes;

const US_PER_MS: u64 = 1000;

#[derive(Debug, Clone, Copy)]
struct Transit {
    packet: Packet,
    hops: u32,
}

/// Everything the medium owns for the whole run.
#[derive(TypedBuilder)]
pub struct MediumModels<P: RoutingProtocol> {
    pub trajectories: Vec<Trajectory>,
    pub addresses: Vec<IpAddr>,
    pub channel: WirelessChannel,
    pub routing: RoutingBinding<P>,
    pub monitor: FlowMonitor,
    pub results: Results,
    pub output_interval: TimeMS,
    #[builder(default)]
    pub capture: Option<FrameCapture>,
    #[builder(default)]
    pub routes_file: Option<PathBuf>,
}

/// The wireless medium shared by every traffic endpoint.
///
/// Packets are routed when they are sent. A packet that survives every hop is queued with
/// its arrival time and handed to the sink socket in the step that covers that instant.
#[derive(TypedBuilder)]
pub struct MediumBucket<P: RoutingProtocol> {
    pub models: MediumModels<P>,
    pub step_size: TimeMS,
    #[builder(default)]
    pub step: TimeMS,
    #[builder(default)]
    positions: Vec<Point2D>,
    #[builder(default)]
    neighbors: NeighborTable,
    #[builder(default = KeyedPriorityQueue::new())]
    queue: KeyedPriorityQueue<PacketId, Reverse<(u64, u64)>>,
    #[builder(default)]
    in_transit: HashMap<PacketId, Transit>,
    #[builder(default)]
    sockets: HashMap<SocketKey, Vec<Packet>>,
    #[builder(default)]
    next_packet_id: u64,
    #[builder(default)]
    fault: Option<ExperimentError>,
}

impl<P: RoutingProtocol> MediumBucket<P> {
    /// Hands out the flow monitor once the run is over.
    pub fn into_monitor(self) -> FlowMonitor {
        self.models.monitor
    }

    fn is_mobile(&self) -> bool {
        self.models
            .trajectories
            .iter()
            .any(|trajectory| matches!(trajectory, Trajectory::Waypoints(_)))
    }

    fn update_positions(&mut self) {
        let now = self.step;
        self.positions = self
            .models
            .trajectories
            .iter()
            .map(|trajectory| trajectory.position_at(now))
            .collect();
        self.neighbors = NeighborTable::build(&self.positions, self.models.channel.range());
    }

    fn keep_fault(&mut self, result: Result<(), ResourceError>) {
        if let Err(e) = result {
            warn!("Output failed at {}: {}", self.step, e);
            if self.fault.is_none() {
                self.fault = Some(e.into());
            }
        }
    }

    fn capture_frame(&mut self, time_us: u64, packet: &Packet, hop: (usize, usize), lost: bool) {
        let result = match self.models.capture.as_mut() {
            Some(capture) => capture.capture(&FrameRecord {
                time_us,
                packet_id: packet.packet_id.0,
                flow_id: packet.flow_id.0,
                sender: hop.0 as u32,
                receiver: hop.1 as u32,
                size: packet.size,
                lost,
            }),
            None => return,
        };
        self.keep_fault(result);
    }

    /// Sends the packet hop by hop along the route. Returns the arrival time at the sink, or
    /// `None` when a hop lost the frame.
    fn forward(&mut self, packet: &Packet, route: &Route, departure_us: u64) -> Option<u64> {
        let mut time_us = departure_us;
        for (sender, receiver) in route.links() {
            let hop = (sender.as_usize(), receiver.as_usize());
            let lost = self.models.channel.frame_lost();
            self.capture_frame(time_us, packet, hop, lost);
            if lost {
                return None;
            }
            let distance = match (self.positions.get(hop.0), self.positions.get(hop.1)) {
                (Some(this), Some(other)) => this.distance(other),
                _ => 0.0,
            };
            time_us += self.models.channel.hop_delay_us(packet.size, distance);
        }
        Some(time_us)
    }

    fn drop_packet(&mut self, packet: &Packet, reason: DropReason) -> TxOutcome {
        debug!(
            "Packet {} of flow {} dropped: {}",
            packet.packet_id, packet.flow_id, reason
        );
        self.models.monitor.record_drop(packet, reason);
        TxOutcome::Dropped(reason)
    }

    fn deliver_until(&mut self, window_end_us: u64) {
        loop {
            let due = match self.queue.peek() {
                Some((_, Reverse((arrival_us, _)))) => *arrival_us < window_end_us,
                None => false,
            };
            if !due {
                break;
            }
            let (packet_id, Reverse((arrival_us, _))) = match self.queue.pop() {
                Some(entry) => entry,
                None => break,
            };
            let transit = match self.in_transit.remove(&packet_id) {
                Some(transit) => transit,
                None => continue,
            };
            let packet = transit.packet;
            if !self
                .models
                .monitor
                .record_rx(&packet, arrival_us, transit.hops)
            {
                continue;
            }
            if let Some(writer) = self.models.results.rx_trace.as_mut() {
                writer.add_data(&packet, arrival_us, transit.hops);
            }
            if let Some(mailbox) = self.sockets.get_mut(&packet.socket) {
                mailbox.push(packet);
            }
        }
    }

    fn discard_lost(&mut self) {
        let now_us = self.step.as_u64() * US_PER_MS;
        for packet_id in self.models.monitor.check_for_lost_packets(now_us) {
            self.queue.remove(&packet_id);
            self.in_transit.remove(&packet_id);
        }
    }

    fn dump_routes(&mut self) {
        if !self.models.routing.snapshot_due(self.step, self.step_size) {
            return;
        }
        if let Some(file_path) = self.models.routes_file.clone() {
            let snapshot = self.models.routing.protocol().snapshot(self.step);
            let result = write_routes(&file_path, &snapshot, &self.models.addresses);
            self.keep_fault(result);
        }
    }

    fn write_positions(&mut self) {
        if !self.step.is_multiple_of(self.models.output_interval) {
            return;
        }
        if let Some(writer) = self.models.results.positions.as_mut() {
            for (index, position) in self.positions.iter().enumerate() {
                writer.add_data(self.step, index.into(), position);
            }
        }
        let result = self.models.results.write_to_file();
        self.keep_fault(result);
    }
}

impl<P: RoutingProtocol> Bucket for MediumBucket<P> {
    fn initialize(&mut self, step: TimeMS) {
        self.step = step;
        self.update_positions();
        debug!(
            "Medium initialized with {} nodes and {} links",
            self.neighbors.node_count(),
            self.neighbors.link_count()
        );
    }

    fn before_apps(&mut self, step: TimeMS) {
        self.step = step;
        if self.is_mobile() {
            self.update_positions();
        }
        self.models.routing.protocol_mut().expire(step);
    }

    fn after_stage_one(&mut self) {
        let window_end_us = (self.step + self.step_size).as_u64() * US_PER_MS;
        self.deliver_until(window_end_us);
    }

    fn after_apps(&mut self) {
        self.dump_routes();
        self.discard_lost();
        self.write_positions();
    }

    fn terminate(&mut self) -> Result<(), ExperimentError> {
        debug!(
            "Medium stopped with {} packets queued and {} in flight",
            self.queue.len(),
            self.models.monitor.in_flight()
        );
        let results = std::mem::take(&mut self.models.results);
        let closed = results.close_files();
        self.keep_fault(closed);
        if let Some(capture) = self.models.capture.take() {
            let finished = capture.finish();
            self.keep_fault(finished);
        }
        match self.fault.take() {
            Some(fault) => Err(ExperimentError::engine(fault)),
            None => Ok(()),
        }
    }
}

impl<P: RoutingProtocol> PacketMedium for MediumBucket<P> {
    fn now(&self) -> TimeMS {
        self.step
    }

    fn step_size(&self) -> TimeMS {
        self.step_size
    }

    fn transmit(&mut self, request: TxRequest) -> TxOutcome {
        let packet = Packet::new(PacketId(self.next_packet_id), &request);
        self.next_packet_id += 1;
        self.models.monitor.record_tx(&packet);

        let source = request.source;
        let sink = packet.sink();
        let resolution =
            self.models
                .routing
                .protocol_mut()
                .resolve(self.step, source, sink, &self.neighbors);
        let (route, latency_us) = match resolution {
            Resolution::Cached(route) => (route, 0),
            Resolution::Discovered { route, latency_us } => (route, latency_us),
            Resolution::Unreachable => return self.drop_packet(&packet, DropReason::NoRoute),
        };

        let departure_us = request.sent_us + latency_us;
        let arrival_us = match self.forward(&packet, &route, departure_us) {
            Some(arrival_us) => arrival_us,
            None => return self.drop_packet(&packet, DropReason::FrameError),
        };
        self.queue.push(
            packet.packet_id,
            Reverse((arrival_us, packet.packet_id.0)),
        );
        self.in_transit.insert(
            packet.packet_id,
            Transit {
                packet,
                hops: route.hop_count() as u32,
            },
        );
        TxOutcome::InFlight(packet.packet_id)
    }

    fn listen(&mut self, socket: SocketKey) {
        self.sockets.entry(socket).or_default();
    }

    fn close(&mut self, socket: &SocketKey) {
        self.sockets.remove(socket);
    }

    fn is_listening(&self, socket: &SocketKey) -> bool {
        self.sockets.contains_key(socket)
    }

    fn take_delivered(&mut self, socket: &SocketKey) -> Vec<Packet> {
        match self.sockets.get_mut(socket) {
            Some(mailbox) => std::mem::take(mailbox),
            None => Vec::new(),
        }
    }
}
