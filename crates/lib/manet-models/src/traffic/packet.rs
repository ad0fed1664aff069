use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use manet_core::node::NodeId;

/// Identity of a flow, equal to its position in the plan plus one.
#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct FlowId(pub u32);

impl Display for FlowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketId(pub u64);

impl Display for PacketId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    /// IP plus transport header bytes added to every payload.
    pub fn header_bytes(&self) -> u32 {
        match self {
            Transport::Tcp => 40,
            Transport::Udp => 28,
        }
    }

    pub fn protocol_number(&self) -> u8 {
        match self {
            Transport::Tcp => 6,
            Transport::Udp => 17,
        }
    }
}

impl Display for Transport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp => write!(f, "TCP"),
            Transport::Udp => write!(f, "UDP"),
        }
    }
}

/// Receiving socket of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketKey {
    pub node_id: NodeId,
    pub transport: Transport,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    NoRoute,
    FrameError,
    Timeout,
    InFlightAtEnd,
}

impl Display for DropReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::NoRoute => write!(f, "NoRoute"),
            DropReason::FrameError => write!(f, "FrameError"),
            DropReason::Timeout => write!(f, "Timeout"),
            DropReason::InFlightAtEnd => write!(f, "InFlightAtEnd"),
        }
    }
}

/// What a source asks the medium to send.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxRequest {
    pub flow_id: FlowId,
    pub source: NodeId,
    pub socket: SocketKey,
    pub payload: u32,
    /// Send instant in microseconds.
    pub sent_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    InFlight(PacketId),
    Dropped(DropReason),
}

/// A packet accepted by the medium.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Packet {
    pub packet_id: PacketId,
    pub flow_id: FlowId,
    pub source: NodeId,
    pub socket: SocketKey,
    pub payload: u32,
    /// IP level size in bytes.
    pub size: u32,
    pub sent_us: u64,
}

impl Packet {
    pub fn new(packet_id: PacketId, request: &TxRequest) -> Self {
        Self {
            packet_id,
            flow_id: request.flow_id,
            source: request.source,
            socket: request.socket,
            payload: request.payload,
            size: request.payload + request.socket.transport.header_bytes(),
            sent_us: request.sent_us,
        }
    }

    pub fn sink(&self) -> NodeId {
        self.socket.node_id
    }
}
