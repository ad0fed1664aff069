use std::net::IpAddr;
use std::path::PathBuf;

use log::{debug, info};

use manet_core::error::ConfigError;
use manet_models::dist::{SeedBank, Stream};
use manet_models::net::address::{AddressPool, AddressPrefix};
use manet_models::net::channel::{ChannelSettings, WirelessChannel};

use crate::manet::node::Node;

/// The shared channel with one interface and one address per node.
#[derive(Debug, Clone)]
pub struct LinkFabric {
    pub prefix: AddressPrefix,
    pub channel: WirelessChannel,
    /// Addresses in node order.
    pub addresses: Vec<IpAddr>,
    pub capture_prefix: Option<PathBuf>,
}

/// Attaches every node to the channel and assigns addresses in node creation order. Either all
/// nodes receive an address or none does.
pub fn install_fabric(
    nodes: &mut [Node],
    prefix: AddressPrefix,
    settings: ChannelSettings,
    capture_prefix: Option<PathBuf>,
    seeds: &SeedBank,
) -> Result<LinkFabric, ConfigError> {
    let mut pool = AddressPool::new(prefix);
    let addresses = pool.assign(nodes.len() as u32)?;
    for (node, address) in nodes.iter_mut().zip(addresses.iter()) {
        node.address = Some(*address);
        debug!("{} has address {}", node.name, address);
    }
    info!(
        "Attached {} nodes to the channel, addresses from {}",
        nodes.len(),
        prefix
    );
    if let Some(capture) = &capture_prefix {
        info!("Capturing frames with prefix {}", capture.display());
    }
    Ok(LinkFabric {
        prefix,
        channel: WirelessChannel::new(settings, seeds.rng(Stream::Channel)),
        addresses,
        capture_prefix,
    })
}
