use hashbrown::HashMap;
use log::info;

use manet_core::error::ConfigError;
use manet_core::node::AppId;
use manet_models::dist::{SeedBank, Stream};
use manet_models::traffic::endpoint::{sink_app_id, source_app_id, FlowEndpointFactory};
use manet_models::traffic::flow::FlowDescriptor;

use crate::manet::node::Node;

fn address_of(nodes: &[Node], flow_node: usize) -> String {
    match nodes.get(flow_node).and_then(|node| node.address) {
        Some(address) => address.to_string(),
        None => "unassigned".to_string(),
    }
}

/// Creates the sink and the source of every flow. Each source draws from its own stream.
pub fn install_traffic<F: FlowEndpointFactory>(
    factory: &F,
    flows: &[FlowDescriptor],
    nodes: &[Node],
    seeds: &SeedBank,
) -> Result<HashMap<AppId, F::Endpoint>, ConfigError> {
    let mut endpoints = HashMap::with_capacity(flows.len() * 2);
    for flow in flows.iter() {
        info!(
            "Flow {}: {} {} -> {} port {}, source {}..{} ms, sink {}..{} ms",
            flow.flow_id,
            flow.transport(),
            address_of(nodes, flow.source.as_usize()),
            address_of(nodes, flow.sink.as_usize()),
            flow.port,
            flow.start,
            flow.stop,
            flow.sink_start,
            flow.sink_stop
        );
        let source = factory.source(flow, seeds.rng(Stream::Flow(flow.flow_id.0)))?;
        endpoints.insert(sink_app_id(flow), factory.sink(flow));
        endpoints.insert(source_app_id(flow), source);
    }
    Ok(endpoints)
}
