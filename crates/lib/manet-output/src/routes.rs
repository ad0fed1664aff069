use std::fs;
use std::net::IpAddr;
use std::path::Path;

use itertools::Itertools;
use log::info;

use manet_core::error::ResourceError;
use manet_core::node::NodeId;
use manet_models::net::routing::RoutingSnapshot;

fn address_of(addresses: &[IpAddr], node_id: NodeId) -> String {
    match addresses.get(node_id.as_usize()) {
        Some(address) => address.to_string(),
        None => node_id.to_string(),
    }
}

/// Text dump of every routing table, one block per node in node order.
pub fn render_routes(snapshot: &RoutingSnapshot, addresses: &[IpAddr]) -> String {
    let at = snapshot.at.as_secs_f64();
    snapshot
        .tables
        .iter()
        .map(|table| {
            let header = format!(
                "Node: {}; Time: +{}s; {} routing table",
                table.node_id, at, snapshot.protocol
            );
            let rows = table
                .routes
                .iter()
                .map(|row| {
                    let expires = row.expires.saturating_sub(snapshot.at).as_secs_f64();
                    format!(
                        "{:<40}{:<40}{:<8}{:<8}{:<10}{}",
                        address_of(addresses, row.destination),
                        address_of(addresses, row.next_hop),
                        "UP",
                        row.seq_no,
                        format!("{:.3}", expires),
                        row.hops
                    )
                })
                .join("\n");
            let columns = format!(
                "{:<40}{:<40}{:<8}{:<8}{:<10}{}",
                "Destination", "Gateway", "Flag", "SeqNo", "Expire", "Hops"
            );
            if rows.is_empty() {
                format!("{}\n{}\n", header, columns)
            } else {
                format!("{}\n{}\n{}\n", header, columns, rows)
            }
        })
        .join("\n")
}

pub fn write_routes(
    file_path: &Path,
    snapshot: &RoutingSnapshot,
    addresses: &[IpAddr],
) -> Result<(), ResourceError> {
    fs::write(file_path, render_routes(snapshot, addresses))
        .map_err(|e| ResourceError::write(file_path, e))?;
    info!(
        "Routing tables at {} ms written to {}",
        snapshot.at,
        file_path.display()
    );
    Ok(())
}
