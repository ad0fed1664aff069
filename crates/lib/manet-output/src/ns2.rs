use std::fs;
use std::path::Path;

use log::info;

use manet_core::error::ResourceError;
use manet_models::mobility::path::WaypointPath;

/// Renders node paths as an ns-2 movement trace. Each path starts with the initial
/// coordinates followed by one `setdest` per leg; pauses are implied by the gap between legs.
pub fn render_movements(paths: &[WaypointPath]) -> String {
    let mut content = String::new();
    for (node, path) in paths.iter().enumerate() {
        if let Some(first) = path.waypoints().first() {
            content.push_str(&format!("$node_({}) set X_ {:.6}\n", node, first.pos.x));
            content.push_str(&format!("$node_({}) set Y_ {:.6}\n", node, first.pos.y));
            content.push_str(&format!("$node_({}) set Z_ 0.000000\n", node));
        }
    }
    for (node, path) in paths.iter().enumerate() {
        for leg in path.waypoints().windows(2) {
            let (from, to) = (leg[0], leg[1]);
            let distance = from.pos.distance(&to.pos);
            let travel_s = (to.at - from.at) / 1000.0;
            if distance <= 0.0 || travel_s <= 0.0 {
                continue;
            }
            content.push_str(&format!(
                "$ns_ at {:.6} \"$node_({}) setdest {:.6} {:.6} {:.6}\"\n",
                from.at / 1000.0,
                node,
                to.pos.x,
                to.pos.y,
                distance / travel_s
            ));
        }
    }
    content
}

pub fn write_movements(file_path: &Path, paths: &[WaypointPath]) -> Result<(), ResourceError> {
    fs::write(file_path, render_movements(paths))
        .map_err(|e| ResourceError::write(file_path, e))?;
    info!(
        "Movements of {} nodes written to {}",
        paths.len(),
        file_path.display()
    );
    Ok(())
}
