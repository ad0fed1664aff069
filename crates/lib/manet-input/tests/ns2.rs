use std::io::Write;

use manet_core::bucket::TimeMS;
use manet_core::error::{ConfigError, ExperimentError, ResourceError};
use manet_input::trace::read_trace;
use manet_models::mobility::{Point2D, PositionProvider, TraceFormat};
use tempfile::NamedTempFile;

const MOVEMENTS: &str = r#"$node_(0) set X_ 0.0
$node_(0) set Y_ 0.0
$node_(1) set X_ 100.0
$node_(1) set Y_ 50.0
$node_(2) set X_ 7.0
$node_(2) set Y_ 7.0
$ns_ at 1.0 "$node_(0) setdest 100.0 0.0 10.0"
$ns_ at 6.0 "$node_(0) setdest 50.0 0.0 10.0"
$ns_ at 3.0 "$node_(2) set Y_ 9.0"
"#;

fn trace_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write trace");
    file
}

#[test]
fn test_replays_setdest_with_interruption() {
    let file = trace_file(MOVEMENTS);
    let trajectories =
        read_trace(file.path(), Some(TraceFormat::Ns2), 3).expect("valid trace");
    assert_eq!(trajectories.len(), 3);

    let node0 = &trajectories[0];
    assert_eq!(node0.position_at(TimeMS::from(500u64)), Point2D::new(0.0, 0.0));
    assert_eq!(node0.position_at(TimeMS::from(3000u64)), Point2D::new(20.0, 0.0));
    // the second setdest starts from x = 50 at 6 s and turns around
    assert_eq!(node0.position_at(TimeMS::from(6000u64)), Point2D::new(50.0, 0.0));
    assert_eq!(node0.position_at(TimeMS::from(60_000u64)), Point2D::new(50.0, 0.0));

    let node1 = &trajectories[1];
    assert_eq!(node1.position_at(TimeMS::from(42_000u64)), Point2D::new(100.0, 50.0));

    let node2 = &trajectories[2];
    assert_eq!(node2.position_at(TimeMS::from(2999u64)), Point2D::new(7.0, 7.0));
    assert_eq!(node2.position_at(TimeMS::from(3000u64)), Point2D::new(7.0, 9.0));
}

#[test]
fn test_extra_nodes_are_ignored() {
    let file = trace_file(MOVEMENTS);
    let trajectories =
        read_trace(file.path(), Some(TraceFormat::Ns2), 2).expect("valid trace");
    assert_eq!(trajectories.len(), 2);
}

#[test]
fn test_missing_nodes_are_reported() {
    let file = trace_file(MOVEMENTS);
    match read_trace(file.path(), Some(TraceFormat::Ns2), 5) {
        Err(ExperimentError::Config(ConfigError::TraceCoverage {
            covered, requested, ..
        })) => {
            assert_eq!(covered, 3);
            assert_eq!(requested, 5);
        }
        other => panic!("expected a coverage error, got {:?}", other),
    }
}

#[test]
fn test_malformed_trace_names_the_line() {
    let file = trace_file("$node_(0) set X_ 1.0\n$ns_ at soon \"$node_(0) setdest 1 1 1\"\n");
    match read_trace(file.path(), Some(TraceFormat::Ns2), 1) {
        Err(ExperimentError::Config(ConfigError::MalformedTrace { line, .. })) => {
            assert_eq!(line, 2)
        }
        other => panic!("expected a malformed trace error, got {:?}", other),
    }
}

#[test]
fn test_missing_file_is_a_resource_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.ns_movements");
    assert!(matches!(
        read_trace(&missing, None, 1),
        Err(ExperimentError::Resource(ResourceError::MissingInput { .. }))
    ));
}
