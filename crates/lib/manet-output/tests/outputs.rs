use std::fs::File;
use std::net::{IpAddr, Ipv4Addr};

use parquet::file::reader::{FileReader, SerializedFileReader};

use manet_core::bucket::TimeMS;
use manet_input::ns2::read_ns2_trace;
use manet_models::mobility::path::WaypointPath;
use manet_models::mobility::{Point2D, PositionProvider, Trajectory};
use manet_models::net::routing::{NodeRoutes, RouteRow, RoutingKind, RoutingSnapshot};
use manet_output::capture::{FrameCapture, FrameRecord};
use manet_output::ns2::{render_movements, write_movements};
use manet_output::result::{OutputSettings, OutputType, Outputs, Results};
use manet_output::routes::render_routes;

#[test]
fn routing_dump_uses_node_addresses() {
    let snapshot = RoutingSnapshot {
        at: TimeMS::from(2_000u64),
        protocol: RoutingKind::Aodv,
        tables: vec![
            NodeRoutes {
                node_id: 0u32.into(),
                routes: vec![RouteRow {
                    destination: 2u32.into(),
                    next_hop: 1u32.into(),
                    hops: 2,
                    seq_no: 4,
                    expires: TimeMS::from(5_000u64),
                }],
            },
            NodeRoutes {
                node_id: 1u32.into(),
                routes: Vec::new(),
            },
        ],
    };
    let addresses: Vec<IpAddr> = (1..=3)
        .map(|host| IpAddr::V4(Ipv4Addr::new(10, 0, 0, host)))
        .collect();

    let dump = render_routes(&snapshot, &addresses);
    assert!(dump.contains("Node: 0; Time: +2s; AODV routing table"));
    assert!(dump.contains("Node: 1; Time: +2s; AODV routing table"));
    let row = dump
        .lines()
        .find(|line| line.starts_with("10.0.0.3"))
        .expect("route row");
    assert!(row.contains("10.0.0.2"));
    assert!(row.contains("3.000"));
    assert!(row.trim_end().ends_with('2'));
}

#[test]
fn frames_are_captured_as_csv() {
    let dir = tempfile::tempdir().expect("temp dir");
    let prefix = dir.path().join("aodv");
    let mut capture = FrameCapture::new(&prefix).expect("capture opens");
    for packet_id in 0..2 {
        capture
            .capture(&FrameRecord {
                time_us: 20_000_000,
                packet_id,
                flow_id: 1,
                sender: 80,
                receiver: 79,
                size: 552,
                lost: packet_id == 1,
            })
            .expect("frame captured");
    }
    assert_eq!(capture.frames(), 2);
    capture.finish().expect("capture closed");

    let content =
        std::fs::read_to_string(dir.path().join("aodv.frames.csv")).expect("capture file");
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "time_us,packet_id,flow_id,sender,receiver,size,lost");
    assert_eq!(lines[1], "20000000,0,1,80,79,552,false");
    assert_eq!(lines[2], "20000000,1,1,80,79,552,true");
}

#[test]
fn movements_replay_through_the_trace_reader() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut moving = WaypointPath::new(Point2D::new(0.0, 0.0));
    moving.push(10_000.0, Point2D::new(100.0, 0.0));
    moving.push(12_000.0, Point2D::new(100.0, 0.0));
    moving.push(17_000.0, Point2D::new(100.0, 50.0));
    let resting = WaypointPath::new(Point2D::new(30.0, 40.0));

    let paths = vec![moving, resting];
    let content = render_movements(&paths);
    assert!(content.contains("$node_(1) set Y_ 40.000000"));
    assert!(content.contains("$ns_ at 0.000000 \"$node_(0) setdest 100.000000 0.000000 10.000000\""));
    assert!(content.contains("$ns_ at 12.000000 \"$node_(0) setdest 100.000000 50.000000 10.000000\""));

    let path = dir.path().join("movements.ns_movements");
    write_movements(&path, &paths).expect("trace written");
    let trajectories = read_ns2_trace(&path, 2).expect("trace readable");
    let at = |trajectory: &Trajectory, ms: u64| trajectory.position_at(TimeMS::from(ms));
    assert_eq!(at(&trajectories[0], 5_000), Point2D::new(50.0, 0.0));
    assert_eq!(at(&trajectories[0], 11_000), Point2D::new(100.0, 0.0));
    assert_eq!(at(&trajectories[0], 20_000), Point2D::new(100.0, 50.0));
    assert_eq!(at(&trajectories[1], 20_000), Point2D::new(30.0, 40.0));
}

#[test]
fn movements_are_one_command_per_line() {
    let mut path = WaypointPath::new(Point2D::new(1.0, 2.0));
    path.push(2_000.0, Point2D::new(1.0, 22.0));
    let content = render_movements(&[path]);
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines,
        vec![
            "$node_(0) set X_ 1.000000",
            "$node_(0) set Y_ 2.000000",
            "$node_(0) set Z_ 0.000000",
            "$ns_ at 0.000000 \"$node_(0) setdest 1.000000 22.000000 10.000000\"",
        ]
    );
    assert!(content.ends_with('\n'));
    assert!(render_movements(&[]).is_empty());
}

#[test]
fn position_table_is_written_as_parquet() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = OutputSettings {
        output_path: "output".to_string(),
        output_interval: TimeMS::SECOND,
        outputs: vec![Outputs {
            output_type: OutputType::NodePositions,
            output_filename: "positions.parquet".to_string(),
        }],
    };
    let mut results = Results::new(dir.path(), &settings).expect("results open");
    assert!(results.rx_trace.is_none());
    let writer = results.positions.as_mut().expect("position writer");
    for step in 0..3u64 {
        writer.add_data(TimeMS::from(step * 1000), 0u32.into(), &Point2D::new(1.0, 2.0));
        writer.add_data(TimeMS::from(step * 1000), 1u32.into(), &Point2D::new(3.0, 4.0));
    }
    results.write_to_file().expect("batch written");
    results.close_files().expect("files closed");

    let file = File::open(dir.path().join("positions.parquet")).expect("parquet file");
    let reader = SerializedFileReader::new(file).expect("parquet reader");
    assert_eq!(reader.metadata().file_metadata().num_rows(), 6);
}

#[test]
fn unknown_table_extension_is_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = OutputSettings {
        output_path: "output".to_string(),
        output_interval: TimeMS::SECOND,
        outputs: vec![Outputs {
            output_type: OutputType::PacketRx,
            output_filename: "rx.json".to_string(),
        }],
    };
    assert!(Results::new(dir.path(), &settings).is_err());
}
