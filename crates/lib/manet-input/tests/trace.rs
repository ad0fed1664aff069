use std::fs::File;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, RecordBatch, UInt64Array};
use parquet::arrow::ArrowWriter;

use manet_core::bucket::TimeMS;
use manet_core::error::{ConfigError, ExperimentError};
use manet_input::trace::read_trace;
use manet_models::mobility::{Point2D, PositionProvider};

fn write_trace(path: &std::path::Path, time_step: Vec<u64>, node_id: Vec<u64>, x: Vec<f64>, y: Vec<f64>) {
    let record_batch = RecordBatch::try_from_iter(vec![
        ("time_step", Arc::new(UInt64Array::from(time_step)) as ArrayRef),
        ("node_id", Arc::new(UInt64Array::from(node_id)) as ArrayRef),
        ("x", Arc::new(Float64Array::from(x)) as ArrayRef),
        ("y", Arc::new(Float64Array::from(y)) as ArrayRef),
    ])
    .expect("valid batch");
    let file = File::create(path).expect("create trace");
    let mut writer = ArrowWriter::try_new(file, record_batch.schema(), None).expect("writer");
    writer.write(&record_batch).expect("write batch");
    writer.close().expect("close trace");
}

#[test]
fn test_parquet_trace_is_interpolated() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("positions.parquet");
    write_trace(
        &path,
        vec![0, 0, 1000, 1000, 0],
        vec![0, 1, 0, 1, 7],
        vec![0.0, 10.0, 100.0, 10.0, 3.0],
        vec![0.0, 10.0, 0.0, 30.0, 3.0],
    );
    let trajectories = read_trace(&path, None, 2).expect("valid trace");
    assert_eq!(trajectories.len(), 2);
    assert_eq!(
        trajectories[0].position_at(TimeMS::from(250u64)),
        Point2D::new(25.0, 0.0)
    );
    assert_eq!(
        trajectories[1].position_at(TimeMS::from(5000u64)),
        Point2D::new(10.0, 30.0)
    );
}

#[test]
fn test_parquet_trace_coverage() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("positions.parquet");
    write_trace(&path, vec![0], vec![0], vec![1.0], vec![1.0]);
    assert!(matches!(
        read_trace(&path, None, 2),
        Err(ExperimentError::Config(ConfigError::TraceCoverage { covered: 1, .. }))
    ));
}
