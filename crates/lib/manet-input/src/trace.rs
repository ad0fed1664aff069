use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use typed_builder::TypedBuilder;

use manet_core::error::{ConfigError, ExperimentError, ResourceError};
use manet_models::mobility::path::WaypointPath;
use manet_models::mobility::{Point2D, TraceFormat, Trajectory};

use crate::batch::{read_f64_column, read_u64_column};
use crate::columns::{COORD_X, COORD_Y, NODE_ID, TIME_STEP};
use crate::ns2::read_ns2_trace;

/// Reads a position table `(time_step, node_id, x, y)` from a parquet file. Positions
/// between two samples of a node are interpolated linearly.
#[derive(Clone, Debug, TypedBuilder)]
pub struct TraceReader {
    file_path: PathBuf,
    node_count: u32,
}

impl TraceReader {
    fn malformed(&self, row: usize, reason: impl ToString) -> ConfigError {
        ConfigError::MalformedTrace {
            path: self.file_path.clone(),
            line: row,
            reason: reason.to_string(),
        }
    }

    pub fn fetch_trajectories(&self) -> Result<Vec<Trajectory>, ExperimentError> {
        if !self.file_path.exists() {
            return Err(ResourceError::MissingInput {
                path: self.file_path.clone(),
            }
            .into());
        }
        let trace_file =
            File::open(&self.file_path).map_err(|e| ResourceError::read(&self.file_path, e))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(trace_file)
            .and_then(|builder| builder.build())
            .map_err(|e| self.malformed(0, e))?;

        let mut samples: BTreeMap<u32, Vec<(u64, Point2D)>> = BTreeMap::new();
        let mut rows_read = 0;
        for record_batch in reader {
            let record_batch = record_batch.map_err(|e| self.malformed(rows_read, e))?;
            let time_steps = read_u64_column(TIME_STEP, &record_batch, &self.file_path, rows_read)?;
            let node_ids = read_u64_column(NODE_ID, &record_batch, &self.file_path, rows_read)?;
            let x_positions = read_f64_column(COORD_X, &record_batch, &self.file_path, rows_read)?;
            let y_positions = read_f64_column(COORD_Y, &record_batch, &self.file_path, rows_read)?;

            for i in 0..record_batch.num_rows() {
                let row = rows_read + i;
                let position = Point2D::new(x_positions[i], y_positions[i]);
                if !position.is_finite() {
                    return Err(self.malformed(row, "position is not finite").into());
                }
                if node_ids[i] >= self.node_count as u64 {
                    continue;
                }
                samples
                    .entry(node_ids[i] as u32)
                    .or_default()
                    .push((time_steps[i], position));
            }
            rows_read += record_batch.num_rows();
        }
        debug!("Read {} trace rows", rows_read);

        if samples.len() < self.node_count as usize {
            return Err(ConfigError::TraceCoverage {
                path: self.file_path.clone(),
                covered: samples.len(),
                requested: self.node_count,
            }
            .into());
        }
        let trajectories = samples
            .into_values()
            .map(|mut node_samples| {
                node_samples.sort_by_key(|(time_step, _)| *time_step);
                let mut path = WaypointPath::new(node_samples[0].1);
                for (time_step, position) in node_samples.into_iter() {
                    path.push(time_step as f64, position);
                }
                Trajectory::Waypoints(path)
            })
            .collect();
        Ok(trajectories)
    }
}

/// Reads a mobility trace in the given format, inferred from the extension when absent.
pub fn read_trace(
    file_path: &Path,
    format: Option<TraceFormat>,
    node_count: u32,
) -> Result<Vec<Trajectory>, ExperimentError> {
    let format = format.unwrap_or_else(|| TraceFormat::from_path(file_path));
    info!("Reading {:?} trace {}", format, file_path.display());
    match format {
        TraceFormat::Ns2 => read_ns2_trace(file_path, node_count),
        TraceFormat::Parquet => TraceReader::builder()
            .file_path(file_path.to_path_buf())
            .node_count(node_count)
            .build()
            .fetch_trajectories(),
    }
}
