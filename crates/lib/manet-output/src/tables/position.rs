use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, RecordBatch, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};

use manet_core::bucket::TimeMS;
use manet_core::error::ResourceError;
use manet_core::node::NodeId;
use manet_models::mobility::Point2D;

use crate::result::ResultWriter;
use crate::writer::WriterType;

#[derive(Debug)]
pub struct PositionWriter {
    time_step: Vec<u64>,
    node_id: Vec<u64>,
    x: Vec<f64>,
    y: Vec<f64>,
    to_output: WriterType,
}

impl PositionWriter {
    pub fn new(output_file: &Path) -> Result<Self, ResourceError> {
        Ok(Self {
            to_output: WriterType::new(output_file, Self::schema())?,
            time_step: Vec::new(),
            node_id: Vec::new(),
            x: Vec::new(),
            y: Vec::new(),
        })
    }

    pub fn add_data(&mut self, time_step: TimeMS, node_id: NodeId, position: &Point2D) {
        self.time_step.push(time_step.as_u64());
        self.node_id.push(node_id.as_u64());
        self.x.push(position.x);
        self.y.push(position.y);
    }
}

impl ResultWriter for PositionWriter {
    fn schema() -> Schema {
        let time_ms = Field::new("time_step", DataType::UInt64, false);
        let node_id = Field::new("node_id", DataType::UInt64, false);
        let x = Field::new("x", DataType::Float64, false);
        let y = Field::new("y", DataType::Float64, false);
        Schema::new(vec![time_ms, node_id, x, y])
    }

    fn write_to_file(&mut self) -> Result<(), ResourceError> {
        if self.time_step.is_empty() {
            return Ok(());
        }
        let record_batch = RecordBatch::try_from_iter(vec![
            (
                "time_step",
                Arc::new(UInt64Array::from(std::mem::take(&mut self.time_step))) as ArrayRef,
            ),
            (
                "node_id",
                Arc::new(UInt64Array::from(std::mem::take(&mut self.node_id))) as ArrayRef,
            ),
            (
                "x",
                Arc::new(Float64Array::from(std::mem::take(&mut self.x))) as ArrayRef,
            ),
            (
                "y",
                Arc::new(Float64Array::from(std::mem::take(&mut self.y))) as ArrayRef,
            ),
        ])
        .map_err(|e| ResourceError::output("positions", e))?;
        self.to_output.record_batch_to_file(&record_batch)
    }

    fn close_file(mut self) -> Result<(), ResourceError> {
        self.write_to_file()?;
        self.to_output.close()
    }
}
