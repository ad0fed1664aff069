use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, UInt32Array, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};

use manet_core::error::ResourceError;
use manet_models::traffic::packet::Packet;

use crate::result::ResultWriter;
use crate::writer::WriterType;

/// One row per packet that reached its sink node.
#[derive(Debug)]
pub struct RxTraceWriter {
    time_us: Vec<u64>,
    packet_id: Vec<u64>,
    flow_id: Vec<u32>,
    source: Vec<u32>,
    sink: Vec<u32>,
    size: Vec<u32>,
    delay_us: Vec<u64>,
    hops: Vec<u32>,
    to_output: WriterType,
}

impl RxTraceWriter {
    pub fn new(output_file: &Path) -> Result<Self, ResourceError> {
        Ok(Self {
            to_output: WriterType::new(output_file, Self::schema())?,
            time_us: Vec::new(),
            packet_id: Vec::new(),
            flow_id: Vec::new(),
            source: Vec::new(),
            sink: Vec::new(),
            size: Vec::new(),
            delay_us: Vec::new(),
            hops: Vec::new(),
        })
    }

    pub fn add_data(&mut self, packet: &Packet, arrival_us: u64, hops: u32) {
        self.time_us.push(arrival_us);
        self.packet_id.push(packet.packet_id.0);
        self.flow_id.push(packet.flow_id.0);
        self.source.push(packet.source.as_u32());
        self.sink.push(packet.sink().as_u32());
        self.size.push(packet.size);
        self.delay_us.push(arrival_us.saturating_sub(packet.sent_us));
        self.hops.push(hops);
    }
}

impl ResultWriter for RxTraceWriter {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("time_us", DataType::UInt64, false),
            Field::new("packet_id", DataType::UInt64, false),
            Field::new("flow_id", DataType::UInt32, false),
            Field::new("source", DataType::UInt32, false),
            Field::new("sink", DataType::UInt32, false),
            Field::new("size", DataType::UInt32, false),
            Field::new("delay_us", DataType::UInt64, false),
            Field::new("hops", DataType::UInt32, false),
        ])
    }

    fn write_to_file(&mut self) -> Result<(), ResourceError> {
        if self.time_us.is_empty() {
            return Ok(());
        }
        let record_batch = RecordBatch::try_from_iter(vec![
            (
                "time_us",
                Arc::new(UInt64Array::from(std::mem::take(&mut self.time_us))) as ArrayRef,
            ),
            (
                "packet_id",
                Arc::new(UInt64Array::from(std::mem::take(&mut self.packet_id))) as ArrayRef,
            ),
            (
                "flow_id",
                Arc::new(UInt32Array::from(std::mem::take(&mut self.flow_id))) as ArrayRef,
            ),
            (
                "source",
                Arc::new(UInt32Array::from(std::mem::take(&mut self.source))) as ArrayRef,
            ),
            (
                "sink",
                Arc::new(UInt32Array::from(std::mem::take(&mut self.sink))) as ArrayRef,
            ),
            (
                "size",
                Arc::new(UInt32Array::from(std::mem::take(&mut self.size))) as ArrayRef,
            ),
            (
                "delay_us",
                Arc::new(UInt64Array::from(std::mem::take(&mut self.delay_us))) as ArrayRef,
            ),
            (
                "hops",
                Arc::new(UInt32Array::from(std::mem::take(&mut self.hops))) as ArrayRef,
            ),
        ])
        .map_err(|e| ResourceError::output("receive trace", e))?;
        self.to_output.record_batch_to_file(&record_batch)
    }

    fn close_file(mut self) -> Result<(), ResourceError> {
        self.write_to_file()?;
        self.to_output.close()
    }
}
