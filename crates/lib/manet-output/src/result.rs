use std::fs;
use std::path::Path;

use arrow::datatypes::Schema;
use serde::Deserialize;

use manet_core::bucket::TimeMS;
use manet_core::error::ResourceError;

use crate::tables::position::PositionWriter;
use crate::tables::rx::RxTraceWriter;

#[derive(Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
pub enum OutputType {
    NodePositions,
    PacketRx,
}

#[derive(Deserialize, Debug, Clone)]
pub struct OutputSettings {
    pub output_path: String,
    pub output_interval: TimeMS,
    #[serde(default)]
    pub outputs: Vec<Outputs>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            output_path: "output".to_string(),
            output_interval: TimeMS::SECOND,
            outputs: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Outputs {
    pub output_type: OutputType,
    pub output_filename: String,
}

pub trait ResultWriter {
    fn schema() -> Schema;
    fn write_to_file(&mut self) -> Result<(), ResourceError>;
    fn close_file(self) -> Result<(), ResourceError>;
}

/// Optional tabular outputs of a run.
#[derive(Debug, Default)]
pub struct Results {
    pub positions: Option<PositionWriter>,
    pub rx_trace: Option<RxTraceWriter>,
}

impl Results {
    pub fn new(output_path: &Path, output_settings: &OutputSettings) -> Result<Self, ResourceError> {
        if output_settings.outputs.is_empty() {
            return Ok(Self::default());
        }
        if !output_path.exists() {
            fs::create_dir_all(output_path).map_err(|e| ResourceError::write(output_path, e))?;
        }

        let file_of = |output_type: OutputType| {
            output_settings
                .outputs
                .iter()
                .filter(|output| output.output_type == output_type)
                .last()
                .map(|settings| output_path.join(&settings.output_filename))
        };
        let positions = match file_of(OutputType::NodePositions) {
            Some(file) => Some(PositionWriter::new(&file)?),
            None => None,
        };
        let rx_trace = match file_of(OutputType::PacketRx) {
            Some(file) => Some(RxTraceWriter::new(&file)?),
            None => None,
        };
        Ok(Self {
            positions,
            rx_trace,
        })
    }

    pub fn write_to_file(&mut self) -> Result<(), ResourceError> {
        if let Some(writer) = &mut self.positions {
            writer.write_to_file()?;
        }
        if let Some(writer) = &mut self.rx_trace {
            writer.write_to_file()?;
        }
        Ok(())
    }

    pub fn close_files(self) -> Result<(), ResourceError> {
        if let Some(writer) = self.positions {
            writer.close_file()?;
        }
        if let Some(writer) = self.rx_trace {
            writer.close_file()?;
        }
        Ok(())
    }
}
