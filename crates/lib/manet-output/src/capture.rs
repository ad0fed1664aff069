use std::fs::File;
use std::path::{Path, PathBuf};

use csv::Writer;
use log::debug;
use serde::Serialize;

use manet_core::error::ResourceError;

/// One frame sent over one hop.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct FrameRecord {
    pub time_us: u64,
    pub packet_id: u64,
    pub flow_id: u32,
    pub sender: u32,
    pub receiver: u32,
    pub size: u32,
    pub lost: bool,
}

/// Frame capture written to `<prefix>.frames.csv`.
pub struct FrameCapture {
    file_path: PathBuf,
    writer: Writer<File>,
    frames: u64,
}

impl FrameCapture {
    pub fn file_for(prefix: &Path) -> PathBuf {
        PathBuf::from(format!("{}.frames.csv", prefix.display()))
    }

    pub fn new(prefix: &Path) -> Result<Self, ResourceError> {
        let file_path = Self::file_for(prefix);
        let writer =
            Writer::from_path(&file_path).map_err(|e| ResourceError::output(&file_path, e))?;
        debug!("Capturing frames to {}", file_path.display());
        Ok(Self {
            file_path,
            writer,
            frames: 0,
        })
    }

    pub fn capture(&mut self, record: &FrameRecord) -> Result<(), ResourceError> {
        self.frames += 1;
        self.writer
            .serialize(record)
            .map_err(|e| ResourceError::output(&self.file_path, e))
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn finish(mut self) -> Result<(), ResourceError> {
        self.writer
            .flush()
            .map_err(|e| ResourceError::write(&self.file_path, e))?;
        debug!("Captured {} frames", self.frames);
        Ok(())
    }
}
