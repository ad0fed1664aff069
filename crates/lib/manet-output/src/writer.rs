use std::fs::File;
use std::path::Path;

use arrow::csv::Writer;
use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchWriter};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use manet_core::error::ResourceError;

/// Tabular output, parquet or csv depending on the file extension.
#[derive(Debug)]
pub enum WriterType {
    Parquet(WriterParquet),
    Csv(WriterCsv),
}

impl WriterType {
    pub fn new(file_name: &Path, schema: Schema) -> Result<Self, ResourceError> {
        if file_name.exists() {
            std::fs::remove_file(file_name).map_err(|e| ResourceError::write(file_name, e))?;
        }
        match file_name.extension().and_then(|ext| ext.to_str()) {
            Some("parquet") => Ok(WriterType::Parquet(WriterParquet::new(file_name, schema)?)),
            Some("csv") => Ok(WriterType::Csv(WriterCsv::new(file_name)?)),
            _ => Err(ResourceError::output(
                file_name,
                "file extension must be parquet or csv",
            )),
        }
    }

    pub fn record_batch_to_file(&mut self, record_batch: &RecordBatch) -> Result<(), ResourceError> {
        match self {
            WriterType::Parquet(to_output) => to_output
                .writer
                .write(record_batch)
                .map_err(|e| ResourceError::output(&to_output.file_name, e)),
            WriterType::Csv(to_output) => to_output
                .writer
                .write(record_batch)
                .map_err(|e| ResourceError::output(&to_output.file_name, e)),
        }
    }

    pub fn close(self) -> Result<(), ResourceError> {
        match self {
            WriterType::Parquet(to_output) => to_output.close(),
            WriterType::Csv(to_output) => to_output.close(),
        }
    }
}

#[derive(Debug)]
pub struct WriterParquet {
    file_name: std::path::PathBuf,
    pub writer: ArrowWriter<File>,
}

impl WriterParquet {
    fn new(file_name: &Path, schema: Schema) -> Result<Self, ResourceError> {
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let output_file = File::create(file_name).map_err(|e| ResourceError::write(file_name, e))?;
        let writer = ArrowWriter::try_new(output_file, SchemaRef::from(schema), Some(props))
            .map_err(|e| ResourceError::output(file_name, e))?;
        Ok(Self {
            file_name: file_name.to_path_buf(),
            writer,
        })
    }

    pub fn close(self) -> Result<(), ResourceError> {
        let file_name = self.file_name;
        self.writer
            .close()
            .map(|_| ())
            .map_err(|e| ResourceError::output(&file_name, e))
    }
}

#[derive(Debug)]
pub struct WriterCsv {
    file_name: std::path::PathBuf,
    pub writer: Writer<File>,
}

impl WriterCsv {
    fn new(file_name: &Path) -> Result<Self, ResourceError> {
        let output_file = File::create(file_name).map_err(|e| ResourceError::write(file_name, e))?;
        Ok(Self {
            file_name: file_name.to_path_buf(),
            writer: Writer::new(output_file),
        })
    }

    pub fn close(self) -> Result<(), ResourceError> {
        let file_name = self.file_name;
        self.writer
            .close()
            .map_err(|e| ResourceError::output(&file_name, e))
    }
}
