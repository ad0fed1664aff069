use std::path::Path;

use arrow::array::{Array, Float64Array, UInt64Array};
use arrow::record_batch::RecordBatch;

use manet_core::error::ConfigError;

fn malformed(file_path: &Path, row: usize, reason: String) -> ConfigError {
    ConfigError::MalformedTrace {
        path: file_path.to_path_buf(),
        line: row,
        reason,
    }
}

pub(crate) fn read_f64_column(
    col_name: &str,
    record_batch: &RecordBatch,
    file_path: &Path,
    first_row: usize,
) -> Result<Vec<f64>, ConfigError> {
    let column = record_batch
        .column_by_name(col_name)
        .ok_or_else(|| malformed(file_path, first_row, format!("missing column {}", col_name)))?;
    let values = column
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| {
            malformed(file_path, first_row, format!("column {} is not float64", col_name))
        })?;
    if values.null_count() > 0 {
        return Err(malformed(
            file_path,
            first_row,
            format!("column {} has null values", col_name),
        ));
    }
    Ok(values.values().to_vec())
}

pub(crate) fn read_u64_column(
    col_name: &str,
    record_batch: &RecordBatch,
    file_path: &Path,
    first_row: usize,
) -> Result<Vec<u64>, ConfigError> {
    let column = record_batch
        .column_by_name(col_name)
        .ok_or_else(|| malformed(file_path, first_row, format!("missing column {}", col_name)))?;
    let values = column
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| {
            malformed(file_path, first_row, format!("column {} is not uint64", col_name))
        })?;
    if values.null_count() > 0 {
        return Err(malformed(
            file_path,
            first_row,
            format!("column {} has null values", col_name),
        ));
    }
    Ok(values.values().to_vec())
}
