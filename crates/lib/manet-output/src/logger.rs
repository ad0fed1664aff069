use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::LevelFilter;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use serde::Deserialize;

use manet_core::error::ResourceError;

#[derive(Deserialize, Debug, Clone)]
pub struct LogSettings {
    pub log_path: String,
    pub log_level: String,
    pub log_file_name: String,
    pub log_overwrite: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            log_path: "output".to_string(),
            log_level: "info".to_string(),
            log_file_name: "manet.log".to_string(),
            log_overwrite: true,
        }
    }
}

pub fn setup_logging(log_level: &str, log_file_path: &Path) -> Result<Config, ResourceError> {
    let log_level = get_logging_level(log_level);
    let log_file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y.%m.%d %H:%M:%S)} | {({l}):5.5} | {({f}:{L}):>40.40} | {m}{n}",
        )))
        .build(log_file_path)
        .map_err(|e| ResourceError::write(log_file_path, e))?;

    Config::builder()
        .appender(Appender::builder().build("x", Box::new(log_file)))
        .build(Root::builder().appender("x").build(log_level))
        .map_err(|e| ResourceError::output(log_file_path, e))
}

fn get_logging_level(log_level: &str) -> LevelFilter {
    match log_level {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Resolves the log file, creating the log directory. An existing log file is removed when
/// `log_overwrite` is set and kept otherwise, the new log getting a timestamped name.
pub fn log_file_path(config_dir: &Path, log_settings: &LogSettings) -> Result<PathBuf, ResourceError> {
    let log_path = config_dir.join(&log_settings.log_path).join("logs");
    if !log_path.exists() {
        fs::create_dir_all(&log_path).map_err(|e| ResourceError::write(&log_path, e))?;
    }

    let log_file_path = log_path.join(&log_settings.log_file_name);
    if !log_file_path.exists() {
        return Ok(log_file_path);
    }
    if log_settings.log_overwrite {
        fs::remove_file(&log_file_path).map_err(|e| ResourceError::write(&log_file_path, e))?;
        return Ok(log_file_path);
    }

    let time_stamp = Utc::now().format("_%d%m%Y_%H%M%S").to_string();
    let stem = log_settings
        .log_file_name
        .split('.')
        .next()
        .unwrap_or("manet");
    Ok(log_path.join(format!("{}{}.log", stem, time_stamp)))
}

pub fn initiate_logger(config_dir: &Path, log_settings: &LogSettings) -> Result<PathBuf, ResourceError> {
    let log_file_path = log_file_path(config_dir, log_settings)?;
    let logger_config = setup_logging(&log_settings.log_level, &log_file_path)?;
    log4rs::init_config(logger_config).map_err(|e| ResourceError::output(&log_file_path, e))?;
    Ok(log_file_path)
}
