use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use manet_core::bucket::TimeMS;
use manet_core::error::{ConfigError, ExperimentError, ResourceError};
use manet_models::dist::DistParams;
use manet_models::mobility::FieldSettings;
use manet_output::logger::LogSettings;

fn default_seed() -> u64 {
    1
}

#[derive(Deserialize, Debug, Clone)]
pub struct TraceSettings {
    pub node_count: u32,
    pub duration: TimeMS,
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub output_file: PathBuf,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MovementSettings {
    pub min_speed: f64,
    pub max_speed: f64,
    pub pause: DistParams,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub trace_settings: TraceSettings,
    #[serde(default)]
    pub field_settings: FieldSettings,
    pub movement_settings: MovementSettings,
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Config {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.trace_settings.node_count == 0 {
            return Err(ConfigError::InvalidNodeCount(0));
        }
        if config.trace_settings.duration.as_u64() == 0 {
            return Err(ConfigError::invalid("duration", "> 0", config.trace_settings.duration));
        }
        Ok(config)
    }
}

pub fn read_config(file_path: &Path) -> Result<Config, ExperimentError> {
    if !file_path.exists() {
        return Err(ResourceError::MissingInput {
            path: file_path.to_path_buf(),
        }
        .into());
    }
    let content = fs::read_to_string(file_path).map_err(|e| ResourceError::read(file_path, e))?;
    Ok(Config::parse(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[trace_settings]
node_count = 5
duration = 30000
output_file = "movements.tcl"

[field_settings]
width = 500.0
height = 400.0

[movement_settings]
min_speed = 1.0
max_speed = 5.0

[movement_settings.pause]
dist_name = "constant"
value = 2.0
"#;

    #[test]
    fn reads_every_section() {
        let config = Config::parse(CONFIG).expect("valid config");
        assert_eq!(config.trace_settings.node_count, 5);
        assert_eq!(config.trace_settings.seed, 1);
        assert_eq!(config.trace_settings.duration, TimeMS::from(30000u64));
        assert_eq!(config.field_settings.width, 500.0);
        assert_eq!(config.movement_settings.max_speed, 5.0);
        assert_eq!(config.log_settings.log_level, "info");
    }

    #[test]
    fn zero_nodes_are_rejected() {
        let content = CONFIG.replace("node_count = 5", "node_count = 0");
        assert!(matches!(
            Config::parse(&content),
            Err(ConfigError::InvalidNodeCount(0))
        ));
    }

    #[test]
    fn missing_file_is_a_resource_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = read_config(&dir.path().join("absent.toml"));
        assert!(matches!(
            result,
            Err(ExperimentError::Resource(ResourceError::MissingInput { .. }))
        ));
    }
}
