use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;
use serde::Deserialize;

use manet_core::bucket::TimeMS;
use manet_core::error::{ConfigError, ExperimentError, ResourceError};
use manet_models::mobility::{FieldSettings, MobilitySettings};
use manet_models::monitor::MonitorSettings;
use manet_models::net::address::AddressPrefix;
use manet_models::net::aodv::AodvSettings;
use manet_models::net::channel::ChannelSettings;
use manet_models::net::routing::RoutingKind;
use manet_models::traffic::flow::{plan_flows, FlowDescriptor, FlowSettings};
use manet_output::logger::LogSettings;
use manet_output::result::OutputSettings;

const DEFAULT_IPV4_PREFIX: &str = "10.0.0.0/8";
const DEFAULT_IPV6_PREFIX: &str = "2001:1::/64";
const DEFAULT_CAPTURE_PREFIX: &str = "manet";

fn default_scenario() -> String {
    "manet".to_string()
}

fn default_step_size() -> TimeMS {
    TimeMS::from(10u64)
}

fn default_seed() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_name_prefix() -> String {
    "node-".to_string()
}

fn default_print_routes_at() -> TimeMS {
    TimeMS::from(8000u64)
}

fn default_routes_file() -> String {
    "routes.txt".to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct BaseConfig {
    pub simulation_settings: SimSettings,
    #[serde(default)]
    pub field_settings: FieldSettings,
    pub node_settings: NodeSettings,
    #[serde(default)]
    pub link_settings: LinkSettings,
    #[serde(default)]
    pub routing_settings: RoutingSettings,
    #[serde(default)]
    pub monitor_settings: MonitorSettings,
    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub output_settings: OutputSettings,
    #[serde(default)]
    pub flows: Vec<FlowSettings>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SimSettings {
    #[serde(default = "default_scenario")]
    pub scenario: String,
    pub duration: TimeMS,
    #[serde(default = "default_step_size")]
    pub step_size: TimeMS,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_true")]
    pub traffic_enabled: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NodeSettings {
    pub node_count: u32,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    #[serde(default)]
    pub mobility: MobilitySettings,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct LinkSettings {
    /// Defaults to `10.0.0.0/8` for IPv4 routing and `2001:1::/64` for IPv6 routing.
    pub prefix: Option<AddressPrefix>,
    #[serde(default)]
    pub channel: ChannelSettings,
    /// Frames are captured to `<capture_prefix>.frames.csv` when set.
    pub capture_prefix: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RoutingSettings {
    #[serde(default)]
    pub protocol: RoutingKind,
    #[serde(default)]
    pub aodv: AodvSettings,
    #[serde(default)]
    pub print_routes: bool,
    #[serde(default = "default_print_routes_at")]
    pub print_routes_at: TimeMS,
    #[serde(default = "default_routes_file")]
    pub routes_file: String,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            protocol: RoutingKind::default(),
            aodv: AodvSettings::default(),
            print_routes: false,
            print_routes_at: default_print_routes_at(),
            routes_file: default_routes_file(),
        }
    }
}

/// A `key=value` override given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub key: String,
    pub value: String,
}

impl FromStr for Override {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Ok(Self {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => Err(ConfigError::InvalidOverride {
                key: s.to_string(),
                value: String::new(),
            }),
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::InvalidOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl BaseConfig {
    pub fn apply(&mut self, item: &Override) -> Result<(), ConfigError> {
        let (key, value) = (item.key.as_str(), item.value.as_str());
        debug!("Applying override {}={}", key, value);
        match key {
            "node_count" => self.node_settings.node_count = parse_value(key, value)?,
            "total_time" => {
                let seconds: f64 = parse_value(key, value)?;
                if !(seconds.is_finite() && seconds >= 0.0) {
                    return Err(ConfigError::InvalidOverride {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
                self.simulation_settings.duration = TimeMS::from_secs_f64(seconds);
            }
            "duration" => self.simulation_settings.duration = parse_value(key, value)?,
            "seed" => self.simulation_settings.seed = parse_value(key, value)?,
            "traffic" => self.simulation_settings.traffic_enabled = parse_value(key, value)?,
            "pcap" => {
                let enabled: bool = parse_value(key, value)?;
                self.link_settings.capture_prefix = match enabled {
                    true => Some(
                        self.link_settings
                            .capture_prefix
                            .clone()
                            .unwrap_or_else(|| DEFAULT_CAPTURE_PREFIX.to_string()),
                    ),
                    false => None,
                };
            }
            "print_routes" => self.routing_settings.print_routes = parse_value(key, value)?,
            "trace_file" => {
                self.node_settings.mobility = MobilitySettings::TraceReplay {
                    trace_file: PathBuf::from(value),
                    trace_format: None,
                }
            }
            "report_file" => self.monitor_settings.report_file = value.to_string(),
            "grid_step" => {
                let step: f64 = parse_value(key, value)?;
                match &mut self.node_settings.mobility {
                    MobilitySettings::StaticGrid { delta_x, .. } => *delta_x = step,
                    _ => {
                        return Err(ConfigError::InvalidOverride {
                            key: key.to_string(),
                            value: format!("{} (mobility is not a static grid)", value),
                        })
                    }
                }
            }
            "routing" => self.routing_settings.protocol = RoutingKind::from_str(value)?,
            _ => return Err(ConfigError::UnknownOverride(key.to_string())),
        }
        Ok(())
    }
}

/// Validated and immutable experiment configuration.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    base: BaseConfig,
    config_dir: PathBuf,
    prefix: AddressPrefix,
    flows: Vec<FlowDescriptor>,
}

impl ExperimentConfig {
    pub fn from_file(file_path: &Path, overrides: &[Override]) -> Result<Self, ExperimentError> {
        if !file_path.exists() {
            return Err(ResourceError::MissingInput {
                path: file_path.to_path_buf(),
            }
            .into());
        }
        let content =
            fs::read_to_string(file_path).map_err(|e| ResourceError::read(file_path, e))?;
        let config_dir = file_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self::parse(&content, &config_dir, overrides)?)
    }

    /// Parses a TOML configuration. Relative paths are resolved against `config_dir`.
    pub fn parse(
        content: &str,
        config_dir: &Path,
        overrides: &[Override],
    ) -> Result<Self, ConfigError> {
        let mut base: BaseConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        for item in overrides.iter() {
            base.apply(item)?;
        }
        Self::validate(base, config_dir)
    }

    fn validate(base: BaseConfig, config_dir: &Path) -> Result<Self, ConfigError> {
        let node_count = base.node_settings.node_count;
        if node_count == 0 {
            return Err(ConfigError::InvalidNodeCount(node_count));
        }
        let sim = &base.simulation_settings;
        if sim.duration.as_u64() == 0 {
            return Err(ConfigError::invalid("duration", "> 0", sim.duration));
        }
        if sim.step_size.as_u64() == 0 {
            return Err(ConfigError::invalid("step_size", "> 0", sim.step_size));
        }
        if !sim.duration.is_multiple_of(sim.step_size) {
            return Err(ConfigError::invalid(
                "step_size",
                "a divisor of duration",
                sim.step_size,
            ));
        }
        let routing = &base.routing_settings;
        if routing.print_routes && routing.print_routes_at > sim.duration {
            return Err(ConfigError::invalid(
                "print_routes_at",
                "<= duration",
                routing.print_routes_at,
            ));
        }
        if base.output_settings.output_interval.as_u64() == 0 {
            return Err(ConfigError::invalid(
                "output_interval",
                "> 0",
                base.output_settings.output_interval,
            ));
        }
        base.field_settings.validate()?;
        base.link_settings.channel.validate()?;
        base.monitor_settings.validate()?;

        let prefix = match base.link_settings.prefix {
            Some(prefix) => prefix,
            None => match base.routing_settings.protocol {
                RoutingKind::Aodv => AddressPrefix::from_str(DEFAULT_IPV4_PREFIX)?,
                RoutingKind::Aodv6 => AddressPrefix::from_str(DEFAULT_IPV6_PREFIX)?,
            },
        };
        let flows = match sim.traffic_enabled {
            true => plan_flows(&base.flows, node_count, sim.duration)?,
            false => Vec::new(),
        };

        Ok(Self {
            base,
            config_dir: config_dir.to_path_buf(),
            prefix,
            flows,
        })
    }

    pub fn base(&self) -> &BaseConfig {
        &self.base
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn node_count(&self) -> u32 {
        self.base.node_settings.node_count
    }

    pub fn duration(&self) -> TimeMS {
        self.base.simulation_settings.duration
    }

    pub fn step_size(&self) -> TimeMS {
        self.base.simulation_settings.step_size
    }

    pub fn seed(&self) -> u64 {
        self.base.simulation_settings.seed
    }

    pub fn traffic_enabled(&self) -> bool {
        self.base.simulation_settings.traffic_enabled
    }

    pub fn prefix(&self) -> AddressPrefix {
        self.prefix
    }

    pub fn flows(&self) -> &[FlowDescriptor] {
        &self.flows
    }

    pub fn print_routes_at(&self) -> Option<TimeMS> {
        match self.base.routing_settings.print_routes {
            true => Some(self.base.routing_settings.print_routes_at),
            false => None,
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        match path.is_absolute() {
            true => path.to_path_buf(),
            false => self.config_dir.join(path),
        }
    }

    /// Directory of the optional outputs: tables, routing dump and frame capture.
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(Path::new(&self.base.output_settings.output_path))
    }

    pub fn report_path(&self) -> PathBuf {
        self.resolve(Path::new(&self.base.monitor_settings.report_file))
    }

    pub fn routes_path(&self) -> Option<PathBuf> {
        self.print_routes_at()
            .map(|_| self.output_dir().join(&self.base.routing_settings.routes_file))
    }

    pub fn capture_prefix(&self) -> Option<PathBuf> {
        self.base
            .link_settings
            .capture_prefix
            .as_ref()
            .map(|prefix| self.output_dir().join(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [simulation_settings]
        duration = 10000

        [node_settings]
        node_count = 5
    "#;

    fn set(item: &str) -> Override {
        item.parse().expect("valid override")
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = ExperimentConfig::parse(MINIMAL, Path::new("/tmp"), &[]).expect("valid");
        assert_eq!(config.node_count(), 5);
        assert_eq!(config.step_size(), TimeMS::from(10u64));
        assert_eq!(config.prefix().to_string(), "10.0.0.0/8");
        assert_eq!(config.print_routes_at(), None);
        assert_eq!(config.report_path(), PathBuf::from("/tmp/flow-monitor.xml"));
        assert!(config.flows().is_empty());
    }

    #[test]
    fn overrides_replace_values() {
        let overrides = [
            set("node_count=20"),
            set("total_time=150"),
            set("routing=aodv6"),
            set("print_routes=true"),
            set("pcap=true"),
            set("grid_step=60"),
        ];
        let config = ExperimentConfig::parse(MINIMAL, Path::new("/tmp"), &overrides).expect("valid");
        assert_eq!(config.node_count(), 20);
        assert_eq!(config.duration(), TimeMS::from(150_000u64));
        assert_eq!(config.prefix().to_string(), "2001:1::/64");
        assert_eq!(config.print_routes_at(), Some(TimeMS::from(8000u64)));
        assert_eq!(
            config.capture_prefix(),
            Some(PathBuf::from("/tmp/output/manet"))
        );
        match &config.base().node_settings.mobility {
            MobilitySettings::StaticGrid { delta_x, .. } => assert_eq!(*delta_x, 60.0),
            other => panic!("unexpected mobility {:?}", other),
        }
    }

    #[test]
    fn unknown_and_unparsable_overrides_are_rejected() {
        let unknown = ExperimentConfig::parse(MINIMAL, Path::new("."), &[set("speed=3")]);
        assert!(matches!(unknown, Err(ConfigError::UnknownOverride(key)) if key == "speed"));

        let invalid = ExperimentConfig::parse(MINIMAL, Path::new("."), &[set("seed=abc")]);
        assert!(matches!(invalid, Err(ConfigError::InvalidOverride { .. })));

        assert!("no-equals-sign".parse::<Override>().is_err());
    }

    #[test]
    fn zero_nodes_is_a_configuration_error() {
        let result = ExperimentConfig::parse(MINIMAL, Path::new("."), &[set("node_count=0")]);
        assert!(matches!(result, Err(ConfigError::InvalidNodeCount(0))));
    }

    #[test]
    fn step_size_must_divide_the_duration() {
        let result = ExperimentConfig::parse(MINIMAL, Path::new("."), &[set("duration=1005")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter { field, .. }) if field == "step_size"
        ));
    }

    #[test]
    fn routes_dump_after_the_run_is_rejected() {
        let overrides = [set("print_routes=true"), set("duration=5000")];
        let result = ExperimentConfig::parse(MINIMAL, Path::new("."), &overrides);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter { field, .. }) if field == "print_routes_at"
        ));

        let overrides = [set("print_routes=false"), set("duration=5000")];
        assert!(ExperimentConfig::parse(MINIMAL, Path::new("."), &overrides).is_ok());
    }

    #[test]
    fn mismatched_prefix_family_is_kept_for_the_routing_phase() {
        let content = format!("{}\n[link_settings]\nprefix = \"10.1.0.0/16\"\n", MINIMAL);
        let config =
            ExperimentConfig::parse(&content, Path::new("."), &[set("routing=aodv6")]).expect("valid");
        assert_eq!(config.prefix().to_string(), "10.1.0.0/16");
    }
}
