use rand::Rng;
use rand_distr::{Distribution, Exp, Gamma, LogNormal, Normal, Uniform};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

use manet_core::error::ConfigError;
use manet_core::node::NodeId;

#[derive(Debug, Clone, Copy)]
pub enum DistType {
    Constant(f64),
    Uniform(Uniform<f64>),
    Normal(Normal<f64>),
    LogNormal(LogNormal<f64>),
    Exponential(Exp<f64>),
    Gamma(Gamma<f64>),
}

/// Parameters of a distribution as they appear in the configuration file. Only the fields
/// the named distribution needs have to be present.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DistParams {
    pub dist_name: String,
    pub value: Option<f64>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub scale: Option<f64>,
    pub shape: Option<f64>,
    pub rate: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl DistParams {
    pub fn constant(value: f64) -> Self {
        Self {
            dist_name: "constant".to_string(),
            value: Some(value),
            mean: None,
            std_dev: None,
            scale: None,
            shape: None,
            rate: None,
            min: None,
            max: None,
        }
    }

    pub fn uniform(min: f64, max: f64) -> Self {
        Self {
            dist_name: "uniform".to_string(),
            min: Some(min),
            max: Some(max),
            value: None,
            ..Self::constant(0.0)
        }
    }
}

impl DistType {
    pub fn new(params: &DistParams) -> Result<Self, ConfigError> {
        let name = params.dist_name.to_lowercase();
        let dist = match name.as_str() {
            "constant" => Self::build_constant(params),
            "uniform" => Self::build_uniform(params),
            "normal" => Self::build_normal(params),
            "lognormal" => Self::build_log_normal(params),
            "exponential" => Self::build_exponential(params),
            "gamma" => Self::build_gamma(params),
            _ => Err("supported values are constant, uniform, normal, lognormal, exponential, gamma"
                .to_string()),
        };
        dist.map_err(|reason| ConfigError::Distribution { name, reason })
    }

    fn required(value: Option<f64>, field: &str) -> Result<f64, String> {
        match value {
            Some(val) if val.is_finite() => Ok(val),
            Some(val) => Err(format!("{} must be finite, got {}", field, val)),
            None => Err(format!("missing {}", field)),
        }
    }

    fn build_constant(params: &DistParams) -> Result<Self, String> {
        let value = Self::required(params.value, "value")?;
        Ok(Self::Constant(value))
    }

    fn build_uniform(params: &DistParams) -> Result<Self, String> {
        let min = Self::required(params.min, "min")?;
        let max = Self::required(params.max, "max")?;
        if min > max {
            return Err(format!("min {} is larger than max {}", min, max));
        }
        Ok(Self::Uniform(Uniform::new_inclusive(min, max)))
    }

    fn build_normal(params: &DistParams) -> Result<Self, String> {
        let mean = Self::required(params.mean, "mean")?;
        let std_dev = Self::required(params.std_dev, "std_dev")?;
        Normal::new(mean, std_dev)
            .map(Self::Normal)
            .map_err(|e| e.to_string())
    }

    fn build_log_normal(params: &DistParams) -> Result<Self, String> {
        let mean = Self::required(params.mean, "mean")?;
        let std_dev = Self::required(params.std_dev, "std_dev")?;
        LogNormal::new(mean, std_dev)
            .map(Self::LogNormal)
            .map_err(|e| e.to_string())
    }

    fn build_exponential(params: &DistParams) -> Result<Self, String> {
        let rate = Self::required(params.rate, "rate")?;
        Exp::new(rate)
            .map(Self::Exponential)
            .map_err(|e| e.to_string())
    }

    fn build_gamma(params: &DistParams) -> Result<Self, String> {
        let shape = Self::required(params.shape, "shape")?;
        let scale = Self::required(params.scale, "scale")?;
        Gamma::new(shape, scale)
            .map(Self::Gamma)
            .map_err(|e| e.to_string())
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            DistType::Constant(value) => *value,
            DistType::Uniform(dist) => dist.sample(rng),
            DistType::Normal(dist) => dist.sample(rng),
            DistType::LogNormal(dist) => dist.sample(rng),
            DistType::Exponential(dist) => dist.sample(rng),
            DistType::Gamma(dist) => dist.sample(rng),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RngSampler {
    pub dist: DistType,
    pub rng: Pcg64Mcg,
}

impl RngSampler {
    pub fn new(params: &DistParams, rng: Pcg64Mcg) -> Result<Self, ConfigError> {
        let dist = DistType::new(params)?;
        Ok(Self { dist, rng })
    }

    pub fn sample(&mut self) -> f64 {
        self.dist.sample(&mut self.rng)
    }
}

/// Independent random streams used in an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Mobility(NodeId),
    Flow(u32),
    Channel,
}

impl Stream {
    fn tag(&self) -> u64 {
        match self {
            Stream::Mobility(node_id) => (1u64 << 32) | node_id.as_u64(),
            Stream::Flow(flow_id) => (2u64 << 32) | *flow_id as u64,
            Stream::Channel => 3u64 << 32,
        }
    }
}

/// Derives every random stream of an experiment from the one configured seed. The same seed
/// always yields the same streams, independent of the order in which they are requested.
#[derive(Debug, Clone, Copy)]
pub struct SeedBank {
    seed: u64,
}

impl SeedBank {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn stream_seed(&self, stream: Stream) -> u128 {
        let mixed = splitmix64(self.seed ^ splitmix64(stream.tag()));
        let high = splitmix64(mixed);
        ((high as u128) << 64) | mixed as u128
    }

    pub fn rng(&self, stream: Stream) -> Pcg64Mcg {
        Pcg64Mcg::new(self.stream_seed(stream))
    }
}

fn splitmix64(value: u64) -> u64 {
    let mut z = value.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
