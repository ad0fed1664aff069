use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors detected while validating the configuration or building the experiment.
/// None of them leaves a partially constructed experiment running.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("node count must be positive, got {0}")]
    InvalidNodeCount(u32),

    #[error("flow {flow} references node {node}, outside of [0, {node_count})")]
    NodeOutOfRange {
        flow: u32,
        node: u32,
        node_count: u32,
    },

    #[error("flow {flow} uses node {node} as both source and sink")]
    SelfFlow { flow: u32, node: u32 },

    #[error("flow {flow} is invalid: {reason}")]
    InvalidFlow { flow: u32, reason: String },

    #[error("{field} must be {expected}, got {value}")]
    InvalidParameter {
        field: String,
        expected: String,
        value: String,
    },

    #[error("invalid distribution {name}: {reason}")]
    Distribution { name: String, reason: String },

    #[error("malformed trace {} at line {line}: {reason}", .path.display())]
    MalformedTrace {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("trace {} covers {covered} of the {requested} requested nodes", .path.display())]
    TraceCoverage {
        path: PathBuf,
        covered: usize,
        requested: u32,
    },

    #[error("address prefix {prefix} holds {capacity} hosts but {requested} nodes need an address")]
    AddressPoolExhausted {
        prefix: String,
        capacity: u128,
        requested: u32,
    },

    #[error("invalid address prefix {prefix}: {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("routing protocol {routing} requires an {expected} prefix, got {prefix}")]
    FamilyMismatch {
        routing: String,
        expected: String,
        prefix: String,
    },

    #[error("unknown override key {0}")]
    UnknownOverride(String),

    #[error("invalid value {value} for override {key}")]
    InvalidOverride { key: String, value: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Errors about files the experiment reads or writes.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("required input {} does not exist", .path.display())]
    MissingInput { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to produce {}: {reason}", .path.display())]
    Output { path: PathBuf, reason: String },
}

impl ResourceError {
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ResourceError::Read {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ResourceError::Write {
            path: path.into(),
            source,
        }
    }

    pub fn output(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ResourceError::Output {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Top level error of an experiment run.
#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("engine failure: {message}")]
    Engine { message: String },
}

impl ExperimentError {
    pub fn engine(message: impl ToString) -> Self {
        ExperimentError::Engine {
            message: message.to_string(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, ExperimentError::Config(_))
    }
}

impl ConfigError {
    pub fn invalid(field: &str, expected: &str, value: impl ToString) -> Self {
        ConfigError::InvalidParameter {
            field: field.to_string(),
            expected: expected.to_string(),
            value: value.to_string(),
        }
    }
}
