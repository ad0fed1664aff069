pub mod config;
pub mod experiment;
pub mod fabric;
pub mod topology;
pub mod traffic;
