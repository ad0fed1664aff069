pub mod config;
pub mod setdest;
