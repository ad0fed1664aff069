#![forbid(unsafe_code)]

pub mod dist;
pub mod mobility;
pub mod monitor;
pub mod net;
pub mod traffic;
