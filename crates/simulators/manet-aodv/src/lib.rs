#![forbid(unsafe_code)]

pub mod manet;
pub mod simulation;
