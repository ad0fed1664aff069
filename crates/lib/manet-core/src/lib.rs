#![forbid(unsafe_code)]

pub use hashbrown;

pub mod app;
pub mod bucket;
pub mod error;
pub mod node;
pub mod scheduler;
