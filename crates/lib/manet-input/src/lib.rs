#![forbid(unsafe_code)]

pub mod batch;
pub mod columns;
pub mod ns2;
pub mod trace;
