#![forbid(unsafe_code)]

pub mod capture;
pub mod logger;
pub mod ns2;
pub mod report;
pub mod result;
pub mod routes;
pub mod tables;
pub mod writer;
