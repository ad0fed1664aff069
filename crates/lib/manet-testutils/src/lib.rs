pub mod app;
pub mod bucket;
