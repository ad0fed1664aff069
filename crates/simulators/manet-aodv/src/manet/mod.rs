pub mod bucket;
pub mod node;
