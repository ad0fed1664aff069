pub mod position;
pub mod rx;
