pub mod endpoint;
pub mod flow;
pub mod packet;
