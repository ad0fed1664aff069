pub mod address;
pub mod aodv;
pub mod channel;
pub mod routing;
