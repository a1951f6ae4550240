//! OPC UA server hosting device objects.

pub mod address_space;
pub mod config;
pub mod endpoint;
pub mod host;
