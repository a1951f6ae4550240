//! Async client for driving devices on a FleetGlue server.

pub mod connector;
mod helpers;
pub mod provider;
pub mod session_worker;
pub mod ua_client;
