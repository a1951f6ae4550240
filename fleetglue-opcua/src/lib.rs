//! # fleetglue-opcua
//!
//! OPC UA device fleet: a server that hosts virtual devices as objects in its
//! address space, and a backend-agnostic async client for driving them.
//!
//! ## Features
//! - `test-support`: Enables `MockDeviceProvider` via `mockall` and exposes
//!   the in-memory `MemoryStore`

pub mod actions;
pub mod client;
pub mod device;
mod error;
pub mod registers;
pub mod server;
pub mod store;
mod value;

// Stable public API
pub use client::provider::{DeviceProvider, RegisterValue, WriteResult};
pub use client::ua_client::UaDeviceClient;
pub use error::{OpcError, OpcResult, friendly_hint, friendly_status_hint};
pub use server::config::{DeviceConfig, ServerConfig};
pub use server::endpoint::Endpoint;
pub use server::host::DeviceServer;
pub use value::DeviceValue;

/// Endpoint the server binds to when none is configured.
pub const DEFAULT_SERVER_ENDPOINT: &str = "opc.tcp://0.0.0.0:4840/freeopcua/server/";

/// Endpoint the client connects to when none is given.
pub const DEFAULT_CLIENT_ENDPOINT: &str = "opc.tcp://localhost:4840/freeopcua/server/";

/// Namespace URI under which all device nodes are registered.
pub const DEFAULT_NAMESPACE: &str = "http://example.org/fleetglue";

// Test support re-export
#[cfg(any(test, feature = "test-support"))]
pub use client::provider::MockDeviceProvider;
#[cfg(any(test, feature = "test-support"))]
pub use store::MemoryStore;
