use crate::error::OpcResult;
use crate::value::DeviceValue;
use async_trait::async_trait;

#[cfg(any(test, feature = "test-support"))]
use mockall::automock;

/// A single register's read result.
///
/// Returned by [`DeviceProvider::read_device`] and
/// [`DeviceProvider::read_register`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterValue {
    /// Browse name of the owning device (e.g., `"Button1"`).
    pub device: String,
    /// Register browse name (e.g., `"State"`).
    pub register: String,
    /// The current typed value.
    pub value: DeviceValue,
    /// OPC UA quality: `"Good"`, `"Uncertain"`, or `"Bad"` followed by a hint.
    pub quality: String,
    /// Source timestamp of the value, formatted as a local time string.
    pub timestamp: String,
}

/// Result of a single write operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub device: String,
    pub register: String,
    /// Whether the write succeeded.
    pub success: bool,
    /// Error message if the write failed, `None` on success.
    pub error: Option<String>,
}

/// Async trait for device operations against an OPC UA server.
///
/// This is the stable public API. Every call names the endpoint URL, so a
/// single provider can talk to several servers.
#[cfg_attr(any(test, feature = "test-support"), automock)]
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// List device objects in the device namespace of the server.
    ///
    /// # Errors
    /// Returns `Err` if the connection fails or the server does not publish
    /// the device namespace.
    async fn list_devices(&self, endpoint: &str) -> OpcResult<Vec<String>>;

    /// Read every register of a device.
    ///
    /// # Errors
    /// Returns `Err` if the connection fails or the device does not exist.
    async fn read_device(&self, endpoint: &str, device: &str) -> OpcResult<Vec<RegisterValue>>;

    /// Read one register.
    ///
    /// # Errors
    /// Returns `Err` if the connection fails or the device or register does
    /// not exist.
    async fn read_register(
        &self,
        endpoint: &str,
        device: &str,
        register: &str,
    ) -> OpcResult<RegisterValue>;

    /// Write a value to one register.
    ///
    /// A write the server rejects is reported through
    /// [`WriteResult::success`], not as `Err`.
    ///
    /// # Errors
    /// Returns `Err` if the connection fails or the register cannot be
    /// resolved.
    async fn write_register(
        &self,
        endpoint: &str,
        device: &str,
        register: &str,
        value: DeviceValue,
    ) -> OpcResult<WriteResult>;
}
