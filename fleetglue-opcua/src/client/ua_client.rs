use crate::DEFAULT_NAMESPACE;
use crate::client::connector::{SessionConnector, UaConnector};
use crate::client::provider::{DeviceProvider, RegisterValue, WriteResult};
use crate::client::session_worker::{SessionRequest, SessionWorker};
use crate::error::OpcResult;
use crate::value::DeviceValue;
use async_trait::async_trait;
use std::sync::Arc;

/// Concrete [`DeviceProvider`] talking OPC UA through the `opcua` crate.
///
/// All session calls run on a dedicated [`SessionWorker`] thread.
pub struct UaDeviceClient<C: SessionConnector + 'static = UaConnector> {
    pub worker: SessionWorker<C>,
}

impl UaDeviceClient<UaConnector> {
    /// Client for devices registered under `namespace`.
    pub fn for_namespace(namespace: impl Into<String>) -> OpcResult<Self> {
        Self::new(UaConnector::new(namespace))
    }

    /// Client for the default device namespace.
    pub fn with_defaults() -> OpcResult<Self> {
        Self::for_namespace(DEFAULT_NAMESPACE)
    }
}

impl<C: SessionConnector + 'static> UaDeviceClient<C> {
    /// Creates a new `UaDeviceClient` with the given connector.
    pub fn new(connector: C) -> OpcResult<Self> {
        tracing::info!("Initializing UaDeviceClient...");
        let worker = SessionWorker::start(Arc::new(connector))?;
        tracing::info!("UaDeviceClient initialized successfully");
        Ok(Self { worker })
    }
}

#[async_trait]
impl<C: SessionConnector + 'static> DeviceProvider for UaDeviceClient<C> {
    async fn list_devices(&self, endpoint: &str) -> OpcResult<Vec<String>> {
        let endpoint_owned = endpoint.to_string();
        self.worker
            .send_request(|reply| SessionRequest::ListDevices {
                endpoint: endpoint_owned,
                reply,
            })
            .await
    }

    async fn read_device(&self, endpoint: &str, device: &str) -> OpcResult<Vec<RegisterValue>> {
        let endpoint_owned = endpoint.to_string();
        let device_owned = device.to_string();
        self.worker
            .send_request(|reply| SessionRequest::ReadDevice {
                endpoint: endpoint_owned,
                device: device_owned,
                reply,
            })
            .await
    }

    async fn read_register(
        &self,
        endpoint: &str,
        device: &str,
        register: &str,
    ) -> OpcResult<RegisterValue> {
        let endpoint_owned = endpoint.to_string();
        let device_owned = device.to_string();
        let register_owned = register.to_string();
        self.worker
            .send_request(|reply| SessionRequest::ReadRegister {
                endpoint: endpoint_owned,
                device: device_owned,
                register: register_owned,
                reply,
            })
            .await
    }

    async fn write_register(
        &self,
        endpoint: &str,
        device: &str,
        register: &str,
        value: DeviceValue,
    ) -> OpcResult<WriteResult> {
        let endpoint_owned = endpoint.to_string();
        let device_owned = device.to_string();
        let register_owned = register.to_string();
        self.worker
            .send_request(|reply| SessionRequest::WriteRegister {
                endpoint: endpoint_owned,
                device: device_owned,
                register: register_owned,
                value,
                reply,
            })
            .await
    }
}
