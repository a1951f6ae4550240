//! Server configuration, loadable from TOML.

use crate::device::{Device, DeviceKind, VirtualButton, VirtualLight, VirtualSwitch};
use crate::error::{OpcError, OpcResult};
use crate::server::endpoint::Endpoint;
use crate::{DEFAULT_NAMESPACE, DEFAULT_SERVER_ENDPOINT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// One device hosted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Browse name of the device object.
    pub name: String,
    pub kind: DeviceKind,
    /// Simulation tick period in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub update_interval_ms: u64,
    /// GPIO pin, published as metadata.
    #[serde(default)]
    pub pin: Option<u32>,
    /// Run the device's background simulation.
    #[serde(default)]
    pub simulate: bool,
}

const fn default_interval_ms() -> u64 {
    1000
}

impl DeviceConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Instantiate the device model described by this entry.
    pub fn build(&self) -> Arc<dyn Device> {
        match self.kind {
            DeviceKind::Switch => Arc::new(
                VirtualSwitch::new(self.name.clone(), self.update_interval())
                    .simulated(self.simulate),
            ),
            DeviceKind::Button => Arc::new(
                VirtualButton::new(self.name.clone(), self.pin)
                    .with_interval(self.update_interval())
                    .simulated(self.simulate),
            ),
            DeviceKind::Light => Arc::new(
                VirtualLight::new(self.name.clone(), self.pin)
                    .with_interval(self.update_interval()),
            ),
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Endpoint URL the server listens on.
    pub endpoint: String,
    /// Namespace URI for device nodes.
    pub namespace: String,
    pub application_name: String,
    pub application_uri: String,
    /// Description attribute of the Server object.
    pub description: String,
    /// Directory holding the server's certificate and trust lists.
    pub pki_dir: PathBuf,
    pub devices: Vec<DeviceConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SERVER_ENDPOINT.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            application_name: "FleetGlue OPC UA Server".to_string(),
            application_uri: "urn:fleetglue:server".to_string(),
            description: "FleetGlue OPC UA Server".to_string(),
            pki_dir: PathBuf::from("pki"),
            devices: vec![
                DeviceConfig {
                    name: "VirtualSwitch".to_string(),
                    kind: DeviceKind::Switch,
                    update_interval_ms: 2000,
                    pin: None,
                    simulate: false,
                },
                DeviceConfig {
                    name: "Button1".to_string(),
                    kind: DeviceKind::Button,
                    update_interval_ms: 100,
                    pin: Some(17),
                    simulate: false,
                },
                DeviceConfig {
                    name: "Light1".to_string(),
                    kind: DeviceKind::Light,
                    update_interval_ms: 500,
                    pin: Some(18),
                    simulate: false,
                },
            ],
        }
    }
}

impl ServerConfig {
    /// Load a configuration file. Missing keys fall back to the defaults.
    pub fn load_from_file(path: &Path) -> OpcResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OpcError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), devices = config.devices.len(), "configuration loaded");
        Ok(config)
    }

    /// Check the configuration, collecting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = Endpoint::parse(&self.endpoint) {
            errors.push(e.to_string());
        }

        if self.namespace.trim().is_empty() {
            errors.push("namespace must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.name.trim().is_empty() {
                errors.push("device name must not be empty".to_string());
            } else if !seen.insert(device.name.as_str()) {
                errors.push(format!("duplicate device name '{}'", device.name));
            }
            if device.update_interval_ms == 0 {
                errors.push(format!(
                    "device '{}': update_interval_ms must be greater than 0",
                    device.name
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and return the parsed endpoint.
    pub fn checked_endpoint(&self) -> OpcResult<Endpoint> {
        self.validate()
            .map_err(|errors| OpcError::Config(errors.join("; ")))?;
        Endpoint::parse(&self.endpoint)
    }

    /// Instantiate every configured device, in file order.
    pub fn build_devices(&self) -> Vec<Arc<dyn Device>> {
        self.devices.iter().map(DeviceConfig::build).collect()
    }

    /// Turn simulation on for every device that supports it.
    pub fn simulate_all(&mut self) {
        for device in &mut self.devices {
            device.simulate = true;
        }
    }
}
