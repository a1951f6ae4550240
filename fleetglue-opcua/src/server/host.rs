//! Server lifecycle: setup, device registration, run and stop.

use crate::device::runtime::{DeviceTask, spawn_device};
use crate::device::{Device, initialize};
use crate::error::{OpcError, OpcResult};
use crate::server::address_space::{AddressSpaceStore, register_namespace, set_server_description};
use crate::server::config::ServerConfig;
use crate::server::endpoint::Endpoint;
use crate::store::RegisterStore;
use opcua::server::prelude::{ANONYMOUS_USER_TOKEN_ID, Server, ServerBuilder, ServerEndpoint};
use opcua::sync::RwLock;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// OPC UA server exposing a set of devices in one namespace.
///
/// Lifecycle: [`setup`](Self::setup) builds the server and registers the
/// namespace, [`add_device`](Self::add_device) publishes devices,
/// [`run`](Self::run) serves until a shutdown future resolves, and
/// [`stop`](Self::stop) halts device loops and the server. `setup` and
/// `stop` are both safe to call more than once.
pub struct DeviceServer {
    config: ServerConfig,
    server: Option<Arc<RwLock<Server>>>,
    store: Option<Arc<AddressSpaceStore>>,
    devices: Vec<Arc<dyn Device>>,
    tasks: Vec<DeviceTask>,
    shutdown: Option<watch::Sender<bool>>,
}

impl DeviceServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            server: None,
            store: None,
            devices: Vec::new(),
            tasks: Vec::new(),
            shutdown: None,
        }
    }

    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Namespace index of the device nodes, once set up.
    pub fn namespace_index(&self) -> Option<u16> {
        self.store.as_ref().map(|s| s.namespace())
    }

    /// Register store over the live address space, once set up.
    pub fn store(&self) -> Option<Arc<AddressSpaceStore>> {
        self.store.clone()
    }

    pub fn device_names(&self) -> Vec<&str> {
        self.devices.iter().map(|d| d.name()).collect()
    }

    pub const fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Build the server, register the namespace and describe the Server
    /// object. Returns the namespace index.
    pub fn setup(&mut self) -> OpcResult<u16> {
        if let Some(store) = &self.store {
            return Ok(store.namespace());
        }

        let endpoint = self.config.checked_endpoint()?;
        let server = build_server(&self.config, &endpoint)?;

        let address_space = server.address_space();
        let namespace = register_namespace(&address_space, &self.config.namespace)?;
        set_server_description(&address_space, &self.config.description)?;

        tracing::info!(
            endpoint = %endpoint,
            namespace = %self.config.namespace,
            ns = namespace,
            "server set up"
        );

        self.store = Some(Arc::new(AddressSpaceStore::new(address_space, namespace)));
        self.server = Some(Arc::new(RwLock::new(server)));
        Ok(namespace)
    }

    /// Publish `device` under the Objects folder, setting the server up
    /// first if needed.
    ///
    /// Devices added while the server runs start their loop immediately.
    pub fn add_device(&mut self, device: Arc<dyn Device>) -> OpcResult<()> {
        self.setup()?;
        let store = self
            .store
            .clone()
            .ok_or_else(|| OpcError::InvalidState("server is not set up".into()))?;

        initialize(device.as_ref(), store.as_ref())?;
        tracing::info!(device = %device.name(), kind = %device.kind(), "device added");

        if let Some(tx) = &self.shutdown
            && let Some(task) = spawn_device(device.clone(), store, tx.subscribe())
        {
            self.tasks.push(task);
        }
        self.devices.push(device);
        Ok(())
    }

    /// Add every device listed in the configuration.
    pub fn add_configured_devices(&mut self) -> OpcResult<usize> {
        let devices = self.config.build_devices();
        let count = devices.len();
        for device in devices {
            self.add_device(device)?;
        }
        Ok(count)
    }

    /// Start the background loops of all devices.
    pub fn start(&mut self) -> OpcResult<()> {
        if self.is_running() {
            return Ok(());
        }
        let store: Arc<dyn RegisterStore> = self
            .store
            .clone()
            .ok_or_else(|| OpcError::InvalidState("server is not set up".into()))?;

        let (tx, _) = watch::channel(false);
        for device in &self.devices {
            if let Some(task) = spawn_device(device.clone(), store.clone(), tx.subscribe()) {
                self.tasks.push(task);
            }
        }
        self.shutdown = Some(tx);
        tracing::info!(
            devices = self.devices.len(),
            tasks = self.tasks.len(),
            "devices started"
        );
        Ok(())
    }

    /// Serve clients until `shutdown` resolves or the server task ends,
    /// then stop everything.
    pub async fn run<F>(&mut self, shutdown: F) -> OpcResult<()>
    where
        F: Future<Output = ()>,
    {
        self.setup()?;
        self.start()?;
        let server = self
            .server
            .clone()
            .ok_or_else(|| OpcError::InvalidState("server is not set up".into()))?;

        tracing::info!(endpoint = %self.config.endpoint, "server started");

        let server_task = Server::new_server_task(server);
        tokio::pin!(server_task);
        tokio::pin!(shutdown);

        tokio::select! {
            () = &mut server_task => tracing::warn!("server task ended"),
            () = &mut shutdown => tracing::info!("shutdown requested"),
        }

        self.stop().await;
        Ok(())
    }

    /// Stop device loops and abort the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
            for task in self.tasks.drain(..) {
                task.join().await;
            }
        }
        if let Some(server) = &self.server {
            server.write().abort();
            tracing::info!("server stopped");
        }
    }
}

fn build_server(config: &ServerConfig, endpoint: &Endpoint) -> OpcResult<Server> {
    let user_tokens = [ANONYMOUS_USER_TOKEN_ID.to_string()];
    ServerBuilder::new()
        .application_name(config.application_name.as_str())
        .application_uri(config.application_uri.as_str())
        .product_uri(config.application_uri.as_str())
        .create_sample_keypair(true)
        .pki_dir(config.pki_dir.clone())
        .trust_client_certs()
        .host_and_port(endpoint.host.as_str(), endpoint.port)
        .discovery_urls(vec![endpoint.path.clone()])
        .endpoint(
            "none",
            ServerEndpoint::new_none(endpoint.path.as_str(), &user_tokens),
        )
        .server()
        .ok_or_else(|| OpcError::Config(format!("invalid server configuration for {endpoint}")))
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!(signal = "SIGINT", "signal received"),
        () = terminate => tracing::info!(signal = "SIGTERM", "signal received"),
    }
}
