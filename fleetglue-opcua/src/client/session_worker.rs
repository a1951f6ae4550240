use crate::client::connector::{ChildNode, ConnectedSession, SessionConnector};
use crate::client::helpers::{quality_to_string, timestamp_to_string};
use crate::client::provider::{RegisterValue, WriteResult};
use crate::error::{OpcError, OpcResult, friendly_status_hint, is_connection_status};
use crate::value::DeviceValue;
use opcua::types::{DataValue, NodeClass, NodeId, ObjectId, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub enum SessionRequest {
    ListDevices {
        endpoint: String,
        reply: oneshot::Sender<OpcResult<Vec<String>>>,
    },
    ReadDevice {
        endpoint: String,
        device: String,
        reply: oneshot::Sender<OpcResult<Vec<RegisterValue>>>,
    },
    ReadRegister {
        endpoint: String,
        device: String,
        register: String,
        reply: oneshot::Sender<OpcResult<RegisterValue>>,
    },
    WriteRegister {
        endpoint: String,
        device: String,
        register: String,
        value: DeviceValue,
        reply: oneshot::Sender<OpcResult<WriteResult>>,
    },
}

/// Dedicated thread owning all OPC UA sessions.
///
/// `opcua` sessions block on their own runtime, so they never run on the
/// caller's tokio workers. Sessions are cached per endpoint URL.
pub struct SessionWorker<C: SessionConnector + 'static> {
    pub sender: mpsc::Sender<SessionRequest>,
    pub handle: Option<std::thread::JoinHandle<()>>,
    _phantom: std::marker::PhantomData<C>,
}

fn is_connection_error(err: &OpcError) -> bool {
    match err {
        OpcError::Status(status) => is_connection_status(*status),
        OpcError::Connection(_) => true,
        _ => false,
    }
}

impl<C: SessionConnector + 'static> SessionWorker<C> {
    pub fn start(connector: Arc<C>) -> OpcResult<Self> {
        let (tx, mut rx) = mpsc::channel(32);

        let handle = std::thread::Builder::new()
            .name("opcua-session".into())
            .spawn(move || {
                let mut cache: HashMap<String, C::Session> = HashMap::new();

                while let Some(req) = rx.blocking_recv() {
                    match req {
                        SessionRequest::ListDevices { endpoint, reply } => {
                            let result =
                                Self::dispatch_with_retry(&mut cache, &connector, &endpoint, |s| {
                                    Self::handle_list(&endpoint, s)
                                });
                            let _ = reply.send(result);
                        }
                        SessionRequest::ReadDevice {
                            endpoint,
                            device,
                            reply,
                        } => {
                            let result =
                                Self::dispatch_with_retry(&mut cache, &connector, &endpoint, |s| {
                                    Self::handle_read_device(&endpoint, &device, s)
                                });
                            let _ = reply.send(result);
                        }
                        SessionRequest::ReadRegister {
                            endpoint,
                            device,
                            register,
                            reply,
                        } => {
                            let result =
                                Self::dispatch_with_retry(&mut cache, &connector, &endpoint, |s| {
                                    Self::handle_read_register(&endpoint, &device, &register, s)
                                });
                            let _ = reply.send(result);
                        }
                        SessionRequest::WriteRegister {
                            endpoint,
                            device,
                            register,
                            value,
                            reply,
                        } => {
                            let result =
                                Self::dispatch_with_retry(&mut cache, &connector, &endpoint, |s| {
                                    Self::handle_write(&endpoint, &device, &register, &value, s)
                                });
                            let _ = reply.send(result);
                        }
                    }
                }

                tracing::debug!(sessions = cache.len(), "session worker thread exiting cleanly");
            })
            .map_err(|e| OpcError::Internal(format!("cannot spawn session worker: {e}")))?;

        tracing::debug!("session worker thread started");

        Ok(Self {
            sender: tx,
            handle: Some(handle),
            _phantom: std::marker::PhantomData,
        })
    }

    pub async fn send_request<F, R>(&self, req_builder: F) -> OpcResult<R>
    where
        F: FnOnce(oneshot::Sender<OpcResult<R>>) -> SessionRequest,
    {
        if self
            .handle
            .as_ref()
            .is_some_and(std::thread::JoinHandle::is_finished)
        {
            tracing::error!("session worker thread panicked or exited unexpectedly");
            return Err(OpcError::Internal("session worker thread panicked".into()));
        }

        let (tx, rx) = oneshot::channel();
        let req = req_builder(tx);

        self.sender.send(req).await.map_err(|_| {
            OpcError::Internal("session worker channel closed (worker stopped)".into())
        })?;

        rx.await
            .map_err(|_| OpcError::Internal("session worker shut down during request".into()))?
    }

    /// Run `operation` on the cached session for `endpoint`, connecting on a
    /// cache miss. A connection-class failure evicts the session and the
    /// operation is retried once on a fresh one.
    fn dispatch_with_retry<F, R>(
        cache: &mut HashMap<String, C::Session>,
        connector: &Arc<C>,
        endpoint: &str,
        operation: F,
    ) -> OpcResult<R>
    where
        F: Fn(&C::Session) -> OpcResult<R>,
    {
        let result = if let Some(session) = cache.get(endpoint) {
            tracing::trace!(endpoint, "Cache hit");
            operation(session)
        } else {
            tracing::debug!(endpoint, "Cache miss, connecting");
            let session = connector.connect(endpoint)?;
            let result = operation(&session);
            cache.insert(endpoint.to_string(), session);
            result
        };

        match result {
            Err(e) if is_connection_error(&e) => {
                tracing::warn!(endpoint, error = %e, "Evicting stale session");
                cache.remove(endpoint);
                tracing::debug!(endpoint, "Reconnecting");
                let fresh = connector.connect(endpoint).map_err(|connect_e| {
                    tracing::error!(error = %connect_e, "Reconnect failed");
                    connect_e
                })?;
                let result = operation(&fresh);
                cache.insert(endpoint.to_string(), fresh);
                result
            }
            other => other,
        }
    }

    fn handle_list(endpoint: &str, session: &C::Session) -> OpcResult<Vec<String>> {
        let span = tracing::info_span!("opc.list_devices", endpoint = %endpoint);
        let _enter = span.enter();

        let devices: Vec<String> = device_objects(session)?
            .into_iter()
            .map(|child| child.browse_name)
            .collect();
        tracing::info!(count = devices.len(), "list_devices completed");
        Ok(devices)
    }

    fn handle_read_device(
        endpoint: &str,
        device: &str,
        session: &C::Session,
    ) -> OpcResult<Vec<RegisterValue>> {
        let span = tracing::info_span!("opc.read_device", endpoint = %endpoint, device = %device);
        let _enter = span.enter();

        let device_node = find_device(session, device)?;
        let registers = device_registers(session, &device_node)?;
        let node_ids: Vec<NodeId> = registers.iter().map(|r| r.node_id.clone()).collect();
        let values = session.read_values(&node_ids)?;

        let result: Vec<RegisterValue> = registers
            .iter()
            .zip(values.iter())
            .map(|(register, data_value)| to_register_value(device, &register.browse_name, data_value))
            .collect();
        tracing::info!(count = result.len(), "read_device completed");
        Ok(result)
    }

    fn handle_read_register(
        endpoint: &str,
        device: &str,
        register: &str,
        session: &C::Session,
    ) -> OpcResult<RegisterValue> {
        let span = tracing::info_span!(
            "opc.read_register",
            endpoint = %endpoint,
            device = %device,
            register = %register
        );
        let _enter = span.enter();

        let node_id = find_register(session, device, register)?;
        let values = session.read_values(std::slice::from_ref(&node_id))?;
        let data_value = values
            .first()
            .ok_or_else(|| OpcError::Internal("Server returned empty read results".into()))?;
        Ok(to_register_value(device, register, data_value))
    }

    fn handle_write(
        endpoint: &str,
        device: &str,
        register: &str,
        value: &DeviceValue,
        session: &C::Session,
    ) -> OpcResult<WriteResult> {
        let span = tracing::info_span!(
            "opc.write_register",
            endpoint = %endpoint,
            device = %device,
            register = %register
        );
        let _enter = span.enter();

        let node_id = find_register(session, device, register)?;
        let status = session.write_value(&node_id, value.to_variant())?;

        let write_result = if status.is_good() {
            tracing::info!(value = %value, "write_register completed");
            WriteResult {
                device: device.to_string(),
                register: register.to_string(),
                success: true,
                error: None,
            }
        } else {
            let msg = format_status(status);
            tracing::warn!(error = %msg, "write_register: server rejected write");
            WriteResult {
                device: device.to_string(),
                register: register.to_string(),
                success: false,
                error: Some(msg),
            }
        };
        Ok(write_result)
    }
}

fn format_status(status: StatusCode) -> String {
    match friendly_status_hint(status) {
        Some(hint) => format!("{status}: {hint}"),
        None => status.to_string(),
    }
}

fn to_register_value(device: &str, register: &str, data_value: &DataValue) -> RegisterValue {
    let status = data_value.status.unwrap_or(StatusCode::Good);
    RegisterValue {
        device: device.to_string(),
        register: register.to_string(),
        value: data_value
            .value
            .as_ref()
            .map_or(DeviceValue::Empty, DeviceValue::from),
        quality: quality_to_string(status),
        timestamp: timestamp_to_string(data_value.source_timestamp.as_ref()),
    }
}

/// Objects-folder children that live in the device namespace.
fn device_objects<S: ConnectedSession>(session: &S) -> OpcResult<Vec<ChildNode>> {
    let ns = session.namespace_index();
    let objects: NodeId = ObjectId::ObjectsFolder.into();
    Ok(session
        .browse_children(&objects)?
        .into_iter()
        .filter(|child| child.namespace == ns && child.node_class == NodeClass::Object)
        .collect())
}

fn find_device<S: ConnectedSession>(session: &S, device: &str) -> OpcResult<NodeId> {
    device_objects(session)?
        .into_iter()
        .find(|child| child.browse_name == device)
        .map(|child| child.node_id)
        .ok_or_else(|| OpcError::NotFound(format!("device '{device}'")))
}

fn device_registers<S: ConnectedSession>(
    session: &S,
    device_node: &NodeId,
) -> OpcResult<Vec<ChildNode>> {
    let ns = session.namespace_index();
    Ok(session
        .browse_children(device_node)?
        .into_iter()
        .filter(|child| child.namespace == ns && child.node_class == NodeClass::Variable)
        .collect())
}

fn find_register<S: ConnectedSession>(
    session: &S,
    device: &str,
    register: &str,
) -> OpcResult<NodeId> {
    let device_node = find_device(session, device)?;
    device_registers(session, &device_node)?
        .into_iter()
        .find(|child| child.browse_name == register)
        .map(|child| child.node_id)
        .ok_or_else(|| OpcError::NotFound(format!("register '{device}.{register}'")))
}
