//! Session seam between the worker and the `opcua` client stack.

use crate::error::{OpcError, OpcResult, friendly_status_hint};
use opcua::client::prelude::*;
use opcua::sync::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

/// All browse result fields.
const BROWSE_RESULT_MASK_ALL: u32 = 0x3F;

/// A node found by browsing forward hierarchical references.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildNode {
    pub node_id: NodeId,
    pub browse_name: String,
    pub namespace: u16,
    pub node_class: NodeClass,
}

pub trait SessionConnector: Send + Sync {
    type Session: ConnectedSession;

    fn connect(&self, endpoint: &str) -> OpcResult<Self::Session>;
}

pub trait ConnectedSession {
    /// Index of the device namespace on this server, resolved on connect.
    fn namespace_index(&self) -> u16;

    fn browse_children(&self, node: &NodeId) -> OpcResult<Vec<ChildNode>>;

    /// Read the Value attribute of each node, in order.
    fn read_values(&self, nodes: &[NodeId]) -> OpcResult<Vec<DataValue>>;

    /// Write the Value attribute, returning the per-node status.
    fn write_value(&self, node: &NodeId, value: Variant) -> OpcResult<StatusCode>;
}

/// Anonymous, unsecured sessions over `opc.tcp`.
pub struct UaConnector {
    namespace: String,
    pki_dir: PathBuf,
}

impl UaConnector {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pki_dir: PathBuf::from("pki"),
        }
    }

    #[must_use]
    pub fn with_pki_dir(mut self, pki_dir: impl Into<PathBuf>) -> Self {
        self.pki_dir = pki_dir.into();
        self
    }
}

impl SessionConnector for UaConnector {
    type Session = UaSession;

    fn connect(&self, endpoint: &str) -> OpcResult<Self::Session> {
        let mut client = ClientBuilder::new()
            .application_name("FleetGlue OPC UA Client")
            .application_uri("urn:fleetglue:client")
            .product_uri("urn:fleetglue:client")
            .trust_server_certs(true)
            .create_sample_keypair(true)
            .pki_dir(self.pki_dir.clone())
            .session_retry_limit(0)
            .client()
            .ok_or_else(|| OpcError::Internal("invalid client configuration".into()))?;

        let session = client
            .connect_to_endpoint(
                (
                    endpoint,
                    SecurityPolicy::None.to_str(),
                    MessageSecurityMode::None,
                    UserTokenPolicy::anonymous(),
                ),
                IdentityToken::Anonymous,
            )
            .map_err(|status| {
                let hint = friendly_status_hint(status).unwrap_or("No hint available");
                OpcError::Connection(format!("{endpoint}: {status} ({hint})"))
            })?;

        let namespace = resolve_namespace(&session, &self.namespace)?;
        tracing::debug!(endpoint, namespace = %self.namespace, ns = namespace, "session connected");
        Ok(UaSession { session, namespace })
    }
}

fn resolve_namespace(session: &Arc<RwLock<Session>>, uri: &str) -> OpcResult<u16> {
    let node: NodeId = VariableId::Server_NamespaceArray.into();
    let values = session.read().read(
        &[value_read_id(node)],
        TimestampsToReturn::Neither,
        0.0,
    )?;
    namespace_index_in(values.first().and_then(|dv| dv.value.as_ref()), uri)
}

/// Position of `uri` in a `Server_NamespaceArray` value.
fn namespace_index_in(namespace_array: Option<&Variant>, uri: &str) -> OpcResult<u16> {
    let namespaces: Vec<String> = match namespace_array {
        Some(Variant::Array(array)) => array
            .values
            .iter()
            .filter_map(|v| match v {
                Variant::String(s) => Some(s.as_ref().to_string()),
                _ => None,
            })
            .collect(),
        _ => {
            return Err(OpcError::Conversion(
                "Server_NamespaceArray is not a string array".into(),
            ));
        }
    };

    let index = namespaces
        .iter()
        .position(|ns| ns == uri)
        .ok_or_else(|| OpcError::NotFound(format!("namespace '{uri}' on server")))?;
    Ok(u16::try_from(index)?)
}

fn value_read_id(node_id: NodeId) -> ReadValueId {
    ReadValueId {
        node_id,
        attribute_id: AttributeId::Value as u32,
        index_range: UAString::null(),
        data_encoding: QualifiedName::null(),
    }
}

pub struct UaSession {
    session: Arc<RwLock<Session>>,
    namespace: u16,
}

impl ConnectedSession for UaSession {
    fn namespace_index(&self) -> u16 {
        self.namespace
    }

    fn browse_children(&self, node: &NodeId) -> OpcResult<Vec<ChildNode>> {
        let description = BrowseDescription {
            node_id: node.clone(),
            browse_direction: BrowseDirection::Forward,
            reference_type_id: ReferenceTypeId::HierarchicalReferences.into(),
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: BROWSE_RESULT_MASK_ALL,
        };
        let results = self.session.read().browse(&[description])?;

        let Some(result) = results.and_then(|r| r.into_iter().next()) else {
            return Ok(Vec::new());
        };
        if result.status_code.is_bad() {
            return Err(OpcError::Status(result.status_code));
        }

        Ok(result
            .references
            .unwrap_or_default()
            .into_iter()
            .map(|reference| ChildNode {
                node_id: reference.node_id.node_id,
                browse_name: reference.browse_name.name.as_ref().to_string(),
                namespace: reference.browse_name.namespace_index,
                node_class: reference.node_class,
            })
            .collect())
    }

    fn read_values(&self, nodes: &[NodeId]) -> OpcResult<Vec<DataValue>> {
        let ids: Vec<ReadValueId> = nodes.iter().cloned().map(value_read_id).collect();
        Ok(self
            .session
            .read()
            .read(&ids, TimestampsToReturn::Source, 0.0)?)
    }

    fn write_value(&self, node: &NodeId, value: Variant) -> OpcResult<StatusCode> {
        let write = WriteValue {
            node_id: node.clone(),
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
            value: DataValue::value_only(value),
        };
        let statuses = self.session.read().write(&[write])?;
        statuses
            .first()
            .copied()
            .ok_or_else(|| OpcError::Internal("Server returned empty write results".into()))
    }
}

impl Drop for UaSession {
    fn drop(&mut self) {
        self.session.read().disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace_array() -> Variant {
        Variant::from(vec![
            "http://opcfoundation.org/UA/".to_string(),
            "urn:fleetglue:server".to_string(),
            "http://example.org/fleetglue".to_string(),
        ])
    }

    #[test]
    fn test_namespace_index_found() {
        let array = namespace_array();
        assert_eq!(
            namespace_index_in(Some(&array), "http://example.org/fleetglue").unwrap(),
            2
        );
        assert_eq!(
            namespace_index_in(Some(&array), "http://opcfoundation.org/UA/").unwrap(),
            0
        );
    }

    #[test]
    fn test_namespace_index_missing_uri() {
        let array = namespace_array();
        let err = namespace_index_in(Some(&array), "http://example.org/other").unwrap_err();
        assert!(matches!(err, OpcError::NotFound(_)), "{err}");
        assert!(err.to_string().contains("http://example.org/other"));
    }

    #[test]
    fn test_namespace_index_rejects_non_array() {
        let scalar = Variant::from("http://example.org/fleetglue");
        assert!(matches!(
            namespace_index_in(Some(&scalar), "http://example.org/fleetglue"),
            Err(OpcError::Conversion(_))
        ));
        assert!(matches!(
            namespace_index_in(None, "http://example.org/fleetglue"),
            Err(OpcError::Conversion(_))
        ));
    }
}
