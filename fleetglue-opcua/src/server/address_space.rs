//! [`RegisterStore`] backed by the live OPC UA address space.

use crate::error::{OpcError, OpcResult};
use crate::registers::Register;
use crate::store::{RegisterStore, ensure_same_kind};
use crate::value::DeviceValue;
use opcua::server::prelude::*;
use opcua::sync::RwLock;
use std::sync::Arc;

/// Node id of a device object: `ns=<ns>;s=<device>`.
pub fn device_node_id(namespace: u16, device: &str) -> NodeId {
    NodeId::new(namespace, device.to_string())
}

/// Node id of a register variable: `ns=<ns>;s=<device>.<register>`.
pub fn register_node_id(namespace: u16, device: &str, register: &str) -> NodeId {
    NodeId::new(namespace, format!("{device}.{register}"))
}

/// Register the namespace URI, returning its index.
pub fn register_namespace(address_space: &RwLock<AddressSpace>, uri: &str) -> OpcResult<u16> {
    let mut space = address_space.write();
    space
        .register_namespace(uri)
        .map_err(|()| OpcError::InvalidState(format!("cannot register namespace '{uri}'")))
}

/// Set the Description attribute of the standard Server object.
pub fn set_server_description(
    address_space: &RwLock<AddressSpace>,
    description: &str,
) -> OpcResult<()> {
    let mut space = address_space.write();
    let server_id: NodeId = ObjectId::Server.into();
    let node = space
        .find_node_mut(&server_id)
        .ok_or_else(|| OpcError::NotFound("Server object".into()))?;
    node.as_mut_node()
        .set_attribute(
            AttributeId::Description,
            Variant::from(LocalizedText::new("", description)),
        )
        .map_err(OpcError::Status)
}

/// Device registers stored as variables under objects in one namespace.
#[derive(Clone)]
pub struct AddressSpaceStore {
    address_space: Arc<RwLock<AddressSpace>>,
    namespace: u16,
}

impl AddressSpaceStore {
    pub fn new(address_space: Arc<RwLock<AddressSpace>>, namespace: u16) -> Self {
        Self {
            address_space,
            namespace,
        }
    }

    pub const fn namespace(&self) -> u16 {
        self.namespace
    }

    fn read_node(space: &AddressSpace, node_id: &NodeId, label: &str) -> OpcResult<DeviceValue> {
        match space.find_node(node_id) {
            Some(NodeType::Variable(variable)) => {
                let data_value = variable.value(
                    TimestampsToReturn::Neither,
                    NumericRange::None,
                    &QualifiedName::null(),
                    0.0,
                );
                Ok(data_value
                    .value
                    .as_ref()
                    .map_or(DeviceValue::Empty, DeviceValue::from))
            }
            Some(_) => Err(OpcError::InvalidState(format!("{label} is not a variable"))),
            None => Err(OpcError::NotFound(format!("register '{label}'"))),
        }
    }
}

impl RegisterStore for AddressSpaceStore {
    fn add_device(&self, device: &str) -> OpcResult<()> {
        let node_id = device_node_id(self.namespace, device);
        let mut space = self.address_space.write();
        let inserted = ObjectBuilder::new(
            &node_id,
            QualifiedName::new(self.namespace, device),
            device,
        )
        .organized_by(ObjectId::ObjectsFolder)
        .insert(&mut space);

        if inserted {
            Ok(())
        } else {
            Err(OpcError::InvalidState(format!(
                "device '{device}' already exists"
            )))
        }
    }

    fn add_register(&self, device: &str, register: &Register) -> OpcResult<()> {
        let device_id = device_node_id(self.namespace, device);
        let node_id = register_node_id(self.namespace, device, register.name);
        let mut space = self.address_space.write();

        if space.find_node(&device_id).is_none() {
            return Err(OpcError::NotFound(format!("device '{device}'")));
        }

        let mut builder = VariableBuilder::new(
            &node_id,
            QualifiedName::new(self.namespace, register.name),
            register.name,
        )
        .data_type(register.initial.data_type())
        .value(register.initial.to_variant())
        .component_of(device_id);
        if register.writable {
            builder = builder.writable();
        }

        if builder.insert(&mut space) {
            Ok(())
        } else {
            Err(OpcError::InvalidState(format!(
                "register '{device}.{}' already exists",
                register.name
            )))
        }
    }

    fn read(&self, device: &str, register: &str) -> OpcResult<DeviceValue> {
        let node_id = register_node_id(self.namespace, device, register);
        let space = self.address_space.read();
        Self::read_node(&space, &node_id, &format!("{device}.{register}"))
    }

    fn write(&self, device: &str, register: &str, value: DeviceValue) -> OpcResult<()> {
        let node_id = register_node_id(self.namespace, device, register);
        let label = format!("{device}.{register}");
        let mut space = self.address_space.write();

        let current = Self::read_node(&space, &node_id, &label)?;
        ensure_same_kind(device, register, &current, &value)?;

        let now = DateTime::now();
        if space.set_variable_value(node_id, value.to_variant(), &now, &now) {
            Ok(())
        } else {
            Err(OpcError::NotFound(format!("register '{label}'")))
        }
    }
}
