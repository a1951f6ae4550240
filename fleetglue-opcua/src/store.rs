//! Register storage seam between device models and the address space.
//!
//! Devices never touch the OPC UA address space directly; they read and write
//! registers through [`RegisterStore`]. The server backs it with the live
//! address space, tests with [`MemoryStore`].

use crate::error::{OpcError, OpcResult};
use crate::registers::Register;
use crate::value::DeviceValue;

/// Server-side access to device registers.
///
/// Writes made through the store are local to the server and bypass the
/// access level that restricts network clients.
pub trait RegisterStore: Send + Sync {
    /// Create the object node for a device.
    fn add_device(&self, device: &str) -> OpcResult<()>;

    /// Create a register variable under an existing device.
    fn add_register(&self, device: &str, register: &Register) -> OpcResult<()>;

    /// Read the current value of a register.
    fn read(&self, device: &str, register: &str) -> OpcResult<DeviceValue>;

    /// Replace the value of a register, keeping its type.
    fn write(&self, device: &str, register: &str, value: DeviceValue) -> OpcResult<()>;
}

/// Rejects a write that would change the type of a register.
pub fn ensure_same_kind(
    device: &str,
    register: &str,
    current: &DeviceValue,
    new: &DeviceValue,
) -> OpcResult<()> {
    if current.same_kind(new) {
        Ok(())
    } else {
        Err(OpcError::Conversion(format!(
            "{device}.{register} holds {}, cannot store {}",
            current.kind_name(),
            new.kind_name()
        )))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;

#[cfg(any(test, feature = "test-support"))]
mod memory {
    use super::{RegisterStore, ensure_same_kind};
    use crate::error::{OpcError, OpcResult};
    use crate::registers::Register;
    use crate::value::DeviceValue;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct DeviceEntry {
        name: String,
        registers: Vec<(Register, DeviceValue)>,
    }

    /// In-memory [`RegisterStore`] used by tests and by the mock-driven TUI.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        devices: Mutex<Vec<DeviceEntry>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Device names in insertion order.
        pub fn devices(&self) -> Vec<String> {
            self.devices
                .lock()
                .map(|d| d.iter().map(|e| e.name.clone()).collect())
                .unwrap_or_default()
        }

        /// Register names of a device in insertion order.
        pub fn registers(&self, device: &str) -> Vec<String> {
            self.devices
                .lock()
                .ok()
                .and_then(|d| {
                    d.iter().find(|e| e.name == device).map(|e| {
                        e.registers
                            .iter()
                            .map(|(r, _)| r.name.to_string())
                            .collect()
                    })
                })
                .unwrap_or_default()
        }

        fn with_device<R>(
            &self,
            device: &str,
            f: impl FnOnce(&mut DeviceEntry) -> OpcResult<R>,
        ) -> OpcResult<R> {
            let mut devices = self
                .devices
                .lock()
                .map_err(|_| OpcError::Internal("memory store lock poisoned".into()))?;
            let entry = devices
                .iter_mut()
                .find(|e| e.name == device)
                .ok_or_else(|| OpcError::NotFound(format!("device '{device}'")))?;
            f(entry)
        }
    }

    impl RegisterStore for MemoryStore {
        fn add_device(&self, device: &str) -> OpcResult<()> {
            let mut devices = self
                .devices
                .lock()
                .map_err(|_| OpcError::Internal("memory store lock poisoned".into()))?;
            if devices.iter().any(|e| e.name == device) {
                return Err(OpcError::InvalidState(format!(
                    "device '{device}' already exists"
                )));
            }
            devices.push(DeviceEntry {
                name: device.to_string(),
                registers: Vec::new(),
            });
            Ok(())
        }

        fn add_register(&self, device: &str, register: &Register) -> OpcResult<()> {
            self.with_device(device, |entry| {
                if entry.registers.iter().any(|(r, _)| r.name == register.name) {
                    return Err(OpcError::InvalidState(format!(
                        "register '{device}.{}' already exists",
                        register.name
                    )));
                }
                entry
                    .registers
                    .push((register.clone(), register.initial.clone()));
                Ok(())
            })
        }

        fn read(&self, device: &str, register: &str) -> OpcResult<DeviceValue> {
            self.with_device(device, |entry| {
                entry
                    .registers
                    .iter()
                    .find(|(r, _)| r.name == register)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| OpcError::NotFound(format!("register '{device}.{register}'")))
            })
        }

        fn write(&self, device: &str, register: &str, value: DeviceValue) -> OpcResult<()> {
            self.with_device(device, |entry| {
                let slot = entry
                    .registers
                    .iter_mut()
                    .find(|(r, _)| r.name == register)
                    .map(|(_, v)| v)
                    .ok_or_else(|| {
                        OpcError::NotFound(format!("register '{device}.{register}'"))
                    })?;
                ensure_same_kind(device, register, slot, &value)?;
                *slot = value;
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store.add_device("Dev").unwrap();
        store
            .add_register("Dev", &Register::writable("State", false))
            .unwrap();

        store.write("Dev", "State", DeviceValue::Bool(true)).unwrap();
        assert_eq!(store.read("Dev", "State").unwrap(), DeviceValue::Bool(true));
        assert_eq!(store.registers("Dev"), vec!["State".to_string()]);
    }

    #[test]
    fn test_memory_store_rejects_kind_change() {
        let store = MemoryStore::new();
        store.add_device("Dev").unwrap();
        store
            .add_register("Dev", &Register::writable("Count", 0))
            .unwrap();

        let err = store
            .write("Dev", "Count", DeviceValue::Text("one".into()))
            .unwrap_err();
        assert!(matches!(err, OpcError::Conversion(_)));
        assert_eq!(store.read("Dev", "Count").unwrap(), DeviceValue::Int(0));
    }

    #[test]
    fn test_memory_store_unknown_targets() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.read("Missing", "State"),
            Err(OpcError::NotFound(_))
        ));

        store.add_device("Dev").unwrap();
        assert!(matches!(
            store.write("Dev", "Missing", DeviceValue::Bool(true)),
            Err(OpcError::NotFound(_))
        ));
    }

    #[test]
    fn test_memory_store_duplicate_device() {
        let store = MemoryStore::new();
        store.add_device("Dev").unwrap();
        assert!(matches!(
            store.add_device("Dev"),
            Err(OpcError::InvalidState(_))
        ));
    }
}
