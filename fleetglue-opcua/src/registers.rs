//! Register names shared by the server's device models and the client.

use crate::value::DeviceValue;

/// Number of toggles or presses since the server started.
pub const COUNT: &str = "Count";
/// Current on/pressed state.
pub const STATE: &str = "State";
/// Device type name (`Switch`, `Button`, `Light`).
pub const TYPE: &str = "Type";
/// Whether the device is simulated rather than backed by hardware.
pub const VIRTUAL: &str = "Virtual";
/// RFC 3339 timestamp of the most recent state change.
pub const LAST_STATE_CHANGE: &str = "LastStateChange";
/// GPIO pin the device would be wired to.
pub const PIN: &str = "Pin";

/// Declaration of a single register on a device object.
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub name: &'static str,
    pub initial: DeviceValue,
    pub writable: bool,
}

impl Register {
    pub fn writable(name: &'static str, initial: impl Into<DeviceValue>) -> Self {
        Self {
            name,
            initial: initial.into(),
            writable: true,
        }
    }

    pub fn read_only(name: &'static str, initial: impl Into<DeviceValue>) -> Self {
        Self {
            name,
            initial: initial.into(),
            writable: false,
        }
    }
}
