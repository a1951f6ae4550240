//! Virtual device models hosted by the server.
//!
//! A device owns no state of its own: everything observable lives in its
//! registers, so values written by network clients and by the device's own
//! simulation never diverge.

mod button;
mod light;
pub mod runtime;
mod switch;

pub use button::VirtualButton;
pub use light::VirtualLight;
pub use switch::VirtualSwitch;

use crate::error::{OpcError, OpcResult};
use crate::registers::{self, Register};
use crate::store::RegisterStore;
use crate::value::DeviceValue;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of device, published in the `Type` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Switch,
    Button,
    Light,
}

impl DeviceKind {
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Switch => "Switch",
            Self::Button => "Button",
            Self::Light => "Light",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A device exposed as an object in the server's namespace.
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> DeviceKind;

    /// Period between simulation ticks.
    fn update_interval(&self) -> Duration;

    /// GPIO pin, published as metadata only.
    fn pin(&self) -> Option<u32> {
        None
    }

    /// Device-specific registers. Metadata registers are added by [`initialize`].
    fn registers(&self) -> Vec<Register>;

    /// Whether the runtime should drive [`Device::tick`] in the background.
    fn is_simulated(&self) -> bool {
        false
    }

    /// One step of the device's background behaviour.
    fn tick(&self, _store: &dyn RegisterStore) -> OpcResult<()> {
        Ok(())
    }
}

/// Create the device object and all of its registers in `store`.
pub fn initialize(device: &dyn Device, store: &dyn RegisterStore) -> OpcResult<()> {
    let name = device.name();
    store.add_device(name)?;

    for register in device.registers() {
        store.add_register(name, &register)?;
    }

    store.add_register(
        name,
        &Register::read_only(registers::TYPE, device.kind().type_name()),
    )?;
    store.add_register(name, &Register::read_only(registers::VIRTUAL, true))?;
    if let Some(pin) = device.pin() {
        let pin = i64::from(pin);
        store.add_register(name, &Register::read_only(registers::PIN, DeviceValue::Int(pin)))?;
    }

    tracing::debug!(device = %name, kind = %device.kind(), "device nodes created");
    Ok(())
}

/// Current UTC time in the format stored in `LastStateChange`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Registers shared by stateful devices: state, change stamp and counter.
fn stateful_registers() -> Vec<Register> {
    vec![
        Register::writable(registers::STATE, false),
        Register::writable(registers::LAST_STATE_CHANGE, ""),
        Register::writable(registers::COUNT, 0),
    ]
}

fn read_bool(store: &dyn RegisterStore, device: &str, register: &str) -> OpcResult<bool> {
    let value = store.read(device, register)?;
    value.as_bool().ok_or_else(|| {
        OpcError::Conversion(format!(
            "{device}.{register} is {}, expected Boolean",
            value.kind_name()
        ))
    })
}

fn read_count(store: &dyn RegisterStore, device: &str) -> OpcResult<i64> {
    let value = store.read(device, registers::COUNT)?;
    value.as_int().ok_or_else(|| {
        OpcError::Conversion(format!(
            "{device}.{} is {}, expected Int32",
            registers::COUNT,
            value.kind_name()
        ))
    })
}

/// Write a new state and stamp the change time.
fn set_state(store: &dyn RegisterStore, device: &str, state: bool) -> OpcResult<()> {
    store.write(device, registers::STATE, DeviceValue::Bool(state))?;
    store.write(
        device,
        registers::LAST_STATE_CHANGE,
        DeviceValue::Text(timestamp_now()),
    )
}

/// Increment the counter, returning the new count.
fn bump_count(store: &dyn RegisterStore, device: &str) -> OpcResult<i64> {
    let count = read_count(store, device)? + 1;
    store.write(device, registers::COUNT, DeviceValue::Int(count))?;
    Ok(count)
}
