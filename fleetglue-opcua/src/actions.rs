//! Device operations composed from provider reads and writes.
//!
//! These mirror what the devices do on the server: a state change always
//! stamps `LastStateChange` and a rising edge bumps `Count`. Every register an
//! action touches is read before its first write, so a device that lacks one
//! is rejected unchanged.

use crate::client::provider::{DeviceProvider, WriteResult};
use crate::device::timestamp_now;
use crate::error::{OpcError, OpcResult};
use crate::registers;
use crate::value::DeviceValue;

fn ensure_written(result: WriteResult) -> OpcResult<()> {
    if result.success {
        Ok(())
    } else {
        Err(OpcError::InvalidState(format!(
            "write to {}.{} rejected: {}",
            result.device,
            result.register,
            result.error.unwrap_or_else(|| "unknown error".into())
        )))
    }
}

async fn write(
    provider: &dyn DeviceProvider,
    endpoint: &str,
    device: &str,
    register: &str,
    value: DeviceValue,
) -> OpcResult<()> {
    ensure_written(
        provider
            .write_register(endpoint, device, register, value)
            .await?,
    )
}

async fn read_state(provider: &dyn DeviceProvider, endpoint: &str, device: &str) -> OpcResult<bool> {
    let read = provider
        .read_register(endpoint, device, registers::STATE)
        .await?;
    read.value.as_bool().ok_or_else(|| {
        OpcError::Conversion(format!(
            "{device}.{} is {}, expected Boolean",
            registers::STATE,
            read.value.kind_name()
        ))
    })
}

async fn set_state(
    provider: &dyn DeviceProvider,
    endpoint: &str,
    device: &str,
    state: bool,
) -> OpcResult<()> {
    write(provider, endpoint, device, registers::STATE, DeviceValue::Bool(state)).await?;
    write(
        provider,
        endpoint,
        device,
        registers::LAST_STATE_CHANGE,
        DeviceValue::Text(timestamp_now()),
    )
    .await
}

/// Next value of `Count`, after checking the device also has `LastStateChange`.
async fn next_count(provider: &dyn DeviceProvider, endpoint: &str, device: &str) -> OpcResult<i64> {
    last_state_change(provider, endpoint, device).await?;
    Ok(press_count(provider, endpoint, device).await? + 1)
}

async fn write_count(
    provider: &dyn DeviceProvider,
    endpoint: &str,
    device: &str,
    count: i64,
) -> OpcResult<()> {
    write(provider, endpoint, device, registers::COUNT, DeviceValue::Int(count)).await
}

/// Flip the switch state, returning the new state.
pub async fn toggle_switch(
    provider: &dyn DeviceProvider,
    endpoint: &str,
    device: &str,
) -> OpcResult<bool> {
    let new_state = !read_state(provider, endpoint, device).await?;
    let count = next_count(provider, endpoint, device).await?;
    set_state(provider, endpoint, device, new_state).await?;
    write_count(provider, endpoint, device, count).await?;
    tracing::info!(device, state = new_state, count, "switch toggled");
    Ok(new_state)
}

/// Press the button, returning the new press count.
pub async fn press_button(
    provider: &dyn DeviceProvider,
    endpoint: &str,
    device: &str,
) -> OpcResult<i64> {
    let count = next_count(provider, endpoint, device).await?;
    set_state(provider, endpoint, device, true).await?;
    write_count(provider, endpoint, device, count).await?;
    tracing::info!(device, count, "button pressed");
    Ok(count)
}

pub async fn release_button(
    provider: &dyn DeviceProvider,
    endpoint: &str,
    device: &str,
) -> OpcResult<()> {
    last_state_change(provider, endpoint, device).await?;
    set_state(provider, endpoint, device, false).await?;
    tracing::info!(device, "button released");
    Ok(())
}

/// Switch a light on or off.
pub async fn set_light(
    provider: &dyn DeviceProvider,
    endpoint: &str,
    device: &str,
    on: bool,
) -> OpcResult<()> {
    write(provider, endpoint, device, registers::STATE, DeviceValue::Bool(on)).await?;
    tracing::info!(device, on, "light switched");
    Ok(())
}

/// Press then release, returning the press count.
pub async fn press_and_release_button(
    provider: &dyn DeviceProvider,
    endpoint: &str,
    device: &str,
) -> OpcResult<i64> {
    let count = press_button(provider, endpoint, device).await?;
    release_button(provider, endpoint, device).await?;
    Ok(count)
}

/// Current value of the `Count` register.
pub async fn press_count(
    provider: &dyn DeviceProvider,
    endpoint: &str,
    device: &str,
) -> OpcResult<i64> {
    let read = provider
        .read_register(endpoint, device, registers::COUNT)
        .await?;
    read.value.as_int().ok_or_else(|| {
        OpcError::Conversion(format!(
            "{device}.{} is {}, expected Int32",
            registers::COUNT,
            read.value.kind_name()
        ))
    })
}

/// Current value of the `LastStateChange` register (empty if never changed).
pub async fn last_state_change(
    provider: &dyn DeviceProvider,
    endpoint: &str,
    device: &str,
) -> OpcResult<String> {
    let read = provider
        .read_register(endpoint, device, registers::LAST_STATE_CHANGE)
        .await?;
    match read.value {
        DeviceValue::Text(stamp) => Ok(stamp),
        DeviceValue::Empty => Ok(String::new()),
        other => Err(OpcError::Conversion(format!(
            "{device}.{} is {}, expected String",
            registers::LAST_STATE_CHANGE,
            other.kind_name()
        ))),
    }
}
