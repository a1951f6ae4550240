use super::{Device, DeviceKind, read_bool};
use crate::error::{OpcError, OpcResult};
use crate::registers::{self, Register};
use crate::store::RegisterStore;
use std::sync::Mutex;
use std::time::Duration;

/// Default period at which a light samples its `State` register.
pub const LIGHT_INTERVAL: Duration = Duration::from_millis(500);

/// Output device controlled by clients writing its `State` register.
///
/// The tick only observes: it reports every change a client makes.
#[derive(Debug)]
pub struct VirtualLight {
    name: String,
    pin: Option<u32>,
    update_interval: Duration,
    last_seen: Mutex<Option<bool>>,
}

impl VirtualLight {
    pub fn new(name: impl Into<String>, pin: Option<u32>) -> Self {
        Self {
            name: name.into(),
            pin,
            update_interval: LIGHT_INTERVAL,
            last_seen: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_interval(mut self, update_interval: Duration) -> Self {
        self.update_interval = update_interval;
        self
    }

    pub fn is_on(&self, store: &dyn RegisterStore) -> OpcResult<bool> {
        read_bool(store, &self.name, registers::STATE)
    }

    /// Compare the register with the last observed state.
    /// Returns the new state if it changed since the previous call.
    fn observe(&self, store: &dyn RegisterStore) -> OpcResult<Option<bool>> {
        let current = self.is_on(store)?;
        let mut last = self
            .last_seen
            .lock()
            .map_err(|_| OpcError::Internal("light state lock poisoned".into()))?;
        let changed = match *last {
            None => {
                tracing::info!(device = %self.name, state = current, "initial state");
                None
            }
            Some(prev) if prev != current => Some(current),
            Some(_) => None,
        };
        *last = Some(current);
        Ok(changed)
    }
}

impl Device for VirtualLight {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Light
    }

    fn update_interval(&self) -> Duration {
        self.update_interval
    }

    fn pin(&self) -> Option<u32> {
        self.pin
    }

    fn registers(&self) -> Vec<Register> {
        vec![Register::writable(registers::STATE, false)]
    }

    // Always watched: the light has no behaviour besides reporting changes.
    fn is_simulated(&self) -> bool {
        true
    }

    fn tick(&self, store: &dyn RegisterStore) -> OpcResult<()> {
        if let Some(state) = self.observe(store)? {
            tracing::info!(device = %self.name, state, "changed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::initialize;
    use crate::store::MemoryStore;
    use crate::value::DeviceValue;

    #[test]
    fn test_light_registers() {
        let store = MemoryStore::new();
        let light = VirtualLight::new("Light1", Some(18));
        initialize(&light, &store).unwrap();

        assert_eq!(
            store.registers("Light1"),
            vec![
                registers::STATE,
                registers::TYPE,
                registers::VIRTUAL,
                registers::PIN
            ]
        );
        assert!(!light.is_on(&store).unwrap());
    }

    #[test]
    fn test_observe_reports_changes_once() {
        let store = MemoryStore::new();
        let light = VirtualLight::new("Light1", None);
        initialize(&light, &store).unwrap();

        assert_eq!(light.observe(&store).unwrap(), None);

        store
            .write("Light1", registers::STATE, DeviceValue::Bool(true))
            .unwrap();
        assert_eq!(light.observe(&store).unwrap(), Some(true));
        assert_eq!(light.observe(&store).unwrap(), None);

        store
            .write("Light1", registers::STATE, DeviceValue::Bool(false))
            .unwrap();
        assert_eq!(light.observe(&store).unwrap(), Some(false));
    }
}
