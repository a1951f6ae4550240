use super::{Device, DeviceKind, bump_count, read_bool, set_state, stateful_registers};
use crate::error::OpcResult;
use crate::registers::{self, Register};
use crate::store::RegisterStore;
use std::time::Duration;

/// Two-position switch. When simulated it toggles itself every interval.
#[derive(Debug, Clone)]
pub struct VirtualSwitch {
    name: String,
    update_interval: Duration,
    simulate: bool,
}

impl VirtualSwitch {
    pub fn new(name: impl Into<String>, update_interval: Duration) -> Self {
        Self {
            name: name.into(),
            update_interval,
            simulate: false,
        }
    }

    #[must_use]
    pub fn simulated(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Flip the state, stamp the change and count it. Returns the new state.
    pub fn toggle(&self, store: &dyn RegisterStore) -> OpcResult<bool> {
        let current = read_bool(store, &self.name, registers::STATE)?;
        tracing::info!(device = %self.name, state = current, "current state");

        let new_state = !current;
        set_state(store, &self.name, new_state)?;
        let count = bump_count(store, &self.name)?;
        tracing::info!(device = %self.name, state = new_state, count, "state set");
        Ok(new_state)
    }

    pub fn switch_count(&self, store: &dyn RegisterStore) -> OpcResult<i64> {
        super::read_count(store, &self.name)
    }

    pub fn last_state_change(&self, store: &dyn RegisterStore) -> OpcResult<String> {
        Ok(store
            .read(&self.name, registers::LAST_STATE_CHANGE)?
            .to_string())
    }
}

impl Device for VirtualSwitch {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Switch
    }

    fn update_interval(&self) -> Duration {
        self.update_interval
    }

    fn registers(&self) -> Vec<Register> {
        stateful_registers()
    }

    fn is_simulated(&self) -> bool {
        self.simulate
    }

    fn tick(&self, store: &dyn RegisterStore) -> OpcResult<()> {
        self.toggle(store).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::initialize;
    use crate::store::MemoryStore;
    use crate::value::DeviceValue;

    fn setup() -> (MemoryStore, VirtualSwitch) {
        let store = MemoryStore::new();
        let switch = VirtualSwitch::new("VirtualSwitch", Duration::from_secs(2));
        initialize(&switch, &store).unwrap();
        (store, switch)
    }

    #[test]
    fn test_toggle_flips_state_and_counts() {
        let (store, switch) = setup();

        assert!(switch.toggle(&store).unwrap());
        assert_eq!(
            store.read("VirtualSwitch", registers::STATE).unwrap(),
            DeviceValue::Bool(true)
        );
        assert_eq!(switch.switch_count(&store).unwrap(), 1);
        assert!(!switch.last_state_change(&store).unwrap().is_empty());
    }

    #[test]
    fn test_toggle_twice_restores_state() {
        let (store, switch) = setup();

        switch.toggle(&store).unwrap();
        assert!(!switch.toggle(&store).unwrap());
        assert_eq!(switch.switch_count(&store).unwrap(), 2);
    }

    #[test]
    fn test_toggle_sees_external_writes() {
        let (store, switch) = setup();
        // A network client turned it on and bumped the count itself.
        store
            .write("VirtualSwitch", registers::STATE, DeviceValue::Bool(true))
            .unwrap();
        store
            .write("VirtualSwitch", registers::COUNT, DeviceValue::Int(5))
            .unwrap();

        assert!(!switch.toggle(&store).unwrap());
        assert_eq!(switch.switch_count(&store).unwrap(), 6);
    }

    #[test]
    fn test_simulated_flag_and_tick() {
        let (store, switch) = setup();
        assert!(!switch.is_simulated());
        assert!(switch.clone().simulated(true).is_simulated());

        switch.tick(&store).unwrap();
        assert_eq!(switch.switch_count(&store).unwrap(), 1);
    }
}
