use super::{Device, DeviceKind, bump_count, read_bool, set_state, stateful_registers};
use crate::error::OpcResult;
use crate::registers::{self, Register};
use crate::store::RegisterStore;
use rand::Rng;
use std::time::Duration;

/// Default polling period of a button, matching a 10 Hz GPIO scan.
pub const BUTTON_INTERVAL: Duration = Duration::from_millis(100);

/// Probability per tick that a simulated button changes state.
const SIMULATED_FLIP_PROBABILITY: f64 = 0.05;

/// Momentary push button.
#[derive(Debug, Clone)]
pub struct VirtualButton {
    name: String,
    pin: Option<u32>,
    update_interval: Duration,
    simulate: bool,
}

impl VirtualButton {
    pub fn new(name: impl Into<String>, pin: Option<u32>) -> Self {
        Self {
            name: name.into(),
            pin,
            update_interval: BUTTON_INTERVAL,
            simulate: false,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, update_interval: Duration) -> Self {
        self.update_interval = update_interval;
        self
    }

    #[must_use]
    pub fn simulated(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Push the button down. Returns the new press count.
    pub fn press(&self, store: &dyn RegisterStore) -> OpcResult<i64> {
        set_state(store, &self.name, true)?;
        let count = bump_count(store, &self.name)?;
        tracing::info!(device = %self.name, count, "pressed");
        Ok(count)
    }

    pub fn release(&self, store: &dyn RegisterStore) -> OpcResult<()> {
        set_state(store, &self.name, false)?;
        tracing::info!(device = %self.name, "released");
        Ok(())
    }

    /// A full click. Returns the new press count.
    pub fn press_and_release(&self, store: &dyn RegisterStore) -> OpcResult<i64> {
        let count = self.press(store)?;
        self.release(store)?;
        Ok(count)
    }

    pub fn press_count(&self, store: &dyn RegisterStore) -> OpcResult<i64> {
        super::read_count(store, &self.name)
    }

    pub fn last_state_change(&self, store: &dyn RegisterStore) -> OpcResult<String> {
        Ok(store
            .read(&self.name, registers::LAST_STATE_CHANGE)?
            .to_string())
    }

    /// Apply one simulated step given whether the state flips this tick.
    fn step(&self, store: &dyn RegisterStore, flip: bool) -> OpcResult<()> {
        if !flip {
            return Ok(());
        }
        if read_bool(store, &self.name, registers::STATE)? {
            self.release(store)
        } else {
            self.press(store).map(|_| ())
        }
    }
}

impl Device for VirtualButton {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Button
    }

    fn update_interval(&self) -> Duration {
        self.update_interval
    }

    fn pin(&self) -> Option<u32> {
        self.pin
    }

    fn registers(&self) -> Vec<Register> {
        stateful_registers()
    }

    fn is_simulated(&self) -> bool {
        self.simulate
    }

    fn tick(&self, store: &dyn RegisterStore) -> OpcResult<()> {
        let flip = rand::rng().random_bool(SIMULATED_FLIP_PROBABILITY);
        self.step(store, flip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::initialize;
    use crate::store::MemoryStore;
    use crate::value::DeviceValue;

    fn setup() -> (MemoryStore, VirtualButton) {
        let store = MemoryStore::new();
        let button = VirtualButton::new("Button1", Some(17));
        initialize(&button, &store).unwrap();
        (store, button)
    }

    fn state(store: &MemoryStore) -> DeviceValue {
        store.read("Button1", registers::STATE).unwrap()
    }

    #[test]
    fn test_press_then_release() {
        let (store, button) = setup();

        assert_eq!(button.press(&store).unwrap(), 1);
        assert_eq!(state(&store), DeviceValue::Bool(true));

        button.release(&store).unwrap();
        assert_eq!(state(&store), DeviceValue::Bool(false));
        assert_eq!(button.press_count(&store).unwrap(), 1);
    }

    #[test]
    fn test_press_and_release_counts_once() {
        let (store, button) = setup();

        assert_eq!(button.press_and_release(&store).unwrap(), 1);
        assert_eq!(button.press_and_release(&store).unwrap(), 2);
        assert_eq!(state(&store), DeviceValue::Bool(false));
        assert!(!button.last_state_change(&store).unwrap().is_empty());
    }

    #[test]
    fn test_release_does_not_count() {
        let (store, button) = setup();
        button.release(&store).unwrap();
        assert_eq!(button.press_count(&store).unwrap(), 0);
    }

    #[test]
    fn test_simulated_step_counts_rising_edges_only() {
        let (store, button) = setup();

        button.step(&store, false).unwrap();
        assert_eq!(button.press_count(&store).unwrap(), 0);

        button.step(&store, true).unwrap(); // up -> down
        assert_eq!(state(&store), DeviceValue::Bool(true));
        assert_eq!(button.press_count(&store).unwrap(), 1);

        button.step(&store, true).unwrap(); // down -> up
        assert_eq!(state(&store), DeviceValue::Bool(false));
        assert_eq!(button.press_count(&store).unwrap(), 1);
    }

    #[test]
    fn test_defaults() {
        let button = VirtualButton::new("B", None);
        assert_eq!(button.update_interval(), BUTTON_INTERVAL);
        assert_eq!(button.pin(), None);
        assert_eq!(button.kind(), DeviceKind::Button);
    }
}
