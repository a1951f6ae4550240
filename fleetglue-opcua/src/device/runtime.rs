//! Background tasks driving simulated devices.

use super::Device;
use crate::store::RegisterStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// How long `stop` waits for a device task before abandoning it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to a running device task.
pub struct DeviceTask {
    pub name: String,
    handle: JoinHandle<()>,
}

impl DeviceTask {
    /// Wait for the task to finish after shutdown was signalled.
    pub async fn join(self) {
        match tokio::time::timeout(STOP_TIMEOUT, self.handle).await {
            Ok(Ok(())) => tracing::info!(device = %self.name, "device stopped"),
            Ok(Err(e)) => tracing::error!(device = %self.name, error = %e, "device task failed"),
            Err(_) => tracing::warn!(
                device = %self.name,
                timeout_secs = STOP_TIMEOUT.as_secs(),
                "device task did not stop in time"
            ),
        }
    }
}

/// Start the background loop of `device`, if it has one.
///
/// The loop calls [`Device::tick`] every update interval until `shutdown`
/// flips to `true` or its sender is dropped. Tick errors are logged and the
/// loop keeps running.
pub fn spawn_device(
    device: Arc<dyn Device>,
    store: Arc<dyn RegisterStore>,
    mut shutdown: watch::Receiver<bool>,
) -> Option<DeviceTask> {
    if !device.is_simulated() {
        tracing::info!(device = %device.name(), "device started (passive)");
        return None;
    }

    let name = device.name().to_string();
    let period = device.update_interval().max(Duration::from_millis(1));
    let span = tracing::info_span!("device.run", device = %name);
    let handle = tokio::spawn(
        async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the initial
            // register values stay visible for one period.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = device.tick(store.as_ref()) {
                            tracing::warn!(error = %e, "device tick failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }
        .instrument(span),
    );

    tracing::info!(device = %name, interval_ms = period.as_millis(), "device started");
    Some(DeviceTask { name, handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{VirtualButton, VirtualSwitch, initialize};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_simulated_switch_toggles_until_stopped() {
        let store = Arc::new(MemoryStore::new());
        let switch = VirtualSwitch::new("S", Duration::from_millis(10)).simulated(true);
        initialize(&switch, store.as_ref()).unwrap();
        let reader = switch.clone();

        let (tx, rx) = watch::channel(false);
        let task = spawn_device(Arc::new(switch), store.clone(), rx).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        task.join().await;

        let count = reader.switch_count(store.as_ref()).unwrap();
        assert!(count >= 1, "expected at least one toggle, got {count}");

        // No more ticks once stopped.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(reader.switch_count(store.as_ref()).unwrap(), count);
    }

    #[tokio::test]
    async fn test_passive_device_spawns_nothing() {
        let store = Arc::new(MemoryStore::new());
        let button = VirtualButton::new("B", None);
        initialize(&button, store.as_ref()).unwrap();

        let (_tx, rx) = watch::channel(false);
        assert!(spawn_device(Arc::new(button), store, rx).is_none());
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_task() {
        let store = Arc::new(MemoryStore::new());
        let switch = VirtualSwitch::new("S", Duration::from_secs(60)).simulated(true);
        initialize(&switch, store.as_ref()).unwrap();

        let (tx, rx) = watch::channel(false);
        let task = spawn_device(Arc::new(switch), store, rx).unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), task.join())
            .await
            .expect("task should stop when the sender is dropped");
    }
}
