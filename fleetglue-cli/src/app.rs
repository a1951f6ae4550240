use fleetglue_opcua::{
    DeviceProvider, DeviceValue, Endpoint, OpcError, OpcResult, RegisterValue, WriteResult,
    actions, friendly_hint,
};
use ratatui::widgets::{ListState, TableState};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Timeout for connecting, listing and reading.
const OPC_TIMEOUT_SECS: u64 = 30;

/// Timeout for writes and device actions.
const OPC_WRITE_TIMEOUT_SECS: u64 = 10;

/// Interval between automatic register refreshes.
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

const PAGE_SIZE: usize = 20;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CurrentScreen {
    Home,
    Loading,
    DeviceList,
    DeviceInfo,
    WriteInput,
    Exiting,
}

/// One-key operations on the device being viewed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DeviceAction {
    Toggle,
    Press,
    Release,
    PressAndRelease,
    Count,
    LightOn,
    LightOff,
}

impl DeviceAction {
    const fn verb(self) -> &'static str {
        match self {
            Self::Toggle => "Toggling",
            Self::Press => "Pressing",
            Self::Release => "Releasing",
            Self::PressAndRelease => "Pressing and releasing",
            Self::Count => "Reading count of",
            Self::LightOn => "Switching on",
            Self::LightOff => "Switching off",
        }
    }
}

type Pending<T> = Option<oneshot::Receiver<OpcResult<T>>>;

/// Main application state for the device client TUI.
///
/// Manages the current screen, the device list, the registers of the open
/// device, and the receivers of background OPC UA operations.
pub struct App {
    pub endpoint_input: String,
    /// Endpoint the device list was fetched from.
    pub endpoint: Option<String>,
    pub devices: Vec<String>,
    pub selected_index: Option<usize>,
    pub current_screen: CurrentScreen,
    pub provider: Arc<dyn DeviceProvider>,
    pub messages: Vec<String>,
    pub list_state: ListState,
    pub table_state: TableState,
    pub fetch_result_rx: Pending<Vec<String>>,

    /// Device whose registers are shown.
    pub current_device: Option<String>,
    pub registers: Vec<RegisterValue>,
    pub read_result_rx: Pending<Vec<RegisterValue>>,
    /// Tracks when the last successful read completed.
    pub last_read_time: Option<std::time::Instant>,
    pub action_result_rx: Pending<String>,

    /// Register being edited for writing.
    pub write_register: Option<String>,
    pub write_value_input: String,
    pub write_result_rx: Pending<WriteResult>,
}

impl App {
    /// Create a new `App` talking to `provider`, prefilled with `endpoint`.
    pub fn new(provider: Arc<dyn DeviceProvider>, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint_input: endpoint.into(),
            endpoint: None,
            devices: Vec::new(),
            selected_index: None,
            current_screen: CurrentScreen::Home,
            provider,
            messages: Vec::new(),
            list_state: ListState::default(),
            table_state: TableState::default(),
            fetch_result_rx: None,
            current_device: None,
            registers: Vec::new(),
            read_result_rx: None,
            last_read_time: None,
            action_result_rx: None,
            write_register: None,
            write_value_input: String::new(),
            write_result_rx: None,
        }
    }

    pub fn add_message(&mut self, message: String) {
        self.messages.push(message);
        if self.messages.len() > 10 {
            self.messages.remove(0);
        }
    }

    fn add_error(&mut self, context: &str, e: &OpcError) {
        let msg = match friendly_hint(e) {
            Some(h) => format!("{context}: {h} ({e})"),
            None => format!("{context}: {e}"),
        };
        self.add_message(msg);
    }

    // Actions
    pub fn start_fetch_devices(&mut self) {
        let endpoint = self.endpoint_input.trim().to_string();
        if let Err(e) = Endpoint::parse(&endpoint) {
            tracing::debug!(endpoint = %endpoint, error = %e, "start_fetch_devices: rejected input");
            self.add_message(format!("{e}"));
            return;
        }

        self.current_screen = CurrentScreen::Loading;
        self.add_message(format!("Connecting to {endpoint}..."));
        self.endpoint = Some(endpoint.clone());

        let provider = Arc::clone(&self.provider);
        self.fetch_result_rx = Some(spawn_with_timeout(
            "Device listing",
            OPC_TIMEOUT_SECS,
            async move { provider.list_devices(&endpoint).await },
        ));
    }

    pub fn poll_fetch_result(&mut self) {
        let Some(rx) = &mut self.fetch_result_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(devices)) => {
                self.devices = devices;
                self.current_screen = CurrentScreen::DeviceList;
                if self.devices.is_empty() {
                    self.selected_index = None;
                    self.list_state.select(None);
                } else {
                    self.selected_index = Some(0);
                    self.list_state.select(Some(0));
                }
                let endpoint = self.endpoint.clone().unwrap_or_default();
                self.add_message(format!(
                    "Found {} devices on {endpoint}",
                    self.devices.len()
                ));
                self.fetch_result_rx = None;
            }
            Ok(Err(e)) => {
                self.current_screen = CurrentScreen::Home;
                tracing::error!(error = %e, "Failed to list devices");
                self.add_error("Error listing devices", &e);
                self.fetch_result_rx = None;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                self.current_screen = CurrentScreen::Home;
                tracing::error!("Device listing task terminated unexpectedly (sender dropped)");
                self.add_message("Device listing task terminated unexpectedly".into());
                self.fetch_result_rx = None;
            }
        }
    }

    fn list_len(&self) -> usize {
        match self.current_screen {
            CurrentScreen::DeviceList => self.devices.len(),
            CurrentScreen::DeviceInfo => self.registers.len(),
            _ => 0,
        }
    }

    fn select(&mut self, idx: Option<usize>) {
        self.selected_index = idx;
        self.list_state.select(idx);
        if self.current_screen == CurrentScreen::DeviceInfo {
            self.table_state.select(idx);
        }
    }

    pub fn select_next(&mut self) {
        let count = self.list_len();
        if count == 0 {
            return;
        }
        match self.selected_index {
            Some(idx) if idx < count - 1 => self.select(Some(idx + 1)),
            Some(_) => {}
            None => self.select(Some(0)),
        }
    }

    pub fn select_prev(&mut self) {
        if let Some(idx) = self.selected_index
            && idx > 0
        {
            self.select(Some(idx - 1));
        }
    }

    /// Jump forward by a page (clamped to end of list).
    pub fn page_down(&mut self) {
        let count = self.list_len();
        if count == 0 {
            return;
        }
        let new_idx = self
            .selected_index
            .map_or(0, |idx| (idx + PAGE_SIZE).min(count - 1));
        self.select(Some(new_idx));
    }

    /// Jump backward by a page (clamped to start of list).
    pub fn page_up(&mut self) {
        if self.list_len() == 0 {
            return;
        }
        let new_idx = self
            .selected_index
            .map_or(0, |idx| idx.saturating_sub(PAGE_SIZE));
        self.select(Some(new_idx));
    }

    /// Open the highlighted device and read its registers.
    pub fn start_read_device(&mut self) {
        if self.current_screen != CurrentScreen::DeviceList {
            return;
        }
        let Some(device) = self
            .selected_index
            .and_then(|idx| self.devices.get(idx))
            .cloned()
        else {
            return;
        };

        tracing::info!(device = %device, "start_read_device");
        self.current_device = Some(device.clone());
        self.registers.clear();
        self.current_screen = CurrentScreen::Loading;
        self.add_message(format!("Reading {device}..."));
        self.spawn_read();
    }

    /// Spawn a read of the current device, if there is one.
    fn spawn_read(&mut self) -> bool {
        let (Some(endpoint), Some(device)) = (self.endpoint.clone(), self.current_device.clone())
        else {
            return false;
        };
        let provider = Arc::clone(&self.provider);
        self.read_result_rx = Some(spawn_with_timeout(
            "Register read",
            OPC_TIMEOUT_SECS,
            async move { provider.read_device(&endpoint, &device).await },
        ));
        true
    }

    pub fn poll_read_result(&mut self) {
        let Some(rx) = &mut self.read_result_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(values)) => {
                let first_read = self.current_screen == CurrentScreen::Loading;
                self.registers = values;
                if self.current_screen != CurrentScreen::WriteInput {
                    self.current_screen = CurrentScreen::DeviceInfo;
                }
                if self.registers.is_empty() {
                    self.selected_index = None;
                    self.table_state.select(None);
                } else {
                    let idx = self
                        .selected_index
                        .filter(|_| !first_read)
                        .map_or(0, |idx| idx.min(self.registers.len() - 1));
                    self.selected_index = Some(idx);
                    self.table_state.select(Some(idx));
                }

                let bad = self
                    .registers
                    .iter()
                    .filter(|r| r.quality.starts_with("Bad"))
                    .count();
                if first_read {
                    let device = self.current_device.clone().unwrap_or_default();
                    if bad > 0 {
                        self.add_message(format!(
                            "Read {} registers of {device} (⚠ {bad} bad)",
                            self.registers.len()
                        ));
                    } else {
                        self.add_message(format!(
                            "Read {} registers of {device}",
                            self.registers.len()
                        ));
                    }
                }

                self.last_read_time = Some(std::time::Instant::now());
                self.read_result_rx = None;
            }
            Ok(Err(e)) => {
                self.current_screen = CurrentScreen::DeviceList;
                tracing::error!(error = %e, "Read device failed");
                self.add_error("Error reading device", &e);
                self.restore_device_selection();
                self.current_device = None;
                self.registers.clear();
                self.last_read_time = None;
                self.read_result_rx = None;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                self.current_screen = CurrentScreen::DeviceList;
                tracing::error!("Read background task terminated unexpectedly (sender dropped)");
                self.add_message("Read task terminated unexpectedly".into());
                self.restore_device_selection();
                self.read_result_rx = None;
            }
        }
    }

    pub fn maybe_auto_refresh(&mut self) {
        if self.current_screen != CurrentScreen::DeviceInfo {
            return;
        }
        if self.read_result_rx.is_some() {
            return;
        }
        let Some(last) = self.last_read_time else {
            return;
        };
        if last.elapsed() < REFRESH_INTERVAL {
            return;
        }
        tracing::trace!("Auto-refreshing registers");
        self.spawn_read();
    }

    /// Run `action` against the open device.
    pub fn start_action(&mut self, action: DeviceAction) {
        if self.current_screen != CurrentScreen::DeviceInfo {
            return;
        }
        if self.action_result_rx.is_some() {
            self.add_message("Another action is still running".into());
            return;
        }
        let (Some(endpoint), Some(device)) = (self.endpoint.clone(), self.current_device.clone())
        else {
            self.add_message("No device context for action".into());
            return;
        };

        tracing::info!(device = %device, action = ?action, "start_action");
        self.add_message(format!("{} {device}...", action.verb()));

        let provider = Arc::clone(&self.provider);
        self.action_result_rx = Some(spawn_with_timeout(
            "Device action",
            OPC_WRITE_TIMEOUT_SECS,
            async move { run_action(provider.as_ref(), &endpoint, &device, action).await },
        ));
    }

    pub fn poll_action_result(&mut self) {
        let Some(rx) = &mut self.action_result_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(summary)) => {
                self.add_message(format!("✓ {summary}"));
                self.action_result_rx = None;
                self.refresh_now();
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Device action failed");
                self.add_error("✗ Action failed", &e);
                self.action_result_rx = None;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                tracing::error!("Action background task terminated unexpectedly");
                self.add_message("Action task terminated unexpectedly".into());
                self.action_result_rx = None;
            }
        }
    }

    fn refresh_now(&mut self) {
        if self.read_result_rx.is_none() {
            self.spawn_read();
        }
    }

    /// Enter write mode for the highlighted register.
    pub fn enter_write_mode(&mut self) {
        if self.current_screen != CurrentScreen::DeviceInfo {
            return;
        }

        let register = self
            .table_state
            .selected()
            .or(self.selected_index)
            .and_then(|idx| self.registers.get(idx))
            .map(|r| r.register.clone());

        if let Some(name) = register {
            tracing::debug!(register = %name, "enter_write_mode");
            self.write_register = Some(name);
            self.write_value_input.clear();
            self.current_screen = CurrentScreen::WriteInput;
        } else {
            self.add_message("No register selected to write.".into());
        }
    }

    /// Write the typed input to the register being edited.
    ///
    /// The input is parsed as the register's current type.
    pub fn start_write_value(&mut self) {
        let Some(register) = self.write_register.clone() else {
            return;
        };
        let input = self.write_value_input.trim().to_string();
        if input.is_empty() {
            self.add_message("Value cannot be empty.".into());
            return;
        }

        let current = self
            .registers
            .iter()
            .find(|r| r.register == register)
            .map_or(DeviceValue::Empty, |r| r.value.clone());
        let value = match current.parse_like(&input) {
            Ok(v) => v,
            Err(e) => {
                self.add_message(format!("{e}"));
                return;
            }
        };

        let (Some(endpoint), Some(device)) = (self.endpoint.clone(), self.current_device.clone())
        else {
            self.add_message("No device context for write.".into());
            return;
        };

        tracing::info!(device = %device, register = %register, value = %value, "start_write_value");
        self.current_screen = CurrentScreen::Loading;
        self.add_message(format!("Writing '{input}' to {device}.{register}..."));

        let provider = Arc::clone(&self.provider);
        self.write_result_rx = Some(spawn_with_timeout(
            "Write",
            OPC_WRITE_TIMEOUT_SECS,
            async move {
                provider
                    .write_register(&endpoint, &device, &register, value)
                    .await
            },
        ));
    }

    pub fn poll_write_result(&mut self) {
        let Some(rx) = &mut self.write_result_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(result)) => {
                if result.success {
                    tracing::info!(register = %result.register, "poll_write_result: write succeeded");
                    self.add_message(format!(
                        "✓ Write to {}.{} succeeded",
                        result.device, result.register
                    ));
                } else {
                    self.add_message(format!(
                        "✗ Write to {}.{} failed: {}",
                        result.device,
                        result.register,
                        result.error.unwrap_or_default()
                    ));
                }
                self.finish_write();
                self.refresh_now();
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Write register failed");
                self.add_error("Write error", &e);
                self.finish_write();
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                tracing::error!("Write background task terminated unexpectedly");
                self.add_message("Write task terminated unexpectedly".into());
                self.finish_write();
            }
        }
    }

    fn finish_write(&mut self) {
        self.current_screen = CurrentScreen::DeviceInfo;
        self.write_register = None;
        self.write_value_input.clear();
        self.write_result_rx = None;
    }

    fn restore_device_selection(&mut self) {
        let idx = self
            .current_device
            .as_ref()
            .and_then(|d| self.devices.iter().position(|x| x == d))
            .or(if self.devices.is_empty() { None } else { Some(0) });
        self.selected_index = idx;
        self.list_state.select(idx);
    }

    pub fn go_back(&mut self) {
        match self.current_screen {
            CurrentScreen::DeviceList => {
                self.current_screen = CurrentScreen::Home;
                self.devices.clear();
                self.endpoint = None;
                self.selected_index = None;
                self.list_state.select(None);
            }
            CurrentScreen::DeviceInfo => {
                self.current_screen = CurrentScreen::DeviceList;
                self.registers.clear();
                self.last_read_time = None;
                self.read_result_rx = None;
                self.table_state.select(None);
                self.restore_device_selection();
                self.current_device = None;
            }
            CurrentScreen::WriteInput => {
                self.current_screen = CurrentScreen::DeviceInfo;
                self.write_register = None;
                self.write_value_input.clear();
            }
            CurrentScreen::Loading => {
                // Abandon the operation that owns the screen; its result is dropped.
                // A write outranks a background refresh running alongside it.
                if self.fetch_result_rx.take().is_some() {
                    self.current_screen = CurrentScreen::Home;
                } else if self.write_result_rx.is_some() {
                    self.finish_write();
                } else if self.read_result_rx.take().is_some() {
                    self.current_screen = CurrentScreen::DeviceList;
                    self.restore_device_selection();
                    self.current_device = None;
                }
                self.add_message("Cancelled".into());
            }
            _ => {}
        }
    }
}

/// Run `future` on a tokio task bounded by `secs`, reporting through a
/// oneshot channel polled by the UI loop.
fn spawn_with_timeout<T, F>(label: &'static str, secs: u64, future: F) -> oneshot::Receiver<OpcResult<T>>
where
    T: Send + 'static,
    F: Future<Output = OpcResult<T>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = tokio::time::timeout(Duration::from_secs(secs), future)
            .await
            .unwrap_or_else(|_| {
                tracing::error!("{label} timed out ({secs}s)");
                Err(OpcError::Internal(format!("{label} timed out ({secs}s)")))
            });
        let _ = tx.send(result);
    });
    rx
}

async fn run_action(
    provider: &dyn DeviceProvider,
    endpoint: &str,
    device: &str,
    action: DeviceAction,
) -> OpcResult<String> {
    match action {
        DeviceAction::Toggle => {
            let state = actions::toggle_switch(provider, endpoint, device).await?;
            Ok(format!("{device} state set to {state}"))
        }
        DeviceAction::Press => {
            let count = actions::press_button(provider, endpoint, device).await?;
            Ok(format!("{device} pressed (count {count})"))
        }
        DeviceAction::Release => {
            actions::release_button(provider, endpoint, device).await?;
            Ok(format!("{device} released"))
        }
        DeviceAction::PressAndRelease => {
            let count = actions::press_and_release_button(provider, endpoint, device).await?;
            Ok(format!("{device} pressed and released (count {count})"))
        }
        DeviceAction::Count => {
            let count = actions::press_count(provider, endpoint, device).await?;
            let last = actions::last_state_change(provider, endpoint, device).await?;
            let last = if last.is_empty() { "never".to_string() } else { last };
            Ok(format!("{device} count {count}, last change {last}"))
        }
        DeviceAction::LightOn => {
            actions::set_light(provider, endpoint, device, true).await?;
            Ok(format!("{device} switched on"))
        }
        DeviceAction::LightOff => {
            actions::set_light(provider, endpoint, device, false).await?;
            Ok(format!("{device} switched off"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetglue_opcua::{DEFAULT_CLIENT_ENDPOINT, MockDeviceProvider};
    use mockall::predicate::*;

    const EP: &str = DEFAULT_CLIENT_ENDPOINT;

    fn app(mock: MockDeviceProvider) -> App {
        App::new(Arc::new(mock), EP)
    }

    fn reg(register: &str, value: DeviceValue) -> RegisterValue {
        RegisterValue {
            device: "Button1".into(),
            register: register.into(),
            value,
            quality: "Good".into(),
            timestamp: "2026-10-16 10:00:00".into(),
        }
    }

    fn device_app(mock: MockDeviceProvider) -> App {
        let mut app = app(mock);
        app.endpoint = Some(EP.into());
        app.devices = vec!["VirtualSwitch".into(), "Button1".into()];
        app.current_device = Some("Button1".into());
        app.registers = vec![
            reg("State", DeviceValue::Bool(false)),
            reg("Count", DeviceValue::Int(2)),
        ];
        app.selected_index = Some(0);
        app.table_state.select(Some(0));
        app.current_screen = CurrentScreen::DeviceInfo;
        app
    }

    #[test]
    fn test_poll_fetch_result_success() {
        let (tx, rx) = oneshot::channel();
        let mut app = app(MockDeviceProvider::new());
        app.current_screen = CurrentScreen::Loading;
        app.endpoint = Some(EP.into());
        app.fetch_result_rx = Some(rx);

        tx.send(Ok(vec!["VirtualSwitch".into(), "Button1".into()]))
            .unwrap();
        app.poll_fetch_result();

        assert_eq!(app.current_screen, CurrentScreen::DeviceList);
        assert_eq!(app.devices.len(), 2);
        assert_eq!(app.selected_index, Some(0));
        assert!(app.fetch_result_rx.is_none());
        assert!(app.messages.last().unwrap().contains("Found 2 devices"));
    }

    #[test]
    fn test_poll_fetch_result_error_shows_hint() {
        let (tx, rx) = oneshot::channel();
        let mut app = app(MockDeviceProvider::new());
        app.current_screen = CurrentScreen::Loading;
        app.fetch_result_rx = Some(rx);

        tx.send(Err(OpcError::Status(
            opcua::types::StatusCode::BadCommunicationError,
        )))
        .unwrap();
        app.poll_fetch_result();

        assert_eq!(app.current_screen, CurrentScreen::Home);
        let last = app.messages.last().unwrap();
        assert!(last.contains("Error listing devices"));
        assert!(last.contains("check that the server is reachable"));
    }

    #[test]
    fn test_poll_fetch_result_empty() {
        let (tx, rx) = oneshot::channel();
        let mut app = app(MockDeviceProvider::new());
        app.current_screen = CurrentScreen::Loading;
        app.fetch_result_rx = Some(rx);

        tx.send(Ok(vec![])).unwrap();
        app.poll_fetch_result();

        assert_eq!(app.current_screen, CurrentScreen::DeviceList);
        assert_eq!(app.selected_index, None);
        assert!(app.messages.last().unwrap().contains("Found 0 devices"));
    }

    #[test]
    fn test_poll_fetch_result_closed() {
        let (tx, rx) = oneshot::channel::<OpcResult<Vec<String>>>();
        let mut app = app(MockDeviceProvider::new());
        app.current_screen = CurrentScreen::Loading;
        app.fetch_result_rx = Some(rx);

        drop(tx);
        app.poll_fetch_result();

        assert_eq!(app.current_screen, CurrentScreen::Home);
        assert!(
            app.messages
                .last()
                .unwrap()
                .contains("terminated unexpectedly")
        );
    }

    #[tokio::test]
    async fn test_start_fetch_devices_sets_loading() {
        let mut mock = MockDeviceProvider::new();
        mock.expect_list_devices()
            .with(eq(EP))
            .returning(|_| Ok(vec!["Button1".into()]));

        let mut app = app(mock);
        app.start_fetch_devices();
        assert_eq!(app.current_screen, CurrentScreen::Loading);
        assert!(app.messages.iter().any(|m| m.contains("Connecting to")));

        tokio::time::sleep(Duration::from_millis(50)).await;
        app.poll_fetch_result();
        assert_eq!(app.current_screen, CurrentScreen::DeviceList);
        assert_eq!(app.devices, vec!["Button1"]);
    }

    #[test]
    fn test_start_fetch_devices_rejects_bad_endpoint() {
        let mut app = app(MockDeviceProvider::new());
        app.endpoint_input = "localhost:4840".into();
        app.start_fetch_devices();

        assert_eq!(app.current_screen, CurrentScreen::Home);
        assert!(app.fetch_result_rx.is_none());
        assert!(app.messages.last().unwrap().contains("Invalid endpoint"));
    }

    #[test]
    fn test_device_navigation() {
        let mut app = app(MockDeviceProvider::new());
        app.devices = vec!["D1".into(), "D2".into()];
        app.current_screen = CurrentScreen::DeviceList;
        app.select(Some(0));

        app.select_next();
        assert_eq!(app.selected_index, Some(1));
        app.select_next();
        assert_eq!(app.selected_index, Some(1));
        app.select_prev();
        assert_eq!(app.selected_index, Some(0));
        app.select_prev();
        assert_eq!(app.selected_index, Some(0));
    }

    #[test]
    fn test_select_on_empty_list() {
        let mut app = app(MockDeviceProvider::new());
        app.current_screen = CurrentScreen::DeviceList;

        app.select_next();
        assert_eq!(app.selected_index, None);
        app.page_down();
        assert_eq!(app.selected_index, None);
    }

    #[test]
    fn test_page_down_and_up() {
        let mut app = app(MockDeviceProvider::new());
        app.current_screen = CurrentScreen::DeviceList;
        app.devices = (0..50).map(|i| format!("D{i}")).collect();
        app.select(Some(0));

        app.page_down();
        assert_eq!(app.selected_index, Some(20));
        app.page_down();
        app.page_down();
        assert_eq!(app.selected_index, Some(49));

        app.page_up();
        assert_eq!(app.selected_index, Some(29));
        app.page_up();
        app.page_up();
        assert_eq!(app.selected_index, Some(0));
    }

    #[tokio::test]
    async fn test_open_device_reads_registers() {
        let mut mock = MockDeviceProvider::new();
        mock.expect_read_device()
            .with(eq(EP), eq("Button1"))
            .returning(|_, _| Ok(vec![reg("State", DeviceValue::Bool(true))]));

        let mut app = app(mock);
        app.endpoint = Some(EP.into());
        app.devices = vec!["VirtualSwitch".into(), "Button1".into()];
        app.current_screen = CurrentScreen::DeviceList;
        app.select(Some(1));

        app.start_read_device();
        assert_eq!(app.current_screen, CurrentScreen::Loading);

        tokio::time::sleep(Duration::from_millis(50)).await;
        app.poll_read_result();

        assert_eq!(app.current_screen, CurrentScreen::DeviceInfo);
        assert_eq!(app.registers.len(), 1);
        assert_eq!(app.selected_index, Some(0));
        assert!(app.last_read_time.is_some());
        assert!(app.messages.last().unwrap().contains("Read 1 registers of Button1"));
    }

    #[test]
    fn test_poll_read_result_error_returns_to_list() {
        let (tx, rx) = oneshot::channel();
        let mut app = device_app(MockDeviceProvider::new());
        app.current_screen = CurrentScreen::Loading;
        app.read_result_rx = Some(rx);

        tx.send(Err(OpcError::NotFound("device 'Button1'".into())))
            .unwrap();
        app.poll_read_result();

        assert_eq!(app.current_screen, CurrentScreen::DeviceList);
        assert_eq!(app.selected_index, Some(1));
        assert!(app.current_device.is_none());
        assert!(app.messages.last().unwrap().contains("Error reading device"));
    }

    #[test]
    fn test_refresh_preserves_cursor() {
        let (tx, rx) = oneshot::channel();
        let mut app = device_app(MockDeviceProvider::new());
        app.select(Some(1));
        app.read_result_rx = Some(rx);

        tx.send(Ok(vec![
            reg("State", DeviceValue::Bool(true)),
            reg("Count", DeviceValue::Int(3)),
        ]))
        .unwrap();
        app.poll_read_result();

        assert_eq!(app.current_screen, CurrentScreen::DeviceInfo);
        assert_eq!(app.selected_index, Some(1));
        assert_eq!(app.registers[1].value, DeviceValue::Int(3));
    }

    #[tokio::test]
    async fn test_auto_refresh_waits_for_interval() {
        let mut mock = MockDeviceProvider::new();
        mock.expect_read_device()
            .times(1)
            .returning(|_, _| Ok(vec![]));

        let mut app = device_app(mock);
        app.last_read_time = Some(std::time::Instant::now());
        app.maybe_auto_refresh();
        assert!(app.read_result_rx.is_none());

        app.last_read_time = Some(std::time::Instant::now() - Duration::from_secs(2));
        app.maybe_auto_refresh();
        assert!(app.read_result_rx.is_some());

        // In flight: no second read.
        app.maybe_auto_refresh();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_press_action_reports_count() {
        let mut mock = MockDeviceProvider::new();
        mock.expect_write_register().returning(|_, d, r, _| {
            Ok(WriteResult {
                device: d.into(),
                register: r.into(),
                success: true,
                error: None,
            })
        });
        mock.expect_read_register().returning(|_, _, r| {
            if r == "Count" {
                Ok(reg(r, DeviceValue::Int(2)))
            } else {
                Ok(reg(r, DeviceValue::Text(String::new())))
            }
        });
        mock.expect_read_device().returning(|_, _| Ok(vec![]));

        let mut app = device_app(mock);
        app.start_action(DeviceAction::Press);
        assert!(app.messages.last().unwrap().contains("Pressing Button1"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        app.poll_action_result();
        assert!(app.action_result_rx.is_none());
        assert!(
            app.messages
                .last()
                .unwrap()
                .contains("Button1 pressed (count 3)")
        );
        assert!(app.read_result_rx.is_some(), "action triggers a refresh");
    }

    #[tokio::test]
    async fn test_action_error_is_reported() {
        let mut mock = MockDeviceProvider::new();
        mock.expect_read_register()
            .returning(|_, _, _| Err(OpcError::Status(opcua::types::StatusCode::BadNodeIdUnknown)));

        let mut app = device_app(mock);
        app.start_action(DeviceAction::Toggle);
        tokio::time::sleep(Duration::from_millis(50)).await;
        app.poll_action_result();

        let last = app.messages.last().unwrap();
        assert!(last.contains("Action failed"), "{last}");
        assert!(last.contains("BadNodeIdUnknown"), "{last}");
        assert_eq!(app.current_screen, CurrentScreen::DeviceInfo);
    }

    #[test]
    fn test_action_ignored_outside_device_screen() {
        let mut app = app(MockDeviceProvider::new());
        app.current_screen = CurrentScreen::DeviceList;
        app.start_action(DeviceAction::Toggle);
        assert!(app.action_result_rx.is_none());
        assert!(app.messages.is_empty());
    }

    #[test]
    fn test_enter_write_mode_uses_highlighted_register() {
        let mut app = device_app(MockDeviceProvider::new());
        app.select(Some(1));

        app.enter_write_mode();
        assert_eq!(app.current_screen, CurrentScreen::WriteInput);
        assert_eq!(app.write_register.as_deref(), Some("Count"));

        app.go_back();
        assert_eq!(app.current_screen, CurrentScreen::DeviceInfo);
        assert!(app.write_register.is_none());
    }

    #[test]
    fn test_write_rejects_value_of_wrong_type() {
        let mut app = device_app(MockDeviceProvider::new());
        app.enter_write_mode();
        app.write_value_input = "maybe".into();

        app.start_write_value();
        assert_eq!(app.current_screen, CurrentScreen::WriteInput);
        assert!(app.write_result_rx.is_none());
        assert!(app.messages.last().unwrap().contains("not a valid Boolean"));
    }

    #[tokio::test]
    async fn test_write_value_round_trip() {
        let mut mock = MockDeviceProvider::new();
        mock.expect_write_register()
            .with(eq(EP), eq("Button1"), eq("State"), eq(DeviceValue::Bool(true)))
            .times(1)
            .returning(|_, d, r, _| {
                Ok(WriteResult {
                    device: d.into(),
                    register: r.into(),
                    success: true,
                    error: None,
                })
            });
        mock.expect_read_device().returning(|_, _| Ok(vec![]));

        let mut app = device_app(mock);
        app.enter_write_mode();
        app.write_value_input = "on".into();
        app.start_write_value();
        assert_eq!(app.current_screen, CurrentScreen::Loading);

        tokio::time::sleep(Duration::from_millis(50)).await;
        app.poll_write_result();

        assert_eq!(app.current_screen, CurrentScreen::DeviceInfo);
        assert!(app.write_register.is_none());
        assert!(app.messages.last().unwrap().contains("succeeded"));
    }

    #[test]
    fn test_poll_write_result_failure() {
        let (tx, rx) = oneshot::channel();
        let mut app = device_app(MockDeviceProvider::new());
        app.current_screen = CurrentScreen::Loading;
        app.write_register = Some("Pin".into());
        app.write_result_rx = Some(rx);

        tx.send(Ok(WriteResult {
            device: "Button1".into(),
            register: "Pin".into(),
            success: false,
            error: Some("BadNotWritable".into()),
        }))
        .unwrap();
        app.current_device = None; // no refresh spawned without context
        app.poll_write_result();

        assert_eq!(app.current_screen, CurrentScreen::DeviceInfo);
        assert!(app.messages.last().unwrap().contains("failed: BadNotWritable"));
    }

    #[test]
    fn test_go_back_navigation() {
        let mut app = device_app(MockDeviceProvider::new());

        // DeviceInfo -> DeviceList, cursor on the device just viewed
        app.go_back();
        assert_eq!(app.current_screen, CurrentScreen::DeviceList);
        assert!(app.registers.is_empty());
        assert_eq!(app.selected_index, Some(1));

        // DeviceList -> Home
        app.go_back();
        assert_eq!(app.current_screen, CurrentScreen::Home);
        assert!(app.devices.is_empty());
        assert_eq!(app.selected_index, None);
    }

    #[test]
    fn test_go_back_from_loading_cancels() {
        let (_tx, rx) = oneshot::channel();
        let mut app = app(MockDeviceProvider::new());
        app.current_screen = CurrentScreen::Loading;
        app.fetch_result_rx = Some(rx);

        app.go_back();
        assert_eq!(app.current_screen, CurrentScreen::Home);
        assert!(app.fetch_result_rx.is_none());
    }

    #[test]
    fn test_cancelling_a_write_keeps_the_device_open() {
        let (write_tx, write_rx) = oneshot::channel::<OpcResult<WriteResult>>();
        let (read_tx, read_rx) = oneshot::channel();
        let mut app = device_app(MockDeviceProvider::new());
        app.current_screen = CurrentScreen::Loading;
        app.write_register = Some("State".into());
        app.write_result_rx = Some(write_rx);
        app.read_result_rx = Some(read_rx);

        app.go_back();
        assert_eq!(app.current_screen, CurrentScreen::DeviceInfo);
        assert_eq!(app.current_device.as_deref(), Some("Button1"));
        assert!(app.write_result_rx.is_none());
        assert!(write_tx.is_closed());

        // The refresh still lands on the open device.
        read_tx
            .send(Ok(vec![reg("State", DeviceValue::Bool(true))]))
            .unwrap();
        app.poll_read_result();
        app.poll_write_result();
        assert_eq!(app.current_screen, CurrentScreen::DeviceInfo);
        assert_eq!(app.current_device.as_deref(), Some("Button1"));
        assert_eq!(app.registers[0].value, DeviceValue::Bool(true));
    }

    #[tokio::test]
    async fn test_light_actions_write_state() {
        let mut mock = MockDeviceProvider::new();
        mock.expect_write_register()
            .with(eq(EP), eq("Light1"), eq("State"), eq(DeviceValue::Bool(true)))
            .times(1)
            .returning(|_, d, r, _| {
                Ok(WriteResult {
                    device: d.into(),
                    register: r.into(),
                    success: true,
                    error: None,
                })
            });
        mock.expect_read_device().returning(|_, _| Ok(vec![]));

        let mut app = device_app(mock);
        app.current_device = Some("Light1".into());
        app.start_action(DeviceAction::LightOn);
        assert!(app.messages.last().unwrap().contains("Switching on Light1"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        app.poll_action_result();
        assert!(app.messages.last().unwrap().contains("Light1 switched on"));
    }

    #[test]
    fn test_add_message_ring_buffer() {
        let mut app = app(MockDeviceProvider::new());
        for i in 0..15 {
            app.add_message(format!("msg-{i}"));
        }
        assert_eq!(app.messages.len(), 10);
        assert_eq!(app.messages[0], "msg-5");
        assert_eq!(app.messages[9], "msg-14");
    }
}
