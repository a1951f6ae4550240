mod app;
mod ui;

use crate::app::{App, CurrentScreen, DeviceAction};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use fleetglue_opcua::server::host::shutdown_signal;
use fleetglue_opcua::{
    DEFAULT_CLIENT_ENDPOINT, DEFAULT_NAMESPACE, DeviceServer, ServerConfig, UaDeviceClient,
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::{io, path::PathBuf, sync::Arc, time::Duration};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Virtual device fleet over OPC UA.
#[derive(Debug, Parser)]
#[command(name = "fleetglue", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Host the configured devices on an OPC UA server.
    Server {
        /// TOML configuration file; built-in defaults are used when omitted.
        #[arg(short, long, env = "FLEETGLUE_CONFIG")]
        config: Option<PathBuf>,

        /// Endpoint to bind, overriding the configuration.
        #[arg(short, long, env = "FLEETGLUE_ENDPOINT")]
        endpoint: Option<String>,

        /// Namespace URI, overriding the configuration.
        #[arg(short, long, env = "FLEETGLUE_NAMESPACE")]
        namespace: Option<String>,

        /// Let every device change state on its own.
        #[arg(long)]
        simulate: bool,
    },
    /// Interactive client for browsing and driving devices.
    Client {
        /// Server endpoint to prefill.
        #[arg(short, long, env = "FLEETGLUE_ENDPOINT", default_value = DEFAULT_CLIENT_ENDPOINT)]
        endpoint: String,

        /// Namespace URI the devices are registered under.
        #[arg(short, long, env = "FLEETGLUE_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Server {
            config,
            endpoint,
            namespace,
            simulate,
        } => run_server(config, endpoint, namespace, simulate).await,
        Command::Client {
            endpoint,
            namespace,
        } => run_client(endpoint, namespace).await,
    }
}

async fn run_server(
    config_path: Option<PathBuf>,
    endpoint: Option<String>,
    namespace: Option<String>,
    simulate: bool,
) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,opcua=warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .init();

    let mut config = match &config_path {
        Some(path) => ServerConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    if let Some(namespace) = namespace {
        config.namespace = namespace;
    }
    if simulate {
        config.simulate_all();
    }

    tracing::info!(endpoint = %config.endpoint, namespace = %config.namespace, "Starting FleetGlue server");

    let mut server = DeviceServer::new(config);
    let count = server
        .add_configured_devices()
        .context("Failed to register devices")?;
    tracing::info!(devices = count, names = ?server.device_names(), "Devices registered");

    server
        .run(shutdown_signal())
        .await
        .context("Server terminated with an error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn run_client(endpoint: String, namespace: String) -> Result<()> {
    // The TUI owns the terminal, so logs go to a file.
    let file_appender = tracing_appender::rolling::daily("logs", "fleetglue-client.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_filter(filter))
        .init();

    tracing::info!(namespace = %namespace, "Starting FleetGlue client");

    let client =
        UaDeviceClient::for_namespace(namespace).context("Failed to start OPC UA session worker")?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(Arc::new(client), endpoint);
    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "Application error");
    }

    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    // Clear any leftover events (like the Enter key used to start the app)
    while event::poll(Duration::from_millis(0))? {
        let _ = event::read()?;
    }

    loop {
        app.poll_fetch_result();
        app.poll_read_result();
        app.poll_action_result();
        app.poll_write_result();
        app.maybe_auto_refresh();

        terminal.draw(|f| ui::render(f, app))?;

        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
        {
            handle_key_event(app, key);
        }

        if app.current_screen == CurrentScreen::Exiting {
            return Ok(());
        }
    }
}

fn handle_key_event(app: &mut App, key: event::KeyEvent) {
    if key.kind != event::KeyEventKind::Press {
        return;
    }

    match app.current_screen {
        CurrentScreen::Home => match key.code {
            KeyCode::Enter => app.start_fetch_devices(),
            KeyCode::Char(c) => app.endpoint_input.push(c),
            KeyCode::Backspace => {
                app.endpoint_input.pop();
            }
            KeyCode::Esc => app.current_screen = CurrentScreen::Exiting,
            _ => {}
        },
        CurrentScreen::DeviceList => match key.code {
            KeyCode::Esc => app.go_back(),
            KeyCode::Down => app.select_next(),
            KeyCode::Up => app.select_prev(),
            KeyCode::PageDown => app.page_down(),
            KeyCode::PageUp => app.page_up(),
            KeyCode::Enter => app.start_read_device(),
            KeyCode::Char('q' | 'Q') => app.current_screen = CurrentScreen::Exiting,
            _ => {}
        },
        CurrentScreen::DeviceInfo => match key.code {
            KeyCode::Esc => app.go_back(),
            KeyCode::Down => app.select_next(),
            KeyCode::Up => app.select_prev(),
            KeyCode::PageDown => app.page_down(),
            KeyCode::PageUp => app.page_up(),
            KeyCode::Char('t') => app.start_action(DeviceAction::Toggle),
            KeyCode::Char('p') => app.start_action(DeviceAction::Press),
            KeyCode::Char('r') => app.start_action(DeviceAction::Release),
            KeyCode::Char('b') => app.start_action(DeviceAction::PressAndRelease),
            KeyCode::Char('c') => app.start_action(DeviceAction::Count),
            KeyCode::Char('o') => app.start_action(DeviceAction::LightOn),
            KeyCode::Char('f') => app.start_action(DeviceAction::LightOff),
            KeyCode::Char('w') => app.enter_write_mode(),
            KeyCode::Char('q' | 'Q') => app.current_screen = CurrentScreen::Exiting,
            _ => {}
        },
        CurrentScreen::WriteInput => match key.code {
            KeyCode::Enter => app.start_write_value(),
            KeyCode::Char(c) => app.write_value_input.push(c),
            KeyCode::Backspace => {
                app.write_value_input.pop();
            }
            KeyCode::Esc => app.go_back(),
            _ => {}
        },
        CurrentScreen::Loading => {
            if key.code == KeyCode::Esc {
                app.go_back();
            }
        }
        CurrentScreen::Exiting => {}
    }
}
