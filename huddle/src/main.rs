//! Huddle: presence-aware terminal chat over STOMP.
//!
//! Connects to a STOMP broker over WebSocket, asks for a name, then shows
//! the shared room with everyone currently online. Configuration via CLI
//! flags, environment variables, or config file
//! (`~/.config/huddle/config.toml`).
//!
//! ```bash
//! # Against the development broker
//! cargo run --bin huddle-broker &
//! cargo run --bin huddle -- --broker-url ws://127.0.0.1:5057/ws --identity alice
//!
//! # Or via environment variables
//! HUDDLE_BROKER_URL=ws://127.0.0.1:5057/ws HUDDLE_IDENTITY=bob cargo run --bin huddle
//! ```

use std::io;
use std::path::Path;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing_appender::non_blocking::WorkerGuard;

use huddle::app::{App, AppAction};
use huddle::chat::client::{ChatClient, ChatHandle};
use huddle::config::{CliArgs, ClientConfig};
use huddle::transport::event_channel;
use huddle::transport::stomp::StompTransport;
use huddle::ui;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: {e}; using defaults");
            ClientConfig::default()
        }
    };

    // Initialize logging before terminal setup (logs go to file, not stdout).
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(broker = %config.broker_url, "huddle starting");

    let (events_tx, events_rx) = event_channel();
    let transport = StompTransport::new(config.stomp_config(), events_tx);
    let chat = ChatClient::spawn(transport, events_rx, config.receipts(), config.chat_options());
    chat.connect();

    // Set up terminal.
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app.
    let result = run_app(&mut terminal, &chat, &config);

    // Disconnects first if still joined.
    chat.shutdown().await;

    // Restore terminal.
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    tracing::info!("huddle exiting");
    result
}

/// Initialize file-based logging.
///
/// Logs are written to a file (never stdout, since ratatui owns the terminal).
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("huddle.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Main application loop: draw, pick up chat state, handle one key.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    chat: &ChatHandle,
    config: &ClientConfig,
) -> io::Result<()> {
    let mut app = App::new(config.identity.as_deref(), config.timestamp_format.clone());
    let mut state = chat.watch();

    loop {
        // Step 1: Pick up the latest chat state.
        if state.has_changed().unwrap_or(false) {
            app.set_snapshot(state.borrow_and_update().clone());
        }

        // Step 2: Draw the UI frame.
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Step 3: Poll for terminal input events.
        if event::poll(config.poll_timeout)?
            && let Event::Key(key) = event::read()?
        {
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match app.handle_key_event(key) {
                Some(AppAction::Join(identity)) => chat.join(identity),
                Some(AppAction::Send(content)) => chat.send(content),
                Some(AppAction::Leave) => chat.leave(),
                Some(AppAction::Keystroke) => chat.keystroke(),
                Some(AppAction::Quit) | None => {}
            }
        }

        if app.should_quit || !chat.is_running() {
            return Ok(());
        }
    }
}
