//! src/main.rs
//! ============================================================================
//! # Blob Storage Navigator Entry Point
//!
//! Parses the command line, picks a storage backend, sets up logging and the
//! terminal, then drives `AppController` from the `EventLoop` until quit.

use std::{
    io::{self, Stdout},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{
        EventStream, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
        PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
        supports_keyboard_enhancement,
    },
};
use ratatui::{Frame, Terminal, backend::CrosstermBackend as Backend};
use tokio::{
    signal,
    sync::{Notify, mpsc},
    time::Instant,
};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use blobnav::{
    AppController, DownloadPipeline, Logger,
    config::Config,
    controller::{
        event_loop::{EventLoop, LoopEvent, TaskEvent},
        key_repeat::InputEvent,
    },
    storage::{backend::StorageBackend, local::LocalDirBackend, memory::InMemoryBackend},
    transfer::{
        conflict::{ChannelConflictPrompt, PendingConflict},
        session_store::MemorySessionStore,
    },
    view::View,
};

type AppTerminal = Terminal<Backend<Stdout>>;

const TICK_RATE: Duration = Duration::from_millis(50);

/// Terminal browser for hierarchical blob storage.
#[derive(Debug, Parser)]
#[command(name = "blobnav", version, about)]
struct Cli {
    /// Serve a local directory tree: top-level directories are containers.
    #[arg(long, value_name = "DIR", conflicts_with = "demo", required_unless_present = "demo")]
    root: Option<PathBuf>,

    /// Serve a generated in-memory account.
    #[arg(long)]
    demo: bool,

    /// Account name shown in the breadcrumb (defaults to the root's name).
    #[arg(long, value_name = "NAME")]
    account: Option<String>,

    /// Where downloads land (overrides the config file).
    #[arg(long, value_name = "DIR")]
    download_dir: Option<PathBuf>,

    /// Explicit config file instead of the platform default.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `blobnav=trace`.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup panic handler early
    setup_panic_handler();

    let app: App = App::new(cli)
        .await
        .context("Failed to initialize application")?;

    app.run().await.context("Application runtime error")?;

    info!("Application exited cleanly");
    Ok(())
}

struct App {
    terminal: AppTerminal,
    controller: AppController,
    events: EventLoop<EventStream>,
    shutdown: Arc<Notify>,
    keyboard_enhanced: bool,
    _log_guard: WorkerGuard,
}

impl App {
    async fn new(cli: Cli) -> Result<Self> {
        let (mut config, config_error) = match &cli.config {
            Some(path) => (
                Config::load_from(path)
                    .await
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None,
            ),
            None => match Config::load().await {
                Ok(config) => (config, None),
                Err(e) => (Config::default(), Some(e)),
            },
        };

        if let Some(dir) = cli.download_dir {
            config.download.root = Some(dir);
        }
        if let Some(level) = cli.log_level {
            config.logging.level = level;
        }

        // Initialize logging first
        let log_guard = Logger::init(&config.logging).context("Failed to initialize logging")?;
        info!("Starting blobnav");
        if let Some(e) = config_error {
            warn!("Failed to load config, using defaults: {}", e);
        }

        let backend: Arc<dyn StorageBackend> = match cli.root {
            Some(root) => Arc::new(
                LocalDirBackend::new(&root, cli.account)
                    .with_context(|| format!("Cannot serve {}", root.display()))?,
            ),
            None => InMemoryBackend::demo(),
        };

        // Create communication channels
        let (input_tx, input_rx) = mpsc::unbounded_channel::<InputEvent>();
        let (task_tx, task_rx) = mpsc::unbounded_channel::<TaskEvent>();
        let (conflict_tx, conflict_rx) = mpsc::unbounded_channel::<PendingConflict>();

        let pipeline = Arc::new(DownloadPipeline::new(
            backend.clone(),
            Arc::new(MemorySessionStore::new()),
            Arc::new(ChannelConflictPrompt::new(conflict_tx)),
        ));

        let mut controller = AppController::new(&config, backend, pipeline, input_tx, task_tx)
            .context("Invalid key bindings")?;

        // Setup terminal
        let terminal: AppTerminal = setup_terminal().context("Failed to initialize terminal")?;

        // Key release events are required to stop emulated repeat.
        let keyboard_enhanced = config.keymap.repeat.enabled
            && supports_keyboard_enhancement().unwrap_or(false)
            && execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )
            .is_ok();
        controller.set_repeat_enabled(keyboard_enhanced);
        info!(keyboard_enhanced, "Key repeat emulation configured");

        let events = EventLoop::new(EventStream::new(), input_rx, task_rx, conflict_rx, TICK_RATE);

        controller.start().await;

        info!("Application initialization complete");

        Ok(Self {
            terminal,
            controller,
            events,
            shutdown: Arc::new(Notify::new()),
            keyboard_enhanced,
            _log_guard: log_guard,
        })
    }

    /// Run the main application event loop
    async fn run(mut self) -> Result<()> {
        self.setup_shutdown_handler();

        info!("Starting main event loop");

        loop {
            self.render()?;

            if self.controller.should_quit() {
                info!("Quit requested");
                break;
            }

            let event: LoopEvent = tokio::select! {
                () = self.shutdown.notified() => {
                    info!("Shutdown signal received");
                    break;
                }

                maybe_event = self.events.next_event() => match maybe_event {
                    Some(event) => event,
                    None => {
                        info!("Event stream ended");
                        break;
                    }
                },
            };

            match event {
                LoopEvent::Terminal(event) => {
                    self.controller.handle_terminal(event, Instant::now()).await;
                }
                LoopEvent::Input(input) => {
                    self.controller.handle_input(input, Instant::now()).await;
                }
                LoopEvent::Task(task) => self.controller.handle_task_event(task),
                LoopEvent::Tick(now) => self.controller.tick(now).await,
            }
        }

        let running = self.controller.running_transfers();
        if running > 0 {
            warn!("Cancelling {running} running transfer(s) on exit");
        }
        self.controller.shutdown();

        info!("Main event loop ended");
        Ok(())
    }

    /// Render the UI if a redraw is needed
    fn render(&mut self) -> Result<()> {
        if self.controller.ui().redraw {
            let controller = &self.controller;
            self.terminal
                .draw(|frame: &mut Frame<'_>| View::redraw(frame, controller))
                .context("Failed to draw terminal")?;

            self.controller.ui_mut().redraw = false;
        }

        Ok(())
    }

    /// Setup signal handlers for graceful shutdown
    fn setup_shutdown_handler(&self) {
        let shutdown: Arc<Notify> = self.shutdown.clone();

        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C signal");
                    shutdown.notify_one();
                }
                Err(e) => {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
            }
        });
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if self.keyboard_enhanced {
            let _ = execute!(self.terminal.backend_mut(), PopKeyboardEnhancementFlags);
        }
        if let Err(e) = cleanup_terminal(&mut self.terminal) {
            error!("Failed to cleanup terminal: {}", e);
        }
    }
}

/// Initialize terminal in raw mode with alternate screen
fn setup_terminal() -> Result<AppTerminal> {
    enable_raw_mode().context("Failed to enable raw mode")?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;

    let backend: Backend<Stdout> = Backend::new(stdout);
    let terminal: AppTerminal = Terminal::new(backend).context("Failed to create terminal")?;

    info!("Terminal setup complete");
    Ok(terminal)
}

/// Restore terminal to normal mode
fn cleanup_terminal(terminal: &mut AppTerminal) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;

    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;

    terminal.show_cursor().context("Failed to show cursor")?;

    info!("Terminal cleanup complete");
    Ok(())
}

/// Setup panic handler for graceful terminal restoration
fn setup_panic_handler() {
    let original_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        // Try to restore terminal on panic
        let _ = disable_raw_mode();
        let _ = execute!(io::stderr(), PopKeyboardEnhancementFlags, LeaveAlternateScreen);

        error!("Application panicked: {}", panic_info);
        original_hook(panic_info);
    }));
}
