//! src/controller/app_controller.rs
//! ============================================================================
//! # `AppController`: Routing Input and Task Results
//!
//! Glue between the three engines and the screen:
//! - Prompt modes edit the prompt line, conflict mode waits for o/s/r, help
//!   closes on any key, everything else goes through `InputDispatcher`
//! - `NavigationRequest`s are applied to the navigator in arrival order
//! - Downloads run as spawned tasks reporting back as `TaskEvent`s
//!
//! The controller is driven by one foreground loop and is not shared.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use crossterm::event::{Event as TermEvent, KeyCode, KeyEvent, KeyEventKind};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::controller::actions::{BindingAction, NavigationRequest};
use crate::controller::event_loop::TaskEvent;
use crate::controller::input_dispatcher::InputDispatcher;
use crate::controller::key_repeat::InputEvent;
use crate::controller::key_sequence::BindingTable;
use crate::error::AppError;
use crate::model::download_session::DownloadOptions;
use crate::model::navigation::{ItemKind, NavigationLevel};
use crate::model::ui_state::{UIMode, UIState};
use crate::operators::navigator::PaginatedNavigator;
use crate::storage::backend::StorageBackend;
use crate::tasks::batch_download_task::{
    BatchDownloadResult, BatchRequest, BlobPattern, SharedPipeline, download_matching,
};
use crate::tasks::download_task::{DownloadOutcome, DownloadRequest};
use crate::transfer::conflict::{ConflictAnswer, PendingConflict};
use crate::transfer::progress::{
    BatchProgress, BatchProgressCallback, DownloadProgress, ProgressCallback,
};

pub struct AppController {
    navigator: PaginatedNavigator,
    dispatcher: InputDispatcher,
    requests_rx: mpsc::UnboundedReceiver<NavigationRequest>,
    ui: UIState,
    pipeline: SharedPipeline,
    options: DownloadOptions,
    download_root: PathBuf,
    task_tx: mpsc::UnboundedSender<TaskEvent>,
    running: HashMap<String, CancellationToken>,
    queued_conflicts: VecDeque<PendingConflict>,
    quit: bool,
}

impl AppController {
    pub fn new(
        config: &Config,
        backend: Arc<dyn StorageBackend>,
        pipeline: SharedPipeline,
        input_tx: mpsc::UnboundedSender<InputEvent>,
        task_tx: mpsc::UnboundedSender<TaskEvent>,
    ) -> Result<Self, AppError> {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let dispatcher = InputDispatcher::new(&config.keymap, requests_tx, input_tx)?;
        let navigator = PaginatedNavigator::new(
            backend,
            &config.navigation.session_name,
            config.navigation.page_size,
            config.navigation.delimiter,
        );

        Ok(Self {
            navigator,
            dispatcher,
            requests_rx,
            ui: UIState::new(),
            pipeline,
            options: config.download.options.clone(),
            download_root: config.download.resolved_root(),
            task_tx,
            running: HashMap::new(),
            queued_conflicts: VecDeque::new(),
            quit: false,
        })
    }

    /// Initial listing of the account.
    pub async fn start(&mut self) {
        if let Err(e) = self.navigator.load().await {
            self.ui.show_error(e.to_string());
        }
        self.ui.request_redraw();
    }

    // --- Accessors ---

    #[must_use]
    pub const fn navigator(&self) -> &PaginatedNavigator {
        &self.navigator
    }

    #[must_use]
    pub const fn ui(&self) -> &UIState {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut UIState {
        &mut self.ui
    }

    #[must_use]
    pub const fn should_quit(&self) -> bool {
        self.quit
    }

    #[must_use]
    pub fn running_transfers(&self) -> usize {
        self.running.len()
    }

    #[must_use]
    pub const fn bindings(&self) -> &BindingTable {
        self.dispatcher.table()
    }

    pub fn set_repeat_enabled(&mut self, enabled: bool) {
        self.dispatcher.set_repeat_enabled(enabled);
    }

    // --- Input ---

    pub async fn handle_terminal(&mut self, event: TermEvent, now: Instant) {
        match event {
            TermEvent::Key(key) => self.handle_input(InputEvent::Key(key), now).await,
            TermEvent::Resize(..) | TermEvent::FocusGained => self.ui.request_redraw(),
            _ => {}
        }
    }

    pub async fn handle_input(&mut self, event: InputEvent, now: Instant) {
        match event {
            InputEvent::Key(key) => match self.ui.mode {
                UIMode::Search | UIMode::Command => self.handle_prompt_key(key).await,
                UIMode::Conflict => self.handle_conflict_key(key),
                UIMode::Help => {
                    if key.kind != KeyEventKind::Release {
                        self.ui.toggle_help();
                    }
                }
                UIMode::Browse => {
                    self.dispatcher.process(key, now);
                }
            },
            InputEvent::Repeat(key) => {
                if self.ui.mode == UIMode::Browse {
                    self.dispatcher.process_repeat(key, now);
                }
            }
        }

        self.drain_requests().await;
        self.sync_pending_keys();
    }

    /// Periodic housekeeping: sequence timeout flush and notification expiry.
    pub async fn tick(&mut self, now: Instant) {
        if self.ui.mode == UIMode::Browse && self.dispatcher.tick(now) {
            self.drain_requests().await;
        }
        self.ui.update_notification(now);
        self.sync_pending_keys();
    }

    fn sync_pending_keys(&mut self) {
        let pending = self.dispatcher.pending_keys();
        if pending != self.ui.pending_keys {
            self.ui.pending_keys = pending;
            self.ui.request_redraw();
        }
    }

    async fn drain_requests(&mut self) {
        while let Ok(request) = self.requests_rx.try_recv() {
            self.apply(request).await;
        }
    }

    async fn handle_prompt_key(&mut self, key: KeyEvent) {
        if key.kind == KeyEventKind::Release {
            return;
        }

        match key.code {
            KeyCode::Esc => self.ui.close_prompt(),
            KeyCode::Enter => {
                let line = self.ui.input.trim().to_string();
                let mode = self.ui.mode;
                self.ui.close_prompt();
                match mode {
                    UIMode::Search => self.search(&line),
                    UIMode::Command => self.execute_command(&line).await,
                    _ => {}
                }
            }
            KeyCode::Backspace => {
                self.ui.input.pop();
            }
            KeyCode::Char(c) => self.ui.input.push(c),
            _ => {}
        }
        self.ui.request_redraw();
    }

    fn handle_conflict_key(&mut self, key: KeyEvent) {
        if key.kind == KeyEventKind::Release {
            return;
        }

        let answer = match key.code {
            KeyCode::Char('o' | 'O') => ConflictAnswer::Overwrite,
            KeyCode::Char('s' | 'S') | KeyCode::Esc => ConflictAnswer::Skip,
            KeyCode::Char('r' | 'R') => ConflictAnswer::Rename,
            _ => return,
        };

        if let Some(question) = self.ui.conflict.take() {
            info!(
                marker = "CONFLICT_ANSWERED",
                operation_type = "download",
                path = %question.path.display(),
                answer = ?answer,
                "Conflict answered"
            );
            question.answer(answer);
        }

        match self.queued_conflicts.pop_front() {
            Some(next) => self.ui.conflict = Some(next),
            None => self.ui.mode = UIMode::Browse,
        }
        self.ui.request_redraw();
    }

    // --- Navigation requests ---

    pub async fn apply(&mut self, request: NavigationRequest) {
        debug!(
            marker = "NAVIGATION_REQUEST",
            operation_type = "navigation",
            action = ?request.action,
            binding = %request.binding,
            "Applying navigation request"
        );

        let result = match request.action {
            BindingAction::MoveUp => {
                self.navigator.move_selection(-1);
                Ok(())
            }
            BindingAction::MoveDown => {
                self.navigator.move_selection(1);
                Ok(())
            }
            BindingAction::SelectFirst => {
                self.navigator.select_first();
                Ok(())
            }
            BindingAction::SelectLast => {
                self.navigator.select_last();
                Ok(())
            }
            BindingAction::Enter => self.navigator.enter_selected().await.map(|_| ()),
            BindingAction::Back => self.navigator.navigate_up().await.map(|_| ()),
            BindingAction::NextPage => match self.navigator.next_page().await {
                Ok(false) => {
                    self.ui.show_info("Already on the last page");
                    Ok(())
                }
                other => other.map(|_| ()),
            },
            BindingAction::PreviousPage => match self.navigator.previous_page().await {
                Ok(false) => {
                    self.ui.show_info("Already on the first page");
                    Ok(())
                }
                other => other.map(|_| ()),
            },
            BindingAction::Refresh => self.navigator.refresh().await,
            BindingAction::Download => {
                self.download_selected();
                Ok(())
            }
            BindingAction::DownloadAll => {
                self.download_here(None);
                Ok(())
            }
            BindingAction::CancelDownloads => {
                self.cancel_all();
                Ok(())
            }
            BindingAction::Search | BindingAction::Command => {
                let mode = if request.action == BindingAction::Search {
                    UIMode::Search
                } else {
                    UIMode::Command
                };
                let prefix = request.prefix.as_deref().unwrap_or_default();
                self.ui.open_prompt(mode, prefix);
                Ok(())
            }
            BindingAction::Cancel => {
                self.ui.dismiss_notification();
                Ok(())
            }
            BindingAction::Help => {
                self.ui.toggle_help();
                Ok(())
            }
            BindingAction::Quit => {
                self.quit = true;
                Ok(())
            }
        };

        if let Err(e) = result {
            self.ui.show_error(e.to_string());
        }
        self.ui.request_redraw();
    }

    /// Select the next item after the cursor whose name contains `text`,
    /// ignoring case and wrapping around.
    pub fn search(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.ui.last_search = Some(text.to_string());

        let needle = text.to_lowercase();
        let items = self.navigator.items();
        let count = items.len();
        let start = self.navigator.state().selected_index;

        let found = (1..=count)
            .map(|offset| (start + offset) % count)
            .find(|&i| items[i].name.to_lowercase().contains(&needle));

        match found {
            Some(index) => self.navigator.select_index(index),
            None => self.ui.show_warning(format!("No match for \"{text}\"")),
        }
    }

    pub async fn execute_command(&mut self, line: &str) {
        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "q" | "quit" => self.quit = true,
            "r" | "refresh" => {
                if let Err(e) = self.navigator.refresh().await {
                    self.ui.show_error(e.to_string());
                }
            }
            "dl" | "download" => {
                if argument.is_empty() {
                    self.ui.show_warning("Usage: dl <glob>");
                } else {
                    self.download_here(Some(argument));
                }
            }
            "cancel" => self.cancel_all(),
            other => self.ui.show_error(format!("Unknown command: {other}")),
        }
    }

    // --- Downloads ---

    fn download_selected(&mut self) {
        if self.navigator.level() == NavigationLevel::Root {
            self.ui.show_warning("Open a container to download from it");
            return;
        }
        let Some(container) = self.navigator.state().container.clone() else {
            warn!(
                marker = "NAVIGATION_INVARIANT",
                operation_type = "download",
                "Download requested without a container"
            );
            return;
        };
        let Some(item) = self.navigator.selected_item().cloned() else {
            self.ui.show_info("Nothing selected");
            return;
        };

        match item.kind {
            ItemKind::Blob => self.spawn_download(container, item.path),
            ItemKind::VirtualDirectory => {
                let prefix = format!("{}{}", item.path, self.navigator.delimiter());
                self.spawn_batch(container, Some(prefix), "*");
            }
            ItemKind::Container => {
                warn!(
                    marker = "NAVIGATION_INVARIANT",
                    operation_type = "download",
                    "Container row below the root level"
                );
            }
        }
    }

    /// Batch over the current location. `glob` is relative to it; `None`
    /// takes everything.
    fn download_here(&mut self, glob: Option<&str>) {
        if self.navigator.level() == NavigationLevel::Root {
            self.ui.show_warning("Open a container to download from it");
            return;
        }
        let Some(container) = self.navigator.state().container.clone() else {
            return;
        };

        let prefix = self
            .navigator
            .state()
            .listing_prefix(self.navigator.delimiter());
        let pattern = format!("{}{}", prefix.as_deref().unwrap_or_default(), glob.unwrap_or("*"));
        self.spawn_batch(container, prefix, &pattern);
    }

    fn spawn_download(&mut self, container: String, blob_name: String) {
        let operation_id = nanoid::nanoid!(8);
        let cancel = CancellationToken::new();
        self.running.insert(operation_id.clone(), cancel.clone());
        self.ui.start_transfer(&operation_id, blob_name.clone());

        info!(
            marker = "DOWNLOAD_SPAWNED",
            operation_type = "download",
            operation_id = %operation_id,
            container = %container,
            blob = %blob_name,
            "Download started"
        );

        let progress_tx = self.task_tx.clone();
        let progress_id = operation_id.clone();
        let progress: ProgressCallback = Arc::new(move |p: &DownloadProgress| {
            let _ = progress_tx.send(TaskEvent::DownloadProgress {
                operation_id: progress_id.clone(),
                progress: p.clone(),
            });
        });

        let pipeline = self.pipeline.clone();
        let options = self.options.clone();
        let request = DownloadRequest::new(&container, &blob_name, self.download_root.clone());
        let task_tx = self.task_tx.clone();

        tokio::spawn(async move {
            let result = pipeline
                .download(&request, &options, Some(progress), &cancel)
                .await;
            let _ = task_tx.send(TaskEvent::DownloadFinished {
                operation_id,
                blob_name,
                result,
            });
        });
    }

    fn spawn_batch(&mut self, container: String, prefix: Option<String>, glob: &str) {
        let pattern = match BlobPattern::new(glob) {
            Ok(pattern) => pattern,
            Err(e) => {
                self.ui.show_error(e.to_string());
                return;
            }
        };

        let operation_id = nanoid::nanoid!(8);
        let cancel = CancellationToken::new();
        self.running.insert(operation_id.clone(), cancel.clone());
        self.ui
            .start_transfer(&operation_id, format!("{container}: {glob}"));

        info!(
            marker = "BATCH_SPAWNED",
            operation_type = "batch_download",
            operation_id = %operation_id,
            container = %container,
            pattern = glob,
            "Batch download started"
        );

        let file_tx = self.task_tx.clone();
        let file_id = operation_id.clone();
        let file_progress: ProgressCallback = Arc::new(move |p: &DownloadProgress| {
            let _ = file_tx.send(TaskEvent::DownloadProgress {
                operation_id: file_id.clone(),
                progress: p.clone(),
            });
        });

        let batch_tx = self.task_tx.clone();
        let batch_id = operation_id.clone();
        let batch_progress: BatchProgressCallback = Arc::new(move |p: &BatchProgress| {
            let _ = batch_tx.send(TaskEvent::BatchProgress {
                operation_id: batch_id.clone(),
                progress: p.clone(),
            });
        });

        let request = BatchRequest {
            container,
            prefix,
            pattern,
            root: self.download_root.clone(),
        };
        let pipeline = self.pipeline.clone();
        let options = self.options.clone();
        let task_tx = self.task_tx.clone();

        tokio::spawn(async move {
            let result = download_matching(
                &pipeline,
                &request,
                &options,
                Some(file_progress),
                Some(batch_progress),
                &cancel,
            )
            .await;
            let _ = task_tx.send(TaskEvent::BatchFinished {
                operation_id,
                result,
            });
        });
    }

    fn cancel_all(&mut self) {
        if self.running.is_empty() {
            self.ui.show_info("No downloads running");
            return;
        }
        for token in self.running.values() {
            token.cancel();
        }
        self.ui
            .show_warning(format!("Cancelling {} download(s)", self.running.len()));
    }

    /// Cancel everything still running (used on exit).
    pub fn shutdown(&mut self) {
        for token in self.running.values() {
            token.cancel();
        }
    }

    // --- Task results ---

    pub fn handle_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::DownloadProgress {
                operation_id,
                progress,
            } => {
                if let Some(view) = self.ui.transfer_mut(&operation_id) {
                    view.progress = Some(progress);
                }
            }
            TaskEvent::BatchProgress {
                operation_id,
                progress,
            } => {
                if let Some(view) = self.ui.transfer_mut(&operation_id) {
                    view.batch = Some(progress);
                }
            }
            TaskEvent::DownloadFinished {
                operation_id,
                blob_name,
                result,
            } => {
                self.running.remove(&operation_id);
                self.ui.finish_transfer(&operation_id);
                self.report_download(&blob_name, result);
            }
            TaskEvent::BatchFinished {
                operation_id,
                result,
            } => {
                self.running.remove(&operation_id);
                self.ui.finish_transfer(&operation_id);
                self.report_batch(result);
            }
            TaskEvent::ConflictQuestion(question) => {
                if self.ui.conflict.is_some() {
                    self.queued_conflicts.push_back(question);
                } else {
                    if self.ui.is_prompt_active() {
                        self.ui.close_prompt();
                    }
                    self.ui.conflict = Some(question);
                    self.ui.mode = UIMode::Conflict;
                }
            }
        }
        self.ui.request_redraw();
    }

    fn report_download(&mut self, blob_name: &str, result: Result<DownloadOutcome, AppError>) {
        match result {
            Ok(DownloadOutcome::Completed {
                path,
                resumed_from,
                verified,
                ..
            }) => {
                let mut message = format!("Downloaded {blob_name} to {}", path.display());
                if resumed_from > 0 {
                    message.push_str(" (resumed)");
                }
                if verified {
                    message.push_str(" [verified]");
                }
                self.ui.show_success(message);
            }
            Ok(DownloadOutcome::Skipped { path }) => {
                self.ui
                    .show_info(format!("Skipped {blob_name}: {} exists", path.display()));
            }
            Err(AppError::Cancelled) => {
                self.ui
                    .show_warning(format!("Cancelled {blob_name}, partial file kept"));
            }
            Err(e) => self.ui.show_error(format!("Download of {blob_name} failed: {e}")),
        }
    }

    fn report_batch(&mut self, result: Result<BatchDownloadResult, AppError>) {
        match result {
            Ok(batch) => {
                let message = format!(
                    "Batch: {} downloaded, {} skipped, {} failed{}",
                    batch.completed(),
                    batch.skipped(),
                    batch.failed(),
                    if batch.cancelled { " (cancelled)" } else { "" }
                );
                if batch.failed() > 0 || batch.cancelled {
                    self.ui.show_warning(message);
                } else {
                    self.ui.show_success(message);
                }
            }
            Err(e) => self.ui.show_error(format!("Batch download failed: {e}")),
        }
    }
}
