//! src/model/ui_state.rs
//! ============================================================================
//! # UIState: Modes, Prompt Line, Notifications and Transfers
//!
//! Ephemeral interaction state for the terminal client. Browse state lives in
//! the navigator; this holds everything the renderer shows around it.

use std::collections::VecDeque;

use compact_str::CompactString;
use tokio::time::Instant;

use crate::transfer::conflict::PendingConflict;
use crate::transfer::progress::{BatchProgress, DownloadProgress};

const MAX_RECENT_MESSAGES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UIMode {
    Browse,
    Search,
    Command,
    /// A conflict prompt is waiting for o/s/r.
    Conflict,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: CompactString,
    pub level: NotificationLevel,
    pub timestamp: Instant,
    pub auto_dismiss_ms: Option<u64>,
}

/// One running download as shown in the transfer panel.
#[derive(Debug, Clone)]
pub struct TransferView {
    pub operation_id: String,
    pub label: String,
    pub progress: Option<DownloadProgress>,
    pub batch: Option<BatchProgress>,
}

impl TransferView {
    /// Fraction in `0.0..=1.0` for the gauge.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if let Some(batch) = &self.batch
            && batch.files_total > 0
        {
            let file_part = self
                .progress
                .as_ref()
                .map_or(0.0, |p| p.percentage / 100.0);
            return ((batch.files_completed as f64 + file_part) / batch.files_total as f64)
                .clamp(0.0, 1.0);
        }

        self.progress
            .as_ref()
            .map_or(0.0, |p| (p.percentage / 100.0).clamp(0.0, 1.0))
    }
}

#[derive(Debug)]
pub struct UIState {
    pub mode: UIMode,

    /// Prompt text after the literal prefix.
    pub input: String,

    /// Literal prefix shown before the input ("/" or ":").
    pub prompt_prefix: CompactString,

    pub last_search: Option<String>,
    pub notification: Option<Notification>,

    /// Recent messages, newest last.
    pub history: VecDeque<CompactString>,

    pub transfers: Vec<TransferView>,

    pub conflict: Option<PendingConflict>,

    /// Unresolved key sequence, for the status bar.
    pub pending_keys: String,

    pub redraw: bool,
}

impl UIState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: UIMode::Browse,
            input: String::new(),
            prompt_prefix: CompactString::default(),
            last_search: None,
            notification: None,
            history: VecDeque::with_capacity(MAX_RECENT_MESSAGES),
            transfers: Vec::new(),
            conflict: None,
            pending_keys: String::new(),
            redraw: true,
        }
    }

    pub fn request_redraw(&mut self) {
        self.redraw = true;
    }

    /// Enter search or command entry with its literal prefix.
    pub fn open_prompt(&mut self, mode: UIMode, prefix: &str) {
        self.mode = mode;
        self.prompt_prefix = prefix.into();
        self.input.clear();
        self.redraw = true;
    }

    pub fn close_prompt(&mut self) {
        self.mode = UIMode::Browse;
        self.prompt_prefix = CompactString::default();
        self.input.clear();
        self.redraw = true;
    }

    #[must_use]
    pub const fn is_prompt_active(&self) -> bool {
        matches!(self.mode, UIMode::Search | UIMode::Command)
    }

    pub fn toggle_help(&mut self) {
        self.mode = match self.mode {
            UIMode::Help => UIMode::Browse,
            _ => UIMode::Help,
        };
        self.redraw = true;
    }

    // --- Notifications ---
    pub fn show_notification(
        &mut self,
        message: impl Into<CompactString>,
        level: NotificationLevel,
        auto_dismiss_ms: Option<u64>,
    ) {
        let message = message.into();
        if self.history.len() == MAX_RECENT_MESSAGES {
            self.history.pop_front();
        }
        self.history.push_back(message.clone());

        self.notification = Some(Notification {
            message,
            level,
            timestamp: Instant::now(),
            auto_dismiss_ms,
        });
        self.redraw = true;
    }

    pub fn show_info(&mut self, message: impl Into<CompactString>) {
        self.show_notification(message, NotificationLevel::Info, Some(3000));
    }

    pub fn show_warning(&mut self, message: impl Into<CompactString>) {
        self.show_notification(message, NotificationLevel::Warning, Some(5000));
    }

    /// Errors stay until replaced.
    pub fn show_error(&mut self, message: impl Into<CompactString>) {
        self.show_notification(message, NotificationLevel::Error, None);
    }

    pub fn show_success(&mut self, message: impl Into<CompactString>) {
        self.show_notification(message, NotificationLevel::Success, Some(2000));
    }

    pub fn dismiss_notification(&mut self) {
        self.notification = None;
        self.redraw = true;
    }

    /// Drop an expired notification. Returns true if one was dismissed.
    pub fn update_notification(&mut self, now: Instant) -> bool {
        let expired = self.notification.as_ref().is_some_and(|n| {
            n.auto_dismiss_ms.is_some_and(|ms| {
                now.saturating_duration_since(n.timestamp).as_millis() > u128::from(ms)
            })
        });

        if expired {
            self.dismiss_notification();
        }
        expired
    }

    // --- Transfers ---
    pub fn start_transfer(&mut self, operation_id: &str, label: impl Into<String>) {
        self.transfers.push(TransferView {
            operation_id: operation_id.to_string(),
            label: label.into(),
            progress: None,
            batch: None,
        });
        self.redraw = true;
    }

    pub fn transfer_mut(&mut self, operation_id: &str) -> Option<&mut TransferView> {
        self.transfers
            .iter_mut()
            .find(|t| t.operation_id == operation_id)
    }

    pub fn finish_transfer(&mut self, operation_id: &str) {
        self.transfers.retain(|t| t.operation_id != operation_id);
        self.redraw = true;
    }
}

impl Default for UIState {
    fn default() -> Self {
        Self::new()
    }
}
