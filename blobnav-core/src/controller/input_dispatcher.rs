//! src/controller/input_dispatcher.rs
//! ============================================================================
//! # `InputDispatcher`: Raw Keys to Navigation Requests
//!
//! Front door for keyboard input in browse mode:
//! - Unambiguous keys (Enter, arrows, paging keys, Esc) bypass the resolver
//! - Printable characters are case-normalized and fed to `KeyBindingResolver`
//! - Up/Down holds are emulated through `KeyRepeater`
//!
//! Every completed binding is sent exactly once as a `NavigationRequest` on
//! the channel handed to `new`.

use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::KeymapConfig;
use crate::controller::actions::{BindingAction, NavigationRequest};
use crate::controller::key_repeat::{InputEvent, KeyRepeater};
use crate::controller::key_sequence::{BindingTable, KeyBindingResolver, ResolvedBinding};
use crate::controller::keys::{is_repeatable, key_name, normalize_char};
use crate::error::AppError;

#[derive(Debug)]
pub struct InputDispatcher {
    resolver: KeyBindingResolver,
    table: BindingTable,
    repeater: KeyRepeater,
    requests: mpsc::UnboundedSender<NavigationRequest>,
    min_inter_arrival: Duration,
    last_directional: Option<Instant>,
}

impl InputDispatcher {
    pub fn new(
        keymap: &KeymapConfig,
        requests: mpsc::UnboundedSender<NavigationRequest>,
        input_tx: mpsc::UnboundedSender<InputEvent>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            resolver: KeyBindingResolver::new(keymap.sequence_timeout),
            table: keymap.binding_table()?,
            repeater: KeyRepeater::new(keymap.repeat.clone(), input_tx),
            requests,
            min_inter_arrival: keymap.repeat.min_inter_arrival,
            last_directional: None,
        })
    }

    /// Turn repeat emulation on or off (off when the terminal cannot report
    /// key releases).
    pub fn set_repeat_enabled(&mut self, enabled: bool) {
        self.repeater.set_enabled(enabled);
    }

    #[must_use]
    pub const fn table(&self) -> &BindingTable {
        &self.table
    }

    /// Pending sequence for the status bar.
    #[must_use]
    pub fn pending_keys(&self) -> String {
        self.resolver.pending().to_string()
    }

    pub fn stop_repeat(&mut self) {
        self.repeater.stop();
    }

    /// Process one real key event. Returns whether it produced or advanced a
    /// binding.
    pub fn process(&mut self, key: KeyEvent, now: Instant) -> bool {
        if key.kind == KeyEventKind::Release {
            if self.repeater.is_repeating_key(&key) {
                self.repeater.stop();
            }
            return false;
        }

        if is_repeatable(key.code) {
            return self.process_directional(key, now);
        }

        self.repeater.stop();

        if let Some(action) = Self::fast_path(&key) {
            if action == BindingAction::Cancel {
                self.resolver.reset();
            }
            self.emit(action, key_name(key.code));
            return true;
        }

        match key.code {
            KeyCode::Char(c)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                let c = normalize_char(c, key.modifiers);
                let result = self.resolver.feed(c, &self.table, now);
                let completed = result.completed();
                for resolved in result.completions() {
                    self.emit_resolved(resolved);
                }
                completed || result.is_partial_match
            }
            _ => {
                trace!(
                    marker = "INPUT_UNHANDLED",
                    operation_type = "input_handling",
                    key = ?key.code,
                    "Key has no binding"
                );
                false
            }
        }
    }

    /// Process a synthetic repeat sent by the repeat timer. Returns whether
    /// it moved the selection.
    pub fn process_repeat(&mut self, key: KeyEvent, now: Instant) -> bool {
        if !self.repeater.is_repeating_key(&key) {
            // Stale event queued before the repeat was stopped.
            return false;
        }
        if self.arrived_too_soon(now) {
            return false;
        }

        self.emit_directional(key, now);
        true
    }

    /// Periodic flush so a pending prefix completes without further keys.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.resolver.expire(&self.table, now) {
            Some(resolved) => {
                self.emit_resolved(&resolved);
                true
            }
            None => false,
        }
    }

    fn process_directional(&mut self, key: KeyEvent, now: Instant) -> bool {
        if self.repeater.is_repeating_key(&key) {
            // Held key auto-repeating at the OS level on top of our timer.
            if self.arrived_too_soon(now) {
                return true;
            }
            self.emit_directional(key, now);
            return true;
        }

        self.emit_directional(key, now);
        if key.kind == KeyEventKind::Press {
            self.repeater.start(key);
        }
        true
    }

    fn arrived_too_soon(&self, now: Instant) -> bool {
        self.last_directional
            .is_some_and(|last| now.saturating_duration_since(last) < self.min_inter_arrival)
    }

    fn emit_directional(&mut self, key: KeyEvent, now: Instant) {
        self.last_directional = Some(now);
        let action = if key.code == KeyCode::Up {
            BindingAction::MoveUp
        } else {
            BindingAction::MoveDown
        };
        self.emit(action, key_name(key.code));
    }

    fn fast_path(key: &KeyEvent) -> Option<BindingAction> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(BindingAction::Quit);
        }

        Some(match key.code {
            KeyCode::Enter | KeyCode::Right => BindingAction::Enter,
            KeyCode::Left | KeyCode::Backspace => BindingAction::Back,
            KeyCode::PageDown => BindingAction::NextPage,
            KeyCode::PageUp => BindingAction::PreviousPage,
            KeyCode::Home => BindingAction::SelectFirst,
            KeyCode::End => BindingAction::SelectLast,
            KeyCode::Esc => BindingAction::Cancel,
            _ => return None,
        })
    }

    fn emit_resolved(&self, resolved: &ResolvedBinding) {
        self.emit(resolved.action, resolved.sequence.as_str());
    }

    fn emit(&self, action: BindingAction, binding: &str) {
        debug!(
            marker = "NAVIGATION_REQUEST",
            operation_type = "input_handling",
            action = action.label(),
            binding = binding,
            "Binding resolved"
        );

        if self.requests.send(NavigationRequest::new(action, binding)).is_err() {
            trace!("Navigation request receiver dropped");
        }
    }
}
