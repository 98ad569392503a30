//! src/controller/key_repeat.rs
//! ============================================================================
//! # Key Repeat Emulation
//!
//! Terminals that report key releases stop sending presses while a key is
//! held, so holding Up/Down is emulated here. The timer task never touches
//! input state: it only sends `InputEvent::Repeat` into the same channel the
//! foreground loop drains, so synthetic repeats are processed in order with
//! real keystrokes.

use crossterm::event::KeyEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at, sleep};
use tracing::trace;

use crate::config::KeyRepeatConfig;

/// Everything the foreground loop treats as keyboard input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    Repeat(KeyEvent),
}

#[derive(Debug)]
struct ActiveRepeat {
    key: KeyEvent,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct KeyRepeater {
    config: KeyRepeatConfig,
    tx: mpsc::UnboundedSender<InputEvent>,
    active: Option<ActiveRepeat>,
}

impl KeyRepeater {
    pub fn new(config: KeyRepeatConfig, tx: mpsc::UnboundedSender<InputEvent>) -> Self {
        Self {
            config,
            tx,
            active: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &KeyRepeatConfig {
        &self.config
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        if !enabled {
            self.stop();
        }
    }

    /// Start repeating `key`: one initial delay, then a fixed interval.
    pub fn start(&mut self, key: KeyEvent) {
        self.stop();

        if !self.config.enabled {
            return;
        }

        let tx = self.tx.clone();
        let initial = self.config.initial_delay;
        let every = self.config.interval;

        let handle = tokio::spawn(async move {
            sleep(initial).await;

            let mut ticker = interval_at(tokio::time::Instant::now(), every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if tx.send(InputEvent::Repeat(key)).is_err() {
                    break;
                }
            }
        });

        trace!(
            marker = "KEY_REPEAT_START",
            operation_type = "input_handling",
            key = ?key.code,
            "Key repeat armed"
        );

        self.active = Some(ActiveRepeat { key, handle });
    }

    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.abort();
            trace!(
                marker = "KEY_REPEAT_STOP",
                operation_type = "input_handling",
                key = ?active.key.code,
                "Key repeat stopped"
            );
        }
    }

    #[must_use]
    pub fn is_repeating(&self) -> bool {
        self.active.is_some()
    }

    /// Whether the running repeat is for the same key code and modifiers.
    #[must_use]
    pub fn is_repeating_key(&self, key: &KeyEvent) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.key.code == key.code && a.key.modifiers == key.modifiers)
    }
}

impl Drop for KeyRepeater {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::keys::arrow_key;
    use crossterm::event::KeyCode;
    use std::time::Duration;

    fn config() -> KeyRepeatConfig {
        KeyRepeatConfig {
            enabled: true,
            initial_delay: Duration::from_millis(400),
            interval: Duration::from_millis(50),
            min_inter_arrival: Duration::from_millis(25),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_waits_for_initial_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut repeater = KeyRepeater::new(config(), tx);
        repeater.start(arrow_key(KeyCode::Down));

        sleep(Duration::from_millis(399)).await;
        assert!(rx.try_recv().is_err());

        sleep(Duration::from_millis(2)).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            InputEvent::Repeat(arrow_key(KeyCode::Down))
        );

        // Then once per interval.
        sleep(Duration::from_millis(100)).await;
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_repeats() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut repeater = KeyRepeater::new(config(), tx);
        repeater.start(arrow_key(KeyCode::Up));
        assert!(repeater.is_repeating_key(&arrow_key(KeyCode::Up)));
        assert!(!repeater.is_repeating_key(&arrow_key(KeyCode::Down)));

        repeater.stop();
        sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
        assert!(!repeater.is_repeating());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_repeater_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut repeater = KeyRepeater::new(
            KeyRepeatConfig {
                enabled: false,
                ..config()
            },
            tx,
        );
        repeater.start(arrow_key(KeyCode::Down));

        sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert!(!repeater.is_repeating());
    }
}
