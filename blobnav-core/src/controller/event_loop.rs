//! src/controller/event_loop.rs
//! ============================================================================
//! # Event Loop: Terminal, Input, Task and Tick Multiplexing
//!
//! Single entry point the foreground loop awaits. Terminal events, synthetic
//! key repeats, background task results and conflict questions all come out
//! of `next_event` one at a time, so nothing re-enters input handling
//! concurrently.

use std::io;
use std::time::Duration;

use crossterm::event::Event as TermEvent;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::controller::key_repeat::InputEvent;
use crate::error::AppError;
use crate::tasks::batch_download_task::BatchDownloadResult;
use crate::tasks::download_task::DownloadOutcome;
use crate::transfer::conflict::PendingConflict;
use crate::transfer::progress::{BatchProgress, DownloadProgress};

/// Results reported back by download tasks.
#[derive(Debug)]
pub enum TaskEvent {
    DownloadProgress {
        operation_id: String,
        progress: DownloadProgress,
    },

    BatchProgress {
        operation_id: String,
        progress: BatchProgress,
    },

    DownloadFinished {
        operation_id: String,
        blob_name: String,
        result: Result<DownloadOutcome, AppError>,
    },

    BatchFinished {
        operation_id: String,
        result: Result<BatchDownloadResult, AppError>,
    },

    /// A download hit an existing file under the `ask` policy.
    ConflictQuestion(PendingConflict),
}

#[derive(Debug)]
pub enum LoopEvent {
    Terminal(TermEvent),
    Input(InputEvent),
    Task(TaskEvent),
    Tick(Instant),
}

pub struct EventLoop<S> {
    terminal: S,
    input_rx: mpsc::UnboundedReceiver<InputEvent>,
    task_rx: mpsc::UnboundedReceiver<TaskEvent>,
    conflict_rx: mpsc::UnboundedReceiver<PendingConflict>,
    ticker: Interval,
    terminal_closed: bool,
}

impl<S> EventLoop<S>
where
    S: Stream<Item = io::Result<TermEvent>> + Unpin,
{
    pub fn new(
        terminal: S,
        input_rx: mpsc::UnboundedReceiver<InputEvent>,
        task_rx: mpsc::UnboundedReceiver<TaskEvent>,
        conflict_rx: mpsc::UnboundedReceiver<PendingConflict>,
        tick_rate: Duration,
    ) -> Self {
        let mut ticker = tokio::time::interval(tick_rate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            marker = "EVENT_LOOP_START",
            operation_type = "event_loop",
            tick_ms = tick_rate.as_millis() as u64,
            "Event loop initialized"
        );

        Self {
            terminal,
            input_rx,
            task_rx,
            conflict_rx,
            ticker,
            terminal_closed: false,
        }
    }

    /// Next event from any source. `None` when the terminal stream ends.
    pub async fn next_event(&mut self) -> Option<LoopEvent> {
        loop {
            let event = tokio::select! {
                biased;

                maybe = self.terminal.next(), if !self.terminal_closed => match maybe {
                    Some(Ok(event)) => {
                        trace!("Terminal event received: {:?}", event);
                        Some(LoopEvent::Terminal(event))
                    }
                    Some(Err(e)) => {
                        debug!("Terminal event error: {e}");
                        None
                    }
                    None => {
                        info!("Terminal event stream ended");
                        self.terminal_closed = true;
                        return None;
                    }
                },

                Some(input) = self.input_rx.recv() => Some(LoopEvent::Input(input)),

                Some(question) = self.conflict_rx.recv() => {
                    Some(LoopEvent::Task(TaskEvent::ConflictQuestion(question)))
                }

                Some(task) = self.task_rx.recv() => Some(LoopEvent::Task(task)),

                now = self.ticker.tick() => Some(LoopEvent::Tick(now)),
            };

            if let Some(event) = event {
                return Some(event);
            }
        }
    }
}
