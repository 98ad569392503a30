//! src/logging.rs
//! Tracing setup: a sequence-numbered compact format written to a daily
//! rolling file. Nothing goes to stdout/stderr while the TUI owns the screen.

use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use tracing::Metadata;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        self, FmtContext,
        format::{FormatEvent, FormatFields, Writer},
    },
    layer::SubscriberExt,
    prelude::*,
};

use crate::config::{Config, LoggingConfig};
use crate::error::AppError;

const LOG_FILE_PREFIX: &str = "blobnav";
const MAX_LOG_FILES: usize = 7;

pub struct Logger;

impl Logger {
    /// Call **once** near the start of `main`. Keep the guard alive until
    /// exit or buffered lines are lost.
    pub fn init(config: &LoggingConfig) -> Result<WorkerGuard, AppError> {
        let log_dir: PathBuf = match &config.directory {
            Some(dir) => dir.clone(),
            None => Config::default_log_dir()?,
        };
        fs::create_dir_all(&log_dir).map_err(|e| AppError::ConfigIo {
            path: log_dir.clone(),
            source: e,
        })?;

        // <dir>/blobnav.YYYY-MM-DD.log, oldest files pruned past MAX_LOG_FILES
        let file: RollingFileAppender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .max_log_files(MAX_LOG_FILES)
            .build(&log_dir)
            .map_err(|e| AppError::Other(format!("cannot create log appender: {e}")))?;
        let (writer, guard) = tracing_appender::non_blocking(file);

        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .map_err(|e| AppError::invalid_input("logging.level", e.to_string()))?;

        let file_layer = fmt::layer()
            .event_format(NumberedLine)
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(file_layer)
            .try_init()
            .map_err(|e| AppError::Other(format!("logger already initialized: {e}")))?;

        Ok(guard)
    }
}

static NEXT_LINE: AtomicUsize = AtomicUsize::new(1);

/// One event per line: `NNNNNN HH:MM:SS.mmm LEVEL [file:line module] message fields`.
struct NumberedLine;

impl<S, N> FormatEvent<S, N> for NumberedLine
where
    S: tracing::Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut w: Writer<'_>,
        ev: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let seq = NEXT_LINE.fetch_add(1, Ordering::Relaxed);

        let meta: &'static Metadata<'static> = ev.metadata();
        write!(
            w,
            "{seq:06} {} {:5} [{}:{} {}] ",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            meta.level(),
            meta.file().unwrap_or("??"),
            meta.line().unwrap_or(0),
            meta.module_path().unwrap_or("???"),
        )?;

        ctx.field_format().format_fields(w.by_ref(), ev)?;
        writeln!(w)
    }
}
