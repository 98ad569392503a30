//! src/transfer/progress.rs
//! ============================================================================
//! # Progress Reporting
//!
//! `ProgressTracker` accumulates bytes moved for one blob and produces
//! `DownloadProgress` snapshots; `ProgressStream` is the stream decorator that
//! feeds it and invokes a callback per chunk.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::time::Instant;

/// Snapshot for one blob.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub blob_name: String,
    pub total_bytes: u64,
    pub bytes_transferred: u64,

    /// 0 when the total is unknown or zero.
    pub percentage: f64,

    /// Throughput over the most recent sampling window.
    pub bytes_per_second: f64,

    /// `None` while throughput is zero.
    pub eta: Option<Duration>,
}

/// Coarse progress for a pattern batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub files_completed: usize,
    pub files_total: usize,
    pub bytes_transferred: u64,
    pub current_file: Option<String>,
}

pub type ProgressCallback = Arc<dyn Fn(&DownloadProgress) + Send + Sync>;
pub type BatchProgressCallback = Arc<dyn Fn(&BatchProgress) + Send + Sync>;

/// Minimum window for throughput sampling.
const RATE_WINDOW: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    blob_name: String,
    total_bytes: u64,
    transferred: u64,
    window_start: Instant,
    window_bytes: u64,
    rate: f64,
}

impl ProgressTracker {
    /// `already` counts bytes present before this attempt (resume offset).
    #[must_use]
    pub fn new(blob_name: impl Into<String>, total_bytes: u64, already: u64) -> Self {
        Self {
            blob_name: blob_name.into(),
            total_bytes,
            transferred: already,
            window_start: Instant::now(),
            window_bytes: 0,
            rate: 0.0,
        }
    }

    pub fn record(&mut self, n: usize) -> DownloadProgress {
        self.record_at(n, Instant::now())
    }

    pub fn record_at(&mut self, n: usize, now: Instant) -> DownloadProgress {
        self.transferred = self.transferred.saturating_add(n as u64);
        self.window_bytes = self.window_bytes.saturating_add(n as u64);

        let window = now.saturating_duration_since(self.window_start);
        if window >= RATE_WINDOW {
            self.rate = self.window_bytes as f64 / window.as_secs_f64();
            self.window_start = now;
            self.window_bytes = 0;
        }

        self.snapshot()
    }

    #[must_use]
    pub const fn transferred(&self) -> u64 {
        self.transferred
    }

    #[must_use]
    pub fn snapshot(&self) -> DownloadProgress {
        let percentage = if self.total_bytes == 0 {
            0.0
        } else {
            (self.transferred as f64 / self.total_bytes as f64 * 100.0).min(100.0)
        };

        let remaining = self.total_bytes.saturating_sub(self.transferred);
        let eta = (self.rate > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / self.rate));

        DownloadProgress {
            blob_name: self.blob_name.clone(),
            total_bytes: self.total_bytes,
            bytes_transferred: self.transferred,
            percentage,
            bytes_per_second: self.rate,
            eta,
        }
    }
}

/// Stream decorator reporting every chunk that passes through.
pub struct ProgressStream<S> {
    inner: S,
    tracker: ProgressTracker,
    callback: Option<ProgressCallback>,
}

impl<S> ProgressStream<S> {
    pub const fn new(inner: S, tracker: ProgressTracker, callback: Option<ProgressCallback>) -> Self {
        Self {
            inner,
            tracker,
            callback,
        }
    }

    #[must_use]
    pub const fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }
}

impl<S, E> Stream for ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_next(cx);

        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            let progress = this.tracker.record(chunk.len());
            if let Some(callback) = &this.callback {
                callback(&progress);
            }
        }

        polled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, stream};
    use parking_lot::Mutex;

    #[test]
    fn test_zero_total_reports_zero_percent() {
        let tracker = ProgressTracker::new("empty", 0, 0);
        let snap = tracker.snapshot();
        assert!(snap.percentage.abs() < f64::EPSILON);
        assert!(snap.eta.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_and_eta() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::new("blob", 4000, 0);

        let first = tracker.record_at(1000, t0 + Duration::from_millis(100));
        assert!(first.eta.is_none());

        let second = tracker.record_at(1000, t0 + Duration::from_secs(1));
        assert!((second.bytes_per_second - 2000.0).abs() < 1e-6);
        assert!((second.percentage - 50.0).abs() < 1e-9);
        assert_eq!(second.eta, Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_resume_offset_counts_toward_total() {
        let tracker = ProgressTracker::new("blob", 100, 60);
        assert!((tracker.snapshot().percentage - 60.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_progress_stream_invokes_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |p: &DownloadProgress| {
            sink.lock().push(p.bytes_transferred);
        });

        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"de"))];
        let wrapped = ProgressStream::new(
            stream::iter(chunks),
            ProgressTracker::new("blob", 5, 0),
            Some(callback),
        );
        let _: Vec<_> = wrapped.collect().await;

        assert_eq!(*seen.lock(), vec![3, 5]);
    }
}
