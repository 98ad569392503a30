//! src/transfer/throttle.rs
//! ============================================================================
//! # Throttle: Cumulative Bandwidth Cap
//!
//! Before each chunk of `n` bytes the throttle computes how long to wait so
//! that `(transferred + n) / elapsed <= max_bytes_per_second`. Working from
//! cumulative totals keeps rounding errors from piling up chunk after chunk.
//! The counter and the start baseline change together under one lock, so the
//! same throttle can be shared by async streams and blocking writers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::time::{Instant, Sleep, sleep};

#[derive(Debug, Default)]
struct ThrottleState {
    started: Option<Instant>,
    transferred: u64,
}

#[derive(Debug)]
pub struct Throttle {
    max_bytes_per_second: Option<u64>,
    state: Mutex<ThrottleState>,
}

impl Throttle {
    /// `None` or `Some(0)` disables throttling.
    #[must_use]
    pub fn new(max_bytes_per_second: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            max_bytes_per_second: max_bytes_per_second.filter(|&rate| rate > 0),
            state: Mutex::new(ThrottleState::default()),
        })
    }

    #[must_use]
    pub const fn rate(&self) -> Option<u64> {
        self.max_bytes_per_second
    }

    /// Account for `n` bytes and return the delay owed before sending them.
    pub fn reserve(&self, n: usize) -> Duration {
        self.reserve_at(n, Instant::now())
    }

    fn reserve_at(&self, n: usize, now: Instant) -> Duration {
        let Some(rate) = self.max_bytes_per_second else {
            return Duration::ZERO;
        };

        let mut state = self.state.lock();
        let started = *state.started.get_or_insert(now);
        state.transferred = state.transferred.saturating_add(n as u64);

        let required = Duration::from_secs_f64(state.transferred as f64 / rate as f64);
        let elapsed = now.saturating_duration_since(started);
        required.saturating_sub(elapsed)
    }

    pub async fn acquire(&self, n: usize) {
        let delay = self.reserve(n);
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    /// Blocking variant for synchronous writers.
    pub fn acquire_blocking(&self, n: usize) {
        let delay = self.reserve_at(n, Instant::now());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    #[must_use]
    pub fn transferred(&self) -> u64 {
        self.state.lock().transferred
    }
}

/// Stream decorator that delays each chunk according to a shared throttle.
pub struct ThrottledStream<S> {
    inner: S,
    throttle: Arc<Throttle>,
    pending: Option<(Bytes, Pin<Box<Sleep>>)>,
}

impl<S> ThrottledStream<S> {
    pub const fn new(inner: S, throttle: Arc<Throttle>) -> Self {
        Self {
            inner,
            throttle,
            pending: None,
        }
    }
}

impl<S, E> Stream for ThrottledStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some((_, delay)) = this.pending.as_mut() {
                if delay.as_mut().poll(cx).is_pending() {
                    return Poll::Pending;
                }
                if let Some((chunk, _)) = this.pending.take() {
                    return Poll::Ready(Some(Ok(chunk)));
                }
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let delay = this.throttle.reserve(chunk.len());
                    if delay.is_zero() {
                        return Poll::Ready(Some(Ok(chunk)));
                    }
                    this.pending = Some((chunk, Box::pin(sleep(delay))));
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, stream};

    #[tokio::test(start_paused = true)]
    async fn test_three_transfers_respect_rate() {
        let throttle = Throttle::new(Some(1000));
        let start = Instant::now();

        for _ in 0..3 {
            throttle.acquire(500).await;
        }

        // Third 500-byte chunk can only go once 1500 bytes / 1000 B/s elapsed.
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert_eq!(throttle.transferred(), 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_never_waits() {
        let throttle = Throttle::new(Some(0));
        assert_eq!(throttle.reserve(1 << 30), Duration::ZERO);
        assert!(throttle.rate().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cumulative_accounting_absorbs_idle_time() {
        let throttle = Throttle::new(Some(1000));
        let t0 = Instant::now();

        assert_eq!(
            throttle.reserve_at(500, t0),
            Duration::from_millis(500)
        );
        // Caller was idle for two seconds; the budget already covers 1000 B.
        assert_eq!(
            throttle.reserve_at(500, t0 + Duration::from_secs(2)),
            Duration::ZERO
        );
    }

    #[tokio::test]
    async fn test_blocking_and_async_callers_share_one_budget() {
        let throttle = Throttle::new(Some(1000));
        let start = std::time::Instant::now();

        throttle.acquire(200).await;
        let writer = Arc::clone(&throttle);
        tokio::task::spawn_blocking(move || writer.acquire_blocking(200))
            .await
            .unwrap();

        assert_eq!(throttle.transferred(), 400);
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_stream_delays_chunks() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            (0..4).map(|_| Ok(Bytes::from(vec![0u8; 250]))).collect();
        let throttle = Throttle::new(Some(500));
        let start = Instant::now();

        let total: usize = ThrottledStream::new(stream::iter(chunks), throttle)
            .map(|c| c.map_or(0, |b| b.len()))
            .fold(0, |acc, n| async move { acc + n })
            .await;

        assert_eq!(total, 1000);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
