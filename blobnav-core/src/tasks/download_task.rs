//! src/tasks/download_task.rs
//! ============================================================================
//! # `DownloadPipeline`: One Blob, End to End
//!
//! Stages, each fallible:
//! 1. resolve and sanitize the local target path
//! 2. resume a matching partial session, or run the conflict check
//! 3. create parent directories
//! 4. stream the blob through stall-timeout, throttle and progress decorators
//! 5. verify the checksum when one is known
//! 6. retry recoverable failures from the last written offset
//!
//! Cancellation is observed between chunks and during backoff. It leaves the
//! partial file and its session in place so a later run can resume.
//!
//! Runs on one pipeline are serialized: a second download waits for the first
//! to finish, so the bandwidth cap holds across everything the pipeline moves.

use std::future::Future;
use std::cmp::Reverse;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter, SeekFrom};
use tokio::sync::Mutex;
use tokio::time::{Sleep, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::model::download_session::{DownloadOptions, DownloadSession};
use crate::storage::backend::{BlobMetadata, ByteStream, StorageBackend};
use crate::transfer::checksum::{ExpectedChecksum, verify_file};
use crate::transfer::conflict::{
    ConflictPrompt, ConflictResolver, Resolution, is_renamed_from,
};
use crate::transfer::path_sanitizer::{TargetPlatform, resolve_target_path};
use crate::transfer::progress::{ProgressCallback, ProgressStream, ProgressTracker};
use crate::transfer::session_store::SessionStore;
use crate::transfer::throttle::{Throttle, ThrottledStream};

const BACKOFF_BASE: Duration = Duration::from_millis(100);
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Delay before retry number `retry` (1-based).
#[must_use]
pub fn retry_delay(retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1).min(16);
    BACKOFF_BASE.saturating_mul(1 << exponent).min(BACKOFF_MAX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub container: String,
    pub blob_name: String,

    /// Session root; the file lands at `<root>/<container>/<blob path>`.
    pub root: PathBuf,
}

impl DownloadRequest {
    #[must_use]
    pub fn new(container: &str, blob_name: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            container: container.to_string(),
            blob_name: blob_name.to_string(),
            root: root.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed {
        path: PathBuf,
        /// Bytes written by this run (excludes a resumed prefix).
        bytes_written: u64,
        resumed_from: u64,
        verified: bool,
        session: DownloadSession,
    },
    /// Target existed and the conflict answer was Skip.
    Skipped { path: PathBuf },
}

impl DownloadOutcome {
    #[must_use]
    pub const fn path(&self) -> &PathBuf {
        match self {
            Self::Completed { path, .. } | Self::Skipped { path } => path,
        }
    }
}

/// Turns a stream that stops producing for longer than `timeout` into an
/// `io::ErrorKind::TimedOut` error. The clock only runs while the stream is
/// being polled, so time spent downstream (throttling, writing) is not
/// counted.
struct StallTimeout<S> {
    inner: S,
    timeout: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<S> StallTimeout<S> {
    const fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            deadline: None,
        }
    }
}

impl<S> Stream for StallTimeout<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Poll::Ready(item) = Pin::new(&mut this.inner).poll_next(cx) {
            this.deadline = None;
            return Poll::Ready(item);
        }

        let timeout = this.timeout;
        let deadline = this
            .deadline
            .get_or_insert_with(|| Box::pin(sleep(timeout)));

        if deadline.as_mut().poll(cx).is_ready() {
            this.deadline = None;
            return Poll::Ready(Some(Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no data received within the transfer timeout",
            ))));
        }

        Poll::Pending
    }
}

pub struct DownloadPipeline {
    backend: Arc<dyn StorageBackend>,
    sessions: Arc<dyn SessionStore>,
    prompt: Arc<dyn ConflictPrompt>,
    platform: TargetPlatform,
    active: Mutex<()>,
}

impl DownloadPipeline {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        sessions: Arc<dyn SessionStore>,
        prompt: Arc<dyn ConflictPrompt>,
    ) -> Self {
        Self {
            backend,
            sessions,
            prompt,
            platform: TargetPlatform::current(),
            active: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Download one blob, waiting for any run already in progress on this
    /// pipeline.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        options: &DownloadOptions,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, AppError> {
        let throttle = Throttle::new(options.max_bytes_per_second);
        self.run(request, options, progress, cancel, &throttle).await
    }

    /// Same as `download`, drawing from a throttle shared with other runs.
    pub(crate) async fn run(
        &self,
        request: &DownloadRequest,
        options: &DownloadOptions,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
        throttle: &Arc<Throttle>,
    ) -> Result<DownloadOutcome, AppError> {
        let _active = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AppError::Cancelled),
            guard = self.active.lock() => guard,
        };

        let metadata = self
            .backend
            .get_blob(&request.container, &request.blob_name)
            .await?
            .ok_or_else(|| AppError::BlobNotFound {
                container: request.container.clone(),
                name: request.blob_name.clone(),
            })?;

        let desired = resolve_target_path(
            &request.root,
            &request.container,
            &request.blob_name,
            self.platform,
        )?;

        let mut session = match self.resumable_session(&desired, &metadata, options).await? {
            Some(session) => session,
            None => {
                let target = match ConflictResolver::resolve(
                    &desired,
                    options.conflict_policy,
                    &metadata,
                    self.prompt.as_ref(),
                    self.platform,
                )
                .await?
                {
                    Resolution::Proceed(path) => path,
                    Resolution::Skip => {
                        info!(
                            marker = "DOWNLOAD_SKIPPED",
                            operation_type = "download",
                            blob = %request.blob_name,
                            path = %desired.display(),
                            "Target exists, skipping"
                        );
                        return Ok(DownloadOutcome::Skipped { path: desired });
                    }
                };

                DownloadSession::new(
                    &request.container,
                    &request.blob_name,
                    target,
                    metadata.size,
                    expected_checksum(&metadata).map(|c| c.canonical()),
                )
            }
        };

        if let Some(parent) = session.local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let resumed_from = session.resume_offset;
        self.sessions.save(&session);

        info!(
            marker = "DOWNLOAD_START",
            operation_type = "download",
            container = %request.container,
            blob = %request.blob_name,
            path = %session.local_path.display(),
            total_bytes = metadata.size,
            resume_offset = resumed_from,
            "Starting download"
        );

        let mut retries = 0u32;
        loop {
            if cancel.is_cancelled() {
                self.sessions.save(&session);
                return Err(AppError::Cancelled);
            }

            match self
                .transfer(&session, options, progress.clone(), cancel, throttle)
                .await
            {
                Ok(done) => {
                    session = done;
                    break;
                }
                Err((partial, err)) => {
                    session = partial;
                    self.sessions.save(&session);

                    if matches!(err, AppError::Cancelled) {
                        info!(
                            marker = "DOWNLOAD_CANCELLED",
                            operation_type = "download",
                            blob = %request.blob_name,
                            downloaded = session.downloaded_bytes,
                            "Download cancelled, partial file kept"
                        );
                        return Err(err);
                    }

                    if !err.is_retryable() {
                        return Err(err);
                    }

                    if retries >= options.max_retries {
                        warn!(
                            marker = "DOWNLOAD_FAILED",
                            operation_type = "download",
                            blob = %request.blob_name,
                            attempts = retries + 1,
                            error = %err,
                            "Retries exhausted"
                        );
                        return Err(AppError::RetriesExhausted {
                            attempts: retries + 1,
                            source: Box::new(err),
                        });
                    }

                    retries += 1;
                    session = session.with_retry();
                    self.sessions.save(&session);

                    let delay = retry_delay(retries);
                    warn!(
                        marker = "DOWNLOAD_RETRY",
                        operation_type = "download",
                        blob = %request.blob_name,
                        retry = retries,
                        offset = session.resume_offset,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transfer failed, retrying"
                    );

                    tokio::select! {
                        () = cancel.cancelled() => {
                            return Err(AppError::Cancelled);
                        }
                        () = sleep(delay) => {}
                    }
                }
            }
        }

        let mut verified = false;
        if options.verify_checksum
            && let Some(expected) = session
                .expected_checksum
                .as_deref()
                .and_then(|c| ExpectedChecksum::parse(c).ok())
        {
            verify_file(&session.local_path, &expected, options.buffer_size).await?;
            verified = true;
        }

        let session = session.mark_completed();
        self.sessions.save(&session);

        info!(
            marker = "DOWNLOAD_COMPLETE",
            operation_type = "download",
            blob = %request.blob_name,
            path = %session.local_path.display(),
            bytes = session.total_bytes,
            verified = verified,
            "Download complete"
        );

        Ok(DownloadOutcome::Completed {
            path: session.local_path.clone(),
            bytes_written: session.total_bytes.saturating_sub(resumed_from),
            resumed_from,
            verified,
            session,
        })
    }

    /// A stored partial session for this blob that still matches it. Besides
    /// `desired` itself this finds the " (n)" name an earlier Rename picked.
    async fn resumable_session(
        &self,
        desired: &Path,
        metadata: &BlobMetadata,
        options: &DownloadOptions,
    ) -> Result<Option<DownloadSession>, AppError> {
        if !options.enable_resume {
            return Ok(None);
        }

        let mut candidates: Vec<DownloadSession> = self
            .sessions
            .all()
            .into_iter()
            .filter(|s| s.container == metadata.container && s.blob_name == metadata.name)
            .filter(|s| s.can_resume() && s.total_bytes == metadata.size)
            .filter(|s| {
                s.local_path == desired || is_renamed_from(desired, &s.local_path, self.platform)
            })
            .collect();

        // Exact target first, then the most recently touched rename.
        candidates.sort_by_key(|s| (s.local_path != desired, Reverse(s.updated_at)));

        for stored in candidates {
            let file_len = match tokio::fs::metadata(&stored.local_path).await {
                Ok(m) => m.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            let offset = file_len.min(stored.downloaded_bytes);
            debug!(
                marker = "DOWNLOAD_RESUME",
                operation_type = "download",
                blob = %metadata.name,
                path = %stored.local_path.display(),
                stored = stored.downloaded_bytes,
                on_disk = file_len,
                offset = offset,
                "Resuming partial download"
            );
            return Ok(Some(stored.with_resume_offset(offset)));
        }

        Ok(None)
    }

    /// One attempt from `session.downloaded_bytes` to the end of the blob.
    ///
    /// On failure the returned session reflects the bytes actually written.
    async fn transfer(
        &self,
        session: &DownloadSession,
        options: &DownloadOptions,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
        throttle: &Arc<Throttle>,
    ) -> Result<DownloadSession, (DownloadSession, AppError)> {
        let offset = session.downloaded_bytes;
        let fail = |s: &DownloadSession, e: AppError| (s.clone(), e);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&session.local_path)
            .await
            .map_err(|e| fail(session, e.into()))?;

        // Anything past the offset is from an attempt that was never recorded.
        file.set_len(offset)
            .await
            .map_err(|e| fail(session, e.into()))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| fail(session, e.into()))?;

        let raw: ByteStream = self
            .backend
            .open_read_stream(&session.container, &session.blob_name, offset)
            .await
            .map_err(|e| fail(session, e))?;

        let mut stream = ProgressStream::new(
            ThrottledStream::new(StallTimeout::new(raw, options.timeout), Arc::clone(throttle)),
            ProgressTracker::new(&session.blob_name, session.total_bytes, offset),
            progress,
        );

        let mut writer = BufWriter::with_capacity(options.buffer_size.max(1), file);
        let mut current = session.clone();

        let result: Result<(), AppError> = loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break Err(AppError::Cancelled),
                next = stream.next() => next,
            };

            match next {
                None => break Ok(()),
                Some(Err(e)) if e.kind() == io::ErrorKind::TimedOut => {
                    break Err(AppError::TransferTimeout {
                        blob: session.blob_name.clone(),
                        timeout_secs: options.timeout.as_secs(),
                    });
                }
                Some(Err(e)) => break Err(e.into()),
                Some(Ok(chunk)) => {
                    if let Err(e) = writer.write_all(&chunk).await {
                        break Err(e.into());
                    }
                    current = current.with_progress(current.downloaded_bytes + chunk.len() as u64);
                    self.sessions.save(&current);
                }
            }
        };

        let flushed = writer.flush().await;

        match (result, flushed) {
            (Ok(()), Ok(())) if current.downloaded_bytes >= current.total_bytes => Ok(current),
            (Ok(()), Ok(())) => {
                let err = AppError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "stream ended at {} of {} bytes",
                        current.downloaded_bytes, current.total_bytes
                    ),
                ));
                Err((current, err))
            }
            (Ok(()), Err(e)) => Err((self.reconcile(current).await, e.into())),
            (Err(e), _) => Err((self.reconcile(current).await, e)),
        }
    }

    /// Clamp recorded progress to what is actually on disk.
    async fn reconcile(&self, session: DownloadSession) -> DownloadSession {
        match tokio::fs::metadata(&session.local_path).await {
            Ok(m) if m.len() < session.downloaded_bytes => session.with_progress(m.len()),
            _ => session,
        }
    }
}

fn expected_checksum(metadata: &BlobMetadata) -> Option<ExpectedChecksum> {
    let raw = metadata.content_md5.as_deref()?;
    match ExpectedChecksum::parse(raw) {
        Ok(checksum) => Some(checksum),
        Err(e) => {
            warn!(
                "Ignoring unparsable checksum for {}/{}: {}",
                metadata.container, metadata.name, e
            );
            None
        }
    }
}
