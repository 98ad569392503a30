//! src/tasks/batch_download_task.rs
//! ============================================================================
//! # Batch Download: Every Blob Matching a Pattern
//!
//! Lists the container flat, filters names by a shell-style glob and runs the
//! single-blob pipeline for each match one after another. All files draw from
//! one throttle so the bandwidth cap holds across the whole batch. A failed
//! file is recorded and the batch moves on; cancellation stops it.

use std::sync::Arc;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AppError;
use crate::model::download_session::DownloadOptions;
use crate::storage::backend::{BlobEntry, MAX_PAGE_SIZE, PageRequest};
use crate::tasks::download_task::{DownloadOutcome, DownloadPipeline, DownloadRequest};
use crate::transfer::progress::{BatchProgress, BatchProgressCallback, ProgressCallback};
use crate::transfer::throttle::Throttle;

/// Glob over full blob names: `*` is any run, `?` is one character.
#[derive(Debug, Clone)]
pub struct BlobPattern {
    source: String,
    regex: Regex,
}

impl BlobPattern {
    pub fn new(pattern: &str) -> Result<Self, AppError> {
        if pattern.is_empty() {
            return Err(AppError::invalid_input("pattern", "pattern must not be empty"));
        }

        let mut expr = String::with_capacity(pattern.len() * 2 + 2);
        expr.push('^');
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr)
            .map_err(|e| AppError::invalid_input("pattern", e.to_string()))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub container: String,

    /// Listing prefix including the trailing delimiter, if any.
    pub prefix: Option<String>,
    pub pattern: BlobPattern,
    pub root: std::path::PathBuf,
}

#[derive(Debug)]
pub struct BatchFileResult {
    pub blob_name: String,
    pub result: Result<DownloadOutcome, AppError>,
}

#[derive(Debug, Default)]
pub struct BatchDownloadResult {
    pub files: Vec<BatchFileResult>,
    pub bytes_transferred: u64,

    /// Cancellation stopped the batch before every match was attempted.
    pub cancelled: bool,
}

impl BatchDownloadResult {
    #[must_use]
    pub fn completed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.result, Ok(DownloadOutcome::Completed { .. })))
            .count()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.result, Ok(DownloadOutcome::Skipped { .. })))
            .count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.result.is_err()).count()
    }
}

/// Every blob under `prefix` across all pages, flat.
pub async fn list_matching(
    pipeline: &DownloadPipeline,
    container: &str,
    prefix: Option<&str>,
    pattern: &BlobPattern,
) -> Result<Vec<BlobEntry>, AppError> {
    let mut matched = Vec::new();
    let mut continuation = None;

    loop {
        let page = pipeline
            .backend()
            .list_blobs(
                container,
                prefix,
                None,
                PageRequest::new(MAX_PAGE_SIZE, continuation.take()),
            )
            .await?;

        matched.extend(
            page.items
                .into_iter()
                .filter(|e| !e.is_prefix() && pattern.matches(&e.name)),
        );

        match page.continuation {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }

    Ok(matched)
}

pub async fn download_matching(
    pipeline: &DownloadPipeline,
    request: &BatchRequest,
    options: &DownloadOptions,
    file_progress: Option<ProgressCallback>,
    batch_progress: Option<BatchProgressCallback>,
    cancel: &CancellationToken,
) -> Result<BatchDownloadResult, AppError> {
    let blobs = list_matching(
        pipeline,
        &request.container,
        request.prefix.as_deref(),
        &request.pattern,
    )
    .await?;

    info!(
        marker = "BATCH_DOWNLOAD_START",
        operation_type = "batch_download",
        container = %request.container,
        pattern = request.pattern.as_str(),
        matched = blobs.len(),
        "Starting batch download"
    );

    let throttle = Throttle::new(options.max_bytes_per_second);
    let mut result = BatchDownloadResult::default();
    let total = blobs.len();

    let report = |result: &BatchDownloadResult, current: Option<&str>| {
        if let Some(callback) = &batch_progress {
            callback(&BatchProgress {
                files_completed: result.files.len(),
                files_total: total,
                bytes_transferred: result.bytes_transferred,
                current_file: current.map(str::to_string),
            });
        }
    };

    for blob in blobs {
        if cancel.is_cancelled() {
            result.cancelled = true;
            break;
        }

        report(&result, Some(&blob.name));

        let single = DownloadRequest::new(&request.container, &blob.name, request.root.clone());
        let outcome = pipeline
            .run(&single, options, file_progress.clone(), cancel, &throttle)
            .await;

        match &outcome {
            Ok(DownloadOutcome::Completed { bytes_written, .. }) => {
                result.bytes_transferred += bytes_written;
            }
            Ok(DownloadOutcome::Skipped { .. }) => {}
            Err(AppError::Cancelled) => result.cancelled = true,
            Err(e) => warn!(
                marker = "BATCH_FILE_FAILED",
                operation_type = "batch_download",
                blob = %blob.name,
                error = %e,
                "File failed, continuing with the rest"
            ),
        }

        result.files.push(BatchFileResult {
            blob_name: blob.name,
            result: outcome,
        });

        if result.cancelled {
            break;
        }
    }

    report(&result, None);

    info!(
        marker = "BATCH_DOWNLOAD_DONE",
        operation_type = "batch_download",
        completed = result.completed(),
        skipped = result.skipped(),
        failed = result.failed(),
        cancelled = result.cancelled,
        "Batch download finished"
    );

    Ok(result)
}

/// Shared handle for spawning batches from the controller.
pub type SharedPipeline = Arc<DownloadPipeline>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_semantics() {
        let logs = BlobPattern::new("logs/*.log").unwrap();
        assert!(logs.matches("logs/app.log"));
        assert!(logs.matches("logs/2024/app.log"));
        assert!(!logs.matches("logs/app.log.gz"));

        let single = BlobPattern::new("img?.png").unwrap();
        assert!(single.matches("img1.png"));
        assert!(!single.matches("img12.png"));

        let literal = BlobPattern::new("a+b(1).txt").unwrap();
        assert!(literal.matches("a+b(1).txt"));
        assert!(!literal.matches("aab(1).txt"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(BlobPattern::new("").is_err());
    }
}
