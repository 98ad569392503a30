//! src/transfer/conflict.rs
//! ============================================================================
//! # `ConflictResolver`: Existing Target Handling
//!
//! Decides what happens when a download target already exists. Only the `Ask`
//! policy needs a collaborator, and its answer is always one of the three
//! concrete choices: asking never defers to another question.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::error::AppError;
use crate::model::download_session::ConflictPolicy;
use crate::storage::backend::BlobMetadata;
use crate::transfer::path_sanitizer::{
    MAX_COMPONENT_BYTES, TargetPlatform, truncate_preserving_extension,
};

/// Upper bound on " (n)" suffixes tried before giving up.
const MAX_RENAME_ATTEMPTS: u32 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAnswer {
    Overwrite,
    Skip,
    Rename,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Proceed(PathBuf),
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileInfo {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl LocalFileInfo {
    pub async fn read(path: &Path) -> Result<Self, AppError> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self {
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}

#[async_trait]
pub trait ConflictPrompt: Send + Sync {
    async fn ask(&self, path: &Path, local: &LocalFileInfo, remote: &BlobMetadata)
    -> ConflictAnswer;
}

/// Prompt that always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswerPrompt(pub ConflictAnswer);

#[async_trait]
impl ConflictPrompt for FixedAnswerPrompt {
    async fn ask(&self, _: &Path, _: &LocalFileInfo, _: &BlobMetadata) -> ConflictAnswer {
        self.0
    }
}

/// A question waiting for the user.
#[derive(Debug)]
pub struct PendingConflict {
    pub path: PathBuf,
    pub local: LocalFileInfo,
    pub remote: BlobMetadata,
    pub responder: oneshot::Sender<ConflictAnswer>,
}

impl PendingConflict {
    pub fn answer(self, answer: ConflictAnswer) {
        if self.responder.send(answer).is_err() {
            warn!("Conflict answer for {} arrived after the task ended", self.path.display());
        }
    }
}

/// Forwards questions to the UI loop. If the question is dropped unanswered
/// the download is skipped.
#[derive(Debug, Clone)]
pub struct ChannelConflictPrompt {
    tx: mpsc::UnboundedSender<PendingConflict>,
}

impl ChannelConflictPrompt {
    #[must_use]
    pub const fn new(tx: mpsc::UnboundedSender<PendingConflict>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ConflictPrompt for ChannelConflictPrompt {
    async fn ask(
        &self,
        path: &Path,
        local: &LocalFileInfo,
        remote: &BlobMetadata,
    ) -> ConflictAnswer {
        let (responder, answer) = oneshot::channel();
        let question = PendingConflict {
            path: path.to_path_buf(),
            local: local.clone(),
            remote: remote.clone(),
            responder,
        };

        if self.tx.send(question).is_err() {
            return ConflictAnswer::Skip;
        }

        answer.await.unwrap_or(ConflictAnswer::Skip)
    }
}

pub struct ConflictResolver;

impl ConflictResolver {
    /// Resolve a target that may already exist. Renamed targets stay within
    /// the path limits of `platform`.
    pub async fn resolve(
        desired: &Path,
        policy: ConflictPolicy,
        remote: &BlobMetadata,
        prompt: &dyn ConflictPrompt,
        platform: TargetPlatform,
    ) -> Result<Resolution, AppError> {
        if !tokio::fs::try_exists(desired).await? {
            return Ok(Resolution::Proceed(desired.to_path_buf()));
        }

        let answer = match policy {
            ConflictPolicy::Overwrite => ConflictAnswer::Overwrite,
            ConflictPolicy::Skip => ConflictAnswer::Skip,
            ConflictPolicy::Rename => ConflictAnswer::Rename,
            ConflictPolicy::Ask => {
                let local = LocalFileInfo::read(desired).await?;
                prompt.ask(desired, &local, remote).await
            }
        };

        info!(
            marker = "DOWNLOAD_CONFLICT",
            operation_type = "download",
            path = %desired.display(),
            answer = ?answer,
            "Target exists"
        );

        if answer != ConflictAnswer::Rename {
            return Self::resolve_concrete(desired, answer, platform, |_| false);
        }

        // The rename search stats the directory once per candidate.
        let desired = desired.to_path_buf();
        tokio::task::spawn_blocking(move || {
            Self::resolve_concrete(&desired, answer, platform, |p| p.exists())
        })
        .await
        .map_err(|e| AppError::Other(format!("rename search did not finish: {e}")))?
    }

    /// Apply a concrete answer. `exists` is injected so the rename search can
    /// be tested without touching the file system.
    pub fn resolve_concrete<F>(
        desired: &Path,
        answer: ConflictAnswer,
        platform: TargetPlatform,
        exists: F,
    ) -> Result<Resolution, AppError>
    where
        F: Fn(&Path) -> bool,
    {
        match answer {
            ConflictAnswer::Overwrite => Ok(Resolution::Proceed(desired.to_path_buf())),
            ConflictAnswer::Skip => Ok(Resolution::Skip),
            ConflictAnswer::Rename => {
                next_free_name(desired, platform, exists).map(Resolution::Proceed)
            }
        }
    }
}

fn split_name(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

/// Longest file name that fits beside `desired` on `platform`.
fn name_budget(desired: &Path, platform: TargetPlatform) -> usize {
    let dir_len = desired.parent().map_or(0, |p| p.as_os_str().len() + 1);
    platform
        .max_path_len()
        .saturating_sub(dir_len)
        .min(MAX_COMPONENT_BYTES)
}

/// `"<stem> (n)<ext>"` beside `desired`. The stem is shortened so the suffix
/// and extension always survive within `max_bytes`.
fn renamed_path(desired: &Path, n: u32, max_bytes: usize) -> PathBuf {
    let (stem, ext) = split_name(desired);
    let suffix = format!(" ({n})");
    let budget = max_bytes.saturating_sub(suffix.len() + ext.len());
    let stem = truncate_preserving_extension(&stem, budget);
    desired.with_file_name(format!("{stem}{suffix}{ext}"))
}

/// Whether `candidate` is a name the rename search could have picked for
/// `desired`.
#[must_use]
pub fn is_renamed_from(desired: &Path, candidate: &Path, platform: TargetPlatform) -> bool {
    if candidate.parent() != desired.parent() {
        return false;
    }

    let (stem, _) = split_name(candidate);
    let n = stem
        .strip_suffix(')')
        .and_then(|rest| rest.rsplit_once(" ("))
        .and_then(|(_, digits)| digits.parse::<u32>().ok());

    match n {
        Some(n) if n > 0 => {
            renamed_path(desired, n, name_budget(desired, platform)) == candidate
        }
        _ => false,
    }
}

/// First `"<stem> (n)<ext>"` for n = 1, 2, ... that does not exist.
pub fn next_free_name<F>(
    desired: &Path,
    platform: TargetPlatform,
    exists: F,
) -> Result<PathBuf, AppError>
where
    F: Fn(&Path) -> bool,
{
    let max_bytes = name_budget(desired, platform);

    for n in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = renamed_path(desired, n, max_bytes);
        if !exists(&candidate) {
            return Ok(candidate);
        }
    }

    Err(AppError::Other(format!(
        "no free name for {} after {MAX_RENAME_ATTEMPTS} attempts",
        desired.display()
    )))
}
