//! src/model/download_session.rs
//! ============================================================================
//! # `DownloadSession` and `DownloadOptions`
//!
//! A session is the bookkeeping record of one blob transfer. It is a value:
//! every update returns a new session rather than mutating the old one.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSession {
    pub blob_name: String,
    pub container: String,
    pub local_path: PathBuf,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,

    /// Offset the current attempt started from.
    pub resume_offset: u64,
    pub retry_count: u32,

    /// Canonical `<algo>:<hex>` digest, when the service reported one.
    pub expected_checksum: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DownloadSession {
    #[must_use]
    pub fn new(
        container: impl Into<String>,
        blob_name: impl Into<String>,
        local_path: PathBuf,
        total_bytes: u64,
        expected_checksum: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            blob_name: blob_name.into(),
            container: container.into(),
            local_path,
            total_bytes,
            downloaded_bytes: 0,
            resume_offset: 0,
            retry_count: 0,
            expected_checksum,
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn progress_percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.downloaded_bytes as f64 / self.total_bytes as f64 * 100.0
    }

    #[must_use]
    pub const fn remaining_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.downloaded_bytes)
    }

    #[must_use]
    pub const fn can_resume(&self) -> bool {
        !self.completed && self.downloaded_bytes > 0 && self.downloaded_bytes < self.total_bytes
    }

    #[must_use]
    pub fn with_progress(&self, downloaded_bytes: u64) -> Self {
        Self {
            downloaded_bytes,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Next attempt, restarting at the current downloaded offset.
    #[must_use]
    pub fn with_retry(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            resume_offset: self.downloaded_bytes,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_resume_offset(&self, offset: u64) -> Self {
        Self {
            resume_offset: offset,
            downloaded_bytes: offset,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn mark_completed(&self) -> Self {
        Self {
            completed: true,
            downloaded_bytes: self.total_bytes.max(self.downloaded_bytes),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// What to do when the target file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    Overwrite,
    Skip,
    #[default]
    Rename,
    Ask,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    pub conflict_policy: ConflictPolicy,
    pub verify_checksum: bool,

    /// Bandwidth cap; `None` is unlimited.
    pub max_bytes_per_second: Option<u64>,
    pub max_retries: u32,

    /// Longest wait for a single chunk.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub enable_resume: bool,
    pub buffer_size: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            verify_checksum: true,
            max_bytes_per_second: None,
            max_retries: 3,
            timeout: Duration::from_secs(30),
            enable_resume: true,
            buffer_size: 64 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(total: u64) -> DownloadSession {
        DownloadSession::new("c", "b.bin", PathBuf::from("/tmp/b.bin"), total, None)
    }

    #[test]
    fn test_progress_percentage_zero_total() {
        let s = session(0).with_progress(0);
        assert!(s.progress_percentage().abs() < f64::EPSILON);
        assert_eq!(s.remaining_bytes(), 0);
    }

    #[test]
    fn test_can_resume_only_partial_sessions() {
        let fresh = session(100);
        assert!(!fresh.can_resume());

        let partial = fresh.with_progress(40);
        assert!(partial.can_resume());
        assert!((partial.progress_percentage() - 40.0).abs() < 1e-9);
        assert_eq!(partial.remaining_bytes(), 60);

        let done = partial.with_progress(100).mark_completed();
        assert!(!done.can_resume());
        assert!(!session(100).with_progress(100).can_resume());
    }

    #[test]
    fn test_updates_leave_original_untouched() {
        let original = session(10).with_progress(4);
        let retried = original.with_retry();
        assert_eq!(original.retry_count, 0);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.resume_offset, 4);
    }
}
