//! src/storage/backend.rs
//! ============================================================================
//! # `StorageBackend`: Blob Service Boundary
//!
//! Paged listings, metadata lookups and ranged byte streams. Concrete backends
//! live next to this module; the navigator and download pipeline only ever see
//! `Arc<dyn StorageBackend>`.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 5000;

/// Byte stream returned by ranged reads.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: u32,
    pub continuation: Option<String>,
}

impl PageRequest {
    /// Page size is clamped to `1..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn new(page_size: u32, continuation: Option<String>) -> Self {
        Self {
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            continuation,
        }
    }

    #[must_use]
    pub fn first(page_size: u32) -> Self {
        Self::new(page_size, None)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present when more items follow.
    pub continuation: Option<String>,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn new(items: Vec<T>, continuation: Option<String>) -> Self {
        Self {
            items,
            continuation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobEntryKind {
    /// Virtual directory; the name ends with the delimiter.
    Prefix,
    Blob,
}

/// One row of a blob listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    /// Full name from the container root.
    pub name: String,
    pub kind: BlobEntryKind,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// Base64 Content-MD5 as reported by the service.
    pub content_md5: Option<String>,
}

impl BlobEntry {
    #[must_use]
    pub fn prefix(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: BlobEntryKind::Prefix,
            size: 0,
            last_modified: None,
            content_md5: None,
        }
    }

    #[must_use]
    pub const fn is_prefix(&self) -> bool {
        matches!(self.kind, BlobEntryKind::Prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub container: String,
    pub name: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_md5: Option<String>,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Account shown at the root of the breadcrumb.
    fn account_name(&self) -> &str;

    async fn list_containers(&self, request: PageRequest) -> Result<Page<ContainerInfo>, AppError>;

    /// Lists blobs under `prefix`. With a delimiter the listing is one level
    /// deep and groups deeper names into `Prefix` entries; without one it is
    /// flat.
    async fn list_blobs(
        &self,
        container: &str,
        prefix: Option<&str>,
        delimiter: Option<char>,
        request: PageRequest,
    ) -> Result<Page<BlobEntry>, AppError>;

    async fn get_blob(&self, container: &str, name: &str)
    -> Result<Option<BlobMetadata>, AppError>;

    /// Stream of the blob's bytes starting at `offset`.
    async fn open_read_stream(
        &self,
        container: &str,
        name: &str,
        offset: u64,
    ) -> Result<ByteStream, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps_size() {
        assert_eq!(PageRequest::first(0).page_size, 1);
        assert_eq!(PageRequest::first(10_000).page_size, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::default().page_size, DEFAULT_PAGE_SIZE);
    }
}
