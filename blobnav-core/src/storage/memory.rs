//! src/storage/memory.rs
//! ============================================================================
//! # `InMemoryBackend`: Process-Local Blob Account
//!
//! Backs `--demo` and the test suite. Supports fault injection so retry,
//! resume and checksum paths can be exercised without a network:
//! - `fail_next_listings(n)` makes the next `n` list calls fail
//! - `interrupt_next_reads(after, n)` cuts the next `n` read streams after
//!   `after` bytes with a connection reset
//! - `override_md5` replaces the reported Content-MD5

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::AppError;
use crate::storage::backend::{
    BlobEntry, BlobEntryKind, BlobMetadata, ByteStream, ContainerInfo, Page, PageRequest,
    StorageBackend,
};
use crate::storage::listing::{group_by_delimiter, paginate};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    last_modified: DateTime<Utc>,
    content_md5: String,
}

#[derive(Debug, Default)]
struct Faults {
    failing_listings: u32,
    interrupted_reads: u32,
    interrupt_after: u64,
}

#[derive(Debug)]
pub struct InMemoryBackend {
    account: String,
    containers: RwLock<BTreeMap<String, BTreeMap<String, StoredBlob>>>,
    chunk_size: usize,
    faults: Mutex<Faults>,
    read_offsets: Mutex<Vec<u64>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            containers: RwLock::new(BTreeMap::new()),
            chunk_size: DEFAULT_CHUNK_SIZE,
            faults: Mutex::new(Faults::default()),
            read_offsets: Mutex::new(Vec::new()),
        }
    }

    /// Size of the chunks read streams are split into.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn create_container(&self, name: &str) {
        self.containers
            .write()
            .entry(name.to_string())
            .or_default();
    }

    /// Insert or replace a blob, creating the container if needed.
    pub fn put_blob(&self, container: &str, name: &str, data: impl Into<Bytes>) {
        let data = data.into();
        let content_md5 = BASE64.encode(md5::compute(&data).0);
        self.containers
            .write()
            .entry(container.to_string())
            .or_default()
            .insert(
                name.to_string(),
                StoredBlob {
                    data,
                    last_modified: Utc::now(),
                    content_md5,
                },
            );
    }

    pub fn remove_blob(&self, container: &str, name: &str) -> bool {
        self.containers
            .write()
            .get_mut(container)
            .is_some_and(|blobs| blobs.remove(name).is_some())
    }

    /// Replace the reported Content-MD5 of a blob (simulates corruption).
    pub fn override_md5(&self, container: &str, name: &str, content_md5: impl Into<String>) {
        if let Some(blob) = self
            .containers
            .write()
            .get_mut(container)
            .and_then(|blobs| blobs.get_mut(name))
        {
            blob.content_md5 = content_md5.into();
        }
    }

    pub fn fail_next_listings(&self, count: u32) {
        self.faults.lock().failing_listings = count;
    }

    pub fn interrupt_next_reads(&self, after_bytes: u64, count: u32) {
        let mut faults = self.faults.lock();
        faults.interrupt_after = after_bytes;
        faults.interrupted_reads = count;
    }

    /// Offsets passed to `open_read_stream`, in call order.
    #[must_use]
    pub fn read_offsets(&self) -> Vec<u64> {
        self.read_offsets.lock().clone()
    }

    /// A small account used by `--demo`.
    #[must_use]
    pub fn demo() -> Arc<Self> {
        let backend = Self::new("demo");

        for i in 0..240 {
            backend.put_blob(
                "logs",
                &format!("2024/{:02}/app-{i:03}.log", i % 12 + 1),
                format!("log line {i}\n").repeat(64 + i),
            );
        }
        for name in ["readme.md", "docs/guide.md", "docs/api/index.html"] {
            backend.put_blob("website", name, format!("<!-- {name} -->\n").repeat(200));
        }
        backend.put_blob("media", "video/intro.mp4", vec![0u8; 3 * 1024 * 1024]);
        backend.put_blob("media", "images/logo.png", vec![7u8; 48 * 1024]);
        backend.create_container("empty");

        Arc::new(backend)
    }

    fn take_listing_fault(&self, operation: &str) -> Result<(), AppError> {
        let mut faults = self.faults.lock();
        if faults.failing_listings > 0 {
            faults.failing_listings -= 1;
            return Err(AppError::backend(operation, "injected listing failure", true));
        }
        Ok(())
    }

    fn stored(&self, container: &str, name: &str) -> Result<StoredBlob, AppError> {
        let containers = self.containers.read();
        let blobs = containers
            .get(container)
            .ok_or_else(|| AppError::ContainerNotFound(container.to_string()))?;
        blobs
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::BlobNotFound {
                container: container.to_string(),
                name: name.to_string(),
            })
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    fn account_name(&self) -> &str {
        &self.account
    }

    async fn list_containers(&self, request: PageRequest) -> Result<Page<ContainerInfo>, AppError> {
        self.take_listing_fault("list_containers")?;

        let containers: Vec<ContainerInfo> = self
            .containers
            .read()
            .iter()
            .map(|(name, blobs)| ContainerInfo {
                name: name.clone(),
                last_modified: blobs.values().map(|b| b.last_modified).max(),
            })
            .collect();

        paginate(containers, &request, |c| c.name.as_str())
    }

    async fn list_blobs(
        &self,
        container: &str,
        prefix: Option<&str>,
        delimiter: Option<char>,
        request: PageRequest,
    ) -> Result<Page<BlobEntry>, AppError> {
        self.take_listing_fault("list_blobs")?;

        let prefix = prefix.unwrap_or_default();
        let entries: Vec<BlobEntry> = {
            let containers = self.containers.read();
            let blobs = containers
                .get(container)
                .ok_or_else(|| AppError::ContainerNotFound(container.to_string()))?;

            blobs
                .range(prefix.to_string()..)
                .take_while(|(name, _)| name.starts_with(prefix))
                .map(|(name, blob)| BlobEntry {
                    name: name.clone(),
                    kind: BlobEntryKind::Blob,
                    size: blob.data.len() as u64,
                    last_modified: Some(blob.last_modified),
                    content_md5: Some(blob.content_md5.clone()),
                })
                .collect()
        };

        let entries = match delimiter {
            Some(d) => group_by_delimiter(&entries, prefix, d),
            None => entries,
        };

        debug!(
            marker = "BACKEND_LIST_BLOBS",
            operation_type = "storage",
            container = container,
            prefix = prefix,
            matched = entries.len(),
            "Listed in-memory blobs"
        );

        paginate(entries, &request, |e| e.name.as_str())
    }

    async fn get_blob(
        &self,
        container: &str,
        name: &str,
    ) -> Result<Option<BlobMetadata>, AppError> {
        match self.stored(container, name) {
            Ok(blob) => Ok(Some(BlobMetadata {
                container: container.to_string(),
                name: name.to_string(),
                size: blob.data.len() as u64,
                last_modified: Some(blob.last_modified),
                content_md5: Some(blob.content_md5),
            })),
            Err(AppError::BlobNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn open_read_stream(
        &self,
        container: &str,
        name: &str,
        offset: u64,
    ) -> Result<ByteStream, AppError> {
        self.read_offsets.lock().push(offset);

        let blob = self.stored(container, name)?;
        let len = blob.data.len() as u64;
        if offset > len {
            return Err(AppError::backend(
                "open_read_stream",
                format!("offset {offset} beyond blob length {len}"),
                false,
            ));
        }

        let cut_after = {
            let mut faults = self.faults.lock();
            if faults.interrupted_reads > 0 {
                faults.interrupted_reads -= 1;
                Some(faults.interrupt_after)
            } else {
                None
            }
        };

        let tail = blob.data.slice(offset as usize..);
        let (body, cut) = match cut_after {
            Some(after) if (after as usize) < tail.len() => (tail.slice(..after as usize), true),
            _ => (tail, false),
        };

        let chunk_size = self.chunk_size;
        let chunks: Vec<io::Result<Bytes>> = (0..body.len())
            .step_by(chunk_size)
            .map(|start| Ok(body.slice(start..(start + chunk_size).min(body.len()))))
            .chain(cut.then(|| {
                Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "injected read interruption",
                ))
            }))
            .collect();

        Ok(stream::iter(chunks).boxed())
    }
}
