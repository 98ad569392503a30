//! src/storage/local.rs
//! ============================================================================
//! # `LocalDirBackend`: Directory Tree as a Blob Account
//!
//! Top-level directories under the root are containers; every file beneath a
//! container is a blob named by its `/`-joined relative path. Listings walk
//! the tree on the blocking pool with `walkdir`.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::fs as TokioFs;
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::AppError;
use crate::storage::backend::{
    BlobEntry, BlobEntryKind, BlobMetadata, ByteStream, ContainerInfo, Page, PageRequest,
    StorageBackend,
};
use crate::storage::listing::{group_by_delimiter, paginate};

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct LocalDirBackend {
    account: String,
    root: PathBuf,
}

impl LocalDirBackend {
    pub fn new(root: impl Into<PathBuf>, account: Option<String>) -> Result<Self, AppError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(AppError::invalid_input(
                "root",
                format!("{} is not a directory", root.display()),
            ));
        }

        let account = account.unwrap_or_else(|| {
            root.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("local")
                .to_string()
        });

        Ok(Self { account, root })
    }

    fn container_dir(&self, container: &str) -> Result<PathBuf, AppError> {
        validate_segment_path(container)?;
        let dir = self.root.join(container);
        if !dir.is_dir() {
            return Err(AppError::ContainerNotFound(container.to_string()));
        }
        Ok(dir)
    }

    fn blob_path(&self, container: &str, name: &str) -> Result<PathBuf, AppError> {
        validate_segment_path(name)?;
        Ok(self.container_dir(container)?.join(name))
    }
}

/// Reject names that could escape the root.
fn validate_segment_path(name: &str) -> Result<(), AppError> {
    let escapes = Path::new(name)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));

    if name.is_empty() || escapes || name.split('/').any(|s| s == "..") {
        return Err(AppError::invalid_input(
            "name",
            format!("{name:?} is not a valid relative name"),
        ));
    }
    Ok(())
}

fn modified_of(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl StorageBackend for LocalDirBackend {
    fn account_name(&self) -> &str {
        &self.account
    }

    async fn list_containers(&self, request: PageRequest) -> Result<Page<ContainerInfo>, AppError> {
        let mut containers = Vec::new();
        let mut read_dir = TokioFs::read_dir(&self.root).await?;

        while let Some(entry) = read_dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                containers.push(ContainerInfo {
                    name: name.to_string(),
                    last_modified: modified_of(&metadata),
                });
            }
        }

        containers.sort_by(|a, b| a.name.cmp(&b.name));
        paginate(containers, &request, |c| c.name.as_str())
    }

    async fn list_blobs(
        &self,
        container: &str,
        prefix: Option<&str>,
        delimiter: Option<char>,
        request: PageRequest,
    ) -> Result<Page<BlobEntry>, AppError> {
        let dir = self.container_dir(container)?;
        let prefix = prefix.unwrap_or_default().to_string();

        let walk_prefix = prefix.clone();
        let mut entries = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            for entry in WalkDir::new(&dir)
                .min_depth(1)
                .follow_links(false)
                .into_iter()
                .filter_map(Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }

                let Ok(relative) = entry.path().strip_prefix(&dir) else {
                    continue;
                };
                let Some(name) = relative
                    .components()
                    .map(|c| c.as_os_str().to_str())
                    .collect::<Option<Vec<_>>>()
                    .map(|parts| parts.join("/"))
                else {
                    warn!("Skipping non UTF-8 path {}", entry.path().display());
                    continue;
                };

                if !name.starts_with(&walk_prefix) {
                    continue;
                }

                let metadata = entry.metadata().ok();
                found.push(BlobEntry {
                    name,
                    kind: BlobEntryKind::Blob,
                    size: metadata.as_ref().map_or(0, std::fs::Metadata::len),
                    last_modified: metadata.as_ref().and_then(modified_of),
                    content_md5: None,
                });
            }
            found
        })
        .await
        .map_err(|e| AppError::backend("list_blobs", e.to_string(), false))?;

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let entries = match delimiter {
            Some(d) => group_by_delimiter(&entries, &prefix, d),
            None => entries,
        };

        debug!(
            marker = "BACKEND_LIST_BLOBS",
            operation_type = "storage",
            container = container,
            prefix = %prefix,
            matched = entries.len(),
            "Listed local blobs"
        );

        paginate(entries, &request, |e| e.name.as_str())
    }

    async fn get_blob(
        &self,
        container: &str,
        name: &str,
    ) -> Result<Option<BlobMetadata>, AppError> {
        let path = self.blob_path(container, name)?;
        let metadata = match TokioFs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(BlobMetadata {
            container: container.to_string(),
            name: name.to_string(),
            size: metadata.len(),
            last_modified: modified_of(&metadata),
            content_md5: None,
        }))
    }

    async fn open_read_stream(
        &self,
        container: &str,
        name: &str,
        offset: u64,
    ) -> Result<ByteStream, AppError> {
        let path = self.blob_path(container, name)?;
        let mut file = TokioFs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::BlobNotFound {
                    container: container.to_string(),
                    name: name.to_string(),
                }
            } else {
                e.into()
            }
        })?;

        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }

        Ok(ReaderStream::with_capacity(file, READ_CHUNK).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn fixture() -> (tempfile::TempDir, LocalDirBackend) {
        let dir = tempfile::tempdir().unwrap();
        let photos = dir.path().join("photos");
        std::fs::create_dir_all(photos.join("2023")).unwrap();
        std::fs::write(photos.join("2023").join("a.jpg"), b"aaaa").unwrap();
        std::fs::write(photos.join("cover.png"), b"cover").unwrap();
        std::fs::create_dir_all(dir.path().join("backups")).unwrap();
        std::fs::write(dir.path().join("stray.txt"), b"not a container").unwrap();

        let backend = LocalDirBackend::new(dir.path(), Some("local".into())).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_top_level_directories_are_containers() {
        let (_dir, backend) = fixture();
        let page = backend.list_containers(PageRequest::default()).await.unwrap();
        let names: Vec<_> = page.items.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["backups", "photos"]);
    }

    #[tokio::test]
    async fn test_nested_files_group_into_prefixes() {
        let (_dir, backend) = fixture();
        let page = backend
            .list_blobs("photos", None, Some('/'), PageRequest::default())
            .await
            .unwrap();
        let names: Vec<_> = page.items.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["2023/", "cover.png"]);
    }

    #[tokio::test]
    async fn test_read_from_offset() {
        let (_dir, backend) = fixture();
        let chunks: Vec<bytes::Bytes> = backend
            .open_read_stream("photos", "cover.png", 2)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"ver");
    }

    #[tokio::test]
    async fn test_parent_segments_rejected() {
        let (_dir, backend) = fixture();
        assert!(matches!(
            backend.get_blob("photos", "../stray.txt").await,
            Err(AppError::InvalidInput { .. })
        ));
        assert!(backend.list_blobs("..", None, None, PageRequest::default()).await.is_err());
    }
}
