//! src/model/navigation.rs
//! ============================================================================
//! # `NavigationState`: Immutable Browse Position
//!
//! Where the user is in the account → container → virtual directory
//! hierarchy. Every transition builds a new value; nothing mutates a state in
//! place. `NavigationItem` is the display row for one listing entry.

use chrono::{DateTime, Utc};
use compact_str::CompactString;

use crate::error::AppError;
use crate::storage::backend::{BlobEntry, BlobEntryKind, ContainerInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationLevel {
    Root,
    Container,
    BlobPrefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    pub session_name: CompactString,
    pub account_name: CompactString,
    pub container: Option<String>,

    /// Path below the container without a trailing delimiter ("a/b").
    pub prefix: Option<String>,

    pub breadcrumb: String,
    pub selected_index: usize,
}

impl NavigationState {
    #[must_use]
    pub fn root(session_name: &str, account_name: &str) -> Self {
        Self {
            session_name: session_name.into(),
            account_name: account_name.into(),
            container: None,
            prefix: None,
            breadcrumb: format!("{session_name}:{account_name}"),
            selected_index: 0,
        }
    }

    /// A prefix without a container is rejected.
    pub fn new(
        session_name: &str,
        account_name: &str,
        container: Option<String>,
        prefix: Option<String>,
    ) -> Result<Self, AppError> {
        if prefix.is_some() && container.is_none() {
            return Err(AppError::invalid_input(
                "prefix",
                "a blob prefix requires a container",
            ));
        }

        let prefix = prefix.filter(|p| !p.is_empty());
        let mut breadcrumb = format!("{session_name}:{account_name}");
        if let Some(c) = &container {
            breadcrumb.push('/');
            breadcrumb.push_str(c);
        }
        if let Some(p) = &prefix {
            breadcrumb.push('/');
            breadcrumb.push_str(p);
        }

        Ok(Self {
            session_name: session_name.into(),
            account_name: account_name.into(),
            container,
            prefix,
            breadcrumb,
            selected_index: 0,
        })
    }

    #[must_use]
    pub fn level(&self) -> NavigationLevel {
        match (&self.container, &self.prefix) {
            (None, _) => NavigationLevel::Root,
            (Some(_), None) => NavigationLevel::Container,
            (Some(_), Some(_)) => NavigationLevel::BlobPrefix,
        }
    }

    #[must_use]
    pub fn with_selected(&self, selected_index: usize) -> Self {
        Self {
            selected_index,
            ..self.clone()
        }
    }

    /// State for the given container at its top level.
    pub fn at_container(&self, container: &str) -> Result<Self, AppError> {
        Self::new(
            &self.session_name,
            &self.account_name,
            Some(container.to_string()),
            None,
        )
    }

    /// Same container, different prefix (`None` for the container's top).
    pub fn with_prefix(&self, prefix: Option<String>) -> Result<Self, AppError> {
        Self::new(
            &self.session_name,
            &self.account_name,
            self.container.clone(),
            prefix,
        )
    }

    /// Listing prefix with the trailing delimiter the backend expects.
    #[must_use]
    pub fn listing_prefix(&self, delimiter: char) -> Option<String> {
        self.prefix.as_ref().map(|p| format!("{p}{delimiter}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Container,
    VirtualDirectory,
    Blob,
}

/// Display projection of one listing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationItem {
    /// Last path segment, as shown in the table.
    pub name: String,
    pub kind: ItemKind,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,

    /// Full name within the container (no trailing delimiter for prefixes);
    /// the container name for containers.
    pub path: String,

    /// Service-reported Content-MD5, when known.
    pub content_md5: Option<String>,
}

impl NavigationItem {
    #[must_use]
    pub fn from_container(info: &ContainerInfo) -> Self {
        Self {
            name: info.name.clone(),
            kind: ItemKind::Container,
            size: None,
            modified: info.last_modified,
            path: info.name.clone(),
            content_md5: None,
        }
    }

    #[must_use]
    pub fn from_blob(entry: &BlobEntry, delimiter: char) -> Self {
        match entry.kind {
            BlobEntryKind::Prefix => {
                let path = entry
                    .name
                    .strip_suffix(delimiter)
                    .unwrap_or(&entry.name)
                    .to_string();
                Self {
                    name: last_segment(&path, delimiter).to_string(),
                    kind: ItemKind::VirtualDirectory,
                    size: None,
                    modified: entry.last_modified,
                    path,
                    content_md5: None,
                }
            }
            BlobEntryKind::Blob => Self {
                name: last_segment(&entry.name, delimiter).to_string(),
                kind: ItemKind::Blob,
                size: Some(entry.size),
                modified: entry.last_modified,
                path: entry.name.clone(),
                content_md5: entry.content_md5.clone(),
            },
        }
    }
}

fn last_segment(path: &str, delimiter: char) -> &str {
    path.rsplit(delimiter).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_requires_container() {
        assert!(NavigationState::new("s", "acct", None, Some("a".into())).is_err());

        let state = NavigationState::new("s", "acct", Some("c".into()), Some("a/b".into())).unwrap();
        assert_eq!(state.level(), NavigationLevel::BlobPrefix);
        assert_eq!(state.breadcrumb, "s:acct/c/a/b");
        assert_eq!(state.listing_prefix('/').as_deref(), Some("a/b/"));
    }

    #[test]
    fn test_empty_prefix_is_container_level() {
        let state = NavigationState::new("s", "acct", Some("c".into()), Some(String::new())).unwrap();
        assert_eq!(state.level(), NavigationLevel::Container);
        assert_eq!(NavigationState::root("s", "acct").level(), NavigationLevel::Root);
    }

    #[test]
    fn test_transitions_return_new_values() {
        let root = NavigationState::root("s", "acct");
        let inside = root.at_container("logs").unwrap();
        assert_eq!(root.container, None);
        assert_eq!(inside.container.as_deref(), Some("logs"));
        assert_eq!(inside.with_selected(3).selected_index, 3);
        assert_eq!(inside.selected_index, 0);
    }

    #[test]
    fn test_item_projection() {
        let dir = NavigationItem::from_blob(&BlobEntry::prefix("a/b/"), '/');
        assert_eq!(dir.name, "b");
        assert_eq!(dir.path, "a/b");
        assert_eq!(dir.kind, ItemKind::VirtualDirectory);

        let blob = NavigationItem::from_blob(
            &BlobEntry {
                name: "a/b/c.txt".into(),
                kind: BlobEntryKind::Blob,
                size: 12,
                last_modified: None,
                content_md5: None,
            },
            '/',
        );
        assert_eq!(blob.name, "c.txt");
        assert_eq!(blob.size, Some(12));
    }
}
