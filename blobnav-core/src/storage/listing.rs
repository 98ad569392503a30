//! src/storage/listing.rs
//! Delimiter grouping and keyset pagination shared by the bundled backends.

use std::collections::BTreeMap;

use crate::error::AppError;
use crate::storage::backend::{BlobEntry, Page, PageRequest};

/// Collapse entries below `prefix` into one level using `delimiter`.
///
/// Input must be sorted by name. Names deeper than one level become a single
/// `Prefix` entry ending in the delimiter.
#[must_use]
pub fn group_by_delimiter(entries: &[BlobEntry], prefix: &str, delimiter: char) -> Vec<BlobEntry> {
    let mut grouped: BTreeMap<String, BlobEntry> = BTreeMap::new();

    for entry in entries {
        let Some(rest) = entry.name.strip_prefix(prefix) else {
            continue;
        };

        match rest.find(delimiter) {
            Some(idx) => {
                let dir = format!("{prefix}{}", &rest[..idx + delimiter.len_utf8()]);
                grouped
                    .entry(dir.clone())
                    .or_insert_with(|| BlobEntry::prefix(dir));
            }
            None => {
                grouped.insert(entry.name.clone(), entry.clone());
            }
        }
    }

    grouped.into_values().collect()
}

/// Slice one page out of a name-sorted list.
///
/// The continuation token is the last name of the previous page, so a token
/// stays valid when items before it are added or removed.
pub fn paginate<T, F>(items: Vec<T>, request: &PageRequest, name_of: F) -> Result<Page<T>, AppError>
where
    F: Fn(&T) -> &str,
{
    let start = match request.continuation.as_deref() {
        None => 0,
        Some("") => {
            return Err(AppError::invalid_input(
                "continuation",
                "empty continuation token",
            ));
        }
        Some(token) => items.partition_point(|item| name_of(item) <= token),
    };

    let size = request.page_size as usize;
    let end = start.saturating_add(size).min(items.len());
    let has_more = end < items.len();

    let mut page: Vec<T> = items.into_iter().skip(start).take(end - start).collect();
    let continuation = if has_more {
        page.last().map(|item| name_of(item).to_string())
    } else {
        None
    };
    page.shrink_to_fit();

    Ok(Page::new(page, continuation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::BlobEntryKind;

    fn blob(name: &str) -> BlobEntry {
        BlobEntry {
            name: name.to_string(),
            kind: BlobEntryKind::Blob,
            size: 1,
            last_modified: None,
            content_md5: None,
        }
    }

    #[test]
    fn test_grouping_one_level() {
        let entries = vec![
            blob("a/b/c.txt"),
            blob("a/b/d.txt"),
            blob("a/e.txt"),
            blob("a/f/g/h.txt"),
            blob("root.txt"),
        ];

        let top = group_by_delimiter(&entries, "", '/');
        let names: Vec<_> = top.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a/", "root.txt"]);
        assert!(top[0].is_prefix());

        let nested = group_by_delimiter(&entries, "a/", '/');
        let names: Vec<_> = nested.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a/b/", "a/e.txt", "a/f/"]);
    }

    #[test]
    fn test_keyset_pages_cover_everything_once() {
        let names: Vec<String> = (0..7).map(|i| format!("item-{i}")).collect();

        let first = paginate(names.clone(), &PageRequest::first(3), |s| s.as_str()).unwrap();
        assert_eq!(first.items, vec!["item-0", "item-1", "item-2"]);
        assert_eq!(first.continuation.as_deref(), Some("item-2"));

        let second = paginate(
            names.clone(),
            &PageRequest::new(3, first.continuation),
            |s| s.as_str(),
        )
        .unwrap();
        assert_eq!(second.items, vec!["item-3", "item-4", "item-5"]);

        let third = paginate(names, &PageRequest::new(3, second.continuation), |s| {
            s.as_str()
        })
        .unwrap();
        assert_eq!(third.items, vec!["item-6"]);
        assert!(third.continuation.is_none());
    }

    #[test]
    fn test_exact_fit_has_no_token() {
        let names: Vec<String> = (0..4).map(|i| i.to_string()).collect();
        let page = paginate(names, &PageRequest::first(4), |s| s.as_str()).unwrap();
        assert_eq!(page.items.len(), 4);
        assert!(page.continuation.is_none());
    }
}
