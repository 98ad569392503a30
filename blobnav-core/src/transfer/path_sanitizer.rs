//! src/transfer/path_sanitizer.rs
//! ============================================================================
//! # Path Sanitizer: Blob Names to Local Paths
//!
//! Pure functions of (name, target platform). Blob names may contain anything
//! the service accepts; local file systems do not. Each path segment is
//! cleaned independently and the whole target is capped at the platform's
//! path length limit by shortening the file name, keeping its extension.

use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Longest single path component on every supported file system.
pub const MAX_COMPONENT_BYTES: usize = 255;

const REPLACEMENT: char = '_';

const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPlatform {
    Windows,
    MacOs,
    Linux,
}

impl TargetPlatform {
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Maximum full path length, in characters.
    #[must_use]
    pub const fn max_path_len(self) -> usize {
        match self {
            Self::Windows => 260,
            Self::MacOs => 1024,
            Self::Linux => 4096,
        }
    }

    fn is_invalid(self, c: char) -> bool {
        match self {
            Self::Windows => {
                matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control()
            }
            Self::MacOs => matches!(c, ':' | '/' | '\0'),
            Self::Linux => matches!(c, '/' | '\0'),
        }
    }
}

/// Clean one path segment for `platform`.
#[must_use]
pub fn sanitize_component(name: &str, platform: TargetPlatform) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|c| if platform.is_invalid(c) { REPLACEMENT } else { c })
        .collect();

    if platform == TargetPlatform::Windows {
        let trimmed_len = cleaned.trim_end_matches(['.', ' ']).len();
        cleaned.truncate(trimmed_len);

        let stem = cleaned.split('.').next().unwrap_or_default();
        if WINDOWS_RESERVED
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(stem))
        {
            cleaned.insert(0, REPLACEMENT);
        }
    }

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return REPLACEMENT.to_string();
    }

    truncate_preserving_extension(&cleaned, MAX_COMPONENT_BYTES)
}

/// Shorten `name` to at most `max_bytes`, keeping the extension when it fits.
#[must_use]
pub fn truncate_preserving_extension(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        // Leading dot files have no extension to keep.
        Some(idx) if idx > 0 && name.len() - idx < max_bytes => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };

    let budget = max_bytes.saturating_sub(ext.len());
    let mut cut = budget.min(stem.len());
    while cut > 0 && !stem.is_char_boundary(cut) {
        cut -= 1;
    }

    format!("{}{ext}", &stem[..cut])
}

/// Local path for `blob` of `container` below `root`.
///
/// Fails with `PathTooLong` when the directories alone leave no room for a
/// file name.
pub fn resolve_target_path(
    root: &Path,
    container: &str,
    blob: &str,
    platform: TargetPlatform,
) -> Result<PathBuf, AppError> {
    let mut path = root.join(sanitize_component(container, platform));

    let segments: Vec<&str> = blob.split('/').filter(|s| !s.is_empty()).collect();
    let Some((file_name, dirs)) = segments.split_last() else {
        return Err(AppError::invalid_input("blob", "blob name is empty"));
    };

    for dir in dirs {
        path.push(sanitize_component(dir, platform));
    }

    let limit = platform.max_path_len();
    let dir_len = path.as_os_str().len() + 1;
    let file_name = sanitize_component(file_name, platform);

    if dir_len + file_name.len() <= limit {
        return Ok(path.join(file_name));
    }

    // Keep at least a few characters of the name.
    let room = limit.saturating_sub(dir_len);
    if room < 8 {
        return Err(AppError::PathTooLong {
            path: path.join(file_name),
            limit,
        });
    }

    Ok(path.join(truncate_preserving_extension(&file_name, room)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_invalid_characters_replaced() {
        assert_eq!(
            sanitize_component("a<b>c:d\"e|f?g*h", TargetPlatform::Windows),
            "a_b_c_d_e_f_g_h"
        );
        assert_eq!(sanitize_component("tab\there", TargetPlatform::Windows), "tab_here");
        assert_eq!(sanitize_component("a:b", TargetPlatform::Linux), "a:b");
        assert_eq!(sanitize_component("a:b", TargetPlatform::MacOs), "a_b");
    }

    #[test]
    fn test_windows_reserved_names_escaped() {
        assert_eq!(sanitize_component("CON", TargetPlatform::Windows), "_CON");
        assert_eq!(sanitize_component("nul.txt", TargetPlatform::Windows), "_nul.txt");
        assert_eq!(sanitize_component("com1", TargetPlatform::Windows), "_com1");
        assert_eq!(sanitize_component("CONSOLE", TargetPlatform::Windows), "CONSOLE");
        assert_eq!(sanitize_component("CON", TargetPlatform::Linux), "CON");
    }

    #[test]
    fn test_windows_trailing_dots_and_spaces_trimmed() {
        assert_eq!(sanitize_component("report. ", TargetPlatform::Windows), "report");
        assert_eq!(sanitize_component("...", TargetPlatform::Windows), "_");
    }

    #[test]
    fn test_dot_segments_neutralised() {
        assert_eq!(sanitize_component("..", TargetPlatform::Linux), "_");
        assert_eq!(sanitize_component(".", TargetPlatform::MacOs), "_");
    }

    #[test]
    fn test_long_names_keep_extension() {
        let long = format!("{}.tar.gz", "x".repeat(300));
        let cut = sanitize_component(&long, TargetPlatform::Linux);
        assert_eq!(cut.len(), MAX_COMPONENT_BYTES);
        assert!(cut.ends_with(".gz"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let name = format!("{}.txt", "é".repeat(200));
        let cut = truncate_preserving_extension(&name, 101);
        assert!(cut.len() <= 101);
        assert!(cut.ends_with(".txt"));
    }

    #[test]
    fn test_resolve_builds_nested_path() {
        let path = resolve_target_path(
            Path::new("/dl"),
            "photos",
            "2023/summer/beach.jpg",
            TargetPlatform::Linux,
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/dl/photos/2023/summer/beach.jpg"));
    }

    #[test]
    fn test_resolve_caps_windows_path_length() {
        let root = PathBuf::from("C:/downloads");
        let blob = format!("{}.csv", "n".repeat(250));
        let path = resolve_target_path(&root, "data", &blob, TargetPlatform::Windows).unwrap();

        assert!(path.as_os_str().len() <= TargetPlatform::Windows.max_path_len());
        assert!(path.to_string_lossy().ends_with(".csv"));
    }

    #[test]
    fn test_resolve_fails_when_directories_fill_limit() {
        let root = PathBuf::from(format!("C:/{}", "d".repeat(255)));
        let err = resolve_target_path(&root, "c", "file.txt", TargetPlatform::Windows).unwrap_err();
        assert!(matches!(err, AppError::PathTooLong { limit: 260, .. }));
    }

    #[test]
    fn test_empty_blob_name_rejected() {
        assert!(resolve_target_path(Path::new("/dl"), "c", "///", TargetPlatform::Linux).is_err());
    }
}
