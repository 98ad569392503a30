//! src/controller/actions.rs
//! ============================================================================
//! # Actions: Binding Targets and Navigation Requests
//!
//! `BindingAction` is what a key sequence resolves to. Every resolved action is
//! raised exactly once as a `NavigationRequest`, which the controller applies
//! to the navigator, the prompt or the download tasks.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Target of a key binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingAction {
    MoveUp,
    MoveDown,
    SelectFirst,
    SelectLast,
    /// Enter the selected container or virtual directory.
    Enter,
    /// Go up one level.
    Back,
    NextPage,
    PreviousPage,
    Refresh,
    /// Download the selected blob (or everything under a virtual directory).
    Download,
    /// Download everything in the current location.
    DownloadAll,
    CancelDownloads,
    /// Open the search prompt.
    Search,
    /// Open the command prompt.
    Command,
    /// Abort a pending sequence or close an overlay.
    Cancel,
    Help,
    Quit,
}

impl BindingAction {
    /// Literal text an entry prompt opens with.
    #[must_use]
    pub const fn literal_prefix(self) -> Option<&'static str> {
        match self {
            Self::Search => Some("/"),
            Self::Command => Some(":"),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MoveUp => "move up",
            Self::MoveDown => "move down",
            Self::SelectFirst => "first item",
            Self::SelectLast => "last item",
            Self::Enter => "enter",
            Self::Back => "back",
            Self::NextPage => "next page",
            Self::PreviousPage => "previous page",
            Self::Refresh => "refresh",
            Self::Download => "download selected",
            Self::DownloadAll => "download all here",
            Self::CancelDownloads => "cancel downloads",
            Self::Search => "search",
            Self::Command => "command",
            Self::Cancel => "cancel",
            Self::Help => "help",
            Self::Quit => "quit",
        }
    }
}

/// A resolved input, raised once per completed binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    pub action: BindingAction,

    /// Key sequence (or key name for fast-path keys) that triggered it.
    pub binding: CompactString,

    /// Literal prefix for search/command entry bindings.
    pub prefix: Option<CompactString>,
}

impl NavigationRequest {
    #[must_use]
    pub fn new(action: BindingAction, binding: impl Into<CompactString>) -> Self {
        Self {
            action,
            binding: binding.into(),
            prefix: action.literal_prefix().map(CompactString::const_new),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_bindings_carry_prefix() {
        let search = NavigationRequest::new(BindingAction::Search, "/");
        assert_eq!(search.prefix.as_deref(), Some("/"));

        let command = NavigationRequest::new(BindingAction::Command, ":");
        assert_eq!(command.prefix.as_deref(), Some(":"));

        let down = NavigationRequest::new(BindingAction::MoveDown, "j");
        assert!(down.prefix.is_none());
    }

    #[test]
    fn test_binding_action_names_roundtrip_through_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            action: BindingAction,
        }

        let parsed: Wrapper = toml::from_str("action = \"download_all\"").unwrap();
        assert_eq!(parsed.action, BindingAction::DownloadAll);
    }
}
