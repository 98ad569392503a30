//! src/view/icons.rs
//! ============================================================================
//! # Listing Icons (Nerd Fonts)

pub const CONTAINER_ICON: &str = "\u{f1c0}";
pub const FOLDER_ICON: &str = "\u{f07b}";
pub const FILE_ICON: &str = "\u{f15b}";
