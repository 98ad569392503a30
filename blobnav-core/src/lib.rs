//! src/lib.rs: Library Entry for the Blob Storage Navigator
//! -----------------------------------------------------
//! Exposes the input, navigation and download engines plus the storage
//! backends, renderer and glue the binary wires together.

/// --- Error handling (unified error type for app) ---
pub mod error;

/// --- Configuration: keymap, navigation, download, logging ---
pub mod config;

pub mod logging;
pub use logging::Logger;

/// --- Controller: key resolution, dispatch and the event loop ---
pub mod controller {
    pub mod actions;
    pub mod app_controller;
    pub mod event_loop;
    pub mod input_dispatcher;
    pub mod key_repeat;
    pub mod key_sequence;
    pub mod keys;
}

/// --- State/data models ---
pub mod model {
    pub mod download_session;
    pub mod navigation;
    pub mod page_cursor;
    pub mod ui_state;
}

/// --- Storage backends ---
pub mod storage {
    pub mod backend;
    pub mod listing;
    pub mod local;
    pub mod memory;
}

/// --- Hierarchical navigation ---
pub mod operators {
    pub mod navigator;
}

/// --- Transfer building blocks ---
pub mod transfer {
    pub mod checksum;
    pub mod conflict;
    pub mod path_sanitizer;
    pub mod progress;
    pub mod session_store;
    pub mod throttle;
}

/// --- Background/async tasks ---
pub mod tasks {
    pub mod batch_download_task;
    pub mod download_task;
}

/// --- UI rendering: all view logic and components ---
pub mod view {
    pub mod icons;
    pub mod theme;
    pub mod ui; // main UI orchestrator
    pub mod components {
        pub mod conflict_overlay;
        pub mod help_overlay;
        pub mod object_table;
        pub mod prompt_bar;
        pub mod status_bar;
        pub mod transfer_panel;
    }
    pub use ui::View;
}

pub mod util {
    pub mod humanize;
}

/// --- Crate-level re-exports for the most important types ---
pub use controller::app_controller::AppController;
pub use error::AppError;
pub use operators::navigator::PaginatedNavigator;
pub use tasks::download_task::DownloadPipeline;
