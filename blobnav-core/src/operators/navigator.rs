//! src/operators/navigator.rs
//! ============================================================================
//! # `PaginatedNavigator`: Hierarchical Browse State Machine
//!
//! Owns the browse position, the items of the current page and the page
//! cursor. Levels are Root (containers), Container (top of one container) and
//! BlobPrefix (a virtual directory, nestable without limit).
//!
//! Every loading operation fetches first and commits second: if the backend
//! call fails, state, items and cursor stay exactly as they were and the error
//! is kept for display.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::model::navigation::{ItemKind, NavigationItem, NavigationLevel, NavigationState};
use crate::model::page_cursor::PageCursor;
use crate::storage::backend::{PageRequest, StorageBackend};

pub struct PaginatedNavigator {
    backend: Arc<dyn StorageBackend>,
    state: NavigationState,
    items: Vec<NavigationItem>,
    cursor: PageCursor,
    page_size: u32,
    delimiter: char,
    last_error: Option<AppError>,
}

/// A fetched page that has not been committed yet.
struct LoadedPage {
    items: Vec<NavigationItem>,
    continuation: Option<String>,
}

impl PaginatedNavigator {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        session_name: &str,
        page_size: u32,
        delimiter: char,
    ) -> Self {
        let state = NavigationState::root(session_name, backend.account_name());
        Self {
            backend,
            state,
            items: Vec::new(),
            cursor: PageCursor::new(),
            page_size: PageRequest::first(page_size).page_size,
            delimiter,
            last_error: None,
        }
    }

    // --- Accessors ---

    #[must_use]
    pub const fn state(&self) -> &NavigationState {
        &self.state
    }

    #[must_use]
    pub fn items(&self) -> &[NavigationItem] {
        &self.items
    }

    #[must_use]
    pub const fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    #[must_use]
    pub fn selected_item(&self) -> Option<&NavigationItem> {
        self.items.get(self.state.selected_index)
    }

    #[must_use]
    pub const fn last_error(&self) -> Option<&AppError> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub const fn delimiter(&self) -> char {
        self.delimiter
    }

    #[must_use]
    pub fn level(&self) -> NavigationLevel {
        self.state.level()
    }

    #[must_use]
    pub fn has_next_page(&self) -> bool {
        self.cursor.has_next()
    }

    #[must_use]
    pub fn has_previous_page(&self) -> bool {
        self.cursor.has_previous()
    }

    // --- Loading ---

    /// Load the first page of the current level.
    pub async fn load(&mut self) -> Result<(), AppError> {
        let state = self.state.with_selected(0);
        self.load_into(state, PageCursor::new()).await
    }

    /// Enter the selected container or virtual directory. Blobs are a no-op.
    pub async fn enter_selected(&mut self) -> Result<bool, AppError> {
        let Some(item) = self.selected_item().cloned() else {
            return Ok(false);
        };

        let next = match (self.state.level(), item.kind) {
            (NavigationLevel::Root, ItemKind::Container) => self.state.at_container(&item.name)?,
            (
                NavigationLevel::Container | NavigationLevel::BlobPrefix,
                ItemKind::VirtualDirectory,
            ) => {
                if self.state.container.is_none() {
                    warn!(
                        marker = "NAVIGATION_INVARIANT",
                        operation_type = "navigation",
                        "Virtual directory entered without a container"
                    );
                    return Ok(false);
                }
                self.state.with_prefix(Some(item.path.clone()))?
            }
            (_, ItemKind::Blob) => return Ok(false),
            (level, kind) => {
                warn!(
                    marker = "NAVIGATION_INVARIANT",
                    operation_type = "navigation",
                    level = ?level,
                    kind = ?kind,
                    "Item kind does not belong to this level"
                );
                return Ok(false);
            }
        };

        self.load_into(next, PageCursor::new()).await?;
        Ok(true)
    }

    /// Go up one level. Returns false at Root.
    pub async fn navigate_up(&mut self) -> Result<bool, AppError> {
        let parent = match self.state.level() {
            NavigationLevel::Root => return Ok(false),
            NavigationLevel::Container => {
                NavigationState::root(&self.state.session_name, &self.state.account_name)
            }
            NavigationLevel::BlobPrefix => {
                let parent_prefix = self
                    .state
                    .prefix
                    .as_deref()
                    .and_then(|p| p.rsplit_once(self.delimiter))
                    .map(|(parent, _)| parent.to_string());
                self.state.with_prefix(parent_prefix)?
            }
        };

        self.load_into(parent, PageCursor::new()).await?;
        Ok(true)
    }

    /// Next page, only if the last load returned a continuation.
    pub async fn next_page(&mut self) -> Result<bool, AppError> {
        let Some(cursor) = self.cursor.forward() else {
            return Ok(false);
        };

        let state = self.state.with_selected(0);
        self.load_into(state, cursor).await?;
        Ok(true)
    }

    /// Previous page, only if a prior token is on the stack.
    pub async fn previous_page(&mut self) -> Result<bool, AppError> {
        let Some(cursor) = self.cursor.backward() else {
            return Ok(false);
        };

        let state = self.state.with_selected(0);
        self.load_into(state, cursor).await?;
        Ok(true)
    }

    /// Reload the current level from its first page, keeping the selection
    /// if it is still in range.
    pub async fn refresh(&mut self) -> Result<(), AppError> {
        let keep = self.state.selected_index;
        let page = match self.fetch(&self.state, None).await {
            Ok(page) => page,
            Err(e) => {
                self.last_error = Some(e.clone());
                return Err(e);
            }
        };

        let selected = if keep < page.items.len() { keep } else { 0 };
        self.commit(self.state.with_selected(selected), PageCursor::new(), page);
        Ok(())
    }

    // --- Selection (never loads) ---

    pub fn move_selection(&mut self, delta: isize) {
        if self.items.is_empty() {
            return;
        }
        let max = self.items.len() - 1;
        let target = self.state.selected_index.saturating_add_signed(delta).min(max);
        self.state = self.state.with_selected(target);
    }

    pub fn select_first(&mut self) {
        self.state = self.state.with_selected(0);
    }

    pub fn select_last(&mut self) {
        let last = self.items.len().saturating_sub(1);
        self.state = self.state.with_selected(last);
    }

    pub fn select_index(&mut self, index: usize) {
        if index < self.items.len() {
            self.state = self.state.with_selected(index);
        }
    }

    // --- Internals ---

    async fn load_into(&mut self, state: NavigationState, cursor: PageCursor) -> Result<(), AppError> {
        match self.fetch(&state, cursor.load_token()).await {
            Ok(page) => {
                self.commit(state, cursor, page);
                Ok(())
            }
            Err(e) => {
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn fetch(
        &self,
        state: &NavigationState,
        token: Option<String>,
    ) -> Result<LoadedPage, AppError> {
        let request = PageRequest::new(self.page_size, token);

        let result = match state.level() {
            NavigationLevel::Root => self
                .backend
                .list_containers(request)
                .await
                .map(|page| LoadedPage {
                    items: page.items.iter().map(NavigationItem::from_container).collect(),
                    continuation: page.continuation,
                }),
            NavigationLevel::Container | NavigationLevel::BlobPrefix => {
                let Some(container) = state.container.as_deref() else {
                    warn!(
                        marker = "NAVIGATION_INVARIANT",
                        operation_type = "navigation",
                        "Listing requested without a container"
                    );
                    return Err(AppError::navigation_failed(&state.breadcrumb, "no container"));
                };
                let prefix = state.listing_prefix(self.delimiter);
                self.backend
                    .list_blobs(container, prefix.as_deref(), Some(self.delimiter), request)
                    .await
                    .map(|page| LoadedPage {
                        items: page
                            .items
                            .iter()
                            .map(|e| NavigationItem::from_blob(e, self.delimiter))
                            .collect(),
                        continuation: page.continuation,
                    })
            }
        };

        result.map_err(|e| {
            let err = AppError::navigation_failed(&state.breadcrumb, e.to_string());
            warn!(
                marker = "NAVIGATION_LOAD_FAILED",
                operation_type = "navigation",
                location = %state.breadcrumb,
                error = %e,
                "Load failed, keeping previous view"
            );
            err
        })
    }

    fn commit(&mut self, state: NavigationState, cursor: PageCursor, page: LoadedPage) {
        debug!(
            marker = "NAVIGATION_COMMIT",
            operation_type = "navigation",
            location = %state.breadcrumb,
            items = page.items.len(),
            page = cursor.page_number(),
            has_next = page.continuation.is_some(),
            "Page loaded"
        );

        if state.breadcrumb != self.state.breadcrumb {
            info!("Navigated to {}", state.breadcrumb);
        }

        self.items = page.items;
        self.cursor = cursor.with_continuation(page.continuation);
        self.state = state;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryBackend;

    fn backend() -> Arc<InMemoryBackend> {
        let backend = InMemoryBackend::new("acct");
        backend.put_blob("alpha", "a/b/c/deep.txt", "1");
        backend.put_blob("alpha", "a/b/file.txt", "2");
        backend.put_blob("alpha", "a/top.txt", "3");
        backend.put_blob("alpha", "readme.md", "4");
        backend.create_container("beta");
        Arc::new(backend)
    }

    async fn navigator() -> PaginatedNavigator {
        let mut nav = PaginatedNavigator::new(backend(), "s", 100, '/');
        nav.load().await.unwrap();
        nav
    }

    fn names(nav: &PaginatedNavigator) -> Vec<&str> {
        nav.items().iter().map(|i| i.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_root_lists_containers() {
        let nav = navigator().await;
        assert_eq!(nav.level(), NavigationLevel::Root);
        assert_eq!(names(&nav), vec!["alpha", "beta"]);
        assert_eq!(nav.state().breadcrumb, "s:acct");
    }

    #[tokio::test]
    async fn test_enter_descends_through_prefixes() {
        let mut nav = navigator().await;
        assert!(nav.enter_selected().await.unwrap());
        assert_eq!(nav.level(), NavigationLevel::Container);
        assert_eq!(names(&nav), vec!["a", "readme.md"]);

        assert!(nav.enter_selected().await.unwrap());
        assert_eq!(nav.state().prefix.as_deref(), Some("a"));
        assert_eq!(names(&nav), vec!["b", "top.txt"]);

        assert!(nav.enter_selected().await.unwrap());
        assert_eq!(nav.state().prefix.as_deref(), Some("a/b"));
        assert_eq!(nav.state().breadcrumb, "s:acct/alpha/a/b");
    }

    #[tokio::test]
    async fn test_enter_on_blob_is_noop() {
        let mut nav = navigator().await;
        nav.enter_selected().await.unwrap();
        nav.select_last();
        let before = nav.state().clone();

        assert!(!nav.enter_selected().await.unwrap());
        assert_eq!(nav.state(), &before);
    }

    #[tokio::test]
    async fn test_navigate_up_pops_one_segment() {
        let mut nav = navigator().await;
        nav.enter_selected().await.unwrap(); // alpha
        nav.enter_selected().await.unwrap(); // a
        nav.enter_selected().await.unwrap(); // a/b
        nav.enter_selected().await.unwrap(); // a/b/c
        assert_eq!(nav.state().prefix.as_deref(), Some("a/b/c"));

        assert!(nav.navigate_up().await.unwrap());
        assert_eq!(nav.state().prefix.as_deref(), Some("a/b"));

        nav.navigate_up().await.unwrap();
        assert_eq!(nav.state().prefix.as_deref(), Some("a"));

        nav.navigate_up().await.unwrap();
        assert_eq!(nav.level(), NavigationLevel::Container);

        nav.navigate_up().await.unwrap();
        assert_eq!(nav.level(), NavigationLevel::Root);

        let root = nav.state().clone();
        assert!(!nav.navigate_up().await.unwrap());
        assert_eq!(nav.state(), &root);
    }

    #[tokio::test]
    async fn test_selection_clamps_without_loading() {
        let mut nav = navigator().await;
        nav.move_selection(10);
        assert_eq!(nav.state().selected_index, 1);
        nav.move_selection(-5);
        assert_eq!(nav.state().selected_index, 0);
    }

    #[tokio::test]
    async fn test_paging_without_token_is_rejected() {
        let mut nav = navigator().await;
        assert!(!nav.next_page().await.unwrap());
        assert!(!nav.previous_page().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_view() {
        let backend = backend();
        let mut nav = PaginatedNavigator::new(backend.clone(), "s", 100, '/');
        nav.load().await.unwrap();
        let items_before = nav.items().to_vec();
        let state_before = nav.state().clone();

        backend.fail_next_listings(1);
        let err = nav.enter_selected().await.unwrap_err();
        assert!(matches!(err, AppError::NavigationFailed { .. }));
        assert_eq!(nav.items(), items_before.as_slice());
        assert_eq!(nav.state(), &state_before);
        assert!(nav.last_error().is_some());

        // Next successful load clears the error.
        nav.enter_selected().await.unwrap();
        assert!(nav.last_error().is_none());
    }

    #[tokio::test]
    async fn test_refresh_keeps_selection_in_range() {
        let backend = backend();
        let mut nav = PaginatedNavigator::new(backend.clone(), "s", 100, '/');
        nav.load().await.unwrap();
        nav.enter_selected().await.unwrap();
        nav.select_last();
        assert_eq!(nav.state().selected_index, 1);

        backend.put_blob("alpha", "zzz.txt", "5");
        nav.refresh().await.unwrap();
        assert_eq!(nav.state().selected_index, 1);
        assert_eq!(nav.items().len(), 3);

        backend.remove_blob("alpha", "readme.md");
        backend.remove_blob("alpha", "zzz.txt");
        nav.select_last();
        nav.refresh().await.unwrap();
        assert_eq!(nav.state().selected_index, 0);
    }
}
