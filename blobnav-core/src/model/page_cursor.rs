//! src/model/page_cursor.rs
//! Forward-only continuation tokens plus a stack of the tokens that produced
//! earlier pages, so paging backwards can re-request them.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCursor {
    /// Token that produced the current page (`None` for the first page).
    pub current: Option<String>,

    /// Token returned with the current page.
    pub next: Option<String>,

    /// Tokens of the pages before the current one, oldest first.
    pub history: Vec<Option<String>>,
}

impl PageCursor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor for the page after this one, if the backend offered one.
    #[must_use]
    pub fn forward(&self) -> Option<Self> {
        let next = self.next.clone()?;
        let mut history = self.history.clone();
        history.push(self.current.clone());

        Some(Self {
            current: Some(next),
            next: None,
            history,
        })
    }

    /// Cursor for the page before this one.
    #[must_use]
    pub fn backward(&self) -> Option<Self> {
        let mut history = self.history.clone();
        let previous = history.pop()?;

        Some(Self {
            current: previous,
            next: None,
            history,
        })
    }

    /// Same position, with the continuation returned by its load.
    #[must_use]
    pub fn with_continuation(&self, next: Option<String>) -> Self {
        Self {
            next,
            ..self.clone()
        }
    }

    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.next.is_some()
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        !self.history.is_empty()
    }

    /// One-based page number.
    #[must_use]
    pub fn page_number(&self) -> usize {
        self.history.len() + 1
    }

    #[must_use]
    pub fn load_token(&self) -> Option<String> {
        self.current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_requires_token() {
        assert!(PageCursor::new().forward().is_none());
        assert!(PageCursor::new().backward().is_none());
    }

    #[test]
    fn test_forward_then_backward_restores_first_page() {
        let first = PageCursor::new().with_continuation(Some("t1".into()));
        let second = first.forward().unwrap().with_continuation(Some("t2".into()));
        assert_eq!(second.load_token().as_deref(), Some("t1"));
        assert_eq!(second.page_number(), 2);

        let third = second.forward().unwrap();
        assert_eq!(third.load_token().as_deref(), Some("t2"));
        assert_eq!(third.page_number(), 3);

        let back = third.backward().unwrap();
        assert_eq!(back.load_token().as_deref(), Some("t1"));
        let start = back.backward().unwrap();
        assert_eq!(start.load_token(), None);
        assert!(!start.has_previous());
    }
}
