//! Content source protocol: paged listing and caption fetches.

use crate::core::{ContentItem, CreatorId};
use crate::errors::SourceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One page of a creator's content listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentPage {
    /// Items on this page, newest first.
    pub items: Vec<ContentItem>,
    /// Cursor for the next page, when the source reports one.
    pub next_cursor: Option<String>,
    /// Whether the source reports more content after this page.
    pub has_more: bool,
}

impl ContentPage {
    /// A page with more content behind it.
    #[must_use]
    pub fn more(items: Vec<ContentItem>, next_cursor: impl Into<String>) -> Self {
        Self {
            items,
            next_cursor: Some(next_cursor.into()),
            has_more: true,
        }
    }

    /// The final page of a listing.
    #[must_use]
    pub fn last(items: Vec<ContentItem>) -> Self {
        Self {
            items,
            next_cursor: None,
            has_more: false,
        }
    }
}

/// Protocol for the platform a creator's content lives on.
///
/// Implementations wrap a real platform API; the pipeline only ever sees
/// pages and caption text.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Lists one page of the creator's content, newest first.
    async fn list_content(
        &self,
        creator_id: &CreatorId,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ContentPage, SourceError>;

    /// Fetches raw caption text for one item.
    ///
    /// `Ok(None)` means the item has no captions; that is an expected
    /// outcome, not an error.
    async fn fetch_captions(
        &self,
        creator_id: &CreatorId,
        item_id: &str,
    ) -> Result<Option<String>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_factories() {
        let page = ContentPage::more(Vec::new(), "cursor-2");
        assert!(page.has_more);
        assert_eq!(page.next_cursor.as_deref(), Some("cursor-2"));

        let page = ContentPage::last(Vec::new());
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }
}
