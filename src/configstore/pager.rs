//! Lazy, restartable page sequences.
//!
//! Both store providers list configs page by page. [`Pager`] drives a
//! [`PageSource`] until the cumulative number of fetched items reaches the
//! total reported by the provider, or a page comes back empty.

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::Result;

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total number of items reported by the provider.
    pub total_count: usize,
}

/// Something that can fetch numbered pages (1-based).
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Item type of the listing.
    type Item: Send;

    /// Fetches one page.
    async fn fetch_page(&self, page_number: u32, page_size: u32) -> Result<Page<Self::Item>>;
}

/// Cursor over the pages of a [`PageSource`].
#[derive(Debug)]
pub struct Pager<'a, S: PageSource> {
    /// Page source.
    source: &'a S,
    /// Requested page size.
    page_size: u32,
    /// Next page to fetch.
    next_page: u32,
    /// Items fetched so far.
    fetched: usize,
    /// Whether the listing is complete.
    exhausted: bool,
}

impl<'a, S: PageSource> Pager<'a, S> {
    /// Creates a pager positioned before the first page.
    #[must_use]
    pub fn new(source: &'a S, page_size: u32) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            next_page: 1,
            fetched: 0,
            exhausted: false,
        }
    }

    /// Fetches the next page, or `None` once the listing is complete.
    ///
    /// # Errors
    ///
    /// Returns the source's error; the pager stays at the failed page, so
    /// calling again retries it.
    pub async fn next_page(&mut self) -> Result<Option<Vec<S::Item>>> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self.source.fetch_page(self.next_page, self.page_size).await?;
        trace!(
            "Fetched page {} with {} items (total {})",
            self.next_page,
            page.items.len(),
            page.total_count
        );

        self.next_page += 1;
        self.fetched += page.items.len();

        if page.items.is_empty() || self.fetched >= page.total_count {
            self.exhausted = true;
        }

        if page.items.is_empty() {
            Ok(None)
        } else {
            Ok(Some(page.items))
        }
    }

    /// Rewinds to the first page.
    pub const fn restart(&mut self) {
        self.next_page = 1;
        self.fetched = 0;
        self.exhausted = false;
    }

    /// Number of items fetched since the last restart.
    #[must_use]
    pub const fn fetched(&self) -> usize {
        self.fetched
    }

    /// Drains every remaining page.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the source.
    pub async fn collect_all(mut self) -> Result<Vec<S::Item>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        debug!("Listing complete: {} items in {} pages", items.len(), self.next_page - 1);
        Ok(items)
    }
}
