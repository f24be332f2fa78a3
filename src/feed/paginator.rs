use std::sync::Arc;

use super::mapping::{map_documents, ContentItem};
use crate::storage::{Cursor, DocumentStore, OrderBy, SortField, StoreError};

/// Items per page. Fixed to bound store reads per request.
pub const PAGE_SIZE: usize = 4;

/// Ordering every feed page is fetched under
pub const FEED_ORDER: OrderBy = OrderBy::ascending(SortField::Title);

/// One fetched page
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<ContentItem>,
    /// Points at the last document of this page; `None` when the page was empty
    pub cursor: Option<Cursor>,
}

impl Page {
    /// True when the store returned nothing: the ordering is exhausted.
    ///
    /// Decided on the cursor, not on `items`, so a page whose documents were
    /// all skipped by mapping does not end the feed early.
    pub fn is_end(&self) -> bool {
        self.cursor.is_none()
    }
}

/// Issues ordered, limited fetches and hands back the cursor for the next one.
///
/// Successive pages are disjoint as long as nothing is inserted or deleted
/// ahead of the cursor in the meantime. No de-duplication is done here.
#[derive(Clone)]
pub struct Paginator {
    store: Arc<dyn DocumentStore>,
    collection: Arc<str>,
    page_size: usize,
}

impl Paginator {
    pub fn new(store: Arc<dyn DocumentStore>, collection: Arc<str>) -> Self {
        Self {
            store,
            collection,
            page_size: PAGE_SIZE,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Up to one page from the start of the ordering
    pub async fn first_page(&self) -> Result<Page, StoreError> {
        self.fetch(None).await
    }

    /// Up to one page strictly after `cursor`. An empty page means there is nothing left.
    pub async fn next_page(&self, cursor: &Cursor) -> Result<Page, StoreError> {
        self.fetch(Some(cursor)).await
    }

    async fn fetch(&self, after: Option<&Cursor>) -> Result<Page, StoreError> {
        let documents = self
            .store
            .query(&self.collection, FEED_ORDER, self.page_size, after)
            .await?;

        let cursor = documents
            .last()
            .map(|last| Cursor::after(last, FEED_ORDER))
            .transpose()?;

        tracing::debug!(
            collection = %self.collection,
            fetched = documents.len(),
            continued = after.is_some(),
            "Fetched page"
        );

        Ok(Page {
            items: map_documents(documents),
            cursor,
        })
    }
}
