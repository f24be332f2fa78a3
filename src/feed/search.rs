use std::sync::Arc;

use super::error::FeedError;
use super::mapping::{map_documents, ContentItem};
use crate::storage::{DocumentStore, Field};
use crate::util::MAX_SEARCH_QUERY_LENGTH;

/// Reject terms the store should never see.
fn validate_search_term(term: &str) -> Result<(), FeedError> {
    if term.len() > MAX_SEARCH_QUERY_LENGTH {
        return Err(FeedError::InvalidQuery(format!(
            "exceeds maximum length of {} characters",
            MAX_SEARCH_QUERY_LENGTH
        )));
    }
    Ok(())
}

/// Runs the exact-title and tag-containment queries and merges them.
#[derive(Clone)]
pub struct SearchEngine {
    store: Arc<dyn DocumentStore>,
    collection: Arc<str>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn DocumentStore>, collection: Arc<str>) -> Self {
        Self { store, collection }
    }

    /// All title matches followed by all tag matches.
    ///
    /// The two result sets are concatenated as-is: an item whose title is
    /// `term` and whose tags also contain `term` appears twice. If either
    /// query fails the whole search fails and nothing is returned.
    pub async fn search(&self, term: &str) -> Result<Vec<ContentItem>, FeedError> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }
        validate_search_term(term)?;

        let (by_title, by_tag) = futures::future::try_join(
            self.store.query_equal(&self.collection, Field::Title, term),
            self.store.query_contains(&self.collection, Field::Tags, term),
        )
        .await
        .map_err(FeedError::StoreRead)?;

        tracing::debug!(
            query = %term,
            title_matches = by_title.len(),
            tag_matches = by_tag.len(),
            "Search merged"
        );

        let mut results = map_documents(by_title);
        results.extend(map_documents(by_tag));
        Ok(results)
    }
}
