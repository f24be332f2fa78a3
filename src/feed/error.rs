use thiserror::Error;

use crate::storage::StoreError;

/// Failures surfaced by the feed core.
///
/// None of these are fatal: reads leave the feed unchanged, writes restore
/// the prior status, and subscription failures keep the last aggregates.
#[derive(Debug, Error)]
pub enum FeedError {
    /// A page or search fetch failed
    #[error("Failed to load items: {0}")]
    StoreRead(#[source] StoreError),

    /// A delete failed
    #[error("Failed to delete item: {0}")]
    StoreWrite(#[source] StoreError),

    /// The live aggregate feed failed
    #[error("Live updates failed: {0}")]
    Subscription(#[source] StoreError),

    /// The search term was rejected before any query was issued
    #[error("Invalid search query: {0}")]
    InvalidQuery(String),
}
