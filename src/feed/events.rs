use super::aggregate::AggregateState;
use super::error::FeedError;
use super::mapping::ContentItem;
use super::paginator::Page;
use crate::storage::StoreError;

/// Results pushed back to the controller by background tasks.
///
/// One-shot results carry the view generation they were issued under so the
/// controller can drop results that a later navigation or search superseded.
#[derive(Debug)]
pub enum FeedEvent {
    /// First page loaded (mount, reset, or search cleared)
    FirstPageLoaded {
        generation: u64,
        result: Result<Page, StoreError>,
    },
    /// "Load more" finished
    NextPageLoaded {
        generation: u64,
        result: Result<Page, StoreError>,
    },
    /// Merged search finished
    SearchCompleted {
        term: String,
        generation: u64,
        result: Result<Vec<ContentItem>, FeedError>,
    },
    /// Delete finished
    DeleteCompleted {
        id: String,
        result: Result<(), StoreError>,
    },
    /// The live subscription delivered a snapshot and aggregates were recomputed
    AggregatesUpdated(AggregateState),
    /// The live subscription reported an error; aggregates are left as they were
    SubscriptionFailed(StoreError),
}

impl FeedEvent {
    /// True for results of operations the controller counts as in flight
    pub fn is_one_shot(&self) -> bool {
        !matches!(
            self,
            FeedEvent::AggregatesUpdated(_) | FeedEvent::SubscriptionFailed(_)
        )
    }
}
