//! Tag and category aggregates over the whole live collection.
//!
//! Aggregates are recomputed with a full pass on every snapshot. They are
//! independent of pagination and search: the visible list never feeds them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::events::FeedEvent;
use super::mapping::{map_documents, Category, ContentItem};
use crate::storage::{DocumentStore, SnapshotEvent, StoreError};

/// Number of items in one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: Category,
    pub count: usize,
}

/// Summary of the full collection.
///
/// Tags and categories keep first-seen order so the presentation stays
/// stable across snapshots that only change counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateState {
    tags: Vec<String>,
    categories: Vec<CategoryCount>,
    item_count: usize,
}

impl AggregateState {
    /// Compute aggregates from a complete snapshot.
    ///
    /// Items without a category are counted under [`Category::Uncategorized`]
    /// unless `count_uncategorized` is false, in which case they are left out
    /// of the histogram (their tags still count).
    pub fn from_items(items: &[ContentItem], count_uncategorized: bool) -> Self {
        let mut seen_tags: HashSet<&str> = HashSet::new();
        let mut tags = Vec::new();
        let mut positions: HashMap<&Category, usize> = HashMap::new();
        let mut categories: Vec<CategoryCount> = Vec::new();

        for item in items {
            for tag in &item.tags {
                if seen_tags.insert(tag.as_str()) {
                    tags.push(tag.clone());
                }
            }

            if !count_uncategorized && item.category == Category::Uncategorized {
                continue;
            }
            match positions.get(&item.category) {
                Some(&index) => categories[index].count += 1,
                None => {
                    positions.insert(&item.category, categories.len());
                    categories.push(CategoryCount {
                        category: item.category.clone(),
                        count: 1,
                    });
                }
            }
        }

        Self {
            tags,
            categories,
            item_count: items.len(),
        }
    }

    /// Unique tags across the collection
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn category_counts(&self) -> &[CategoryCount] {
        &self.categories
    }

    pub fn count_for(&self, category: &Category) -> usize {
        self.categories
            .iter()
            .find(|c| &c.category == category)
            .map_or(0, |c| c.count)
    }

    /// Items in the snapshot the aggregates were computed from
    pub fn item_count(&self) -> usize {
        self.item_count
    }
}

/// Keeps a live subscription open and pushes fresh aggregates to the controller.
///
/// Cancelling (or dropping) the subscriber releases the store subscription.
pub struct AggregationSubscriber {
    task: JoinHandle<()>,
}

impl AggregationSubscriber {
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        collection: &str,
        count_uncategorized: bool,
        events: mpsc::Sender<FeedEvent>,
    ) -> Result<Self, StoreError> {
        let mut subscription = store.subscribe(collection).await?;
        let collection: Arc<str> = Arc::from(collection);

        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let update = match event {
                    SnapshotEvent::Snapshot(documents) => {
                        let items = map_documents(documents);
                        let aggregates = AggregateState::from_items(&items, count_uncategorized);
                        tracing::debug!(
                            collection = %collection,
                            items = aggregates.item_count(),
                            tags = aggregates.tags().len(),
                            categories = aggregates.category_counts().len(),
                            "Aggregates recomputed"
                        );
                        FeedEvent::AggregatesUpdated(aggregates)
                    }
                    SnapshotEvent::Error(e) => FeedEvent::SubscriptionFailed(e),
                };

                if events.send(update).await.is_err() {
                    tracing::debug!(collection = %collection, "Controller gone, closing aggregate feed");
                    break;
                }
            }
            // Dropping `subscription` here releases the store side
        });

        Ok(Self { task })
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for AggregationSubscriber {
    fn drop(&mut self) {
        self.task.abort();
    }
}
