//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use blogfeed::feed::{FeedController, FeedEvent, FeedOptions};
use blogfeed::storage::{
    Cursor, Document, DocumentStore, Field, OrderBy, SqliteStore, StoreError, Subscription,
};

pub const COLLECTION: &str = "blogs";

/// Wraps a real store and fails chosen operations on demand.
pub struct FlakyStore {
    pub inner: SqliteStore,
    pub fail_queries: AtomicBool,
    pub fail_search: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub deletes: AtomicUsize,
    pub queries: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: SqliteStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_queries: AtomicBool::new(false),
            fail_search: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            deletes: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        })
    }

    fn injected() -> StoreError {
        StoreError::Migration("injected failure".to_string())
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn query(
        &self,
        collection: &str,
        order: OrderBy,
        limit: usize,
        after: Option<&Cursor>,
    ) -> Result<Vec<Document>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.query(collection, order, limit, after).await
    }

    async fn query_equal(
        &self,
        collection: &str,
        field: Field,
        value: &str,
    ) -> Result<Vec<Document>, StoreError> {
        self.inner.query_equal(collection, field, value).await
    }

    async fn query_contains(
        &self,
        collection: &str,
        field: Field,
        value: &str,
    ) -> Result<Vec<Document>, StoreError> {
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.query_contains(collection, field, value).await
    }

    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError> {
        self.inner.subscribe(collection).await
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.delete_document(collection, id).await
    }
}

pub fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

/// In-memory store seeded with `(id, title, tags, category)` rows.
/// Tags are whitespace separated.
pub async fn seeded_store(rows: &[(&str, &str, &str, Option<&str>)]) -> SqliteStore {
    let store = SqliteStore::open(":memory:").await.unwrap();
    for (id, title, tags, category) in rows {
        let tags: Vec<&str> = tags.split_whitespace().collect();
        store
            .put_document(
                COLLECTION,
                id,
                fields(json!({ "title": title, "tags": tags, "category": category })),
            )
            .await
            .unwrap();
    }
    store
}

/// Store with documents titled `title00`, `title01`, ... under ids `id00`, ...
pub async fn numbered_store(count: usize) -> SqliteStore {
    let store = SqliteStore::open(":memory:").await.unwrap();
    for i in 0..count {
        store
            .put_document(
                COLLECTION,
                &format!("id{i:02}"),
                fields(json!({ "title": format!("title{i:02}"), "tags": [format!("t{}", i % 3)] })),
            )
            .await
            .unwrap();
    }
    store
}

pub async fn mount(store: Arc<dyn DocumentStore>) -> FeedController {
    mount_with(store, FeedOptions::default()).await
}

pub async fn mount_with(store: Arc<dyn DocumentStore>, options: FeedOptions) -> FeedController {
    let mut controller = FeedController::mount(store, options).await;
    controller.settle().await;
    controller
}

/// Pump events until an aggregate update has been applied.
pub async fn next_aggregates(controller: &mut FeedController) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = controller.next_event().await {
            let is_aggregate = matches!(event, FeedEvent::AggregatesUpdated(_));
            controller.handle_event(event);
            if is_aggregate {
                break;
            }
        }
    })
    .await
    .expect("aggregate update within timeout");
}

/// Pump events until aggregates report `count` items.
pub async fn aggregates_with_count(controller: &mut FeedController, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.aggregates().item_count() != count {
            next_aggregates(controller).await;
        }
    })
    .await
    .expect("aggregates reach expected count");
}

pub fn ids(controller: &FeedController) -> Vec<String> {
    controller.items().iter().map(|i| i.id.clone()).collect()
}

pub fn titles(controller: &FeedController) -> Vec<String> {
    controller.items().iter().map(|i| i.title.to_string()).collect()
}
