use async_trait::async_trait;

use super::live::Subscription;
use super::schema::SqliteStore;
use super::types::{Cursor, Document, Field, OrderBy, StoreError};

/// The document store capability the feed core consumes.
///
/// Implementations own query execution, persistence, and live-update
/// delivery. The feed only ever talks to a store through this trait.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Up to `limit` documents under `order`, strictly after `after` when given.
    ///
    /// A cursor produced under a different ordering is rejected with
    /// [`StoreError::CursorMismatch`].
    async fn query(
        &self,
        collection: &str,
        order: OrderBy,
        limit: usize,
        after: Option<&Cursor>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Documents whose `field` equals `value` exactly.
    async fn query_equal(
        &self,
        collection: &str,
        field: Field,
        value: &str,
    ) -> Result<Vec<Document>, StoreError>;

    /// Documents whose multi-valued `field` contains `value`.
    async fn query_contains(
        &self,
        collection: &str,
        field: Field,
        value: &str,
    ) -> Result<Vec<Document>, StoreError>;

    /// Open a live subscription delivering full snapshots of `collection`.
    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn query(
        &self,
        collection: &str,
        order: OrderBy,
        limit: usize,
        after: Option<&Cursor>,
    ) -> Result<Vec<Document>, StoreError> {
        self.page(collection, order, limit, after).await
    }

    async fn query_equal(
        &self,
        collection: &str,
        field: Field,
        value: &str,
    ) -> Result<Vec<Document>, StoreError> {
        self.find_equal(collection, field, value).await
    }

    async fn query_contains(
        &self,
        collection: &str,
        field: Field,
        value: &str,
    ) -> Result<Vec<Document>, StoreError> {
        self.find_containing(collection, field, value).await
    }

    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError> {
        Ok(self.open_subscription(collection))
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.delete(collection, id).await
    }
}
