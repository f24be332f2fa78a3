//! Live snapshot subscriptions.
//!
//! Every write to a collection is announced on a broadcast channel. Each
//! subscription owns a task that reloads the full collection after every
//! announcement and forwards it as a [`SnapshotEvent`].

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::schema::SqliteStore;
use super::types::{Document, StoreError};

/// Snapshots buffered per subscriber before the reload task waits
const SNAPSHOT_BUFFER: usize = 16;

/// Change announcements buffered before slow subscribers start lagging
pub(crate) const CHANGE_BUFFER: usize = 64;

/// One delivery from a live subscription
#[derive(Debug)]
pub enum SnapshotEvent {
    /// Complete current contents of the collection
    Snapshot(Vec<Document>),
    /// Loading a snapshot failed; the subscription stays open
    Error(StoreError),
}

/// Handle to a live subscription.
///
/// Dropping the handle, or calling [`Subscription::cancel`], releases the
/// subscription: no further snapshots are delivered.
pub struct Subscription {
    events: mpsc::Receiver<SnapshotEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<SnapshotEvent>, task: JoinHandle<()>) -> Self {
        Self {
            events,
            task: Some(task),
        }
    }

    /// Next snapshot event, or `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<SnapshotEvent> {
        self.events.recv().await
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Live subscription cancelled");
        }
        self.events.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl SqliteStore {
    /// Announce a write to `collection`. Having no live subscribers is not an error.
    pub(crate) fn notify_changed(&self, collection: &str) {
        let _ = self.changes.send(Arc::from(collection));
    }

    pub(crate) fn open_subscription(&self, collection: &str) -> Subscription {
        // Subscribe to announcements before the initial load so no write is missed
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let store = self.clone();
        let collection: Arc<str> = Arc::from(collection);

        let task = tokio::spawn(async move {
            if !store.deliver_snapshot(&collection, &tx).await {
                return;
            }

            loop {
                match changes.recv().await {
                    Ok(changed) if *changed == *collection => {}
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(
                            collection = %collection,
                            skipped,
                            "Subscription lagged behind change announcements, reloading"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = tx.send(SnapshotEvent::Error(StoreError::SubscriptionClosed)).await;
                        break;
                    }
                }

                if !store.deliver_snapshot(&collection, &tx).await {
                    break;
                }
            }
        });

        Subscription::new(rx, task)
    }

    /// Load and forward one snapshot. Returns false once the receiver is gone.
    async fn deliver_snapshot(&self, collection: &str, tx: &mpsc::Sender<SnapshotEvent>) -> bool {
        let event = match self.snapshot(collection).await {
            Ok(documents) => {
                tracing::debug!(collection = %collection, count = documents.len(), "Delivering snapshot");
                SnapshotEvent::Snapshot(documents)
            }
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "Snapshot load failed");
                SnapshotEvent::Error(e)
            }
        };

        if tx.send(event).await.is_err() {
            tracing::debug!(collection = %collection, "Subscriber dropped, stopping snapshot task");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn next_snapshot(subscription: &mut Subscription) -> Vec<Document> {
        let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
            .await
            .expect("snapshot within timeout")
            .expect("subscription open");
        match event {
            SnapshotEvent::Snapshot(documents) => documents,
            SnapshotEvent::Error(e) => panic!("unexpected snapshot error: {e}"),
        }
    }

    fn fields(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_initial_snapshot_then_updates() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        store
            .put_document("blogs", "a", fields(json!({"title": "Alpha"})))
            .await
            .unwrap();

        let mut subscription = store.open_subscription("blogs");
        assert_eq!(next_snapshot(&mut subscription).await.len(), 1);

        store
            .put_document("blogs", "b", fields(json!({"title": "Beta"})))
            .await
            .unwrap();
        assert_eq!(next_snapshot(&mut subscription).await.len(), 2);

        store.delete("blogs", "a").await.unwrap();
        let snapshot = next_snapshot(&mut subscription).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "b");
    }

    #[tokio::test]
    async fn test_writes_to_other_collections_are_ignored() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        let mut subscription = store.open_subscription("blogs");
        assert!(next_snapshot(&mut subscription).await.is_empty());

        store
            .put_document("drafts", "x", fields(json!({"title": "Draft"})))
            .await
            .unwrap();
        store
            .put_document("blogs", "y", fields(json!({"title": "Posted"})))
            .await
            .unwrap();

        // The drafts write produces no snapshot; the next one reflects the blogs write
        let snapshot = next_snapshot(&mut subscription).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "y");
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        let mut subscription = store.open_subscription("blogs");
        next_snapshot(&mut subscription).await;

        subscription.cancel();
        store
            .put_document("blogs", "a", fields(json!({"title": "Alpha"})))
            .await
            .unwrap();

        let next = tokio::time::timeout(Duration::from_millis(200), subscription.recv()).await;
        assert!(matches!(next, Ok(None)));
    }
}
