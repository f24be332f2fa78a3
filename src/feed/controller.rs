//! Feed state machine.
//!
//! The controller owns [`FeedState`] and [`AggregateState`]. Store calls run
//! as spawned tasks that report back through a bounded channel; nothing else
//! mutates feed state. Callers drive the controller by pumping events with
//! [`FeedController::next_event`] and [`FeedController::handle_event`], or
//! with [`FeedController::settle`] when they just want outstanding work done.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::aggregate::{AggregateState, AggregationSubscriber, CategoryCount};
use super::error::FeedError;
use super::events::FeedEvent;
use super::mapping::ContentItem;
use super::paginator::{Page, Paginator};
use super::search::SearchEngine;
use crate::config::Config;
use crate::storage::{Cursor, DocumentStore, StoreError};

/// Capacity of the controller's event channel
const EVENT_BUFFER: usize = 64;

/// Shown when "load more" finds nothing left
pub const END_OF_RESULTS_MESSAGE: &str = "No more items to display";

// ============================================================================
// Options
// ============================================================================

/// Per-feed settings, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub collection: String,
    /// Ask before deleting. When off, `request_delete` deletes immediately.
    pub confirm_delete: bool,
    /// How long a notification stays visible
    pub notification_ttl: Duration,
    /// Count items without a category under the uncategorized sentinel
    pub count_uncategorized: bool,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            collection: "blogs".to_string(),
            confirm_delete: true,
            notification_ttl: Duration::from_secs(3),
            count_uncategorized: true,
        }
    }
}

impl From<&Config> for FeedOptions {
    fn from(config: &Config) -> Self {
        Self {
            collection: config.collection.clone(),
            confirm_delete: config.confirm_delete,
            notification_ttl: Duration::from_secs(config.notification_secs),
            count_uncategorized: config.count_uncategorized,
        }
    }
}

// ============================================================================
// Feed State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// First page requested, nothing shown yet
    Loading,
    Browsing,
    Searching,
    /// A "load more" came back empty; no further fetches
    Exhausted,
    /// Transient, while a delete is in flight
    Deleting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMode {
    Browsing,
    Searching { term: String },
}

/// Externally visible feed state.
#[derive(Debug, Clone)]
pub struct FeedState {
    items: Vec<ContentItem>,
    loading: bool,
    exhausted: bool,
    mode: FeedMode,
    status: FeedStatus,
    cursor: Option<Cursor>,
    /// Term of the last search, when it matched nothing
    no_results: Option<String>,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            exhausted: false,
            mode: FeedMode::Browsing,
            status: FeedStatus::Loading,
            cursor: None,
            no_results: None,
        }
    }
}

// ============================================================================
// Notifications and Confirmation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// Transient user-facing message. Expires after the configured TTL.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Increases with every notification raised by one controller
    pub seq: u64,
    pub level: NotificationLevel,
    pub message: Cow<'static, str>,
    pub raised_at: Instant,
}

/// Pending confirmation for destructive operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    /// Delete one item. `title` is `None` when the item isn't in the visible list.
    DeleteItem { id: String, title: Option<Arc<str>> },
}

// ============================================================================
// Controller
// ============================================================================

pub struct FeedController {
    store: Arc<dyn DocumentStore>,
    collection: Arc<str>,
    options: FeedOptions,
    paginator: Paginator,
    search: SearchEngine,

    state: FeedState,
    aggregates: AggregateState,
    subscriber: Option<AggregationSubscriber>,

    events_tx: mpsc::Sender<FeedEvent>,
    events_rx: mpsc::Receiver<FeedEvent>,

    /// Bumped by every navigation (mount, reset, search, search cleared).
    /// Page and search results issued under an older generation are dropped.
    generation: u64,
    /// One-shot tasks whose result has not been handled yet
    in_flight: usize,
    /// A page request of the current generation is outstanding
    page_in_flight: bool,
    /// Status to return to once the in-flight delete completes
    resume_status: Option<FeedStatus>,

    search_input: String,
    active: Option<String>,
    pending_confirm: Option<ConfirmAction>,
    notification: Option<Notification>,
    notification_seq: u64,
    needs_redraw: bool,
}

impl FeedController {
    /// Start the live aggregate feed and request the first page.
    ///
    /// A subscription that cannot be opened is logged and reported; the feed
    /// still works, only without aggregates.
    pub async fn mount(store: Arc<dyn DocumentStore>, options: FeedOptions) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let collection: Arc<str> = Arc::from(options.collection.as_str());

        let mut controller = Self {
            paginator: Paginator::new(Arc::clone(&store), Arc::clone(&collection)),
            search: SearchEngine::new(Arc::clone(&store), Arc::clone(&collection)),
            store,
            collection,
            options,
            state: FeedState::default(),
            aggregates: AggregateState::default(),
            subscriber: None,
            events_tx,
            events_rx,
            generation: 0,
            in_flight: 0,
            page_in_flight: false,
            resume_status: None,
            search_input: String::new(),
            active: None,
            pending_confirm: None,
            notification: None,
            notification_seq: 0,
            needs_redraw: true,
        };

        match AggregationSubscriber::start(
            Arc::clone(&controller.store),
            &controller.collection,
            controller.options.count_uncategorized,
            controller.events_tx.clone(),
        )
        .await
        {
            Ok(subscriber) => controller.subscriber = Some(subscriber),
            Err(e) => {
                let e = FeedError::Subscription(e);
                tracing::error!(collection = %controller.collection, error = %e, "Failed to open live subscription");
                controller.notify(NotificationLevel::Error, e.to_string());
            }
        }

        tracing::info!(collection = %controller.collection, "Feed mounted");
        controller.issue_first_page();
        controller
    }

    /// Release the live subscription. Aggregates are cleared and any update
    /// still queued is ignored.
    pub fn unmount(&mut self) {
        if let Some(subscriber) = self.subscriber.take() {
            subscriber.cancel();
            tracing::info!(collection = %self.collection, "Feed unmounted");
        }
        self.aggregates = AggregateState::default();
        self.needs_redraw = true;
    }

    pub fn is_mounted(&self) -> bool {
        self.subscriber.is_some()
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn items(&self) -> &[ContentItem] {
        &self.state.items
    }

    pub fn tags(&self) -> &[String] {
        self.aggregates.tags()
    }

    pub fn category_counts(&self) -> &[CategoryCount] {
        self.aggregates.category_counts()
    }

    pub fn aggregates(&self) -> &AggregateState {
        &self.aggregates
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.exhausted
    }

    /// True when "load more" would issue a fetch
    pub fn has_more(&self) -> bool {
        self.state.mode == FeedMode::Browsing && !self.state.exhausted
    }

    /// The search term, when the last search matched nothing
    pub fn no_results(&self) -> Option<&str> {
        self.state.no_results.as_deref()
    }

    pub fn status(&self) -> FeedStatus {
        self.state.status
    }

    pub fn mode(&self) -> &FeedMode {
        &self.state.mode
    }

    pub fn search_input(&self) -> &str {
        &self.search_input
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn pending_confirm(&self) -> Option<&ConfirmAction> {
        self.pending_confirm.as_ref()
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn options(&self) -> &FeedOptions {
        &self.options
    }

    /// One-shot operations still awaiting their result
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Returns whether visible state changed since the last call
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Fetch the next page. Returns false when the request was not valid in
    /// the current state (searching, exhausted, loading, or a page already in
    /// flight).
    pub fn request_more(&mut self) -> bool {
        if let FeedMode::Searching { term } = &self.state.mode {
            tracing::debug!(term = %term, "Ignoring load more while searching");
            return false;
        }
        if self.state.status != FeedStatus::Browsing || self.page_in_flight {
            tracing::debug!(
                status = ?self.state.status,
                page_in_flight = self.page_in_flight,
                "Ignoring load more"
            );
            return false;
        }

        self.page_in_flight = true;
        self.state.loading = true;
        self.needs_redraw = true;

        let generation = self.generation;
        let paginator = self.paginator.clone();
        let cursor = self.state.cursor.clone();
        tracing::debug!(generation, continued = cursor.is_some(), "Requesting next page");

        self.spawn_one_shot(async move {
            let result = match cursor {
                Some(cursor) => paginator.next_page(&cursor).await,
                None => paginator.first_page().await,
            };
            FeedEvent::NextPageLoaded { generation, result }
        });
        true
    }

    /// Apply the page's search parameter. `None` and blank terms are ignored.
    pub fn apply_search_query(&mut self, query: Option<&str>) {
        let term = match query {
            Some(term) if !term.trim().is_empty() => term.to_string(),
            _ => return,
        };

        // Any page request still out belongs to the old generation now
        self.bump_generation();
        self.page_in_flight = false;
        self.search_input.clone_from(&term);
        self.state.mode = FeedMode::Searching { term: term.clone() };
        self.state.no_results = None;
        self.state.loading = true;
        self.set_status(FeedStatus::Searching);

        let generation = self.generation;
        let search = self.search.clone();
        tracing::debug!(query = %term, generation, "Spawning search");

        self.spawn_one_shot(async move {
            let result = search.search(&term).await;
            FeedEvent::SearchCompleted {
                term,
                generation,
                result,
            }
        });
    }

    /// Track the search input. Clearing it ends the search and reloads the
    /// first page.
    pub fn update_search_input(&mut self, text: &str) {
        let was_empty = self.search_input.is_empty();
        self.search_input = text.to_string();

        let searching = matches!(self.state.mode, FeedMode::Searching { .. });
        if text.is_empty() && (searching || !was_empty) {
            tracing::debug!("Search cleared, reloading first page");
            self.state.mode = FeedMode::Browsing;
            self.state.items.clear();
            self.state.cursor = None;
            self.state.no_results = None;
            self.state.exhausted = false;
            self.issue_first_page();
        }
    }

    /// Run a search for the current input
    pub fn submit_search(&mut self) {
        let term = self.search_input.clone();
        self.apply_search_query(Some(&term));
    }

    /// Empty the feed and reload the first page (navigation).
    pub fn reset(&mut self) {
        let deleting = self.state.status == FeedStatus::Deleting;
        self.state = FeedState::default();
        if deleting {
            self.state.status = FeedStatus::Deleting;
        }
        self.search_input.clear();
        self.pending_confirm = None;
        self.issue_first_page();
    }

    /// React to the external "active" signal. Returns true when it changed
    /// and the feed was reset.
    pub fn set_active(&mut self, signal: &str) -> bool {
        if self.active.as_deref() == Some(signal) {
            return false;
        }
        tracing::debug!(active = %signal, "Active signal changed");
        self.active = Some(signal.to_string());
        self.reset();
        true
    }

    /// Ask to delete an item. With confirmation enabled this only records
    /// the request; [`confirm_delete`](Self::confirm_delete) resolves it.
    pub fn request_delete(&mut self, id: &str) {
        if self.state.status == FeedStatus::Deleting {
            self.notify(NotificationLevel::Info, "A delete is already in progress");
            return;
        }

        if self.options.confirm_delete {
            let title = self
                .state
                .items
                .iter()
                .find(|item| item.id == id)
                .map(|item| Arc::clone(&item.title));
            self.pending_confirm = Some(ConfirmAction::DeleteItem {
                id: id.to_string(),
                title,
            });
            self.needs_redraw = true;
        } else {
            self.start_delete(id.to_string());
        }
    }

    /// Resolve a pending confirmation. Returns false when nothing was pending.
    pub fn confirm_delete(&mut self, accepted: bool) -> bool {
        let Some(ConfirmAction::DeleteItem { id, .. }) = self.pending_confirm.take() else {
            return false;
        };

        if !accepted {
            tracing::debug!(id = %id, "Delete declined");
            self.notify(NotificationLevel::Info, "Delete cancelled");
            return true;
        }
        if self.state.status == FeedStatus::Deleting {
            self.notify(NotificationLevel::Info, "A delete is already in progress");
            return true;
        }
        self.start_delete(id);
        true
    }

    // ------------------------------------------------------------------------
    // Event Pump
    // ------------------------------------------------------------------------

    /// Wait for the next result from a background task.
    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        self.events_rx.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<FeedEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Handle events until no one-shot operation is in flight.
    ///
    /// Aggregate updates arriving meanwhile are applied as well.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.events_rx.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
    }

    /// Apply a background result to the feed state.
    pub fn handle_event(&mut self, event: FeedEvent) {
        if event.is_one_shot() {
            self.in_flight = self.in_flight.saturating_sub(1);
        }

        match event {
            FeedEvent::FirstPageLoaded { generation, result } => {
                if self.is_stale(generation, "first page") {
                    return;
                }
                self.handle_first_page(result);
            }
            FeedEvent::NextPageLoaded { generation, result } => {
                if self.is_stale(generation, "next page") {
                    return;
                }
                self.handle_next_page(result);
            }
            FeedEvent::SearchCompleted {
                term,
                generation,
                result,
            } => {
                if generation != self.generation {
                    tracing::debug!(
                        expected = self.generation,
                        got = generation,
                        query = %term,
                        "Ignoring stale search result (generation mismatch)"
                    );
                    return;
                }
                self.handle_search_completed(term, result);
            }
            FeedEvent::DeleteCompleted { id, result } => self.handle_delete_completed(id, result),
            FeedEvent::AggregatesUpdated(aggregates) => {
                if self.subscriber.is_none() {
                    tracing::debug!("Ignoring aggregate update after unmount");
                    return;
                }
                self.aggregates = aggregates;
                self.needs_redraw = true;
            }
            FeedEvent::SubscriptionFailed(e) => {
                // Last known aggregates stay available
                let e = FeedError::Subscription(e);
                tracing::error!(collection = %self.collection, error = %e, "Live subscription error");
            }
        }
    }

    /// Drop the notification once its TTL has passed.
    /// Returns true if a notification was actually cleared.
    pub fn clear_expired_notification(&mut self) -> bool {
        if let Some(notification) = &self.notification {
            if notification.raised_at.elapsed() >= self.options.notification_ttl {
                self.notification = None;
                self.needs_redraw = true;
                return true;
            }
        }
        false
    }

    // ------------------------------------------------------------------------
    // Result Handlers
    // ------------------------------------------------------------------------

    fn handle_first_page(&mut self, result: Result<Page, StoreError>) {
        self.page_in_flight = false;
        self.state.loading = false;
        self.needs_redraw = true;

        match result {
            Ok(page) => {
                tracing::debug!(count = page.items.len(), "First page loaded");
                self.state.items = page.items;
                self.state.cursor = page.cursor;
                self.state.exhausted = false;
            }
            Err(e) => {
                let e = FeedError::StoreRead(e);
                tracing::warn!(error = %e, "First page fetch failed");
                self.notify(NotificationLevel::Error, e.to_string());
            }
        }
        self.set_status(FeedStatus::Browsing);
    }

    fn handle_next_page(&mut self, result: Result<Page, StoreError>) {
        self.page_in_flight = false;
        self.state.loading = false;
        self.needs_redraw = true;

        // Without a cursor the request started from the beginning, so the
        // page replaces whatever the list held.
        let from_start = self.state.cursor.is_none();

        match result {
            Ok(page) if page.is_end() => {
                tracing::debug!(loaded = self.state.items.len(), "Feed exhausted");
                if from_start {
                    self.state.items.clear();
                }
                self.state.exhausted = true;
                self.set_status(FeedStatus::Exhausted);
                self.notify(NotificationLevel::Info, END_OF_RESULTS_MESSAGE);
            }
            Ok(page) => {
                tracing::debug!(count = page.items.len(), from_start, "Next page loaded");
                if from_start {
                    self.state.items = page.items;
                } else {
                    self.state.items.extend(page.items);
                }
                self.state.cursor = page.cursor;
            }
            Err(e) => {
                let e = FeedError::StoreRead(e);
                tracing::warn!(error = %e, "Next page fetch failed");
                self.notify(NotificationLevel::Error, e.to_string());
            }
        }
    }

    fn handle_search_completed(&mut self, term: String, result: Result<Vec<ContentItem>, FeedError>) {
        self.state.loading = false;
        self.needs_redraw = true;

        match result {
            Ok(items) => {
                tracing::debug!(query = %term, count = items.len(), "Search completed");
                self.state.no_results = items.is_empty().then_some(term);
                self.state.items = items;
                self.state.cursor = None;
            }
            Err(e) => {
                tracing::warn!(query = %term, error = %e, "Search failed");
                self.notify(NotificationLevel::Error, format!("Search failed: {}", e));
            }
        }
    }

    fn handle_delete_completed(&mut self, id: String, result: Result<(), StoreError>) {
        let resume = self.resume_status.take().unwrap_or(FeedStatus::Browsing);
        self.state.status = resume;
        self.needs_redraw = true;

        match result {
            Ok(()) => {
                tracing::info!(id = %id, "Item deleted");
                self.notify(NotificationLevel::Success, "Item deleted");
            }
            Err(e) => {
                let e = FeedError::StoreWrite(e);
                tracing::error!(id = %id, error = %e, "Delete failed");
                self.notify(NotificationLevel::Error, e.to_string());
            }
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn issue_first_page(&mut self) {
        self.bump_generation();
        self.page_in_flight = true;
        self.state.loading = true;
        self.set_status(FeedStatus::Loading);

        let generation = self.generation;
        let paginator = self.paginator.clone();
        tracing::debug!(generation, "Requesting first page");

        self.spawn_one_shot(async move {
            let result = paginator.first_page().await;
            FeedEvent::FirstPageLoaded { generation, result }
        });
    }

    fn start_delete(&mut self, id: String) {
        self.resume_status = Some(self.state.status);
        self.state.status = FeedStatus::Deleting;
        self.needs_redraw = true;

        let store = Arc::clone(&self.store);
        let collection = Arc::clone(&self.collection);
        tracing::debug!(id = %id, "Deleting item");

        self.spawn_one_shot(async move {
            let result = store.delete_document(&collection, &id).await;
            FeedEvent::DeleteCompleted { id, result }
        });
    }

    fn spawn_one_shot<F>(&mut self, task: F)
    where
        F: Future<Output = FeedEvent> + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let event = task.await;
            if let Err(e) = tx.send(event).await {
                tracing::warn!(error = %e, "Failed to send feed result (receiver dropped)");
            }
        });
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn is_stale(&self, generation: u64, what: &'static str) -> bool {
        if generation != self.generation {
            tracing::debug!(
                expected = self.generation,
                got = generation,
                result = what,
                "Ignoring stale page result (generation mismatch)"
            );
            return true;
        }
        false
    }

    /// Status changes landing while a delete is in flight take effect once
    /// it completes.
    fn set_status(&mut self, status: FeedStatus) {
        if self.state.status == FeedStatus::Deleting {
            self.resume_status = Some(status);
        } else {
            self.state.status = status;
        }
        self.needs_redraw = true;
    }

    fn notify(&mut self, level: NotificationLevel, message: impl Into<Cow<'static, str>>) {
        self.notification_seq += 1;
        self.notification = Some(Notification {
            seq: self.notification_seq,
            level,
            message: message.into(),
            raised_at: Instant::now(),
        });
        self.needs_redraw = true;
    }
}
