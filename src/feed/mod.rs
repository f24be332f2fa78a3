//! Feed core: pagination, merged search, and live tag/category aggregates.
//!
//! - [`mapping`] turns raw store documents into [`ContentItem`]s
//! - [`paginator`] issues ordered, limited fetches and tracks the cursor
//! - [`search`] runs the title and tag queries concurrently and merges them
//! - [`aggregate`] keeps tag and category summaries current from a live subscription
//! - [`controller`] is the state machine tying them together
//!
//! ```ignore
//! let mut feed = FeedController::mount(store, FeedOptions::default()).await;
//! feed.settle().await;
//! feed.request_more();
//! ```

pub mod aggregate;
pub mod controller;
mod error;
mod events;
pub mod mapping;
pub mod paginator;
pub mod search;

pub use aggregate::{AggregateState, AggregationSubscriber, CategoryCount};
pub use controller::{
    ConfirmAction, FeedController, FeedMode, FeedOptions, FeedStatus, Notification,
    NotificationLevel, END_OF_RESULTS_MESSAGE,
};
pub use error::FeedError;
pub use events::FeedEvent;
pub use mapping::{map_documents, Category, ContentItem, MappingError, UNCATEGORIZED_LABEL};
pub use paginator::{Page, Paginator, FEED_ORDER, PAGE_SIZE};
pub use search::SearchEngine;
