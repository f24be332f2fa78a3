//! A paginated, searchable feed over a document store, with tag and
//! category aggregates kept current by a live subscription.

pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
