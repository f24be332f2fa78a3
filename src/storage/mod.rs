mod documents;
mod live;
mod schema;
mod store;
mod types;

pub use documents::parse_import;
pub use live::{SnapshotEvent, Subscription};
pub use schema::SqliteStore;
pub use store::DocumentStore;
pub use types::{Cursor, Direction, Document, Field, OrderBy, SortField, StoreError};
