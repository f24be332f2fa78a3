use serde_json::{Map, Value};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Document store errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another instance of the application has locked the database
    #[error("Another instance of blogfeed appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A document could not be written because a required field is missing or mistyped
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A stored document body could not be decoded
    #[error("Stored document '{id}' is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Document '{0}' not found")]
    NotFound(String),

    /// A cursor was used under an ordering other than the one it was produced under
    #[error("Cursor does not belong to the requested ordering")]
    CursorMismatch,

    #[error("Field '{field}' does not support {operation} queries")]
    UnsupportedField {
        field: &'static str,
        operation: &'static str,
    },

    /// The live subscription stopped delivering snapshots
    #[error("Live subscription closed")]
    SubscriptionClosed,

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StoreError::InstanceLocked;
        }

        StoreError::Database(err)
    }
}

// ============================================================================
// Documents
// ============================================================================

/// A raw store document: the store-assigned id plus its field set.
///
/// The store does not interpret fields beyond the ones it indexes
/// (`title`, `category`, `tags`); everything else is carried through as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// String value of a field, if present and a string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Internal row type for document queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DocumentRow {
    pub id: String,
    pub data: String,
}

impl DocumentRow {
    pub(crate) fn into_document(self) -> Result<Document, StoreError> {
        match serde_json::from_str::<Map<String, Value>>(&self.data) {
            Ok(fields) => Ok(Document::new(self.id, fields)),
            Err(e) => Err(StoreError::Corrupt {
                id: self.id,
                reason: e.to_string(),
            }),
        }
    }
}

// ============================================================================
// Query Vocabulary
// ============================================================================

/// Fields a page can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Title,
    Id,
}

impl SortField {
    /// Column backing this field. Only ever interpolated from this whitelist.
    pub(crate) fn column(self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Id => "id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering for a paged query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: SortField,
    pub direction: Direction,
}

impl OrderBy {
    pub const fn ascending(field: SortField) -> Self {
        Self {
            field,
            direction: Direction::Ascending,
        }
    }

    pub const fn descending(field: SortField) -> Self {
        Self {
            field,
            direction: Direction::Descending,
        }
    }
}

/// Indexed document fields usable in equality and containment queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Category,
    /// Multi-valued: only supports containment
    Tags,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Category => "category",
            Field::Tags => "tags",
        }
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// Opaque position marker pointing at the last document of an ordered page.
///
/// A cursor remembers the ordering it was produced under; a store must
/// reject it with [`StoreError::CursorMismatch`] when it is used with any
/// other ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    order: OrderBy,
    key: String,
    id: String,
}

impl Cursor {
    /// Cursor pointing at `document` under `order`.
    pub fn after(document: &Document, order: OrderBy) -> Result<Self, StoreError> {
        let key = match order.field {
            SortField::Id => document.id.clone(),
            SortField::Title => document
                .get_str("title")
                .ok_or_else(|| {
                    StoreError::InvalidDocument(format!(
                        "document '{}' has no string title to position a cursor on",
                        document.id
                    ))
                })?
                .to_owned(),
        };

        Ok(Self {
            order,
            key,
            id: document.id.clone(),
        })
    }

    pub fn order(&self) -> OrderBy {
        self.order
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }
}
