//! Conversion from raw store documents to feed items.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::storage::Document;

/// Label shown for items that carry no category
pub const UNCATEGORIZED_LABEL: &str = "uncategorized";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("document '{id}' has no title")]
    MissingTitle { id: String },

    #[error("document '{id}': field '{field}' must be {expected}")]
    InvalidField {
        id: String,
        field: &'static str,
        expected: &'static str,
    },
}

/// Item category. Missing and null categories map to the explicit
/// `Uncategorized` sentinel; an empty string is an ordinary name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Named(String),
    Uncategorized,
}

impl Category {
    pub fn label(&self) -> &str {
        match self {
            Category::Named(name) => name,
            Category::Uncategorized => UNCATEGORIZED_LABEL,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A feed entry as the core sees it.
///
/// `title` uses `Arc<str>` so items can be cloned cheaply into search
/// results and confirmation prompts.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub id: String,
    pub title: Arc<str>,
    pub tags: Vec<String>,
    pub category: Category,
    /// Remaining display fields, opaque to the core
    pub extra: Map<String, Value>,
}

impl ContentItem {
    /// Attach the store-assigned id to the document's fields.
    pub fn from_document(document: Document) -> Result<Self, MappingError> {
        let Document { id, mut fields } = document;

        let title = match fields.remove("title") {
            Some(Value::String(title)) => Arc::from(title),
            Some(Value::Null) | None => return Err(MappingError::MissingTitle { id }),
            Some(_) => {
                return Err(MappingError::InvalidField {
                    id,
                    field: "title",
                    expected: "a string",
                })
            }
        };

        let tags = match fields.remove("tags") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => {
                let mut tags = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Value::String(tag) => tags.push(tag),
                        _ => {
                            return Err(MappingError::InvalidField {
                                id,
                                field: "tags",
                                expected: "an array of strings",
                            })
                        }
                    }
                }
                tags
            }
            Some(_) => {
                return Err(MappingError::InvalidField {
                    id,
                    field: "tags",
                    expected: "an array of strings",
                })
            }
        };

        let category = match fields.remove("category") {
            None | Some(Value::Null) => Category::Uncategorized,
            Some(Value::String(name)) => Category::Named(name),
            Some(_) => {
                return Err(MappingError::InvalidField {
                    id,
                    field: "category",
                    expected: "a string",
                })
            }
        };

        Ok(Self {
            id,
            title,
            tags,
            category,
            extra: fields,
        })
    }
}

/// Map a batch of documents, skipping (and logging) any that don't fit the item schema.
pub fn map_documents(documents: Vec<Document>) -> Vec<ContentItem> {
    let mut items = Vec::with_capacity(documents.len());
    for document in documents {
        match ContentItem::from_document(document) {
            Ok(item) => items.push(item),
            Err(e) => tracing::warn!(error = %e, "Skipping malformed document"),
        }
    }
    items
}
