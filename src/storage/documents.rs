use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite, Transaction};

use super::schema::SqliteStore;
use super::types::{Cursor, Direction, Document, DocumentRow, Field, OrderBy, StoreError};

/// Maximum documents returned by any single unbounded query (OOM protection)
const MAX_DOCUMENTS: i64 = 10_000;

/// Tags inserted per statement when writing a document
const TAG_BATCH_SIZE: usize = 100;

/// Columns the store indexes out of a document body
struct IndexedFields {
    title: String,
    category: Option<String>,
    tags: Vec<String>,
}

/// Pull the queryable fields out of a document body, rejecting wrong types.
fn indexed_fields(fields: &Map<String, Value>) -> Result<IndexedFields, StoreError> {
    let title = match fields.get("title") {
        Some(Value::String(title)) => title.clone(),
        Some(_) => return Err(StoreError::InvalidDocument("'title' must be a string".into())),
        None => return Err(StoreError::InvalidDocument("missing 'title'".into())),
    };

    let category = match fields.get("category") {
        None | Some(Value::Null) => None,
        Some(Value::String(category)) => Some(category.clone()),
        Some(_) => {
            return Err(StoreError::InvalidDocument(
                "'category' must be a string or null".into(),
            ))
        }
    };

    let tags = match fields.get("tags") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| {
                v.as_str().map(str::to_owned).ok_or_else(|| {
                    StoreError::InvalidDocument("'tags' must contain only strings".into())
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(StoreError::InvalidDocument(
                "'tags' must be an array of strings".into(),
            ))
        }
    };

    Ok(IndexedFields {
        title,
        category,
        tags,
    })
}

/// Parse a JSON import file: an array of objects, each optionally carrying its own `id`.
pub fn parse_import(content: &str) -> Result<Vec<(Option<String>, Map<String, Value>)>, StoreError> {
    let values: Vec<Value> = serde_json::from_str(content)
        .map_err(|e| StoreError::InvalidDocument(format!("import file is not a JSON array: {e}")))?;

    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::Object(mut fields) => {
                let id = match fields.remove("id") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(id)) => Some(id),
                    Some(_) => {
                        return Err(StoreError::InvalidDocument(format!(
                            "entry {index}: 'id' must be a string"
                        )))
                    }
                };
                Ok((id, fields))
            }
            _ => Err(StoreError::InvalidDocument(format!(
                "entry {index}: expected a JSON object"
            ))),
        })
        .collect()
}

impl SqliteStore {
    // ========================================================================
    // Write Operations
    // ========================================================================

    /// Insert or replace the document `id` within a transaction
    async fn write_document(
        tx: &mut Transaction<'_, Sqlite>,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let indexed = indexed_fields(fields)?;
        let data = serde_json::to_string(fields)
            .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, title, category, data)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                title = excluded.title,
                category = excluded.category,
                data = excluded.data,
                updated_at = datetime('now')
        "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&indexed.title)
        .bind(&indexed.category)
        .bind(&data)
        .execute(&mut **tx)
        .await?;

        sqlx::query("DELETE FROM document_tags WHERE collection = ? AND document_id = ?")
            .bind(collection)
            .bind(id)
            .execute(&mut **tx)
            .await?;

        for chunk in indexed.tags.chunks(TAG_BATCH_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO document_tags (collection, document_id, tag) ");
            builder.push_values(chunk, |mut b, tag| {
                b.push_bind(collection).push_bind(id).push_bind(tag);
            });
            builder.build().execute(&mut **tx).await?;
        }

        Ok(())
    }

    /// Insert or replace a document under an explicit id
    pub async fn put_document(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::write_document(&mut tx, collection, id, &fields).await?;
        tx.commit().await?;

        tracing::debug!(collection = %collection, id = %id, "Document written");
        self.notify_changed(collection);
        Ok(())
    }

    /// Insert a document under a store-assigned id, returning the id
    pub async fn insert_document(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<String, StoreError> {
        let (id,): (String,) = sqlx::query_as("SELECT lower(hex(randomblob(10)))")
            .fetch_one(&self.pool)
            .await?;
        self.put_document(collection, &id, fields).await?;
        Ok(id)
    }

    /// Write a batch of documents in one transaction, assigning ids where missing.
    ///
    /// Subscribers see a single snapshot for the whole batch.
    pub async fn import_documents(
        &self,
        collection: &str,
        documents: Vec<(Option<String>, Map<String, Value>)>,
    ) -> Result<usize, StoreError> {
        if documents.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for (id, fields) in &documents {
            let id = match id {
                Some(id) => id.clone(),
                None => {
                    let (generated,): (String,) =
                        sqlx::query_as("SELECT lower(hex(randomblob(10)))")
                            .fetch_one(&mut *tx)
                            .await?;
                    generated
                }
            };
            Self::write_document(&mut tx, collection, &id, fields).await?;
        }
        tx.commit().await?;

        tracing::info!(collection = %collection, count = documents.len(), "Imported documents");
        self.notify_changed(collection);
        Ok(documents.len())
    }

    /// Delete a document. Unknown ids are reported as `NotFound`.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM document_tags WHERE collection = ? AND document_id = ?")
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound(id.to_owned()));
        }
        tx.commit().await?;

        tracing::debug!(collection = %collection, id = %id, "Document deleted");
        self.notify_changed(collection);
        Ok(())
    }

    /// Number of documents in a collection
    pub async fn count(&self, collection: &str) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ========================================================================
    // Read Operations
    // ========================================================================

    /// Ordered, limited page of a collection, optionally strictly after `after`
    pub async fn page(
        &self,
        collection: &str,
        order: OrderBy,
        limit: usize,
        after: Option<&Cursor>,
    ) -> Result<Vec<Document>, StoreError> {
        let column = order.field.column();
        let (cmp, dir) = match order.direction {
            Direction::Ascending => (">", "ASC"),
            Direction::Descending => ("<", "DESC"),
        };
        let limit = i64::try_from(limit).unwrap_or(MAX_DOCUMENTS).min(MAX_DOCUMENTS);

        let rows = match after {
            None => {
                let sql = format!(
                    "SELECT id, data FROM documents WHERE collection = ? \
                     ORDER BY {column} {dir}, id {dir} LIMIT ?"
                );
                sqlx::query_as::<_, DocumentRow>(&sql)
                    .bind(collection)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            Some(cursor) => {
                if cursor.order() != order {
                    return Err(StoreError::CursorMismatch);
                }
                let sql = format!(
                    "SELECT id, data FROM documents WHERE collection = ?1 \
                     AND ({column} {cmp} ?2 OR ({column} = ?2 AND id {cmp} ?3)) \
                     ORDER BY {column} {dir}, id {dir} LIMIT ?4"
                );
                sqlx::query_as::<_, DocumentRow>(&sql)
                    .bind(collection)
                    .bind(cursor.key())
                    .bind(cursor.id())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    /// Documents whose scalar `field` equals `value`, in id order
    pub async fn find_equal(
        &self,
        collection: &str,
        field: Field,
        value: &str,
    ) -> Result<Vec<Document>, StoreError> {
        let sql = match field {
            Field::Title => {
                "SELECT id, data FROM documents WHERE collection = ? AND title = ? ORDER BY id LIMIT ?"
            }
            Field::Category => {
                "SELECT id, data FROM documents WHERE collection = ? AND category = ? ORDER BY id LIMIT ?"
            }
            Field::Tags => {
                return Err(StoreError::UnsupportedField {
                    field: field.name(),
                    operation: "equality",
                })
            }
        };

        let rows = sqlx::query_as::<_, DocumentRow>(sql)
            .bind(collection)
            .bind(value)
            .bind(MAX_DOCUMENTS)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    /// Documents whose multi-valued `field` contains `value`, each at most once, in id order
    pub async fn find_containing(
        &self,
        collection: &str,
        field: Field,
        value: &str,
    ) -> Result<Vec<Document>, StoreError> {
        if field != Field::Tags {
            return Err(StoreError::UnsupportedField {
                field: field.name(),
                operation: "containment",
            });
        }

        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT d.id, d.data
            FROM documents d
            WHERE d.collection = ?1
              AND EXISTS (
                  SELECT 1 FROM document_tags t
                  WHERE t.collection = d.collection AND t.document_id = d.id AND t.tag = ?2
              )
            ORDER BY d.id
            LIMIT ?3
        "#,
        )
        .bind(collection)
        .bind(value)
        .bind(MAX_DOCUMENTS)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    /// Full contents of a collection, in id order
    pub async fn snapshot(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, data FROM documents WHERE collection = ? ORDER BY id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DocumentRow::into_document).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SortField;
    use serde_json::json;

    async fn test_store() -> SqliteStore {
        SqliteStore::open(":memory:").await.unwrap()
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    /// Seed documents given as (id, title, whitespace-separated tags)
    async fn seed(store: &SqliteStore, docs: &[(&str, &str, &str)]) {
        for (id, title, tags) in docs {
            let tags: Vec<&str> = tags.split_whitespace().collect();
            store
                .put_document("blogs", id, fields(json!({"title": title, "tags": tags})))
                .await
                .unwrap();
        }
    }

    fn ids(documents: &[Document]) -> Vec<&str> {
        documents.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_put_and_snapshot() {
        let store = test_store().await;
        seed(&store, &[("b", "Beta", "rust"), ("a", "Alpha", "")]).await;

        let snapshot = store.snapshot("blogs").await.unwrap();
        assert_eq!(ids(&snapshot), vec!["a", "b"]);
        assert_eq!(snapshot[1].get_str("title"), Some("Beta"));
        assert_eq!(store.count("blogs").await.unwrap(), 2);
        assert_eq!(store.count("drafts").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_rejects_missing_title() {
        let store = test_store().await;
        let result = store
            .put_document("blogs", "a", fields(json!({"tags": ["x"]})))
            .await;
        assert!(matches!(result, Err(StoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn test_put_rejects_non_string_tags() {
        let store = test_store().await;
        let result = store
            .put_document("blogs", "a", fields(json!({"title": "A", "tags": [1, 2]})))
            .await;
        assert!(matches!(result, Err(StoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn test_insert_assigns_unique_ids() {
        let store = test_store().await;
        let first = store
            .insert_document("blogs", fields(json!({"title": "One"})))
            .await
            .unwrap();
        let second = store
            .insert_document("blogs", fields(json!({"title": "Two"})))
            .await
            .unwrap();
        assert_eq!(first.len(), 20);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_put_replaces_tags() {
        let store = test_store().await;
        seed(&store, &[("a", "Alpha", "old")]).await;
        seed(&store, &[("a", "Alpha", "new")]).await;

        assert!(store
            .find_containing("blogs", Field::Tags, "old")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            ids(&store.find_containing("blogs", Field::Tags, "new").await.unwrap()),
            vec!["a"]
        );
    }

    #[tokio::test]
    async fn test_page_orders_by_title_then_id() {
        let store = test_store().await;
        seed(
            &store,
            &[
                ("3", "Charlie", ""),
                ("1", "Alpha", ""),
                ("4", "Bravo", ""),
                ("2", "Bravo", ""),
            ],
        )
        .await;

        let order = OrderBy::ascending(SortField::Title);
        let first = store.page("blogs", order, 2, None).await.unwrap();
        assert_eq!(ids(&first), vec!["1", "2"]);

        let cursor = Cursor::after(first.last().unwrap(), order).unwrap();
        let second = store.page("blogs", order, 2, Some(&cursor)).await.unwrap();
        assert_eq!(ids(&second), vec!["4", "3"]);

        let cursor = Cursor::after(second.last().unwrap(), order).unwrap();
        assert!(store
            .page("blogs", order, 2, Some(&cursor))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_page_descending() {
        let store = test_store().await;
        seed(&store, &[("1", "Alpha", ""), ("2", "Bravo", ""), ("3", "Charlie", "")]).await;

        let order = OrderBy::descending(SortField::Title);
        let first = store.page("blogs", order, 2, None).await.unwrap();
        assert_eq!(ids(&first), vec!["3", "2"]);

        let cursor = Cursor::after(first.last().unwrap(), order).unwrap();
        let rest = store.page("blogs", order, 2, Some(&cursor)).await.unwrap();
        assert_eq!(ids(&rest), vec!["1"]);
    }

    #[tokio::test]
    async fn test_page_rejects_cursor_from_other_ordering() {
        let store = test_store().await;
        seed(&store, &[("1", "Alpha", ""), ("2", "Bravo", "")]).await;

        let by_title = OrderBy::ascending(SortField::Title);
        let first = store.page("blogs", by_title, 1, None).await.unwrap();
        let cursor = Cursor::after(&first[0], by_title).unwrap();

        let result = store
            .page("blogs", OrderBy::ascending(SortField::Id), 1, Some(&cursor))
            .await;
        assert!(matches!(result, Err(StoreError::CursorMismatch)));
    }

    #[tokio::test]
    async fn test_find_equal_by_title_is_exact() {
        let store = test_store().await;
        seed(&store, &[("1", "Rust", ""), ("2", "Rust Programming", ""), ("3", "rust", "")]).await;

        let found = store.find_equal("blogs", Field::Title, "Rust").await.unwrap();
        assert_eq!(ids(&found), vec!["1"]);
    }

    #[tokio::test]
    async fn test_find_equal_by_category() {
        let store = test_store().await;
        store
            .put_document("blogs", "1", fields(json!({"title": "A", "category": "Tech"})))
            .await
            .unwrap();
        store
            .put_document("blogs", "2", fields(json!({"title": "B", "category": null})))
            .await
            .unwrap();

        let found = store.find_equal("blogs", Field::Category, "Tech").await.unwrap();
        assert_eq!(ids(&found), vec!["1"]);
    }

    #[tokio::test]
    async fn test_find_containing_returns_each_document_once() {
        let store = test_store().await;
        seed(
            &store,
            &[("1", "A", "rust rust"), ("2", "B", "go"), ("3", "C", "rust")],
        )
        .await;

        let found = store.find_containing("blogs", Field::Tags, "rust").await.unwrap();
        assert_eq!(ids(&found), vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_unsupported_field_combinations() {
        let store = test_store().await;
        assert!(matches!(
            store.find_equal("blogs", Field::Tags, "x").await,
            Err(StoreError::UnsupportedField { .. })
        ));
        assert!(matches!(
            store.find_containing("blogs", Field::Title, "x").await,
            Err(StoreError::UnsupportedField { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_document_and_tags() {
        let store = test_store().await;
        seed(&store, &[("1", "A", "rust")]).await;

        store.delete("blogs", "1").await.unwrap();
        assert_eq!(store.count("blogs").await.unwrap(), 0);
        assert!(store
            .find_containing("blogs", Field::Tags, "rust")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_not_found() {
        let store = test_store().await;
        let result = store.delete("blogs", "missing").await;
        assert!(matches!(result, Err(StoreError::NotFound(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = test_store().await;
        seed(&store, &[("1", "Shared", "t")]).await;
        store
            .put_document("drafts", "1", fields(json!({"title": "Shared", "tags": ["t"]})))
            .await
            .unwrap();

        store.delete("drafts", "1").await.unwrap();
        assert_eq!(store.count("blogs").await.unwrap(), 1);
        assert_eq!(
            ids(&store.find_containing("blogs", Field::Tags, "t").await.unwrap()),
            vec!["1"]
        );
    }

    #[tokio::test]
    async fn test_import_documents() {
        let store = test_store().await;
        let parsed = parse_import(
            r#"[
                {"id": "first", "title": "First", "tags": ["a"]},
                {"title": "Second", "category": "News"}
            ]"#,
        )
        .unwrap();

        let count = store.import_documents("blogs", parsed).await.unwrap();
        assert_eq!(count, 2);

        let snapshot = store.snapshot("blogs").await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|d| d.id == "first"));
        // The id key is not kept in the body
        assert!(snapshot.iter().all(|d| !d.fields.contains_key("id")));
    }

    #[test]
    fn test_parse_import_rejects_non_objects() {
        let result = parse_import(r#"[{"title": "ok"}, 42]"#);
        assert!(matches!(result, Err(StoreError::InvalidDocument(msg)) if msg.contains("entry 1")));
    }

    #[test]
    fn test_parse_import_rejects_non_array() {
        assert!(parse_import(r#"{"title": "x"}"#).is_err());
    }
}
