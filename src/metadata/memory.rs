//! In-memory key-value store.
//!
//! Stores all tables in memory with no persistence. Useful for testing
//! and ephemeral deployments. Uses `RwLock<HashMap>` of ordered maps so
//! range queries come back sorted, like DynamoDB's sort-key order.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::ops::Bound;
use std::pin::Pin;
use std::sync::RwLock;

use super::store::{
    ItemKey, KeyValueStore, PutCondition, RangeItem, RangePage, RangeQuery, StoreError,
    StoreErrorKind, StoreResult, TableSchema,
};

/// Partition key plus sort key (empty for partition-only tables).
type RowKey = (String, String);

#[derive(Debug)]
struct Table {
    schema: TableSchema,
    rows: BTreeMap<RowKey, String>,
}

impl Table {
    fn row_key(&self, key: ItemKey) -> StoreResult<RowKey> {
        match (&self.schema.sort_key, key.sort) {
            (Some(_), Some(sort)) => Ok((key.partition, sort)),
            (None, None) => Ok((key.partition, String::new())),
            _ => Err(StoreError::other(format!(
                "key does not match the key schema of table {}",
                self.schema.name
            ))),
        }
    }
}

pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    /// Upper bound on items per query page, to exercise pagination.
    page_size: Option<u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            page_size: None,
        }
    }

    /// Cap every query page at `page_size` items.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Names of the tables created so far, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let tables = self.tables.read().expect("rwlock poisoned");
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_table(name: &str) -> StoreError {
    StoreError::new(
        StoreErrorKind::ResourceNotFound,
        format!("table {name} does not exist"),
    )
}

impl KeyValueStore for MemoryStore {
    fn create_table(
        &self,
        schema: &TableSchema,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
        let schema = schema.clone();
        Box::pin(async move {
            let mut tables = self.tables.write().expect("rwlock poisoned");
            if tables.contains_key(&schema.name) {
                return Err(StoreError::new(
                    StoreErrorKind::AlreadyExists,
                    format!("table {} already exists", schema.name),
                ));
            }
            tables.insert(
                schema.name.clone(),
                Table {
                    schema,
                    rows: BTreeMap::new(),
                },
            );
            Ok(())
        })
    }

    fn get(
        &self,
        table: &TableSchema,
        key: ItemKey,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Option<String>>> + Send + '_>> {
        let name = table.name.clone();
        Box::pin(async move {
            let tables = self.tables.read().expect("rwlock poisoned");
            let table = tables.get(&name).ok_or_else(|| missing_table(&name))?;
            let row = table.row_key(key)?;
            Ok(table.rows.get(&row).cloned())
        })
    }

    fn contains(
        &self,
        table: &TableSchema,
        key: ItemKey,
    ) -> Pin<Box<dyn Future<Output = StoreResult<bool>> + Send + '_>> {
        let name = table.name.clone();
        Box::pin(async move {
            let tables = self.tables.read().expect("rwlock poisoned");
            let table = tables.get(&name).ok_or_else(|| missing_table(&name))?;
            let row = table.row_key(key)?;
            Ok(table.rows.contains_key(&row))
        })
    }

    fn put(
        &self,
        table: &TableSchema,
        key: ItemKey,
        value: String,
        condition: PutCondition,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
        let name = table.name.clone();
        Box::pin(async move {
            let mut tables = self.tables.write().expect("rwlock poisoned");
            let table = tables.get_mut(&name).ok_or_else(|| missing_table(&name))?;
            let row = table.row_key(key)?;
            if condition == PutCondition::IfAbsent && table.rows.contains_key(&row) {
                return Err(StoreError::new(
                    StoreErrorKind::ConditionFailed,
                    format!("item already present in table {name}"),
                ));
            }
            table.rows.insert(row, value);
            Ok(())
        })
    }

    fn delete(
        &self,
        table: &TableSchema,
        key: ItemKey,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
        let name = table.name.clone();
        Box::pin(async move {
            let mut tables = self.tables.write().expect("rwlock poisoned");
            let table = tables.get_mut(&name).ok_or_else(|| missing_table(&name))?;
            let row = table.row_key(key)?;
            table.rows.remove(&row);
            Ok(())
        })
    }

    fn query(
        &self,
        table: &TableSchema,
        query: RangeQuery,
    ) -> Pin<Box<dyn Future<Output = StoreResult<RangePage>> + Send + '_>> {
        let name = table.name.clone();
        Box::pin(async move {
            let tables = self.tables.read().expect("rwlock poisoned");
            let table = tables.get(&name).ok_or_else(|| missing_table(&name))?;
            if table.schema.sort_key.is_none() {
                return Err(StoreError::other(format!(
                    "table {name} has no sort key and cannot be range-queried"
                )));
            }

            let lower = match &query.exclusive_start {
                Some(start) => Bound::Excluded((query.partition.clone(), start.clone())),
                None => Bound::Included((query.partition.clone(), String::new())),
            };
            let limit = match (query.limit, self.page_size) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
            .map(|n| n.max(1) as usize);

            let mut matching = table
                .rows
                .range((lower, Bound::Unbounded))
                .take_while(|((partition, _), _)| *partition == query.partition)
                .filter(|((_, sort), _)| {
                    query
                        .sort_prefix
                        .as_deref()
                        .map_or(true, |prefix| sort.starts_with(prefix))
                })
                .map(|((_, sort), value)| RangeItem {
                    sort_key: sort.clone(),
                    value: value.clone(),
                })
                .peekable();

            let mut page = RangePage::default();
            while let Some(item) = matching.next() {
                page.items.push(item);
                if limit.is_some_and(|l| page.items.len() >= l) {
                    if matching.peek().is_some() {
                        page.last_evaluated = page.items.last().map(|i| i.sort_key.clone());
                    }
                    break;
                }
            }
            Ok(page)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects_table() -> TableSchema {
        TableSchema::composite("objects", "bucketName", "objectName")
    }

    async fn seeded_store(page_size: Option<u32>) -> MemoryStore {
        let store = match page_size {
            Some(n) => MemoryStore::new().with_page_size(n),
            None => MemoryStore::new(),
        };
        store.create_table(&objects_table()).await.unwrap();
        for (bucket, key) in [("b1", "a/1"), ("b1", "a/2"), ("b1", "b/1"), ("b2", "a/9")] {
            store
                .put(
                    &objects_table(),
                    ItemKey::composite(bucket, key),
                    format!("v-{key}"),
                    PutCondition::Always,
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_create_table_twice_reports_already_exists() {
        let store = MemoryStore::new();
        store.create_table(&objects_table()).await.unwrap();
        let err = store.create_table(&objects_table()).await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::AlreadyExists);
        assert_eq!(store.table_names(), vec!["objects".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_table_reports_resource_not_found() {
        let store = MemoryStore::new();
        let err = store
            .get(&objects_table(), ItemKey::composite("b", "k"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::ResourceNotFound);
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = seeded_store(None).await;
        let table = objects_table();
        let got = store.get(&table, ItemKey::composite("b1", "a/1")).await.unwrap();
        assert_eq!(got.as_deref(), Some("v-a/1"));

        store.delete(&table, ItemKey::composite("b1", "a/1")).await.unwrap();
        assert!(!store.contains(&table, ItemKey::composite("b1", "a/1")).await.unwrap());

        // Deleting a missing key is fine.
        store.delete(&table, ItemKey::composite("b1", "a/1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_put_if_absent() {
        let store = MemoryStore::new();
        let table = TableSchema::keyed("buckets", "bucketName");
        store.create_table(&table).await.unwrap();
        store
            .put(&table, ItemKey::partition("b"), "1".into(), PutCondition::IfAbsent)
            .await
            .unwrap();
        let err = store
            .put(&table, ItemKey::partition("b"), "2".into(), PutCondition::IfAbsent)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::ConditionFailed);
        let got = store.get(&table, ItemKey::partition("b")).await.unwrap();
        assert_eq!(got.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_key_shape_must_match_schema() {
        let store = seeded_store(None).await;
        let err = store
            .get(&objects_table(), ItemKey::partition("b1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Other);
    }

    #[tokio::test]
    async fn test_query_is_scoped_and_ordered() {
        let store = seeded_store(None).await;
        let page = store
            .query(&objects_table(), RangeQuery::new("b1"))
            .await
            .unwrap();
        let keys: Vec<_> = page.items.iter().map(|i| i.sort_key.as_str()).collect();
        assert_eq!(keys, vec!["a/1", "a/2", "b/1"]);
        assert!(page.last_evaluated.is_none());
    }

    #[tokio::test]
    async fn test_query_exclusive_start_and_prefix() {
        let store = seeded_store(None).await;
        let mut query = RangeQuery::new("b1");
        query.exclusive_start = Some("a/1".to_string());
        query.sort_prefix = Some("a/".to_string());
        let page = store.query(&objects_table(), query).await.unwrap();
        let keys: Vec<_> = page.items.iter().map(|i| i.sort_key.as_str()).collect();
        assert_eq!(keys, vec!["a/2"]);
    }

    #[tokio::test]
    async fn test_query_pages() {
        let store = seeded_store(Some(2)).await;
        let page = store
            .query(&objects_table(), RangeQuery::new("b1"))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.last_evaluated.as_deref(), Some("a/2"));

        let mut next = RangeQuery::new("b1");
        next.exclusive_start = page.last_evaluated;
        let page = store.query(&objects_table(), next).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].sort_key, "b/1");
        assert!(page.last_evaluated.is_none());
    }
}
