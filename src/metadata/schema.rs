//! Table layout and one-shot schema provisioning.
//!
//! Bucket descriptors live in a table keyed by bucket name.  Object
//! descriptors live in a second table partitioned by bucket name and
//! sorted by object name, so a bucket's listing is a single range query.

use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::store::{KeyValueStore, StoreErrorKind, StoreResult, TableSchema};
use crate::metrics;

/// Partition key attribute shared by both tables.
pub const BUCKET_NAME_ATTRIBUTE: &str = "bucketName";

/// Sort key attribute of the objects table.
pub const OBJECT_NAME_ATTRIBUTE: &str = "objectName";

/// The two tables backing the metadata store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTables {
    pub buckets: TableSchema,
    pub objects: TableSchema,
}

impl MetadataTables {
    /// Tables named `{prefix}-buckets` and `{prefix}-objects`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            buckets: TableSchema::keyed(format!("{prefix}-buckets"), BUCKET_NAME_ATTRIBUTE),
            objects: TableSchema::composite(
                format!("{prefix}-objects"),
                BUCKET_NAME_ATTRIBUTE,
                OBJECT_NAME_ATTRIBUTE,
            ),
        }
    }

    fn all(&self) -> [&TableSchema; 2] {
        [&self.buckets, &self.objects]
    }
}

/// Records whether this process has already provisioned the tables.
///
/// The state moves from unprovisioned to provisioned once and never
/// back.  Concurrent first callers share one provisioning attempt; a
/// failed attempt leaves the state unprovisioned.
#[derive(Debug, Default)]
pub struct SchemaState {
    ready: OnceCell<()>,
}

impl SchemaState {
    pub fn new() -> Self {
        Self {
            ready: OnceCell::new(),
        }
    }

    pub fn is_provisioned(&self) -> bool {
        self.ready.initialized()
    }

    /// Create every table in `tables` unless this state already did so.
    pub async fn ensure(&self, store: &dyn KeyValueStore, tables: &MetadataTables) -> StoreResult<()> {
        self.ready
            .get_or_try_init(|| provision(store, tables))
            .await
            .map(|_| ())
    }
}

async fn provision(store: &dyn KeyValueStore, tables: &MetadataTables) -> StoreResult<()> {
    let result = create_tables(store, tables).await;
    metrics::record_provisioning(result.is_ok());
    result
}

async fn create_tables(store: &dyn KeyValueStore, tables: &MetadataTables) -> StoreResult<()> {
    for table in tables.all() {
        match store.create_table(table).await {
            Ok(()) => info!("Provisioned metadata table {}", table.name),
            Err(e) if e.kind() == StoreErrorKind::AlreadyExists => {
                debug!("Metadata table {} already exists", table.name)
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::memory::MemoryStore;
    use crate::metadata::store::{
        ItemKey, PutCondition, RangePage, RangeQuery, StoreError,
    };
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts `create_table` calls and can be told to fail them.
    struct CountingStore {
        inner: MemoryStore,
        creates: AtomicUsize,
        fail_with: Option<StoreErrorKind>,
    }

    impl CountingStore {
        fn new(fail_with: Option<StoreErrorKind>) -> Self {
            Self {
                inner: MemoryStore::new(),
                creates: AtomicUsize::new(0),
                fail_with,
            }
        }
    }

    impl KeyValueStore for CountingStore {
        fn create_table(
            &self,
            schema: &TableSchema,
        ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if let Some(kind) = self.fail_with {
                return Box::pin(async move { Err(StoreError::new(kind, "injected")) });
            }
            self.inner.create_table(schema)
        }

        fn get(
            &self,
            table: &TableSchema,
            key: ItemKey,
        ) -> Pin<Box<dyn Future<Output = StoreResult<Option<String>>> + Send + '_>> {
            self.inner.get(table, key)
        }

        fn contains(
            &self,
            table: &TableSchema,
            key: ItemKey,
        ) -> Pin<Box<dyn Future<Output = StoreResult<bool>> + Send + '_>> {
            self.inner.contains(table, key)
        }

        fn put(
            &self,
            table: &TableSchema,
            key: ItemKey,
            value: String,
            condition: PutCondition,
        ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
            self.inner.put(table, key, value, condition)
        }

        fn delete(
            &self,
            table: &TableSchema,
            key: ItemKey,
        ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
            self.inner.delete(table, key)
        }

        fn query(
            &self,
            table: &TableSchema,
            query: RangeQuery,
        ) -> Pin<Box<dyn Future<Output = StoreResult<RangePage>> + Send + '_>> {
            self.inner.query(table, query)
        }
    }

    #[test]
    fn test_table_names() {
        let tables = MetadataTables::with_prefix("meta");
        assert_eq!(tables.buckets.name, "meta-buckets");
        assert_eq!(tables.objects.name, "meta-objects");
        assert_eq!(tables.objects.partition_key, BUCKET_NAME_ATTRIBUTE);
        assert_eq!(tables.objects.sort_key.as_deref(), Some(OBJECT_NAME_ATTRIBUTE));
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent_and_cached() {
        let store = CountingStore::new(None);
        let tables = MetadataTables::with_prefix("t");
        let state = SchemaState::new();
        assert!(!state.is_provisioned());

        state.ensure(&store, &tables).await.unwrap();
        assert!(state.is_provisioned());
        assert_eq!(store.creates.load(Ordering::SeqCst), 2);

        state.ensure(&store, &tables).await.unwrap();
        assert_eq!(store.creates.load(Ordering::SeqCst), 2);
        assert_eq!(
            store.inner.table_names(),
            vec!["t-buckets".to_string(), "t-objects".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fresh_state_tolerates_existing_tables() {
        let store = CountingStore::new(None);
        let tables = MetadataTables::with_prefix("t");

        SchemaState::new().ensure(&store, &tables).await.unwrap();
        // A second process (fresh state) races into tables that already exist.
        SchemaState::new().ensure(&store, &tables).await.unwrap();
        assert_eq!(store.creates.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_already_exists_is_swallowed() {
        let store = CountingStore::new(Some(StoreErrorKind::AlreadyExists));
        let state = SchemaState::new();
        state
            .ensure(&store, &MetadataTables::with_prefix("t"))
            .await
            .unwrap();
        assert!(state.is_provisioned());
    }

    #[tokio::test]
    async fn test_other_failures_are_reported_and_retried() {
        let store = CountingStore::new(Some(StoreErrorKind::Other));
        let tables = MetadataTables::with_prefix("t");
        let state = SchemaState::new();

        let err = state.ensure(&store, &tables).await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Other);
        assert!(!state.is_provisioned());

        // Not cached: the next call tries again.
        state.ensure(&store, &tables).await.unwrap_err();
        assert_eq!(store.creates.load(Ordering::SeqCst), 2);
    }
}
