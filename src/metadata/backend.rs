//! The metadata backend: bucket store, object store, and listings over a
//! [`KeyValueStore`].
//!
//! Operations are split by concern across `buckets`, `objects`,
//! `listing` and `multipart`; this module holds the shared state.

use std::sync::Arc;

use super::multipart::{MultipartUploadLister, NoMultipartUploads};
use super::schema::{MetadataTables, SchemaState};
use super::store::KeyValueStore;
use crate::config::CreateBucketPolicy;
use crate::errors::MetadataError;

/// MaxKeys applied to listings that do not set one.
pub const DEFAULT_MAX_KEYS: u32 = 1000;

/// Bucket and object metadata over a key-value store.
///
/// Every operation provisions the tables on first use (once per backend
/// instance) and, except bucket creation, checks that the bucket exists
/// before touching object records.
pub struct MetadataBackend {
    pub(super) store: Arc<dyn KeyValueStore>,
    pub(super) tables: MetadataTables,
    pub(super) create_policy: CreateBucketPolicy,
    pub(super) default_max_keys: u32,
    pub(super) page_size: Option<u32>,
    pub(super) uploads: Arc<dyn MultipartUploadLister>,
    schema: SchemaState,
}

impl MetadataBackend {
    pub fn new(store: Arc<dyn KeyValueStore>, tables: MetadataTables) -> Self {
        Self {
            store,
            tables,
            create_policy: CreateBucketPolicy::default(),
            default_max_keys: DEFAULT_MAX_KEYS,
            page_size: None,
            uploads: Arc::new(NoMultipartUploads),
            schema: SchemaState::new(),
        }
    }

    pub fn with_create_policy(mut self, policy: CreateBucketPolicy) -> Self {
        self.create_policy = policy;
        self
    }

    pub fn with_default_max_keys(mut self, max_keys: u32) -> Self {
        self.default_max_keys = max_keys;
        self
    }

    /// Limit each range query page to `page_size` items (0 means no limit).
    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size.filter(|n| *n > 0);
        self
    }

    pub fn with_upload_lister(mut self, lister: Arc<dyn MultipartUploadLister>) -> Self {
        self.uploads = lister;
        self
    }

    pub fn tables(&self) -> &MetadataTables {
        &self.tables
    }

    /// Create the backing tables unless this backend already did.
    pub async fn ensure_schema(&self) -> Result<(), MetadataError> {
        self.schema
            .ensure(self.store.as_ref(), &self.tables)
            .await
            .map_err(|e| MetadataError::store("provisioning metadata tables", e))
    }

    pub fn schema_provisioned(&self) -> bool {
        self.schema.is_provisioned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::listing::ListingRequest;
    use crate::metadata::memory::MemoryStore;
    use crate::metadata::store::{
        ItemKey, PutCondition, RangePage, RangeQuery, StoreError, StoreErrorKind, StoreResult,
        TableSchema,
    };
    use std::collections::HashSet;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Fails the named operations with [`StoreErrorKind::Other`].
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        failing: Mutex<HashSet<&'static str>>,
    }

    impl FailingStore {
        fn fail(&self, operation: &'static str) {
            self.failing.lock().unwrap().insert(operation);
        }

        fn injected<T: Send + 'static>(
            &self,
            operation: &'static str,
        ) -> Option<Pin<Box<dyn Future<Output = StoreResult<T>> + Send + '_>>> {
            if self.failing.lock().unwrap().contains(operation) {
                Some(Box::pin(async move {
                    Err(StoreError::other(format!("{operation} unavailable")))
                }))
            } else {
                None
            }
        }
    }

    impl KeyValueStore for FailingStore {
        fn create_table(
            &self,
            schema: &TableSchema,
        ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
            self.inner.create_table(schema)
        }

        fn get(
            &self,
            table: &TableSchema,
            key: ItemKey,
        ) -> Pin<Box<dyn Future<Output = StoreResult<Option<String>>> + Send + '_>> {
            self.injected("get")
                .unwrap_or_else(|| self.inner.get(table, key))
        }

        fn contains(
            &self,
            table: &TableSchema,
            key: ItemKey,
        ) -> Pin<Box<dyn Future<Output = StoreResult<bool>> + Send + '_>> {
            self.injected("contains")
                .unwrap_or_else(|| self.inner.contains(table, key))
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
            self.injected("query")
                .unwrap_or_else(|| self.inner.query(table, query))
        }
    }

    async fn backend_over(store: Arc<FailingStore>) -> MetadataBackend {
        let backend = MetadataBackend::new(store, MetadataTables::with_prefix("test"));
        backend.create_bucket("photos", "{}".into()).await.unwrap();
        backend.put_object("photos", "cat.jpg", "{}".into()).await.unwrap();
        backend
    }

    fn assert_store_failure(err: MetadataError, expected_context: &str) {
        match err {
            MetadataError::Store { context, source } => {
                assert!(
                    context.contains(expected_context),
                    "context {context:?} should mention {expected_context:?}"
                );
                assert_eq!(source.kind(), StoreErrorKind::Other);
            }
            other => panic!("expected a store failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_query_failure_surfaces_from_list_objects() {
        let store = Arc::new(FailingStore::default());
        let backend = backend_over(store.clone()).await;
        store.fail("query");

        let err = backend
            .list_objects("photos", &ListingRequest::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "InternalError");
        assert_store_failure(err, "photos");
    }

    #[tokio::test]
    async fn test_get_failure_is_not_reported_as_missing_key() {
        let store = Arc::new(FailingStore::default());
        let backend = backend_over(store.clone()).await;
        store.fail("get");

        let err = backend.get_object("photos", "cat.jpg").await.unwrap_err();
        assert_store_failure(err, "photos/cat.jpg");

        let err = backend.get_bucket_descriptor("photos").await.unwrap_err();
        assert_store_failure(err, "photos");
    }

    #[tokio::test]
    async fn test_existence_check_failure_is_not_reported_as_missing_bucket() {
        let store = Arc::new(FailingStore::default());
        let backend = backend_over(store.clone()).await;
        store.fail("contains");

        let err = backend.delete_bucket("photos").await.unwrap_err();
        assert_store_failure(err, "photos");

        let err = backend.get_object("photos", "cat.jpg").await.unwrap_err();
        assert_store_failure(err, "photos");
    }
}
