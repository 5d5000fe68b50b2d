//! Abstract key-value store contract.
//!
//! The metadata backend never talks to a database directly.  Every read
//! and write goes through [`KeyValueStore`], a narrow contract over
//! partitioned, range-queryable tables.  The trait uses manually
//! desugared async methods (pinned boxed futures) so it can sit behind
//! `Arc<dyn KeyValueStore>` for both DynamoDB and the in-memory store.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

/// Classification of a store failure.
///
/// Callers branch on the kind, never on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The table (or other resource) being created already exists.
    AlreadyExists,
    /// The table being addressed does not exist.
    ResourceNotFound,
    /// A conditional write was rejected.
    ConditionFailed,
    /// Any other failure.
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreErrorKind::AlreadyExists => "resource already exists",
            StoreErrorKind::ResourceNotFound => "resource not found",
            StoreErrorKind::ConditionFailed => "condition failed",
            StoreErrorKind::Other => "store error",
        };
        f.write_str(s)
    }
}

/// An error reported by a [`KeyValueStore`].
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct StoreError {
    kind: StoreErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl StoreError {
    /// Create an error without an underlying cause.
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_source<E>(kind: StoreErrorKind, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Shorthand for an [`StoreErrorKind::Other`] error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Other, message)
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ── Table and key types ─────────────────────────────────────────────

/// Name and key layout of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name as known to the store.
    pub name: String,
    /// Attribute holding the partition (hash) key.
    pub partition_key: String,
    /// Attribute holding the sort (range) key, for composite tables.
    pub sort_key: Option<String>,
}

impl TableSchema {
    /// A table keyed by partition key alone.
    pub fn keyed(name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    /// A table keyed by (partition key, sort key).
    pub fn composite(
        name: impl Into<String>,
        partition_key: impl Into<String>,
        sort_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            sort_key: Some(sort_key.into()),
        }
    }
}

/// Primary key of a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemKey {
    pub partition: String,
    pub sort: Option<String>,
}

impl ItemKey {
    pub fn partition(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
        }
    }

    pub fn composite(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }
}

/// Write precondition for [`KeyValueStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// Replace whatever is stored under the key.
    Always,
    /// Fail with [`StoreErrorKind::ConditionFailed`] if the key is present.
    IfAbsent,
}

/// An ordered range query over a single partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    /// Partition to scan.
    pub partition: String,
    /// Resume strictly after this sort key.
    pub exclusive_start: Option<String>,
    /// Only return sort keys beginning with this string.
    pub sort_prefix: Option<String>,
    /// Maximum number of items evaluated in one page.
    pub limit: Option<u32>,
}

impl RangeQuery {
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            exclusive_start: None,
            sort_prefix: None,
            limit: None,
        }
    }
}

/// One item returned by a range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeItem {
    pub sort_key: String,
    pub value: String,
}

/// One page of a range query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangePage {
    pub items: Vec<RangeItem>,
    /// Sort key to resume from, if the store stopped before the end.
    pub last_evaluated: Option<String>,
}

// ── Trait ───────────────────────────────────────────────────────────

/// Async key-value store contract.
///
/// All reads are strongly consistent.  Values are opaque strings.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Create a table.  Fails with [`StoreErrorKind::AlreadyExists`] if it
    /// is already there.
    fn create_table(
        &self,
        schema: &TableSchema,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>>;

    /// Read the value stored under `key`.
    fn get(
        &self,
        table: &TableSchema,
        key: ItemKey,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Option<String>>> + Send + '_>>;

    /// Check whether `key` is present without fetching its value.
    fn contains(
        &self,
        table: &TableSchema,
        key: ItemKey,
    ) -> Pin<Box<dyn Future<Output = StoreResult<bool>> + Send + '_>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(
        &self,
        table: &TableSchema,
        key: ItemKey,
        value: String,
        condition: PutCondition,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>>;

    /// Remove `key`.  Removing a missing key succeeds.
    fn delete(
        &self,
        table: &TableSchema,
        key: ItemKey,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>>;

    /// Fetch one page of a partition in ascending sort-key order.
    fn query(
        &self,
        table: &TableSchema,
        query: RangeQuery,
    ) -> Pin<Box<dyn Future<Output = StoreResult<RangePage>> + Send + '_>>;

    /// Whether [`query`](Self::query) pages arrive sorted by sort key.
    ///
    /// When this returns `false`, callers collect every page and sort
    /// before relying on key order.
    fn orders_range_results(&self) -> bool {
        true
    }
}
