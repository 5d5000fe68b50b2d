//! Metadata storage layer.
//!
//! Bucket and object descriptors are kept in two tables of a
//! [`store::KeyValueStore`]: one keyed by bucket name, one partitioned by
//! bucket name and sorted by object name.  [`MetadataBackend`] provides
//! CRUD over both and rebuilds S3-style listings from object ranges.

pub mod backend;
pub mod buckets;
pub mod descriptor;
pub mod dynamodb;
pub mod listing;
pub mod memory;
pub mod multipart;
pub mod objects;
pub mod schema;
pub mod store;

use std::sync::Arc;

use tracing::info;

pub use backend::{MetadataBackend, DEFAULT_MAX_KEYS};
pub use descriptor::{Descriptor, ObjectSummary};
pub use listing::{ListingEntry, ListingRequest, ListingResult};
pub use multipart::{MultipartListingRequest, MultipartUploadLister, NoMultipartUploads};
pub use schema::MetadataTables;

use crate::config::Config;

/// Build a [`MetadataBackend`] for the engine named in `config`.
///
/// Tables are not touched here; they are provisioned on first use.
pub async fn open(config: &Config) -> anyhow::Result<MetadataBackend> {
    let tables = MetadataTables::with_prefix(&config.metadata.dynamodb.table_prefix);

    let store: Arc<dyn store::KeyValueStore> = match config.metadata.engine.as_str() {
        "dynamodb" => {
            let store = dynamodb::DynamoDbStore::new(&config.metadata.dynamodb).await;
            info!(
                "DynamoDB metadata store initialized: region={:?} endpoint={:?} tables={}/{}",
                config.metadata.dynamodb.region,
                config.metadata.dynamodb.endpoint_url,
                tables.buckets.name,
                tables.objects.name
            );
            Arc::new(store)
        }
        "memory" => {
            info!("In-memory metadata store initialized");
            Arc::new(memory::MemoryStore::new())
        }
        other => anyhow::bail!("unknown metadata engine '{other}' (expected dynamodb or memory)"),
    };

    Ok(MetadataBackend::new(store, tables)
        .with_create_policy(config.metadata.create_bucket)
        .with_default_max_keys(config.listing.default_max_keys)
        .with_page_size(config.listing.page_size))
}
