//! Object descriptor CRUD, scoped to an existing bucket.

use tracing::debug;

use super::backend::MetadataBackend;
use super::descriptor::Descriptor;
use super::store::{ItemKey, PutCondition};
use crate::errors::MetadataError;
use crate::metrics::observe;

impl MetadataBackend {
    /// Store an object's descriptor, replacing any previous one.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        descriptor: Descriptor,
    ) -> Result<(), MetadataError> {
        observe("put_object", async {
            self.require_bucket(bucket).await?;
            self.store
                .put(
                    &self.tables.objects,
                    ItemKey::composite(bucket, key),
                    descriptor.into_string(),
                    PutCondition::Always,
                )
                .await
                .map_err(|e| MetadataError::store(format!("putting object {bucket}/{key}"), e))?;
            debug!("Put object {}/{}", bucket, key);
            Ok(())
        })
        .await
    }

    /// Fetch an object's descriptor with a strongly consistent read.
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Descriptor, MetadataError> {
        observe("get_object", async {
            self.require_bucket(bucket).await?;
            self.store
                .get(&self.tables.objects, ItemKey::composite(bucket, key))
                .await
                .map_err(|e| MetadataError::store(format!("reading object {bucket}/{key}"), e))?
                .map(Descriptor::from)
                .ok_or_else(|| MetadataError::NoSuchKey {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        })
        .await
    }

    /// Fetch a bucket's descriptor together with one object's descriptor.
    ///
    /// A missing bucket is [`MetadataError::NoSuchBucket`]; a missing object
    /// is not an error and comes back as `None`.
    pub async fn get_bucket_and_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(Descriptor, Option<Descriptor>), MetadataError> {
        observe("get_bucket_and_object", async {
            let bucket_descriptor = self.fetch_bucket_descriptor(bucket).await?;
            let object = self
                .store
                .get(&self.tables.objects, ItemKey::composite(bucket, key))
                .await
                .map_err(|e| MetadataError::store(format!("reading object {bucket}/{key}"), e))?
                .map(Descriptor::from);
            Ok((bucket_descriptor, object))
        })
        .await
    }

    /// Remove an object's descriptor.  Removing a missing object succeeds.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), MetadataError> {
        observe("delete_object", async {
            self.require_bucket(bucket).await?;
            self.store
                .delete(&self.tables.objects, ItemKey::composite(bucket, key))
                .await
                .map_err(|e| MetadataError::store(format!("deleting object {bucket}/{key}"), e))?;
            debug!("Deleted object {}/{}", bucket, key);
            Ok(())
        })
        .await
    }
}
