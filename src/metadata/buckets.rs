//! Bucket descriptor CRUD.

use tracing::debug;

use super::backend::MetadataBackend;
use super::descriptor::Descriptor;
use super::store::{ItemKey, PutCondition, StoreErrorKind};
use crate::config::CreateBucketPolicy;
use crate::errors::MetadataError;
use crate::metrics::observe;

impl MetadataBackend {
    /// Create a bucket record.
    ///
    /// With [`CreateBucketPolicy::Reject`] an existing bucket yields
    /// [`MetadataError::BucketAlreadyExists`]; with
    /// [`CreateBucketPolicy::Overwrite`] its descriptor is replaced.
    pub async fn create_bucket(
        &self,
        name: &str,
        descriptor: Descriptor,
    ) -> Result<(), MetadataError> {
        observe("create_bucket", async {
            self.ensure_schema().await?;
            let condition = match self.create_policy {
                CreateBucketPolicy::Reject => PutCondition::IfAbsent,
                CreateBucketPolicy::Overwrite => PutCondition::Always,
            };
            let result = self
                .store
                .put(
                    &self.tables.buckets,
                    ItemKey::partition(name),
                    descriptor.into_string(),
                    condition,
                )
                .await;
            match result {
                Ok(()) => {
                    debug!("Created bucket {}", name);
                    Ok(())
                }
                Err(e) if e.kind() == StoreErrorKind::ConditionFailed => {
                    Err(MetadataError::BucketAlreadyExists {
                        bucket: name.to_string(),
                    })
                }
                Err(e) => Err(MetadataError::store(format!("creating bucket {name}"), e)),
            }
        })
        .await
    }

    /// Fetch a bucket's descriptor with a strongly consistent read.
    pub async fn get_bucket_descriptor(&self, name: &str) -> Result<Descriptor, MetadataError> {
        observe("get_bucket", self.fetch_bucket_descriptor(name)).await
    }

    /// Replace a bucket's descriptor.  Does not check that the bucket exists.
    pub async fn update_bucket_descriptor(
        &self,
        name: &str,
        descriptor: Descriptor,
    ) -> Result<(), MetadataError> {
        observe("update_bucket", async {
            self.ensure_schema().await?;
            self.store
                .put(
                    &self.tables.buckets,
                    ItemKey::partition(name),
                    descriptor.into_string(),
                    PutCondition::Always,
                )
                .await
                .map_err(|e| MetadataError::store(format!("updating bucket {name}"), e))?;
            debug!("Updated bucket {}", name);
            Ok(())
        })
        .await
    }

    /// Delete a bucket record.  Objects under the bucket are left alone.
    pub async fn delete_bucket(&self, name: &str) -> Result<(), MetadataError> {
        observe("delete_bucket", async {
            self.require_bucket(name).await?;
            self.store
                .delete(&self.tables.buckets, ItemKey::partition(name))
                .await
                .map_err(|e| MetadataError::store(format!("deleting bucket {name}"), e))?;
            debug!("Deleted bucket {}", name);
            Ok(())
        })
        .await
    }

    /// Check whether a bucket record exists.
    pub async fn bucket_exists(&self, name: &str) -> Result<bool, MetadataError> {
        observe("bucket_exists", self.probe_bucket(name)).await
    }

    /// Fail with [`MetadataError::NoSuchBucket`] unless `name` exists.
    pub(crate) async fn require_bucket(&self, name: &str) -> Result<(), MetadataError> {
        if self.probe_bucket(name).await? {
            Ok(())
        } else {
            Err(MetadataError::NoSuchBucket {
                bucket: name.to_string(),
            })
        }
    }

    pub(crate) async fn fetch_bucket_descriptor(
        &self,
        name: &str,
    ) -> Result<Descriptor, MetadataError> {
        self.ensure_schema().await?;
        self.store
            .get(&self.tables.buckets, ItemKey::partition(name))
            .await
            .map_err(|e| MetadataError::store(format!("reading bucket {name}"), e))?
            .map(Descriptor::from)
            .ok_or_else(|| MetadataError::NoSuchBucket {
                bucket: name.to_string(),
            })
    }

    async fn probe_bucket(&self, name: &str) -> Result<bool, MetadataError> {
        self.ensure_schema().await?;
        self.store
            .contains(&self.tables.buckets, ItemKey::partition(name))
            .await
            .map_err(|e| MetadataError::store(format!("checking bucket {name}"), e))
    }
}
