//! Metadata error types.
//!
//! Absence is normalized to [`MetadataError::NoSuchBucket`] or
//! [`MetadataError::NoSuchKey`] where it is detected.  Every other store
//! failure is passed through as [`MetadataError::Store`] with the bucket
//! or object it concerned.

use thiserror::Error;

use crate::metadata::store::StoreError;

/// Errors returned by [`MetadataBackend`](crate::metadata::MetadataBackend)
/// operations.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist")]
    NoSuchBucket { bucket: String },

    /// The specified key does not exist.
    #[error("The specified key does not exist.")]
    NoSuchKey { bucket: String, key: String },

    /// A bucket with the requested name already exists.
    #[error("The requested bucket name is not available. The bucket namespace is shared by all users of the system. Please select a different name and try again.")]
    BucketAlreadyExists { bucket: String },

    /// The backing store failed.
    #[error("metadata store failure ({context}): {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },
}

impl MetadataError {
    pub(crate) fn store(context: impl Into<String>, source: StoreError) -> Self {
        MetadataError::Store {
            context: context.into(),
            source,
        }
    }

    /// Return the S3 error code string.
    pub fn code(&self) -> &'static str {
        match self {
            MetadataError::NoSuchBucket { .. } => "NoSuchBucket",
            MetadataError::NoSuchKey { .. } => "NoSuchKey",
            MetadataError::BucketAlreadyExists { .. } => "BucketAlreadyExists",
            MetadataError::Store { .. } => "InternalError",
        }
    }

    /// Return the S3 resource path the error refers to.
    pub fn resource(&self) -> String {
        match self {
            MetadataError::NoSuchBucket { bucket }
            | MetadataError::BucketAlreadyExists { bucket } => format!("/{bucket}"),
            MetadataError::NoSuchKey { bucket, key } => format!("/{bucket}/{key}"),
            MetadataError::Store { .. } => String::new(),
        }
    }
}
