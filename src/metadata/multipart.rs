//! Multipart upload listing, delegated to an external upload tracker.
//!
//! This crate does not track in-progress uploads.  It resolves the bucket
//! and hands the request to a [`MultipartUploadLister`].

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use super::backend::{MetadataBackend, DEFAULT_MAX_KEYS};
use super::descriptor::Descriptor;
use super::listing::ListingResult;
use crate::errors::MetadataError;
use crate::metrics::observe;

/// Parameters of a ListMultipartUploads request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartListingRequest {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub key_marker: Option<String>,
    pub upload_id_marker: Option<String>,
    pub max_uploads: Option<u32>,
}

impl MultipartListingRequest {
    /// An empty, untruncated result echoing this request.
    ///
    /// `default_max_uploads` is echoed when the request sets no limit.
    pub fn empty_result(&self, default_max_uploads: u32) -> ListingResult {
        let echo = |v: &Option<String>| v.as_ref().filter(|s| !s.is_empty()).cloned();
        ListingResult {
            prefix: echo(&self.prefix),
            marker: echo(&self.key_marker),
            delimiter: echo(&self.delimiter),
            max_keys: self.max_uploads.unwrap_or(default_max_uploads),
            ..ListingResult::default()
        }
    }
}

/// Source of in-progress multipart uploads for a bucket.
pub trait MultipartUploadLister: Send + Sync + 'static {
    /// List uploads in `bucket`, whose descriptor is `bucket_descriptor`.
    fn list_uploads(
        &self,
        bucket: &str,
        bucket_descriptor: &Descriptor,
        request: &MultipartListingRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ListingResult, MetadataError>> + Send + '_>>;
}

/// A lister that never reports any uploads.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMultipartUploads;

impl MultipartUploadLister for NoMultipartUploads {
    fn list_uploads(
        &self,
        _bucket: &str,
        _bucket_descriptor: &Descriptor,
        request: &MultipartListingRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ListingResult, MetadataError>> + Send + '_>> {
        let result = request.empty_result(DEFAULT_MAX_KEYS);
        Box::pin(async move { Ok(result) })
    }
}

impl MetadataBackend {
    /// List in-progress multipart uploads through the configured lister.
    ///
    /// A bucket that cannot be resolved yields an empty listing rather than
    /// an error.  The lister always receives a request with `max_uploads`
    /// set, falling back to the backend's default MaxKeys.
    pub async fn list_multipart_uploads(
        &self,
        bucket: &str,
        request: &MultipartListingRequest,
    ) -> Result<ListingResult, MetadataError> {
        let request = MultipartListingRequest {
            max_uploads: Some(request.max_uploads.unwrap_or(self.default_max_keys)),
            ..request.clone()
        };
        observe("list_multipart_uploads", async {
            let descriptor = match self.get_bucket_descriptor(bucket).await {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!("Listing uploads for {}: bucket unavailable: {}", bucket, e);
                    return Ok(request.empty_result(self.default_max_keys));
                }
            };
            debug!("Delegating upload listing for {}", bucket);
            self.uploads.list_uploads(bucket, &descriptor, &request).await
        })
        .await
    }
}
