//! S3-style object listings rebuilt from a bucket's object range.
//!
//! Object names come back from the store in ascending byte order.  The
//! walk filters them by marker and prefix, hides delete markers, rolls keys
//! that share a prefix-up-to-delimiter into common prefixes, and stops once
//! `max_keys` entries have been emitted.

use tracing::debug;

use super::backend::MetadataBackend;
use super::descriptor::Descriptor;
use super::store::{RangeItem, RangeQuery};
use crate::errors::MetadataError;
use crate::metrics::observe;

/// Parameters of a ListObjects (v1) request.
///
/// Empty strings are treated the same as unset values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingRequest {
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    /// Falls back to the backend's default when unset.
    pub max_keys: Option<u32>,
}

impl ListingRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn with_max_keys(mut self, max_keys: u32) -> Self {
        self.max_keys = Some(max_keys);
        self
    }
}

/// One object returned in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub key: String,
    pub descriptor: Descriptor,
}

/// The outcome of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingResult {
    pub contents: Vec<ListingEntry>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    /// Last entry emitted before truncation; pass it back as `marker`.
    pub next_marker: Option<String>,
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    pub max_keys: u32,
}

impl ListingResult {
    /// An empty, untruncated result echoing the request parameters.
    pub fn empty(request: &ListingRequest, max_keys: u32) -> Self {
        Self {
            prefix: non_empty(&request.prefix),
            marker: non_empty(&request.marker),
            delimiter: non_empty(&request.delimiter),
            max_keys,
            ..Self::default()
        }
    }

    /// Number of emitted entries, contents and common prefixes together.
    pub fn entry_count(&self) -> usize {
        self.contents.len() + self.common_prefixes.len()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Build the range query for a listing, or `None` when no key can match.
fn plan_range(bucket: &str, prefix: &str, marker: Option<&str>) -> Option<RangeQuery> {
    let mut query = RangeQuery::new(bucket);
    if !prefix.is_empty() {
        query.sort_prefix = Some(prefix.to_string());
    }
    match marker {
        Some(marker) if prefix.is_empty() || marker.starts_with(prefix) => {
            query.exclusive_start = Some(marker.to_string());
        }
        // Every key under the prefix sorts after the marker.
        Some(marker) if marker < prefix => {}
        // The marker is past every key under the prefix.
        Some(_) => return None,
        None => {}
    }
    Some(query)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Stop,
}

/// Incremental listing state fed one key at a time in ascending order.
struct ListingWalk {
    prefix: String,
    marker: Option<String>,
    delimiter: Option<String>,
    /// The marker names a common prefix returned on an earlier page.
    skip_under_marker: bool,
    max_keys: usize,
    last_emitted: Option<String>,
    result: ListingResult,
}

impl ListingWalk {
    fn new(request: &ListingRequest, max_keys: u32) -> Self {
        let result = ListingResult::empty(request, max_keys);
        let prefix = result.prefix.clone().unwrap_or_default();
        let marker = result.marker.clone();
        let delimiter = result.delimiter.clone();
        let skip_under_marker = match (&marker, &delimiter) {
            (Some(marker), Some(delimiter)) => {
                marker.len() > prefix.len()
                    && marker.starts_with(prefix.as_str())
                    && marker.ends_with(delimiter.as_str())
            }
            _ => false,
        };
        Self {
            prefix,
            marker,
            delimiter,
            skip_under_marker,
            max_keys: max_keys as usize,
            last_emitted: None,
            result,
        }
    }

    /// The key's prefix up to and including the first delimiter after the
    /// listing prefix.
    fn common_prefix_of(&self, key: &str) -> Option<String> {
        let delimiter = self.delimiter.as_deref()?;
        let rest = key.get(self.prefix.len()..)?;
        let index = rest.find(delimiter)?;
        Some(key[..self.prefix.len() + index + delimiter.len()].to_string())
    }

    fn visit(&mut self, key: String, descriptor: Descriptor) -> Step {
        if let Some(marker) = &self.marker {
            if key.as_str() <= marker.as_str() {
                return Step::Continue;
            }
            if self.skip_under_marker && key.starts_with(marker.as_str()) {
                return Step::Continue;
            }
        }
        if !key.starts_with(self.prefix.as_str()) || descriptor.is_delete_marker() {
            return Step::Continue;
        }

        let common_prefix = self.common_prefix_of(&key);
        if let Some(cp) = &common_prefix {
            // Keys sharing a common prefix are adjacent in sorted order. A
            // rolled-up key skips the MaxKeys check so the prefix is never
            // repeated on the next page.
            if self.result.common_prefixes.last() == Some(cp) {
                return Step::Continue;
            }
        }

        if self.result.entry_count() >= self.max_keys {
            self.result.is_truncated = true;
            self.result.next_marker = self.last_emitted.take();
            return Step::Stop;
        }

        match common_prefix {
            Some(cp) => {
                self.last_emitted = Some(cp.clone());
                self.result.common_prefixes.push(cp);
            }
            None => {
                self.last_emitted = Some(key.clone());
                self.result.contents.push(ListingEntry { key, descriptor });
            }
        }
        Step::Continue
    }

    fn visit_item(&mut self, item: RangeItem) -> Step {
        self.visit(item.sort_key, Descriptor::from(item.value))
    }

    fn finish(self) -> ListingResult {
        self.result
    }
}

impl MetadataBackend {
    /// List a bucket's objects the way S3 ListObjects (v1) does.
    pub async fn list_objects(
        &self,
        bucket: &str,
        request: &ListingRequest,
    ) -> Result<ListingResult, MetadataError> {
        observe("list_objects", async {
            self.require_bucket(bucket).await?;

            let max_keys = request.max_keys.unwrap_or(self.default_max_keys);
            let mut walk = ListingWalk::new(request, max_keys);
            let Some(mut query) = plan_range(bucket, &walk.prefix, walk.marker.as_deref()) else {
                debug!("Listing {} skipped: marker is past the prefix", bucket);
                return Ok(walk.finish());
            };
            query.limit = self.page_size;

            let ordered = self.store.orders_range_results();
            let mut collected: Vec<RangeItem> = Vec::new();
            let mut pages = 0u32;
            loop {
                let page = self
                    .store
                    .query(&self.tables.objects, query.clone())
                    .await
                    .map_err(|e| MetadataError::store(format!("listing bucket {bucket}"), e))?;
                pages += 1;

                if ordered {
                    for item in page.items {
                        if walk.visit_item(item) == Step::Stop {
                            debug!("Listing {} truncated after {} page(s)", bucket, pages);
                            return Ok(walk.finish());
                        }
                    }
                } else {
                    collected.extend(page.items);
                }

                match page.last_evaluated {
                    Some(last) => query.exclusive_start = Some(last),
                    None => break,
                }
            }

            if !ordered {
                collected.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
                for item in collected {
                    if walk.visit_item(item) == Step::Stop {
                        break;
                    }
                }
            }

            debug!("Listed {} in {} page(s)", bucket, pages);
            Ok(walk.finish())
        })
        .await
    }
}
