//! bleepmeta: S3-style bucket and object metadata over a key-value store.
//!
//! Bucket and object descriptors live in two DynamoDB (or in-memory)
//! tables.  The [`metadata::MetadataBackend`] provides bucket and object
//! CRUD, S3 ListObjects-style listings, and delegated multipart upload
//! listings.  [`xml`] renders results and failures as S3 XML documents.

pub mod config;
pub mod errors;
pub mod metadata;
pub mod metrics;
pub mod xml;

pub use errors::MetadataError;
pub use metadata::MetadataBackend;
