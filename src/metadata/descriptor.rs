//! Opaque bucket and object descriptors.
//!
//! The backend stores descriptors as serialized strings and never
//! interprets them, with one exception: the listing engine hides objects
//! whose descriptor is a JSON object carrying `"isDeleteMarker": true`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A serialized metadata blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor(String);

#[derive(Deserialize)]
struct DeleteMarkerFlag {
    #[serde(rename = "isDeleteMarker", default)]
    is_delete_marker: bool,
}

/// Listing-relevant fields an object descriptor may carry.
///
/// Every field is optional; descriptors written by other producers simply
/// leave them out.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectSummary {
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub size: Option<u64>,
    pub storage_class: Option<String>,
}

impl Descriptor {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Serialize `value` as JSON into a descriptor.
    pub fn from_value<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_string(value).map(Self)
    }

    /// Parse the descriptor as JSON into `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether this descriptor marks its key as logically deleted.
    ///
    /// Anything that is not a JSON object with a boolean
    /// `isDeleteMarker` member counts as a live descriptor.
    pub fn is_delete_marker(&self) -> bool {
        self.parse::<DeleteMarkerFlag>()
            .map(|flag| flag.is_delete_marker)
            .unwrap_or(false)
    }

    /// Extract the fields rendered in listing `<Contents>` entries.
    pub fn summary(&self) -> ObjectSummary {
        self.parse().unwrap_or_default()
    }
}

impl From<String> for Descriptor {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for Descriptor {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}
