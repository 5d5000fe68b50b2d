//! Configuration loading and types for bleepmeta.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every field has a default, so an empty section (or
//! a missing one) falls back to a local DynamoDB-backed setup.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Metadata backend settings.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Listing engine settings.
    #[serde(default)]
    pub listing: ListingConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// What `create_bucket` does when the bucket already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateBucketPolicy {
    /// Fail with `BucketAlreadyExists`.
    #[default]
    Reject,
    /// Replace the existing descriptor.
    Overwrite,
}

/// Metadata backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Backend type: `dynamodb` or `memory`.
    #[serde(default = "default_metadata_engine")]
    pub engine: String,

    /// Conflict policy for bucket creation.
    #[serde(default)]
    pub create_bucket: CreateBucketPolicy,

    /// DynamoDB-specific configuration.
    #[serde(default)]
    pub dynamodb: DynamoDbConfig,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            engine: default_metadata_engine(),
            create_bucket: CreateBucketPolicy::default(),
            dynamodb: DynamoDbConfig::default(),
        }
    }
}

/// DynamoDB connection and table settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DynamoDbConfig {
    /// AWS region (falls back to the environment/profile chain).
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint (e.g. DynamoDB Local, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Tables are named `{table_prefix}-buckets` and `{table_prefix}-objects`.
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// How long to wait for a newly created table to become ACTIVE.
    #[serde(default = "default_table_ready_timeout")]
    pub table_ready_timeout_secs: u64,
}

impl Default for DynamoDbConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_url: None,
            table_prefix: default_table_prefix(),
            table_ready_timeout_secs: default_table_ready_timeout(),
        }
    }
}

/// Listing engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    /// MaxKeys applied when a request does not set one.
    #[serde(default = "default_max_keys")]
    pub default_max_keys: u32,

    /// Optional item limit per range query page.
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_max_keys: default_max_keys(),
            page_size: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Install the Prometheus recorder.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_metadata_engine() -> String {
    "dynamodb".to_string()
}

fn default_table_prefix() -> String {
    "bleepmeta".to_string()
}

fn default_table_ready_timeout() -> u64 {
    60
}

fn default_max_keys() -> u32 {
    crate::metadata::DEFAULT_MAX_KEYS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
