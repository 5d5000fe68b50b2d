//! Prometheus metrics for bleepmeta.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, and provides [`observe`] to time and
//! count every metadata operation.  Without an installed recorder the
//! macros are no-ops, so library users and tests pay nothing.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::future::Future;
use std::sync::OnceLock;
use std::time::Instant;

use crate::errors::MetadataError;

// -- Metric name constants ----------------------------------------------------

/// Total metadata operations (counter). Labels: operation, status.
pub const OPERATIONS_TOTAL: &str = "bleepmeta_operations_total";

/// Metadata operation duration in seconds (histogram). Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "bleepmeta_operation_duration_seconds";

/// Total schema provisioning attempts (counter). Labels: status.
pub const SCHEMA_PROVISIONING_TOTAL: &str = "bleepmeta_schema_provisioning_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times. Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(OPERATIONS_TOTAL, "Total metadata operations by type");
    describe_histogram!(
        OPERATION_DURATION_SECONDS,
        "Metadata operation duration in seconds"
    );
    describe_counter!(
        SCHEMA_PROVISIONING_TOTAL,
        "Schema provisioning attempts by outcome"
    );
}

/// Render the Prometheus text exposition, if a recorder is installed.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// -- Instrumentation ------------------------------------------------------------

/// Run `fut`, recording its duration and outcome under `operation`.
pub async fn observe<T, F>(operation: &'static str, fut: F) -> Result<T, MetadataError>
where
    F: Future<Output = Result<T, MetadataError>>,
{
    let start = Instant::now();
    let result = fut.await;
    let status = if result.is_ok() { "ok" } else { "error" };
    counter!(OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
    histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(start.elapsed().as_secs_f64());
    result
}

/// Count one schema provisioning attempt.
pub fn record_provisioning(ok: bool) {
    let status = if ok { "ok" } else { "error" };
    counter!(SCHEMA_PROVISIONING_TOTAL, "status" => status).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_observe_passes_result_through() {
        let ok = observe("test_op", async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = observe("test_op", async {
            Err::<u32, _>(MetadataError::NoSuchBucket {
                bucket: "b".to_string(),
            })
        })
        .await;
        assert!(matches!(err, Err(MetadataError::NoSuchBucket { .. })));
    }

    #[test]
    fn test_render_without_recorder() {
        // Nothing installs a recorder in unit tests.
        if PROMETHEUS_HANDLE.get().is_none() {
            assert!(render_metrics().is_none());
        }
    }
}
