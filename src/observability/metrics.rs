//! # Metrics Collection
//!
//! Prometheus counters for the hand-off protocol and the renewal loops.
//! Recording is always safe: without an installed exporter the `metrics`
//! macros are no-ops.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::{Error, Result};

pub const TOKEN_REQUESTS_TOTAL: &str = "courier_token_requests_total";
pub const ENVELOPE_DELIVERIES_TOTAL: &str = "courier_envelope_deliveries_total";
pub const UNWRAPS_TOTAL: &str = "courier_unwraps_total";
pub const CERTIFICATE_ROTATIONS_TOTAL: &str = "courier_certificate_rotations_total";
pub const LEASE_RENEWALS_TOTAL: &str = "courier_lease_renewals_total";

/// Metrics recorder for courier processes
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record the status a credential request was answered with
    pub fn record_token_request(&self, status: u16) {
        let labels = [("status", status.to_string())];
        counter!(TOKEN_REQUESTS_TOTAL, &labels).increment(1);
    }

    /// Record the outcome of pushing an envelope to a workload
    pub fn record_envelope_delivery(&self, success: bool) {
        let labels = [("outcome", outcome(success).to_string())];
        counter!(ENVELOPE_DELIVERIES_TOTAL, &labels).increment(1);
    }

    /// Record the status an agent answered a delivery with
    pub fn record_unwrap(&self, status: u16) {
        let labels = [("status", status.to_string())];
        counter!(UNWRAPS_TOTAL, &labels).increment(1);
    }

    pub fn record_certificate_rotation(&self, common_name: &str, success: bool) {
        let labels =
            [("common_name", common_name.to_string()), ("outcome", outcome(success).to_string())];
        counter!(CERTIFICATE_ROTATIONS_TOTAL, &labels).increment(1);
    }

    pub fn record_lease_renewal(&self, success: bool) {
        let labels = [("outcome", outcome(success).to_string())];
        counter!(LEASE_RENEWALS_TOTAL, &labels).increment(1);
    }

    fn register(&self) {
        describe_counter!(TOKEN_REQUESTS_TOTAL, Unit::Count, "Credential requests by response status");
        describe_counter!(
            ENVELOPE_DELIVERIES_TOTAL,
            Unit::Count,
            "Wrapped credential pushes to workloads by outcome"
        );
        describe_counter!(UNWRAPS_TOTAL, Unit::Count, "Envelope deliveries received by response status");
        describe_counter!(
            CERTIFICATE_ROTATIONS_TOTAL,
            Unit::Count,
            "Certificate re-issuance attempts by outcome"
        );
        describe_counter!(LEASE_RENEWALS_TOTAL, Unit::Count, "Lease renewal attempts by outcome");
    }
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Install the Prometheus exporter on `addr`, tagging every series with the
/// process role.
pub fn init_metrics(addr: SocketAddr, role: &str) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("role", role)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register();

    info!(metrics_addr = %addr, role, "Metrics collection initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_delivery_failures_are_counted() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let metrics = MetricsRecorder::new();
            metrics.record_envelope_delivery(false);
            metrics.record_envelope_delivery(false);
            metrics.record_envelope_delivery(true);
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"courier_envelope_deliveries_total{outcome="failure"} 2"#));
        assert!(rendered.contains(r#"courier_envelope_deliveries_total{outcome="success"} 1"#));
    }

    #[test]
    fn test_recording_without_exporter_is_noop() {
        let metrics = MetricsRecorder::new();
        metrics.record_token_request(202);
        metrics.record_lease_renewal(true);
    }
}
