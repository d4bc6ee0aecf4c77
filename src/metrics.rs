// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the hostNetwork NSG controller.
//!
//! All metrics carry the namespace prefix `hostnet_nsg_`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Outcome and duration of reconcile passes
//! - **Signal Metrics** - Pod changes that requested an NSG update
//! - **Rule Metrics** - Size of the managed and foreign rule sets
//! - **Error Metrics** - Failed Azure Resource Manager calls
//!
//! # Example
//!
//! ```rust,no_run
//! use hostnet_nsg::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success(std::time::Duration::from_secs(1));
//! ```

use crate::errors::NetworkError;
use prometheus::{
    CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "hostnet_nsg";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconcile passes by status
///
/// Labels:
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of NSG reconcile passes by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconcile passes in seconds, including the wait for the NSG write
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of NSG reconcile passes in seconds",
    )
    .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Signal Metrics
// ============================================================================

/// Total number of update signals by reason
///
/// Labels:
/// - `reason`: Pod change that caused the signal (`added`, `updated`, `deleted`)
pub static SIGNALS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_signals_total"),
        "Total number of NSG update signals by reason",
    );
    let counter = CounterVec::new(opts, &["reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of target pods left out of a pass
///
/// Labels:
/// - `reason`: Why no rule was produced (`no_host_ip`, `no_ports`)
pub static PODS_SKIPPED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_pods_skipped_total"),
        "Total number of target pods skipped during rule synthesis by reason",
    );
    let counter = CounterVec::new(opts, &["reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Rule Metrics
// ============================================================================

/// Number of rules in the NSG after the last successful merge
///
/// Labels:
/// - `owner`: `controller` for managed rules, `foreign` for everything else
pub static RULES: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_rules"),
        "Number of NSG rules after the last merge by owner",
    );
    let gauge = GaugeVec::new(opts, &["owner"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of failed Azure Resource Manager calls
///
/// Labels:
/// - `operation`: `resolve`, `get` or `put`
/// - `kind`: `transient` or `permanent`
pub static REMOTE_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_remote_errors_total"),
        "Total number of failed Azure Resource Manager calls by operation and kind",
    );
    let counter = CounterVec::new(opts, &["operation", "kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Register every metric so that `/metrics` lists them before first use.
pub fn init() {
    LazyLock::force(&RECONCILIATION_TOTAL);
    LazyLock::force(&RECONCILIATION_DURATION_SECONDS);
    LazyLock::force(&SIGNALS_TOTAL);
    LazyLock::force(&PODS_SKIPPED_TOTAL);
    LazyLock::force(&RULES);
    LazyLock::force(&REMOTE_ERRORS_TOTAL);
}

/// Record a successful reconcile pass
pub fn record_reconciliation_success(duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&["success"]).inc();
    RECONCILIATION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a failed reconcile pass
pub fn record_reconciliation_error(duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&["error"]).inc();
    RECONCILIATION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record an update signal
pub fn record_signal(reason: &str) {
    SIGNALS_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a target pod that produced no rule
pub fn record_pod_skipped(reason: &str) {
    PODS_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
}

/// Record the rule set sizes of the last merge
///
/// # Arguments
/// * `foreign` - Rules kept untouched
/// * `owned` - Rules synthesized by this controller
#[allow(clippy::cast_precision_loss)]
pub fn set_rule_counts(foreign: usize, owned: usize) {
    RULES.with_label_values(&["foreign"]).set(foreign as f64);
    RULES.with_label_values(&["controller"]).set(owned as f64);
}

/// Record a failed Azure Resource Manager call
///
/// # Arguments
/// * `operation` - Call that failed (`resolve`, `get`, `put`)
/// * `error` - The failure, classified as transient or permanent
pub fn record_remote_error(operation: &str, error: &NetworkError) {
    REMOTE_ERRORS_TOTAL
        .with_label_values(&[operation, error.kind()])
        .inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
