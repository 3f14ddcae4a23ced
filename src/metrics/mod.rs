//! Prometheus metrics for sweeps, notifications and the HTTP API
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all sweep metrics
struct SweepMetrics {
    sweep_duration: HistogramVec,
    sweeps: CounterVec,
    sweep_running: Gauge,
    partition_outcomes: CounterVec,
    listings_seen: CounterVec,
    offer_changes: CounterVec,
    notifications: CounterVec,
}

/// Container for HTTP API metrics
struct ApiMetrics {
    requests: CounterVec,
    duration: HistogramVec,
}

static SWEEP_METRICS: OnceLock<SweepMetrics> = OnceLock::new();

static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Call once at startup. If registration fails the error is returned and
/// every recording function below silently does nothing.
///
/// ```ignore
/// if let Err(e) = rentwatch::metrics::init_metrics() {
///     tracing::warn!("Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let sweep = SweepMetrics {
        sweep_duration: register_histogram_vec!(
            "rentwatch_sweep_duration_seconds",
            "Wall time of a full sweep over all partitions",
            &["trigger"],
            vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0]
        )?,
        sweeps: register_counter_vec!(
            "rentwatch_sweeps_total",
            "Sweeps started, by trigger",
            &["trigger"]
        )?,
        sweep_running: register_gauge!(
            "rentwatch_sweep_running",
            "Whether a sweep is in progress (1 = yes, 0 = no)"
        )?,
        partition_outcomes: register_counter_vec!(
            "rentwatch_partition_outcomes_total",
            "Partition results per sweep",
            &["partition", "outcome"]
        )?,
        listings_seen: register_counter_vec!(
            "rentwatch_listings_seen_total",
            "Listings returned by the source feed",
            &["partition"]
        )?,
        offer_changes: register_counter_vec!(
            "rentwatch_offer_changes_total",
            "Reconciled changes by kind (new, changed, withdrawn)",
            &["partition", "kind"]
        )?,
        notifications: register_counter_vec!(
            "rentwatch_notifications_total",
            "Notification sends by result",
            &["result"]
        )?,
    };

    let api = ApiMetrics {
        requests: register_counter_vec!(
            "rentwatch_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        duration: register_histogram_vec!(
            "rentwatch_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
        )?,
    };

    SWEEP_METRICS
        .set(sweep)
        .map_err(|_| "Sweep metrics already initialized")?;
    API_METRICS
        .set(api)
        .map_err(|_| "API metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SWEEP_METRICS.get().is_some() && API_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Count a sweep start and time it until the guard drops
pub fn start_sweep_timer(trigger: &str) -> MetricsTimer {
    match SWEEP_METRICS.get() {
        Some(m) => {
            m.sweeps.with_label_values(&[trigger]).inc();
            MetricsTimer::new(m.sweep_duration.with_label_values(&[trigger]).start_timer())
        }
        None => MetricsTimer::noop(),
    }
}

pub fn set_sweep_running(running: bool) {
    if let Some(m) = SWEEP_METRICS.get() {
        m.sweep_running.set(if running { 1.0 } else { 0.0 });
    }
}

/// Record how a partition ended (`completed`, `fetch_failed`, ...)
pub fn record_partition_outcome(partition: &str, outcome: &str) {
    if let Some(m) = SWEEP_METRICS.get() {
        m.partition_outcomes
            .with_label_values(&[partition, outcome])
            .inc();
    }
}

/// Record the size of a snapshot and its reconciled changes
pub fn record_partition_changes(
    partition: &str,
    seen: usize,
    new: usize,
    changed: usize,
    withdrawn: usize,
) {
    let Some(m) = SWEEP_METRICS.get() else {
        return;
    };

    m.listings_seen
        .with_label_values(&[partition])
        .inc_by(seen as f64);

    for (kind, count) in [("new", new), ("changed", changed), ("withdrawn", withdrawn)] {
        if count > 0 {
            m.offer_changes
                .with_label_values(&[partition, kind])
                .inc_by(count as f64);
        }
    }
}

/// Record notification delivery results
pub fn record_notifications(sent: usize, failed: usize) {
    let Some(m) = SWEEP_METRICS.get() else {
        return;
    };

    if sent > 0 {
        m.notifications
            .with_label_values(&["sent"])
            .inc_by(sent as f64);
    }
    if failed > 0 {
        m.notifications
            .with_label_values(&["failed"])
            .inc_by(failed as f64);
    }
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = API_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

// ============================================================================
// Tests
// ============================================================================
