//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (submissions, active pipelines)
//! - Acquisition (snapshot fetches, targets latched, completions)
//! - Conversion telemetry (ticks, remote command latency, completions)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Orchestrator Metrics
// =============================================================================

/// Pipeline submissions by result.
pub static PIPELINES_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediaflow_pipelines_submitted_total",
            "Total pipeline submissions",
        ),
        &["result"], // "accepted", "rejected"
    )
    .unwrap()
});

/// Pipelines currently owned by the orchestrator.
pub static PIPELINES_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediaflow_pipelines_active",
        "Number of pipelines currently running",
    )
    .unwrap()
});

// =============================================================================
// Acquisition Metrics
// =============================================================================

/// Job snapshot fetches by result.
pub static SNAPSHOT_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediaflow_snapshot_fetches_total",
            "Total job snapshot fetches from the download engine",
        ),
        &["result"], // "success", "error"
    )
    .unwrap()
});

/// Targets latched by the acquisition state machine.
pub static TARGETS_ACQUIRED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediaflow_targets_acquired_total",
        "Total submissions matched to an engine job",
    )
    .unwrap()
});

/// Acquisition stages that reached completion.
pub static ACQUISITIONS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediaflow_acquisitions_completed_total",
        "Total acquisitions completed",
    )
    .unwrap()
});

// =============================================================================
// Conversion Telemetry Metrics
// =============================================================================

/// Telemetry ticks by result.
pub static TELEMETRY_TICKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediaflow_telemetry_ticks_total",
            "Total conversion telemetry polls",
        ),
        &["result"], // "sample", "unavailable", "error"
    )
    .unwrap()
});

/// Remote command duration in seconds.
pub static REMOTE_COMMAND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mediaflow_remote_command_duration_seconds",
            "Duration of remote shell commands",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["result"], // "success", "unavailable", "error"
    )
    .unwrap()
});

/// Conversion stages that reached completion.
pub static CONVERSIONS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediaflow_conversions_completed_total",
        "Total conversions observed to completion",
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Orchestrator
        Box::new(PIPELINES_SUBMITTED.clone()),
        Box::new(PIPELINES_ACTIVE.clone()),
        // Acquisition
        Box::new(SNAPSHOT_FETCHES.clone()),
        Box::new(TARGETS_ACQUIRED.clone()),
        Box::new(ACQUISITIONS_COMPLETED.clone()),
        // Conversion
        Box::new(TELEMETRY_TICKS.clone()),
        Box::new(REMOTE_COMMAND_DURATION.clone()),
        Box::new(CONVERSIONS_COMPLETED.clone()),
    ]
}
