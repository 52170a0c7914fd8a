//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Single-flight lock (acquisitions, waits, timeouts)
//! - Resolution orchestrator (outcomes, provider polling)
//! - File selector (match / no-match)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Lock Metrics
// =============================================================================

/// Lock acquisitions by backend and role.
pub static LOCK_ACQUISITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "playback_lock_acquisitions_total",
            "Total withLock calls by backend and role",
        ),
        &["backend", "role"], // role: "owner", "waiter"
    )
    .unwrap()
});

/// Waiters that gave up before an outcome arrived.
pub static LOCK_TIMEOUTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("playback_lock_timeouts_total", "Total lock wait timeouts"),
        &["backend"],
    )
    .unwrap()
});

/// Time waiters spent waiting for the owner's outcome.
pub static LOCK_WAIT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "playback_lock_wait_seconds",
            "Duration waiters spent blocked on a lock",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]),
        &["backend"],
    )
    .unwrap()
});

// =============================================================================
// Resolution Metrics
// =============================================================================

/// Resolutions by result.
pub static RESOLUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("playback_resolutions_total", "Total playback resolutions"),
        &["result"], // "ready", "not_ready", "cached", "no_matching_file", "provider_error", "lock_error"
    )
    .unwrap()
});

/// Resolution duration in seconds (owner path only).
pub static RESOLUTION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "playback_resolution_duration_seconds",
            "Duration of provider-backed resolutions",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 30.0, 60.0, 120.0]),
        &["result"],
    )
    .unwrap()
});

/// Provider status polls while waiting for a cache-and-play download.
pub static PROVIDER_POLLS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "playback_provider_polls_total",
        "Total provider status polls during cache-and-play",
    )
    .unwrap()
});

// =============================================================================
// Selector Metrics
// =============================================================================

/// File selections by result.
pub static SELECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("playback_file_selections_total", "Total file selections"),
        &["result"], // "selected", "single_file", "no_candidates", "vetoed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Lock
        Box::new(LOCK_ACQUISITIONS.clone()),
        Box::new(LOCK_TIMEOUTS.clone()),
        Box::new(LOCK_WAIT_DURATION.clone()),
        // Resolution
        Box::new(RESOLUTIONS.clone()),
        Box::new(RESOLUTION_DURATION.clone()),
        Box::new(PROVIDER_POLLS.clone()),
        // Selector
        Box::new(SELECTIONS.clone()),
    ]
}
