// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatcher metrics.
//!
//! Counters are updated with relaxed atomics from the background loop and
//! from caller threads; read them through [`DispatcherMetrics::snapshot`].
//!
//! # Example
//!
//! ```
//! use sockwatch::DispatcherMetrics;
//!
//! let metrics = DispatcherMetrics::new();
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.dispatches(), 0);
//! assert_eq!(snapshot.timeouts, 0);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics for one dispatcher instance.
#[derive(Debug)]
pub struct DispatcherMetrics {
    // Loop metrics
    /// Completed loop iterations
    iterations: AtomicU64,

    /// Readiness polls that failed
    poll_errors: AtomicU64,

    // Driver metrics
    /// Driver invocations triggered by the deferred queue
    deferred_dispatches: AtomicU64,

    /// Driver invocations triggered by socket readiness
    ready_dispatches: AtomicU64,

    /// Transactions finished by their deadline
    timeouts: AtomicU64,

    /// Completion callbacks delivered
    completions: AtomicU64,

    // Resource metrics
    /// Enqueue attempts rejected because the queue was full
    queue_full: AtomicU64,

    /// Registrations refused because the registry could not grow
    registry_growth_failures: AtomicU64,

    /// When metrics collection started
    start_time: Instant,
}

impl DispatcherMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            iterations: AtomicU64::new(0),
            poll_errors: AtomicU64::new(0),
            deferred_dispatches: AtomicU64::new(0),
            ready_dispatches: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            completions: AtomicU64::new(0),
            queue_full: AtomicU64::new(0),
            registry_growth_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub(crate) fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_poll_error(&self) {
        self.poll_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deferred_dispatch(&self) {
        self.deferred_dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ready_dispatch(&self) {
        self.ready_dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completion(&self) {
        self.completions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queue_full(&self) {
        self.queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_registry_growth_failure(&self) {
        self.registry_growth_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get completed loop iterations.
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Get uptime (time since metrics collection started).
    pub fn uptime(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Take a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
            deferred_dispatches: self.deferred_dispatches.load(Ordering::Relaxed),
            ready_dispatches: self.ready_dispatches.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            registry_growth_failures: self.registry_growth_failures.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

impl Default for DispatcherMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of dispatcher metrics.
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    /// Completed loop iterations
    pub iterations: u64,

    /// Failed readiness polls
    pub poll_errors: u64,

    /// Queue-triggered driver invocations
    pub deferred_dispatches: u64,

    /// Readiness-triggered driver invocations
    pub ready_dispatches: u64,

    /// Deadline expiries
    pub timeouts: u64,

    /// Completion callbacks delivered
    pub completions: u64,

    /// Rejected enqueues
    pub queue_full: u64,

    /// Refused registrations
    pub registry_growth_failures: u64,

    /// Uptime in seconds
    pub uptime_secs: f64,
}

impl MetricsSnapshot {
    /// Total driver invocations, queue and readiness combined.
    pub fn dispatches(&self) -> u64 {
        self.deferred_dispatches + self.ready_dispatches
    }
}
