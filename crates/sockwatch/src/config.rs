// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatcher configuration.
//!
//! # Example
//!
//! ```
//! use sockwatch::DispatcherConfig;
//! use std::time::Duration;
//!
//! let config = DispatcherConfig::default()
//!     .with_poll_timeout(Duration::from_millis(20))
//!     .with_queue_capacity(64);
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

/// Default bound on one readiness poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Default deferred queue size in slots (one slot stays reserved).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default number of entries the socket registry grows by.
pub const DEFAULT_REGISTRY_GROWTH: usize = 2;

/// Default timeout scheduled for a transaction when its socket is acquired.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_millis(310_000);

/// Dispatcher configuration.
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Upper bound on a single readiness poll.
    ///
    /// Also bounds the latency of queued work and the precision of
    /// transaction deadlines.
    pub poll_timeout: Duration,

    /// Deferred queue size in slots. Usable capacity is one less.
    pub queue_capacity: usize,

    /// Entries added to the socket registry each time it is full.
    pub registry_growth: usize,

    /// Schedule transaction timeouts on socket acquisition.
    pub deadlines_enabled: bool,

    /// Name of the background thread.
    pub thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            registry_growth: DEFAULT_REGISTRY_GROWTH,
            deadlines_enabled: true,
            thread_name: "sockwatch-dispatch".to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Builder: set poll timeout
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Builder: set deferred queue capacity (slots, including the reserved one)
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Builder: set registry growth step
    pub fn with_registry_growth(mut self, step: usize) -> Self {
        self.registry_growth = step;
        self
    }

    /// Builder: enable or disable transaction deadlines
    pub fn with_deadlines(mut self, enabled: bool) -> Self {
        self.deadlines_enabled = enabled;
        self
    }

    /// Builder: set background thread name
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Validate configuration, returning error message if invalid.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.poll_timeout.is_zero() {
            return Err("poll_timeout must be > 0");
        }
        if self.poll_timeout.as_millis() > i32::MAX as u128 {
            return Err("poll_timeout too large (> i32::MAX ms)");
        }
        if self.queue_capacity < 2 {
            return Err("queue_capacity must be >= 2 (one slot is reserved)");
        }
        if self.registry_growth == 0 {
            return Err("registry_growth must be > 0");
        }
        if self.thread_name.is_empty() {
            return Err("thread_name must not be empty");
        }
        Ok(())
    }
}
