// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Idle wake-up for the dispatcher loop.
//!
//! With no socket registered the loop has nothing to block on in `poll`,
//! yet queued work and newly acquired sockets must still be picked up
//! promptly. The loop sleeps here for at most `poll_timeout`; `enqueue`,
//! `requeue`, `socket_acquired` and `shutdown` cut the sleep short.
//!
//! A notification that arrives while the loop is busy is remembered in
//! `pending`, so the next wait returns at once.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct WakeNotifier {
    pending: AtomicBool,
    sleeping: Mutex<bool>,
    condvar: Condvar,
}

impl WakeNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Flag pending work and wake the loop if it sleeps.
    pub(crate) fn notify(&self) {
        self.pending.store(true, Ordering::Release);

        // `sleeping` is only true inside `wait_for`, which releases the lock.
        if *self.sleeping.lock() {
            self.condvar.notify_one();
        }
    }

    /// Sleep until notified or `timeout` elapses. Returns true if notified.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.pending.swap(false, Ordering::Acquire) {
            return true;
        }

        let mut sleeping = self.sleeping.lock();
        if self.pending.swap(false, Ordering::Acquire) {
            return true;
        }

        *sleeping = true;
        let result = self.condvar.wait_for(&mut sleeping, timeout);
        *sleeping = false;

        self.pending.swap(false, Ordering::Acquire) || !result.timed_out()
    }
}
