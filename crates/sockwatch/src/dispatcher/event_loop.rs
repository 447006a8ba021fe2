// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Body of the dispatcher thread.
//!
//! Each iteration runs three steps in order:
//!
//! 1. Deferred: pop at most one live queue entry and drive it. Only the
//!    queue lock is taken, and it is released before the driver runs.
//! 2. Readiness: under the registry/timer lock, poll every registered socket
//!    for at most `poll_timeout`, then drive each transaction reported ready.
//! 3. Deadlines: still under that lock, advance the deadline list by the
//!    wall-clock time since the previous iteration and time out what expired.
//!
//! With nothing registered and nothing queued the thread sleeps on the wake
//! notifier instead of spinning.

use std::cell::RefCell;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::ReentrantMutexGuard;

use super::{Shared, Watch};
use crate::transaction::{Context, Driver, Step, TxnRef};

type WatchGuard<'a, D> = ReentrantMutexGuard<'a, RefCell<Watch<D>>>;

impl<D: Driver> Shared<D> {
    /// Run the loop until `running` is cleared.
    pub(super) fn run(self: Arc<Self>) {
        log::info!(
            "[sockwatch] dispatcher started (poll_timeout={:?}, queue_capacity={}, deadlines={})",
            self.config.poll_timeout,
            self.config.queue_capacity,
            self.config.deadlines_enabled
        );

        let mut prev = Instant::now();
        while self.running.load(Ordering::Acquire) {
            let deferred = self.run_deferred();

            let guard = self.watch.lock();
            let blocked = self.poll_ready(&guard);
            self.expire_deadlines(&guard, &mut prev);
            drop(guard);

            self.metrics.record_iteration();

            if !deferred && !blocked {
                self.wake.wait_timeout(self.config.poll_timeout);
            }
        }

        log::info!(
            "[sockwatch] dispatcher stopped after {} iterations",
            self.metrics.iterations()
        );
    }

    /// Step 1. Returns false when the queue held no live entry.
    fn run_deferred(&self) -> bool {
        let popped = self.queue.lock().pop();
        let Some(txn) = popped else {
            return false;
        };

        self.metrics.record_deferred_dispatch();
        self.drive(&txn);
        true
    }

    /// Step 2. Returns true when the thread actually blocked in poll.
    fn poll_ready(&self, guard: &WatchGuard<'_, D>) -> bool {
        let ready = {
            let mut watch = guard.borrow_mut();
            if watch.registry.is_empty() {
                return false;
            }
            match watch.registry.poll(self.config.poll_timeout) {
                Ok(0) => return true,
                Ok(_) => watch.registry.ready(),
                Err(e) => {
                    self.metrics.record_poll_error();
                    log::warn!(
                        "[sockwatch] poll over {} sockets failed: {}",
                        watch.registry.len(),
                        e
                    );
                    return false;
                }
            }
        };

        // The snapshot goes stale as drivers run: any of them may drop its
        // own socket (or another's), so membership is re-checked each time.
        for txn in &ready {
            if !guard.borrow().registry.contains(txn.id()) {
                continue;
            }
            self.metrics.record_ready_dispatch();
            self.drive(txn);
        }
        true
    }

    /// Step 3.
    fn expire_deadlines(&self, guard: &WatchGuard<'_, D>, prev: &mut Instant) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(*prev);
        *prev = now;

        if !self.config.deadlines_enabled {
            return;
        }
        let expired = {
            let mut watch = guard.borrow_mut();
            if watch.deadlines.is_empty() {
                return;
            }
            watch.deadlines.advance(elapsed)
        };

        for txn in &expired {
            log::debug!("[sockwatch] {} deadline expired", txn.id());
            self.metrics.record_timeout();
            let outcome = {
                let mut driver = txn.lock();
                let mut cx = Context::new(self, txn);
                driver.timed_out(&mut cx)
            };
            self.deliver(txn, outcome);
        }
    }

    /// Run one driver step for `txn`, then apply the interest policy to the
    /// phase it left behind and report a final outcome.
    ///
    /// No `RefCell` borrow may be live here: the driver re-enters the
    /// registry/timer lock through its context.
    fn drive(&self, txn: &TxnRef<D>) {
        let (step, phase) = {
            let mut driver = txn.lock();
            let mut cx = Context::new(self, txn);
            let step = driver.advance(&mut cx);
            (step, driver.phase())
        };

        // Phase only changes on this thread, so reading it under the monitor
        // and applying it just after is equivalent.
        let guard = self.watch.lock();
        let interest = guard.borrow_mut().registry.refresh_interest(txn.id(), phase);
        drop(guard);
        if let Some(interest) = interest {
            log::trace!("[sockwatch] {} in {:?}, watching {:?}", txn.id(), phase, interest);
        }

        if let Step::Finished(outcome) = step {
            self.deliver(txn, outcome);
        }
    }

    fn deliver(&self, txn: &TxnRef<D>, outcome: D::Outcome) {
        log::debug!("[sockwatch] {} finished: {:?}", txn.id(), outcome);
        self.metrics.record_completion();
        txn.complete(outcome);
    }
}
