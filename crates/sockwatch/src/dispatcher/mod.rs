// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The dispatcher: one background thread driving every transaction.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                        Dispatcher                            |
//! |                                                              |
//! |  caller threads                      background thread       |
//! |  --------------                      -----------------       |
//! |  socket_acquired --+                 1. pop one deferred     |
//! |  socket_lost ------+--> [registry    |    txn, run driver    |
//! |  socket_changed ---+     + deadlines]  2. poll registry      |
//! |                          (reentrant)  |    (<= poll_timeout) |
//! |                                       |    run driver on     |
//! |  enqueue ----------+--> [deferred     |    ready txns        |
//! |  requeue ----------+     queue]       3. advance deadlines,  |
//! |                          (mutex)           time out expired  |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Locking
//!
//! - The registry/timer lock is a `parking_lot::ReentrantMutex`. The loop
//!   holds it across steps 2-3, driver calls included, and a driver running
//!   there may re-enter it through its [`Context`](crate::Context).
//!   The `RefCell` inside is only borrowed for short, non-nested sections, so
//!   no borrow is ever live while a driver or callback runs.
//! - The deferred queue lock is independent and never held while a driver
//!   runs. When both are needed the registry/timer lock comes first.
//!
//! # Example
//!
//! ```no_run
//! use sockwatch::{Context, Dispatcher, DispatcherConfig, Driver, Phase, Step, Transaction};
//!
//! struct Ping;
//!
//! impl Driver for Ping {
//!     type Outcome = &'static str;
//!
//!     fn phase(&self) -> Phase {
//!         Phase::Idle
//!     }
//!
//!     fn advance(&mut self, _cx: &mut Context<'_, Self>) -> Step<Self::Outcome> {
//!         Step::Finished("pong")
//!     }
//!
//!     fn timed_out(&mut self, _cx: &mut Context<'_, Self>) -> Self::Outcome {
//!         "timeout"
//!     }
//! }
//!
//! let dispatcher = Dispatcher::<Ping>::initialize(DispatcherConfig::default())?;
//! let txn = Transaction::new(Ping);
//! txn.on_complete(|txn, outcome| println!("{} -> {}", txn.id(), outcome));
//! dispatcher.enqueue(&txn)?;
//! # Ok::<(), sockwatch::Error>(())
//! ```

mod event_loop;
mod wake;

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, ReentrantMutex};

use crate::config::DispatcherConfig;
use crate::deadline::DeadlineList;
use crate::error::{Error, Result};
use crate::metrics::DispatcherMetrics;
use crate::platform::NativeSocket;
use crate::queue::{DeferredQueue, Queued};
use crate::registry::SocketRegistry;
use crate::transaction::{Driver, TxnRef};

use wake::WakeNotifier;

/// Everything guarded by the registry/timer lock.
pub(crate) struct Watch<D: Driver> {
    pub(crate) registry: SocketRegistry<TxnRef<D>>,
    pub(crate) deadlines: DeadlineList<TxnRef<D>>,
}

/// State shared between the dispatcher handle and its thread.
pub(crate) struct Shared<D: Driver> {
    config: DispatcherConfig,
    watch: ReentrantMutex<RefCell<Watch<D>>>,
    queue: Mutex<DeferredQueue<TxnRef<D>>>,
    running: AtomicBool,
    stopped: AtomicBool,
    wake: WakeNotifier,
    metrics: DispatcherMetrics,
}

impl<D: Driver> Shared<D> {
    pub(crate) fn socket_acquired(&self, txn: &TxnRef<D>, socket: NativeSocket) -> Result<()> {
        let guard = self.watch.lock();
        let mut watch = guard.borrow_mut();

        let registered = watch.registry.register(Arc::clone(txn), socket);
        // A transaction that could not be registered still times out.
        if self.config.deadlines_enabled {
            watch.deadlines.add(Arc::clone(txn), txn.timeout());
        }
        drop(watch);
        drop(guard);

        match registered {
            Ok(added) => {
                if added {
                    log::debug!("[sockwatch] {} watching {}", txn.id(), socket);
                    self.wake.notify();
                }
                Ok(())
            }
            Err(e) => {
                self.metrics.record_registry_growth_failure();
                log::warn!(
                    "[sockwatch] {} not polled on {}: {}",
                    txn.id(),
                    socket,
                    e
                );
                Err(e)
            }
        }
    }

    pub(crate) fn socket_lost(&self, txn: &TxnRef<D>, socket: NativeSocket) {
        let guard = self.watch.lock();
        let mut watch = guard.borrow_mut();

        let deregistered = watch.registry.deregister(txn, socket);
        let unscheduled = watch.deadlines.remove(txn.id());
        let dequeued = self.queue.lock().remove(txn.id());

        log::debug!(
            "[sockwatch] {} lost {} (registry={}, deadline={}, queue={})",
            txn.id(),
            socket,
            deregistered,
            unscheduled,
            dequeued
        );
    }

    pub(crate) fn socket_changed(&self, txn: &TxnRef<D>, socket: NativeSocket) {
        let guard = self.watch.lock();
        let updated = guard.borrow_mut().registry.update(txn, socket);
        if updated {
            log::debug!("[sockwatch] {} now on {}", txn.id(), socket);
        }
    }

    pub(crate) fn enqueue(&self, txn: &TxnRef<D>) -> Result<Queued> {
        self.push(txn, |queue, txn| queue.enqueue(txn).map(|()| Queued::Added))
    }

    pub(crate) fn requeue(&self, txn: &TxnRef<D>) -> Result<Queued> {
        self.push(txn, DeferredQueue::requeue)
    }

    fn push<F>(&self, txn: &TxnRef<D>, op: F) -> Result<Queued>
    where
        F: FnOnce(&mut DeferredQueue<TxnRef<D>>, TxnRef<D>) -> Result<Queued>,
    {
        if self.stopped.load(Ordering::Acquire) {
            return Err(Error::Stopped);
        }
        let result = {
            let mut queue = self.queue.lock();
            op(&mut *queue, Arc::clone(txn))
        };
        match &result {
            Ok(Queued::Added) => self.wake.notify(),
            Ok(Queued::AlreadyPending) => {}
            Err(e) => {
                self.metrics.record_queue_full();
                log::debug!("[sockwatch] {} not queued: {}", txn.id(), e);
            }
        }
        result
    }
}

/// Background dispatcher for a family of transactions driven by `D`.
///
/// Construct one per client and share it by reference (or `Arc`) with every
/// entry point. Dropping it shuts the thread down.
pub struct Dispatcher<D: Driver> {
    shared: Arc<Shared<D>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<D: Driver> Dispatcher<D> {
    /// Validate `config` and allocate the deferred queue. The background
    /// thread is not started yet.
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|msg| Error::InvalidConfig(msg.to_string()))?;

        let queue = DeferredQueue::new(config.queue_capacity)?;
        let watch = Watch {
            registry: SocketRegistry::new(config.registry_growth),
            deadlines: DeadlineList::new(),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                watch: ReentrantMutex::new(RefCell::new(watch)),
                queue: Mutex::new(queue),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                wake: WakeNotifier::new(),
                metrics: DispatcherMetrics::new(),
            }),
            thread: Mutex::new(None),
        })
    }

    /// Create and start a dispatcher in one step.
    pub fn initialize(config: DispatcherConfig) -> Result<Self> {
        let dispatcher = Self::new(config)?;
        dispatcher.start()?;
        Ok(dispatcher)
    }

    /// Spawn the background thread. Calling it again while running is a
    /// no-op; a dispatcher that was shut down cannot be restarted.
    pub fn start(&self) -> Result<()> {
        let mut thread_slot = self.thread.lock();
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(Error::Stopped);
        }
        if thread_slot.is_some() {
            return Ok(());
        }

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.shared.config.thread_name.clone())
            .spawn(move || shared.run());

        match spawned {
            Ok(handle) => {
                *thread_slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(Error::ThreadSpawn(e))
            }
        }
    }

    /// Stop the background thread and wait for it to exit.
    ///
    /// Idempotent. Called from the dispatcher thread itself (for instance
    /// from a completion callback) it only asks the loop to stop. Pending
    /// queue entries are discarded; registered transactions are left as
    /// they are.
    pub fn shutdown(&self) -> Result<()> {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.running.store(false, Ordering::Release);
        self.shared.wake.notify();

        let handle = {
            let mut thread_slot = self.thread.lock();
            let on_own_thread = thread_slot
                .as_ref()
                .is_some_and(|h| h.thread().id() == thread::current().id());
            if on_own_thread {
                None
            } else {
                thread_slot.take()
            }
        };
        let joined = match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Io(std::io::Error::other("dispatcher thread panicked"))),
            None => Ok(()),
        };

        let discarded = {
            let mut queue = self.shared.queue.lock();
            std::iter::from_fn(|| queue.pop()).count()
        };
        if discarded > 0 {
            log::debug!("[sockwatch] discarded {} queued transactions on shutdown", discarded);
        }
        joined
    }

    /// True while the background thread is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// `txn` connected `socket`: watch it (initially for writability) and,
    /// with deadlines enabled, schedule its timeout.
    ///
    /// An invalid socket is not registered. If the registry cannot grow the
    /// error is returned, but the timeout is still scheduled so the
    /// transaction cannot hang forever.
    pub fn socket_acquired(&self, txn: &TxnRef<D>, socket: NativeSocket) -> Result<()> {
        self.shared.socket_acquired(txn, socket)
    }

    /// `txn` lost its socket: remove it from the registry, the deadline list
    /// and the deferred queue in one step. Entries are found by transaction,
    /// so a `socket` that went stale after `socket_changed` still clears
    /// everything. Absent entries are ignored.
    pub fn socket_lost(&self, txn: &TxnRef<D>, socket: NativeSocket) {
        self.shared.socket_lost(txn, socket);
    }

    /// `txn` replaced its socket; keep its poll position and interest.
    /// Refused when `socket` is already registered to another transaction.
    pub fn socket_changed(&self, txn: &TxnRef<D>, socket: NativeSocket) {
        self.shared.socket_changed(txn, socket);
    }

    /// Request one out-of-band driver invocation for `txn`.
    pub fn enqueue(&self, txn: &TxnRef<D>) -> Result<Queued> {
        self.shared.enqueue(txn)
    }

    /// Like [`enqueue`](Self::enqueue), unless `txn` is already waiting.
    pub fn requeue(&self, txn: &TxnRef<D>) -> Result<Queued> {
        self.shared.requeue(txn)
    }

    /// Sockets currently polled.
    pub fn registered_count(&self) -> usize {
        self.shared.watch.lock().borrow().registry.len()
    }

    /// Live entries waiting in the deferred queue.
    pub fn queued_count(&self) -> usize {
        self.shared.queue.lock().live_len()
    }

    /// Transactions waiting for their deadline.
    pub fn deadline_count(&self) -> usize {
        self.shared.watch.lock().borrow().deadlines.len()
    }

    /// True when `txn` is registered, deadline-tracked or queued.
    pub fn is_tracking(&self, txn: &TxnRef<D>) -> bool {
        let id = txn.id();
        let guard = self.shared.watch.lock();
        let watch = guard.borrow();
        watch.registry.contains(id)
            || watch.deadlines.contains(id)
            || self.shared.queue.lock().contains(id)
    }

    /// Readiness currently watched for `txn`, if registered.
    pub fn interest_of(&self, txn: &TxnRef<D>) -> Option<crate::Interest> {
        self.shared.watch.lock().borrow().registry.interest_of(txn.id())
    }

    /// Runtime counters.
    pub fn metrics(&self) -> &DispatcherMetrics {
        &self.shared.metrics
    }

    /// Configuration in effect.
    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }
}

impl<D: Driver> Drop for Dispatcher<D> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl<D: Driver> std::fmt::Debug for Dispatcher<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("running", &self.is_running())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Context, Phase, Step, Transaction};

    #[derive(Debug, Default)]
    struct Idle;

    impl Driver for Idle {
        type Outcome = ();

        fn phase(&self) -> Phase {
            Phase::Idle
        }

        fn advance(&mut self, _cx: &mut Context<'_, Self>) -> Step<()> {
            Step::Pending
        }

        fn timed_out(&mut self, _cx: &mut Context<'_, Self>) {}
    }

    fn idle_dispatcher(config: DispatcherConfig) -> Dispatcher<Idle> {
        Dispatcher::new(config).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = DispatcherConfig::default().with_queue_capacity(1);
        assert!(matches!(
            Dispatcher::<Idle>::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_enqueue_capacity_without_thread() {
        let dispatcher = idle_dispatcher(DispatcherConfig::default().with_queue_capacity(4));
        let txns: Vec<_> = (0..4).map(|_| Transaction::new(Idle)).collect();

        for txn in &txns[..3] {
            assert_eq!(dispatcher.enqueue(txn).unwrap(), Queued::Added);
        }
        assert!(matches!(
            dispatcher.enqueue(&txns[3]),
            Err(Error::QueueFull { capacity: 4 })
        ));
        assert_eq!(dispatcher.metrics().snapshot().queue_full, 1);
        assert_eq!(dispatcher.queued_count(), 3);
    }

    #[test]
    fn test_requeue_reports_pending() {
        let dispatcher = idle_dispatcher(DispatcherConfig::default());
        let txn = Transaction::new(Idle);
        assert_eq!(dispatcher.enqueue(&txn).unwrap(), Queued::Added);
        assert_eq!(dispatcher.requeue(&txn).unwrap(), Queued::AlreadyPending);
        assert_eq!(dispatcher.queued_count(), 1);
    }

    #[test]
    fn test_socket_lost_clears_every_structure() {
        let dispatcher = idle_dispatcher(DispatcherConfig::default());
        let txn = Transaction::new(Idle);
        let socket = NativeSocket::from_raw(1000 as _);

        dispatcher.socket_acquired(&txn, socket).unwrap();
        dispatcher.enqueue(&txn).unwrap();
        assert_eq!(dispatcher.registered_count(), 1);
        assert_eq!(dispatcher.deadline_count(), 1);
        assert_eq!(dispatcher.queued_count(), 1);

        dispatcher.socket_lost(&txn, socket);

        assert!(!dispatcher.is_tracking(&txn));
        assert_eq!(dispatcher.registered_count(), 0);
        assert_eq!(dispatcher.deadline_count(), 0);
        assert_eq!(dispatcher.queued_count(), 0);
    }

    #[test]
    fn test_deadlines_disabled_skips_scheduling() {
        let dispatcher = idle_dispatcher(DispatcherConfig::default().with_deadlines(false));
        let txn = Transaction::new(Idle);
        dispatcher
            .socket_acquired(&txn, NativeSocket::from_raw(1001 as _))
            .unwrap();
        assert_eq!(dispatcher.registered_count(), 1);
        assert_eq!(dispatcher.deadline_count(), 0);
    }

    #[test]
    fn test_invalid_socket_still_schedules_deadline() {
        let dispatcher = idle_dispatcher(DispatcherConfig::default());
        let txn = Transaction::new(Idle);
        dispatcher
            .socket_acquired(&txn, NativeSocket::INVALID)
            .unwrap();
        assert_eq!(dispatcher.registered_count(), 0);
        assert_eq!(dispatcher.deadline_count(), 1);
    }

    #[test]
    fn test_socket_changed_keeps_registration() {
        let dispatcher = idle_dispatcher(DispatcherConfig::default());
        let txn = Transaction::new(Idle);
        dispatcher
            .socket_acquired(&txn, NativeSocket::from_raw(1002 as _))
            .unwrap();
        dispatcher.socket_changed(&txn, NativeSocket::from_raw(1003 as _));
        assert_eq!(dispatcher.registered_count(), 1);

        dispatcher.socket_lost(&txn, NativeSocket::from_raw(1003 as _));
        assert_eq!(dispatcher.registered_count(), 0);
    }

    #[test]
    fn test_socket_lost_with_stale_handle_clears_every_structure() {
        let dispatcher = idle_dispatcher(DispatcherConfig::default());
        let txn = Transaction::new(Idle);

        dispatcher
            .socket_acquired(&txn, NativeSocket::from_raw(500 as _))
            .unwrap();
        dispatcher.enqueue(&txn).unwrap();
        dispatcher.socket_changed(&txn, NativeSocket::from_raw(501 as _));

        dispatcher.socket_lost(&txn, NativeSocket::from_raw(500 as _));

        assert_eq!(dispatcher.registered_count(), 0);
        assert_eq!(dispatcher.deadline_count(), 0);
        assert_eq!(dispatcher.queued_count(), 0);
        assert!(!dispatcher.is_tracking(&txn));
    }

    #[test]
    fn test_socket_changed_to_foreign_socket_refused() {
        let dispatcher = idle_dispatcher(DispatcherConfig::default());
        let a = Transaction::new(Idle);
        let b = Transaction::new(Idle);
        dispatcher
            .socket_acquired(&a, NativeSocket::from_raw(600 as _))
            .unwrap();
        dispatcher
            .socket_acquired(&b, NativeSocket::from_raw(601 as _))
            .unwrap();

        dispatcher.socket_changed(&b, NativeSocket::from_raw(600 as _));

        // b keeps its own handle; losing it leaves a untouched.
        dispatcher.socket_lost(&b, NativeSocket::from_raw(601 as _));
        assert_eq!(dispatcher.registered_count(), 1);
        assert!(dispatcher.is_tracking(&a));
        assert!(!dispatcher.is_tracking(&b));
    }

    #[test]
    fn test_start_is_idempotent_and_shutdown_final() {
        let dispatcher = idle_dispatcher(DispatcherConfig::default());
        assert!(!dispatcher.is_running());
        dispatcher.start().unwrap();
        dispatcher.start().unwrap();
        assert!(dispatcher.is_running());

        dispatcher.shutdown().unwrap();
        dispatcher.shutdown().unwrap();
        assert!(!dispatcher.is_running());
        assert!(matches!(dispatcher.start(), Err(Error::Stopped)));
        assert!(matches!(
            dispatcher.enqueue(&Transaction::new(Idle)),
            Err(Error::Stopped)
        ));
    }
}
