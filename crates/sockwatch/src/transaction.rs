// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transactions as seen by the dispatcher.
//!
//! A [`Transaction`] wraps one protocol state machine (a [`Driver`]) behind
//! its own monitor lock. The dispatcher never looks inside the driver beyond
//! its coarse [`Phase`], which decides the readiness [`Interest`] watched for
//! the transaction's socket.
//!
//! # Lock order
//!
//! registry/timer lock -> transaction monitor -> deferred queue lock.
//!
//! The background loop takes a transaction's monitor while already holding
//! the registry/timer lock, so a caller thread must not call
//! `socket_acquired`/`socket_lost`/`socket_changed` while it holds that
//! transaction's monitor. The driver itself is exempt: it runs on the
//! dispatcher thread and reaches those operations through [`Context`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::config::DEFAULT_TRANSACTION_TIMEOUT;
use crate::dispatcher::Shared;
use crate::error::Result;
use crate::platform::NativeSocket;
use crate::queue::Queued;

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a transaction for its whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    fn next() -> Self {
        Self(NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Anything the dispatcher structures can track by transaction identity.
pub trait Tracked {
    /// Identity used for duplicate detection and removal.
    fn txn_id(&self) -> TxnId;
}

/// Coarse phase of a transaction, advanced only by its driver.
///
/// Ordering matters: the interest policy compares phases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// No transaction in flight.
    #[default]
    Idle,
    /// Sending a DNS query.
    ResolveSend,
    /// Waiting for the DNS answer.
    ResolveWait,
    /// TCP connect in progress.
    Connect,
    /// Sending the request (including any TLS handshake).
    Send,
    /// Reading the response status line and headers.
    ReceiveHeaders,
    /// Reading the response body.
    ReceiveBody,
    /// Outcome decided.
    Finished,
}

/// Readiness the dispatcher watches on a transaction's socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Interest {
    /// Socket can accept more outgoing data.
    #[default]
    Writable,
    /// Socket has incoming data (or EOF).
    Readable,
}

impl Interest {
    /// Interest to watch after the driver left the transaction in `phase`.
    ///
    /// Writable switches to Readable once the transaction waits for DNS or
    /// has reached the response; Readable falls back to Writable only for the
    /// connect/send phases in between. Anything else keeps the current value.
    ///
    /// ```
    /// use sockwatch::{Interest, Phase};
    ///
    /// assert_eq!(Interest::Writable.after(Phase::Send), Interest::Writable);
    /// assert_eq!(Interest::Writable.after(Phase::ReceiveHeaders), Interest::Readable);
    /// assert_eq!(Interest::Readable.after(Phase::Connect), Interest::Writable);
    /// ```
    pub fn after(self, phase: Phase) -> Interest {
        match self {
            Interest::Writable
                if phase == Phase::ResolveWait || phase >= Phase::ReceiveHeaders =>
            {
                Interest::Readable
            }
            Interest::Readable if phase > Phase::ResolveWait && phase < Phase::ReceiveHeaders => {
                Interest::Writable
            }
            current => current,
        }
    }
}

/// Result of one driver step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step<O> {
    /// Transaction still in flight.
    Pending,
    /// Transaction finished with this outcome; the completion callback runs.
    Finished(O),
}

/// External protocol state machine driven by the dispatcher.
///
/// All methods run on the dispatcher thread with the transaction's monitor
/// held. `advance` and `timed_out` may also run while the registry/timer lock
/// is held; the [`Context`] they receive re-enters that lock safely.
pub trait Driver: Send + Sized + 'static {
    /// Final result of a transaction.
    type Outcome: Clone + Send + fmt::Debug + 'static;

    /// Current coarse phase.
    fn phase(&self) -> Phase;

    /// Advance the state machine one step.
    ///
    /// The driver may call `cx.socket_lost()` for its own transaction only.
    fn advance(&mut self, cx: &mut Context<'_, Self>) -> Step<Self::Outcome>;

    /// The transaction's deadline passed. Stop it and return the terminal
    /// timeout outcome.
    fn timed_out(&mut self, cx: &mut Context<'_, Self>) -> Self::Outcome;
}

type Completion<D> = Box<dyn FnMut(&TxnRef<D>, <D as Driver>::Outcome) + Send>;

/// Shared reference to a transaction.
pub type TxnRef<D> = Arc<Transaction<D>>;

/// One transaction shared between the dispatcher and the client library.
pub struct Transaction<D: Driver> {
    id: TxnId,
    monitor: Mutex<D>,
    timeout_ms: AtomicU64,
    completion: Mutex<Option<Completion<D>>>,
    last_outcome: Mutex<Option<D::Outcome>>,
}

impl<D: Driver> Transaction<D> {
    /// Wrap a driver with the default transaction timeout.
    pub fn new(driver: D) -> TxnRef<D> {
        Self::with_timeout(driver, DEFAULT_TRANSACTION_TIMEOUT)
    }

    /// Wrap a driver with an explicit transaction timeout.
    pub fn with_timeout(driver: D, timeout: Duration) -> TxnRef<D> {
        Arc::new(Self {
            id: TxnId::next(),
            monitor: Mutex::new(driver),
            timeout_ms: AtomicU64::new(duration_to_ms(timeout)),
            completion: Mutex::new(None),
            last_outcome: Mutex::new(None),
        })
    }

    /// Stable identity.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Timeout scheduled on the next socket acquisition.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Change the timeout used by the next socket acquisition.
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(duration_to_ms(timeout), Ordering::Relaxed);
    }

    /// Take the transaction monitor.
    ///
    /// See the module docs for the lock order.
    pub fn lock(&self) -> MutexGuard<'_, D> {
        self.monitor.lock()
    }

    /// Register the completion callback, replacing any previous one.
    ///
    /// Called on the dispatcher thread with the final outcome, without the
    /// monitor held. Opaque caller data travels in the closure's captures.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnMut(&TxnRef<D>, D::Outcome) + Send + 'static,
    {
        *self.completion.lock() = Some(Box::new(callback));
    }

    /// Drop the completion callback.
    pub fn clear_on_complete(&self) {
        self.completion.lock().take();
    }

    /// Outcome of the most recently finished run, if any.
    pub fn last_outcome(&self) -> Option<D::Outcome> {
        self.last_outcome.lock().clone()
    }

    /// Record the outcome and run the completion callback.
    ///
    /// The callback is taken out of its slot while it runs so it may
    /// register a replacement for itself.
    pub(crate) fn complete(self: &Arc<Self>, outcome: D::Outcome) {
        *self.last_outcome.lock() = Some(outcome.clone());

        let callback = self.completion.lock().take();
        if let Some(mut callback) = callback {
            callback(self, outcome);
            let mut slot = self.completion.lock();
            if slot.is_none() {
                *slot = Some(callback);
            }
        }
    }
}

impl<D: Driver> Tracked for TxnRef<D> {
    fn txn_id(&self) -> TxnId {
        self.id
    }
}

impl<D: Driver> fmt::Debug for Transaction<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("timeout", &self.timeout())
            .finish_non_exhaustive()
    }
}

fn duration_to_ms(timeout: Duration) -> u64 {
    timeout.as_millis().try_into().unwrap_or(u64::MAX)
}

/// Handle given to a running driver for the transaction it is advancing.
///
/// Every call goes through the same dispatcher entry points a caller thread
/// would use; the registry/timer lock is re-entrant, so these are safe while
/// the loop already holds it.
pub struct Context<'a, D: Driver> {
    shared: &'a Shared<D>,
    txn: &'a TxnRef<D>,
}

impl<'a, D: Driver> Context<'a, D> {
    pub(crate) fn new(shared: &'a Shared<D>, txn: &'a TxnRef<D>) -> Self {
        Self { shared, txn }
    }

    /// Transaction being driven.
    pub fn txn_id(&self) -> TxnId {
        self.txn.id
    }

    /// The transaction connected `socket`: start polling it and schedule its
    /// timeout.
    pub fn socket_acquired(&mut self, socket: NativeSocket) -> Result<()> {
        self.shared.socket_acquired(self.txn, socket)
    }

    /// The transaction lost `socket`: stop polling it, cancel its timeout and
    /// drop any pending deferred dispatch.
    pub fn socket_lost(&mut self, socket: NativeSocket) {
        self.shared.socket_lost(self.txn, socket);
    }

    /// The transaction now uses `socket` instead of its previous one.
    pub fn socket_changed(&mut self, socket: NativeSocket) {
        self.shared.socket_changed(self.txn, socket);
    }

    /// Ask for another out-of-band dispatch unless one is already pending.
    pub fn requeue(&mut self) -> Result<Queued> {
        self.shared.requeue(self.txn)
    }
}
