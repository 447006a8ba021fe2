// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Socket registry: which transaction owns which socket, and what readiness
//! is watched for it.
//!
//! Two index-aligned sequences live behind this type: the poll array handed
//! to the kernel and the transactions it belongs to. Entry `i` of both always
//! describes the same transaction, no socket appears twice, and
//! `len() <= capacity()`.
//!
//! Capacity grows by a fixed step (`registry_growth`, 2 by default). A
//! failed allocation is reported as [`Error::OutOfMemory`] and leaves the
//! registry untouched.

use std::io;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::platform::{self, NativeSocket, PollFd};
use crate::transaction::{Interest, Phase, Tracked, TxnId};

/// Growable (socket, interest, transaction) table owned by the dispatcher.
pub struct SocketRegistry<T> {
    fds: Vec<PollFd>,
    txns: Vec<T>,
    capacity: usize,
    growth: usize,
}

impl<T: Tracked + Clone> SocketRegistry<T> {
    /// Create an empty registry growing by `growth` entries at a time.
    pub fn new(growth: usize) -> Self {
        Self {
            fds: Vec::new(),
            txns: Vec::new(),
            capacity: 0,
            growth: growth.max(1),
        }
    }

    /// Number of registered sockets.
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Entries available before the next growth step.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start watching `socket` for `txn`, initially for writability.
    ///
    /// Returns `Ok(false)` without change when `socket` is invalid (not yet
    /// connected) or when the socket or the transaction is already present.
    pub fn register(&mut self, txn: T, socket: NativeSocket) -> Result<bool> {
        debug_assert!(self.len() <= self.capacity);

        if !socket.is_valid() {
            return Ok(false);
        }
        if let Some(pos) = self.position_of(txn.txn_id()) {
            log::debug!(
                "[sockwatch] {} already watched on {}, ignoring {}",
                txn.txn_id(),
                self.fds[pos].socket(),
                socket
            );
            return Ok(false);
        }
        if let Some(pos) = self.position_of_socket(socket) {
            log::error!(
                "[sockwatch] {} already registered for {}, refusing it for {}",
                socket,
                self.txns[pos].txn_id(),
                txn.txn_id()
            );
            debug_assert!(false, "duplicate socket registration");
            return Ok(false);
        }

        if self.len() == self.capacity {
            self.grow()?;
        }

        self.fds.push(PollFd::new(socket, Interest::Writable));
        self.txns.push(txn);
        Ok(true)
    }

    /// Stop watching the socket registered for `txn`.
    ///
    /// The entry is found by transaction identity; `socket` is only the
    /// caller's view of the handle and is compared for logging. Later entries
    /// shift left by one, keeping their relative order. Returns `false` when
    /// `txn` is not registered.
    pub fn deregister(&mut self, txn: &T, socket: NativeSocket) -> bool {
        let Some(pos) = self.position_of(txn.txn_id()) else {
            return false;
        };
        let registered = self.fds[pos].socket();
        if registered != socket {
            log::debug!(
                "[sockwatch] {} lost {} but was watched on {}; removing it",
                txn.txn_id(),
                socket,
                registered
            );
        }
        self.fds.remove(pos);
        self.txns.remove(pos);
        true
    }

    /// Replace the socket stored for `txn`, keeping its position and
    /// interest.
    ///
    /// No-op when `socket` is invalid, `txn` is not registered, or `socket`
    /// is already registered to another transaction.
    pub fn update(&mut self, txn: &T, socket: NativeSocket) -> bool {
        if !socket.is_valid() {
            return false;
        }
        let Some(pos) = self.position_of(txn.txn_id()) else {
            return false;
        };
        if let Some(other) = self.position_of_socket(socket) {
            if other != pos {
                log::error!(
                    "[sockwatch] {} already registered for {}, refusing it for {}",
                    socket,
                    self.txns[other].txn_id(),
                    txn.txn_id()
                );
                return false;
            }
        }
        self.fds[pos].set_socket(socket);
        true
    }

    /// Apply the interest policy for `id` after its driver left it in
    /// `phase`. Returns the resulting interest, or `None` when `id` is no
    /// longer registered.
    pub fn refresh_interest(&mut self, id: TxnId, phase: Phase) -> Option<Interest> {
        let pos = self.position_of(id)?;
        let next = self.fds[pos].interest().after(phase);
        self.fds[pos].set_interest(next);
        Some(next)
    }

    /// Block on the readiness of every registered socket.
    pub fn poll(&mut self, timeout: Duration) -> io::Result<usize> {
        platform::poll(&mut self.fds, timeout)
    }

    /// Transactions whose socket reported readiness in the last poll, in
    /// registry order.
    pub fn ready(&self) -> Vec<T> {
        self.fds
            .iter()
            .zip(&self.txns)
            .filter(|(fd, _)| fd.is_ready())
            .map(|(_, txn)| txn.clone())
            .collect()
    }

    /// True when `id` is registered.
    pub fn contains(&self, id: TxnId) -> bool {
        self.position_of(id).is_some()
    }

    /// Watched interest for `id`.
    pub fn interest_of(&self, id: TxnId) -> Option<Interest> {
        self.position_of(id).map(|pos| self.fds[pos].interest())
    }

    /// Registered socket for `id`.
    pub fn socket_of(&self, id: TxnId) -> Option<NativeSocket> {
        self.position_of(id).map(|pos| self.fds[pos].socket())
    }

    /// Iterate `(socket, interest, transaction)` in poll order.
    pub fn iter(&self) -> impl Iterator<Item = (NativeSocket, Interest, &T)> {
        self.fds
            .iter()
            .zip(&self.txns)
            .map(|(fd, txn)| (fd.socket(), fd.interest(), txn))
    }

    fn position_of(&self, id: TxnId) -> Option<usize> {
        self.txns.iter().position(|txn| txn.txn_id() == id)
    }

    fn position_of_socket(&self, socket: NativeSocket) -> Option<usize> {
        self.fds.iter().position(|fd| fd.socket() == socket)
    }

    fn grow(&mut self) -> Result<()> {
        let new_cap = self.capacity + self.growth;
        let oom = |_| Error::OutOfMemory {
            what: "socket registry",
            requested: new_cap,
        };
        self.fds
            .try_reserve_exact(new_cap - self.fds.len())
            .map_err(oom)?;
        self.txns
            .try_reserve_exact(new_cap - self.txns.len())
            .map_err(oom)?;
        self.capacity = new_cap;
        Ok(())
    }
}
