// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deferred queue: fixed-capacity FIFO of transactions waiting for an
//! out-of-band driver invocation.
//!
//! The ring is not synchronized by itself; the dispatcher keeps it behind
//! its own queue lock so any number of caller threads can push while the
//! background loop pops.
//!
//! Protocol:
//! - Full: (head + 1) % capacity == tail (one slot always stays empty)
//! - Empty: head == tail
//! - A removed entry becomes a tombstone (`None`) in place; `pop` consumes
//!   and skips it, so it never runs.

use crate::error::{Error, Result};
use crate::transaction::{Tracked, TxnId};

/// Result of a successful enqueue/requeue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Queued {
    /// A new entry was stored.
    Added,
    /// A live entry for the transaction was already waiting.
    AlreadyPending,
}

/// Fixed-capacity ring of pending transactions.
pub struct DeferredQueue<T> {
    slots: Vec<Option<T>>,
    head: usize,
    tail: usize,
}

impl<T: Tracked + Clone> DeferredQueue<T> {
    /// Allocate a ring of `capacity` slots (`capacity - 1` usable).
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 2 {
            return Err(Error::InvalidConfig(format!(
                "queue capacity {} leaves no usable slot",
                capacity
            )));
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| Error::OutOfMemory {
                what: "deferred queue",
                requested: capacity,
            })?;
        slots.resize_with(capacity, || None);
        Ok(Self {
            slots,
            head: 0,
            tail: 0,
        })
    }

    /// Total slots, including the reserved one.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently between tail and head, tombstones included.
    pub fn len(&self) -> usize {
        (self.head + self.capacity() - self.tail) % self.capacity()
    }

    /// True when no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Live (non-tombstone) entries waiting.
    pub fn live_len(&self) -> usize {
        self.occupied().filter(|&i| self.slots[i].is_some()).count()
    }

    /// Append `txn` unconditionally.
    pub fn enqueue(&mut self, txn: T) -> Result<()> {
        let next_head = self.advance(self.head);
        if next_head == self.tail {
            return Err(Error::QueueFull {
                capacity: self.capacity(),
            });
        }
        self.slots[self.head] = Some(txn);
        self.head = next_head;
        Ok(())
    }

    /// Append `txn` unless a live entry for it is already waiting.
    pub fn requeue(&mut self, txn: T) -> Result<Queued> {
        if self.contains(txn.txn_id()) {
            return Ok(Queued::AlreadyPending);
        }
        self.enqueue(txn).map(|()| Queued::Added)
    }

    /// Tombstone every live entry for `id`. Returns whether one was found.
    pub fn remove(&mut self, id: TxnId) -> bool {
        let mut found = false;
        let mut i = self.tail;
        while i != self.head {
            if matches!(&self.slots[i], Some(txn) if txn.txn_id() == id) {
                self.slots[i] = None;
                found = true;
            }
            i = self.advance(i);
        }
        found
    }

    /// True when a live entry for `id` is waiting.
    pub fn contains(&self, id: TxnId) -> bool {
        self.occupied()
            .any(|i| matches!(&self.slots[i], Some(txn) if txn.txn_id() == id))
    }

    /// Take the oldest live entry, consuming any tombstones in front of it.
    pub fn pop(&mut self) -> Option<T> {
        while self.tail != self.head {
            let slot = self.slots[self.tail].take();
            self.tail = self.advance(self.tail);
            if slot.is_some() {
                return slot;
            }
        }
        None
    }

    fn advance(&self, i: usize) -> usize {
        if i + 1 == self.capacity() {
            0
        } else {
            i + 1
        }
    }

    fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        let cap = self.capacity();
        (0..self.len()).map(move |k| (self.tail + k) % cap)
    }
}
