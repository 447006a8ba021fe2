// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deadline list: transactions with a pending timeout, ordered by deadline.
//!
//! Time only moves when the owner calls [`DeadlineList::advance`] with the
//! wall-clock time elapsed since its previous call. Deadlines are kept on
//! that virtual clock, so a stalled loop fires everything that became due in
//! one batch, in deadline order.
//!
//! Membership is explicit (a map keyed by [`TxnId`]), never inferred from
//! link fields: a transaction is either a member or it is not.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::transaction::{Tracked, TxnId};

/// Ordering key: deadline on the virtual clock, then insertion order.
type Key = (Duration, u64);

struct Member<T> {
    key: Key,
    txn: T,
}

/// Ordered collection of transactions waiting for their timeout.
pub struct DeadlineList<T> {
    now: Duration,
    next_seq: u64,
    order: BTreeMap<Key, TxnId>,
    members: HashMap<TxnId, Member<T>>,
}

impl<T: Tracked + Clone> DeadlineList<T> {
    /// Create an empty list with its clock at zero.
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_seq: 0,
            order: BTreeMap::new(),
            members: HashMap::new(),
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Schedule `txn` to expire `timeout` from now. A transaction that is
    /// already a member is rescheduled.
    pub fn add(&mut self, txn: T, timeout: Duration) {
        let id = txn.txn_id();
        self.remove(id);

        let key = (self.now.saturating_add(timeout), self.next_seq);
        self.next_seq += 1;
        self.order.insert(key, id);
        self.members.insert(id, Member { key, txn });
    }

    /// Drop `id` from the list. Returns whether it was a member.
    pub fn remove(&mut self, id: TxnId) -> bool {
        match self.members.remove(&id) {
            Some(member) => {
                self.order.remove(&member.key);
                true
            }
            None => false,
        }
    }

    /// True when `id` is waiting for its deadline.
    pub fn contains(&self, id: TxnId) -> bool {
        self.members.contains_key(&id)
    }

    /// Time left before `id` expires.
    pub fn remaining(&self, id: TxnId) -> Option<Duration> {
        self.members
            .get(&id)
            .map(|member| member.key.0.saturating_sub(self.now))
    }

    /// Move the clock forward by `elapsed` and return every member whose
    /// deadline has been reached, earliest first. Returned transactions are
    /// no longer members.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<T> {
        self.now = self.now.saturating_add(elapsed);

        let mut expired = Vec::new();
        while let Some(entry) = self.order.first_entry() {
            if entry.key().0 > self.now {
                break;
            }
            let id = entry.remove();
            if let Some(member) = self.members.remove(&id) {
                expired.push(member.txn);
            }
        }
        expired
    }
}

impl<T: Tracked + Clone> Default for DeadlineList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Probe(u64);

    impl Tracked for Probe {
        fn txn_id(&self) -> TxnId {
            TxnId::from_raw(self.0)
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_expires_only_due_members() {
        let mut list = DeadlineList::new();
        list.add(Probe(1), ms(50));
        list.add(Probe(2), ms(150));

        let expired = list.advance(ms(60));
        assert_eq!(expired, vec![Probe(1)]);
        assert!(!list.contains(TxnId::from_raw(1)));
        assert!(list.contains(TxnId::from_raw(2)));
        assert_eq!(list.remaining(TxnId::from_raw(2)), Some(ms(90)));

        assert_eq!(list.advance(ms(90)), vec![Probe(2)]);
        assert!(list.is_empty());
    }

    #[test]
    fn test_never_added_never_returned() {
        let mut list: DeadlineList<Probe> = DeadlineList::new();
        assert!(list.advance(ms(10_000)).is_empty());
        list.add(Probe(1), ms(5));
        let expired = list.advance(ms(10_000));
        assert!(!expired.contains(&Probe(2)));
    }

    #[test]
    fn test_batch_in_deadline_order() {
        let mut list = DeadlineList::new();
        list.add(Probe(3), ms(30));
        list.add(Probe(1), ms(10));
        list.add(Probe(2), ms(20));
        list.add(Probe(4), ms(20));
        assert_eq!(
            list.advance(ms(100)),
            vec![Probe(1), Probe(2), Probe(4), Probe(3)]
        );
    }

    #[test]
    fn test_sole_member_remove_is_unambiguous() {
        let mut list = DeadlineList::new();
        assert!(!list.remove(TxnId::from_raw(1)));
        list.add(Probe(1), ms(10));
        assert!(list.contains(TxnId::from_raw(1)));
        assert!(list.remove(TxnId::from_raw(1)));
        assert!(!list.remove(TxnId::from_raw(1)));
        assert!(list.advance(ms(100)).is_empty());
    }

    #[test]
    fn test_add_again_reschedules() {
        let mut list = DeadlineList::new();
        list.add(Probe(1), ms(10));
        list.advance(ms(5));
        list.add(Probe(1), ms(50));
        assert_eq!(list.len(), 1);
        assert!(list.advance(ms(10)).is_empty());
        assert_eq!(list.advance(ms(40)), vec![Probe(1)]);
    }

    #[test]
    fn test_deadline_is_relative_to_add_time() {
        let mut list = DeadlineList::new();
        list.advance(ms(1_000));
        list.add(Probe(1), ms(20));
        assert!(list.advance(ms(19)).is_empty());
        assert_eq!(list.advance(ms(1)), vec![Probe(1)]);
    }
}
