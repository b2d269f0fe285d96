//! Queue bookkeeping: the known set, the pending sequence, and the active count.
//!
//! Every method assumes the caller holds the queue lock. Nothing here spawns
//! or awaits; the dispatch loop turns the keys handed out by
//! [`QueueState::next_admission`] into running jobs.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use crate::model::DispatchKey;

/// Where a known key currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Waiting in the pending sequence.
    Pending,
    /// Handed to the processor, completion not yet acknowledged.
    Active,
}

/// Running totals since the queue was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Every key read from the input stream, valid or not.
    pub received: u64,
    /// Keys appended to the pending sequence.
    pub queued: u64,
    /// Keys dropped because they were already in flight.
    pub merged: u64,
    /// Invalid keys dropped on arrival.
    pub rejected: u64,
    pub dispatched: u64,
    pub completed: u64,
}

/// Point-in-time view of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub max_concurrency: usize,
    pub pending: usize,
    pub active: usize,
    pub known: usize,
    pub counters: Counters,
}

impl QueueSnapshot {
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.active == 0
    }
}

#[derive(Debug)]
pub(crate) struct QueueState<K> {
    known: HashMap<K, Slot>,
    pending: VecDeque<K>,
    active: usize,
    max_concurrency: usize,
    counters: Counters,
}

impl<K: DispatchKey> QueueState<K> {
    pub(crate) fn new(max_concurrency: usize) -> Self {
        Self {
            known: HashMap::new(),
            pending: VecDeque::new(),
            active: 0,
            max_concurrency,
            counters: Counters::default(),
        }
    }

    /// Append `key` unless it is already in flight. Returns whether it was queued.
    pub(crate) fn push(&mut self, key: K) -> bool {
        self.counters.received += 1;
        if self.known.contains_key(&key) {
            self.counters.merged += 1;
            return false;
        }
        self.known.insert(key.clone(), Slot::Pending);
        self.pending.push_back(key);
        self.counters.queued += 1;
        true
    }

    /// Count an invalid key that never reached the pending sequence.
    pub(crate) fn reject(&mut self) {
        self.counters.received += 1;
        self.counters.rejected += 1;
    }

    /// Remove the head of the pending sequence and forget it.
    ///
    /// # Panics
    ///
    /// Panics if nothing is pending. Only admission calls this, after
    /// checking, so an empty queue here means the bookkeeping is corrupt.
    pub(crate) fn pop(&mut self) -> K {
        let Some(key) = self.pending.pop_front() else {
            panic!("pop called on empty pending queue (active={})", self.active);
        };
        self.known.remove(&key);
        key
    }

    /// Move the head key from pending to active.
    fn dispatch(&mut self) -> K {
        let key = self.pop();
        self.active += 1;
        self.known.insert(key.clone(), Slot::Active);
        self.counters.dispatched += 1;
        key
    }

    /// Grant one free slot to the head of the pending sequence, if any.
    ///
    /// The returned key has already been counted as active; the caller must
    /// start its job.
    pub(crate) fn next_admission(&mut self) -> Option<K> {
        if self.active < self.max_concurrency && !self.pending.is_empty() {
            Some(self.dispatch())
        } else {
            None
        }
    }

    /// Release the slot held by a finished job.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not active.
    pub(crate) fn complete(&mut self, key: &K) {
        match self.known.remove(key) {
            Some(Slot::Active) => {}
            other => panic!("completion for {key:?} which is not active (slot: {other:?})"),
        }
        self.active -= 1;
        self.counters.completed += 1;
    }

    pub(crate) fn slot(&self, key: &K) -> Option<Slot> {
        self.known.get(key).copied()
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.active == 0
    }

    pub(crate) fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            max_concurrency: self.max_concurrency,
            pending: self.pending.len(),
            active: self.active,
            known: self.known.len(),
            counters: self.counters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> String {
        s.to_string()
    }

    fn drain_admissions(state: &mut QueueState<String>) -> Vec<String> {
        std::iter::from_fn(|| state.next_admission()).collect()
    }

    #[test]
    fn duplicate_push_leaves_state_unchanged() {
        let mut state = QueueState::new(1);
        assert!(state.push(key("a")));
        let before = state.snapshot();

        assert!(!state.push(key("a")));
        let after = state.snapshot();
        assert_eq!(after.known, before.known);
        assert_eq!(after.pending, before.pending);
        assert_eq!(after.counters.merged, 1);
    }

    #[test]
    fn active_key_is_not_requeued() {
        let mut state = QueueState::new(1);
        state.push(key("a"));
        assert_eq!(state.next_admission(), Some(key("a")));
        assert_eq!(state.slot(&key("a")), Some(Slot::Active));

        assert!(!state.push(key("a")));
        assert_eq!(state.snapshot().pending, 0);
        assert_eq!(state.snapshot().known, 1);
    }

    #[test]
    fn admission_respects_ceiling_and_fifo() {
        let mut state = QueueState::new(2);
        for k in ["a", "b", "c", "d"] {
            state.push(key(k));
        }

        assert_eq!(drain_admissions(&mut state), vec![key("a"), key("b")]);
        let snap = state.snapshot();
        assert_eq!(snap.active, 2);
        assert_eq!(snap.pending, 2);
        assert_eq!(snap.known, 4);

        state.complete(&key("b"));
        assert_eq!(drain_admissions(&mut state), vec![key("c")]);
        state.complete(&key("a"));
        assert_eq!(drain_admissions(&mut state), vec![key("d")]);
    }

    #[test]
    fn completion_allows_readmission() {
        let mut state = QueueState::new(1);
        state.push(key("a"));
        state.next_admission();
        state.complete(&key("a"));
        assert_eq!(state.slot(&key("a")), None);
        assert!(state.is_drained());

        assert!(state.push(key("a")));
        assert_eq!(state.slot(&key("a")), Some(Slot::Pending));
    }

    #[test]
    fn example_scenario_settles_with_one_a() {
        let mut state = QueueState::new(2);
        for k in ["A", "B", "C", "A"] {
            state.push(key(k));
            drain_admissions(&mut state);
        }
        let snap = state.snapshot();
        assert_eq!(snap.known, 3);
        assert_eq!(snap.active, 2);
        assert_eq!(snap.pending, 1);
        assert_eq!(state.slot(&key("C")), Some(Slot::Pending));
        assert_eq!(snap.counters.merged, 1);

        state.complete(&key("A"));
        drain_admissions(&mut state);
        state.complete(&key("B"));
        state.complete(&key("C"));
        assert!(state.is_drained());
        assert_eq!(state.snapshot().known, 0);
    }

    #[test]
    fn reject_counts_without_tracking() {
        let mut state: QueueState<String> = QueueState::new(1);
        state.reject();
        let snap = state.snapshot();
        assert_eq!(snap.known, 0);
        assert_eq!(snap.counters.received, 1);
        assert_eq!(snap.counters.rejected, 1);
    }

    #[test]
    #[should_panic(expected = "pop called on empty pending queue")]
    fn pop_on_empty_queue_is_fatal() {
        let mut state: QueueState<String> = QueueState::new(1);
        state.pop();
    }

    #[test]
    #[should_panic(expected = "which is not active")]
    fn completing_a_pending_key_is_fatal() {
        let mut state = QueueState::new(1);
        state.push(key("a"));
        state.complete(&key("a"));
    }
}
