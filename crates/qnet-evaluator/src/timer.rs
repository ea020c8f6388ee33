//! Delayed-message table for the evaluator actor.
//!
//! Timers are stored as a binary heap of (deadline, id); cancellation is a
//! tombstone (the id is dropped from the live map), so cancel is O(1) and
//! stale heap entries are skipped on pop. The actor loop uses
//! [`TimerHeap::next_deadline`] to size its channel `recv_timeout` and drains
//! expirations with [`TimerHeap::pop_due`], keeping timer firings strictly
//! ordered with external events.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

pub type TimerId = u64;

pub struct TimerHeap<T> {
    heap: BinaryHeap<Reverse<(u64, TimerId)>>,
    live: HashMap<TimerId, T>,
    next_id: TimerId,
}

impl<T> TimerHeap<T> {
    pub fn new() -> Self {
        TimerHeap {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_id: 1,
        }
    }

    /// Schedule `payload` to fire at `deadline_ms` on the injected timeline.
    pub fn schedule(&mut self, deadline_ms: u64, payload: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, payload);
        self.heap.push(Reverse((deadline_ms, id)));
        id
    }

    /// Cancel a pending timer, returning its payload if it was still live.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        self.live.remove(&id)
    }

    /// Earliest live deadline, skipping tombstoned entries.
    pub fn next_deadline(&mut self) -> Option<u64> {
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if self.live.contains_key(&id) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Pop the next timer whose deadline is `<= now_ms`, in deadline order.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TimerId, T)> {
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if !self.live.contains_key(&id) {
                self.heap.pop();
                continue;
            }
            if deadline > now_ms {
                return None;
            }
            self.heap.pop();
            let payload = self.live.remove(&id)?;
            return Some((id, payload));
        }
        None
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl<T> Default for TimerHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_order() {
        let mut timers = TimerHeap::new();
        timers.schedule(300, "c");
        timers.schedule(100, "a");
        timers.schedule(200, "b");

        assert_eq!(timers.next_deadline(), Some(100));
        assert_eq!(timers.pop_due(250).map(|(_, p)| p), Some("a"));
        assert_eq!(timers.pop_due(250).map(|(_, p)| p), Some("b"));
        assert_eq!(timers.pop_due(250), None, "c is not due yet");
        assert_eq!(timers.next_deadline(), Some(300));
    }

    #[test]
    fn cancel_tombstones_entry() {
        let mut timers = TimerHeap::new();
        let a = timers.schedule(100, "a");
        timers.schedule(200, "b");

        assert_eq!(timers.cancel(a), Some("a"));
        assert_eq!(timers.cancel(a), None, "double cancel is a no-op");
        assert_eq!(timers.next_deadline(), Some(200));
        assert_eq!(timers.pop_due(500).map(|(_, p)| p), Some("b"));
        assert!(timers.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let mut timers = TimerHeap::new();
        timers.schedule(100, 1);
        timers.schedule(200, 2);
        timers.clear();
        assert_eq!(timers.next_deadline(), None);
        assert_eq!(timers.pop_due(u64::MAX), None);
    }
}
