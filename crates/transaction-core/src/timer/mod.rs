//! Transaction timer queue.
//!
//! All timers live in one binary heap owned by the engine. Scheduling
//! hands back a [`TimerHandle`]; cancelling through a handle is a no-op
//! once the timer has fired, so machines re-check their state when a
//! timer is delivered instead of trusting the cancellation race.

mod types;

pub use types::{TimerKind, TimerSettings};

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::{Duration, Instant};

use crate::transaction::TransactionKey;

/// Identifies one scheduled timer. Stale handles cancel nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    seq: u64,
}

struct QueueEntry {
    fire_at: Instant,
    seq: u64,
    key: TransactionKey,
    kind: TimerKind,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the earliest deadline first.
        // Equal deadlines fall back to insertion order, which is what
        // lets a timeout scheduled at transaction start win against a
        // retransmission that lands on the same instant.
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of pending timers keyed by (deadline, insertion order).
///
/// Cancellation removes the sequence number from the live set; the heap
/// entry stays behind and is skipped when it surfaces. Entries are
/// unique per sequence number, so a fired timer can never be delivered
/// twice.
#[derive(Default)]
pub struct TimerQueue {
    heap: BinaryHeap<QueueEntry>,
    live: HashSet<u64>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        TimerQueue {
            heap: BinaryHeap::new(),
            live: HashSet::new(),
            next_seq: 0,
        }
    }

    /// Schedules `kind` for `key` at `now + delay`.
    ///
    /// A zero delay is valid and fires on the next drain, which is how
    /// reliable transports collapse their wait timers.
    pub fn schedule(
        &mut self,
        key: TransactionKey,
        kind: TimerKind,
        delay: Duration,
        now: Instant,
    ) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(seq);
        self.heap.push(QueueEntry {
            fire_at: now + delay,
            seq,
            key,
            kind,
        });
        TimerHandle { seq }
    }

    /// Cancels a scheduled timer. No-op if it already fired or was
    /// already cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) {
        self.live.remove(&handle.seq);
    }

    /// Pops every timer due at `now` or earlier, in deadline order with
    /// ties broken by insertion order. Cancelled entries are dropped
    /// silently.
    pub fn drain_due(&mut self, now: Instant) -> Vec<(TransactionKey, TimerKind)> {
        let mut due = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.fire_at > now {
                break;
            }
            let entry = match self.heap.pop() {
                Some(entry) => entry,
                None => break,
            };
            if self.live.remove(&entry.seq) {
                due.push((entry.key, entry.kind));
            }
        }
        due
    }

    /// Earliest live deadline, purging cancelled entries off the top.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(entry) = self.heap.peek() {
            if self.live.contains(&entry.seq) {
                return Some(entry.fire_at);
            }
            self.heap.pop();
        }
        None
    }

    /// Number of live (not yet fired, not cancelled) timers.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringline_sip_core::Method;

    fn key(branch: &str) -> TransactionKey {
        TransactionKey::Branch {
            branch: branch.to_string(),
            method: Method::Invite,
            is_server: false,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();

        queue.schedule(key("b"), TimerKind::B, ms(300), now);
        queue.schedule(key("a"), TimerKind::A, ms(100), now);
        queue.schedule(key("k"), TimerKind::K, ms(200), now);

        let due = queue.drain_due(now + ms(300));
        let kinds: Vec<TimerKind> = due.iter().map(|(_, kind)| *kind).collect();
        assert_eq!(kinds, vec![TimerKind::A, TimerKind::K, TimerKind::B]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_equal_deadlines_fire_in_insertion_order() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();

        queue.schedule(key("first"), TimerKind::B, ms(100), now);
        queue.schedule(key("second"), TimerKind::A, ms(100), now);
        queue.schedule(key("third"), TimerKind::F, ms(100), now);

        let due = queue.drain_due(now + ms(100));
        let branches: Vec<String> = due
            .iter()
            .map(|(key, _)| match key {
                TransactionKey::Branch { branch, .. } => branch.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(branches, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_nothing_due_before_deadline() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();

        queue.schedule(key("a"), TimerKind::A, ms(500), now);
        assert!(queue.drain_due(now + ms(499)).is_empty());
        assert_eq!(queue.len(), 1);

        let due = queue.drain_due(now + ms(500));
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn test_cancelled_timer_is_not_delivered() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();

        let keep = queue.schedule(key("keep"), TimerKind::A, ms(100), now);
        let drop = queue.schedule(key("drop"), TimerKind::E, ms(100), now);
        queue.cancel(drop);

        assert_eq!(queue.len(), 1);
        let due = queue.drain_due(now + ms(100));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, TimerKind::A);

        // Cancelling after the fire is a quiet no-op.
        queue.cancel(keep);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_next_deadline_skips_cancelled_head() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();

        let early = queue.schedule(key("early"), TimerKind::A, ms(50), now);
        queue.schedule(key("late"), TimerKind::B, ms(200), now);
        queue.cancel(early);

        assert_eq!(queue.next_deadline(), Some(now + ms(200)));
    }

    #[test]
    fn test_zero_delay_fires_immediately() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();

        queue.schedule(key("zero"), TimerKind::K, Duration::ZERO, now);
        let due = queue.drain_due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, TimerKind::K);
    }

    #[test]
    fn test_drain_is_empty_when_exhausted() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();
        assert!(queue.drain_due(now).is_empty());
        assert_eq!(queue.next_deadline(), None);
    }
}
