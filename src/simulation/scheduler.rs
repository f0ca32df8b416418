//! Discrete-event scheduler with deterministic ordering.
//!
//! Events are held in a `BTreeMap` keyed by [`EventKey`], ordered by:
//! 1. Time (earlier first)
//! 2. Sequence number (FIFO among events scheduled for the same instant)
//!
//! Callbacks never run concurrently: the runner pops one event at a time and
//! handles it to completion before asking for the next one.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use super::types::NodeId;

/// Key for ordering events in the queue. Doubles as the cancellation handle.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EventKey {
    /// When this event should be processed.
    pub time: Duration,
    /// Insertion sequence number for FIFO ordering at the same time.
    pub sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An event popped from the queue, ready to be dispatched.
#[derive(Debug)]
pub struct ScheduledEvent<E> {
    pub key: EventKey,
    /// Node on whose behalf the event runs, if scheduled with a context.
    pub context: Option<NodeId>,
    pub event: E,
}

struct Pending<E> {
    context: Option<NodeId>,
    event: E,
}

/// Single-threaded discrete-event timeline.
pub struct Scheduler<E> {
    queue: BTreeMap<EventKey, Pending<E>>,
    sequence: u64,
    now: Duration,
    stop_at: Option<Duration>,
    events_processed: u64,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            stop_at: None,
            events_processed: 0,
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `event` to fire `delay` after the current time.
    pub fn schedule_after(&mut self, delay: Duration, event: E) -> EventKey {
        let at = self.now + delay;
        self.insert(at, None, event)
    }

    /// Schedule `event` at absolute time `at`, attributed to `context`.
    ///
    /// Times in the past are clamped to `now`.
    pub fn schedule_with_context(&mut self, context: NodeId, at: Duration, event: E) -> EventKey {
        let at = if at < self.now {
            log::warn!("[{}] event scheduled in the past ({:?} < {:?}), running it now", context, at, self.now);
            self.now
        } else {
            at
        };
        self.insert(at, Some(context), event)
    }

    fn insert(&mut self, time: Duration, context: Option<NodeId>, event: E) -> EventKey {
        let key = EventKey {
            time,
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.queue.insert(key, Pending { context, event });
        key
    }

    /// Remove a pending event. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, key: EventKey) -> bool {
        self.queue.remove(&key).is_some()
    }

    #[cfg(test)]
    pub fn is_pending(&self, key: EventKey) -> bool {
        self.queue.contains_key(&key)
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Iterate pending events in firing order without consuming them.
    #[cfg(test)]
    pub fn pending(&self) -> impl Iterator<Item = (&EventKey, &E)> {
        self.queue.iter().map(|(k, p)| (k, &p.event))
    }

    /// Stop the run `after` from now. Events at or past that instant never fire.
    pub fn stop(&mut self, after: Duration) {
        self.stop_at = Some(self.now + after);
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Pop the next due event and advance the clock to its time.
    ///
    /// Returns `None` once the queue is empty or the stop time is reached.
    pub fn pop_due(&mut self) -> Option<ScheduledEvent<E>> {
        let (&key, _) = self.queue.iter().next()?;
        if let Some(stop_at) = self.stop_at {
            if key.time >= stop_at {
                self.now = stop_at;
                return None;
            }
        }
        let pending = self.queue.remove(&key)?;
        self.now = key.time;
        self.events_processed += 1;
        Some(ScheduledEvent {
            key,
            context: pending.context,
            event: pending.event,
        })
    }

    /// Drop every pending event and reset the clock.
    pub fn destroy(&mut self) {
        let dropped = self.queue.len();
        if dropped > 0 {
            log::debug!("Destroying scheduler with {} pending events", dropped);
        }
        self.queue.clear();
        self.sequence = 0;
        self.now = Duration::ZERO;
        self.stop_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn event_key_orders_by_time_then_sequence() {
        let earlier = EventKey { time: secs(1.0), sequence: 9 };
        let later = EventKey { time: secs(2.0), sequence: 1 };
        assert!(earlier < later);

        let first = EventKey { time: secs(1.0), sequence: 1 };
        let second = EventKey { time: secs(1.0), sequence: 2 };
        assert!(first < second, "same instant must be FIFO");
    }

    #[test]
    fn events_fire_in_time_order_and_fifo_at_same_instant() {
        let mut sched = Scheduler::new();
        sched.schedule_after(secs(2.0), "c");
        sched.schedule_after(secs(1.0), "a");
        sched.schedule_with_context(7, secs(1.0), "b");

        let a = sched.pop_due().unwrap();
        assert_eq!(a.event, "a");
        assert_eq!(a.context, None);
        let b = sched.pop_due().unwrap();
        assert_eq!(b.event, "b");
        assert_eq!(b.context, Some(7));
        assert_eq!(sched.now(), secs(1.0));
        assert_eq!(sched.pop_due().unwrap().event, "c");
        assert_eq!(sched.now(), secs(2.0));
        assert!(sched.pop_due().is_none());
        assert_eq!(sched.events_processed(), 3);
    }

    #[test]
    fn schedule_after_is_relative_to_now() {
        let mut sched = Scheduler::new();
        sched.schedule_after(secs(1.0), 1);
        sched.pop_due();
        sched.schedule_after(secs(0.5), 2);
        let ev = sched.pop_due().unwrap();
        assert_eq!(ev.key.time, secs(1.5));
    }

    #[test]
    fn past_absolute_time_is_clamped_to_now() {
        let mut sched = Scheduler::new();
        sched.schedule_after(secs(3.0), 1);
        sched.pop_due();
        let key = sched.schedule_with_context(1, secs(1.0), 2);
        assert_eq!(key.time, secs(3.0));
    }

    #[test]
    fn cancelled_event_never_fires() {
        let mut sched = Scheduler::new();
        let key = sched.schedule_after(secs(1.0), "cancel me");
        sched.schedule_after(secs(2.0), "keep");
        assert!(sched.is_pending(key));
        assert!(sched.cancel(key));
        assert!(!sched.cancel(key));
        assert_eq!(sched.pop_due().unwrap().event, "keep");
        assert!(sched.pop_due().is_none());
    }

    #[test]
    fn stop_boundary_is_exclusive() {
        let mut sched = Scheduler::new();
        for t in 0..6 {
            sched.schedule_after(secs(t as f64), t);
        }
        sched.stop(secs(5.0));
        let fired: Vec<i32> = std::iter::from_fn(|| sched.pop_due().map(|e| e.event)).collect();
        assert_eq!(fired, vec![0, 1, 2, 3, 4]);
        assert_eq!(sched.now(), secs(5.0));
        assert_eq!(sched.pending_count(), 1);
    }

    #[test]
    fn destroy_clears_queue_and_clock() {
        let mut sched = Scheduler::new();
        sched.schedule_after(secs(1.0), ());
        sched.schedule_after(secs(2.0), ());
        sched.pop_due();
        sched.destroy();
        assert_eq!(sched.pending_count(), 0);
        assert_eq!(sched.now(), Duration::ZERO);
        assert!(sched.pop_due().is_none());
    }
}
