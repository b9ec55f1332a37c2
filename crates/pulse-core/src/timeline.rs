//! Time-ordered event storage.
//!
//! A [`Timeline`] keeps [`Event`]s sorted by time. Insertion uses a binary
//! search for the insertion point, so events that share a time stay in
//! insertion order and a query at that instant resolves to the one added
//! last.

use std::collections::VecDeque;

/// A payload stamped with the time it takes effect.
#[derive(Clone, Debug, PartialEq)]
pub struct Event<T> {
    /// Time in seconds.
    pub time: f64,
    /// The value carried by this event.
    pub payload: T,
}

impl<T> Event<T> {
    /// Create a new event.
    pub fn new(time: f64, payload: T) -> Self {
        Self { time, payload }
    }
}

/// A generic, time-ordered event store.
///
/// Events are held in non-decreasing time order. All lookups are binary
/// searches, so queries are O(log n) regardless of how many events have
/// been scheduled.
#[derive(Clone, Debug)]
pub struct Timeline<T> {
    events: VecDeque<Event<T>>,
    /// Maximum number of retained events (oldest are dropped first).
    memory: Option<usize>,
}

impl<T> Default for Timeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Timeline<T> {
    /// Create an empty, unbounded timeline.
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            memory: None,
        }
    }

    /// Create an empty timeline that retains at most `limit` events.
    ///
    /// When an insert pushes the length past the limit, the earliest
    /// events are discarded.
    pub fn with_memory(limit: usize) -> Self {
        Self {
            events: VecDeque::new(),
            memory: Some(limit.max(1)),
        }
    }

    /// Number of events currently stored.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the timeline holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Remove every event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Iterate over all events in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = &Event<T>> {
        self.events.iter()
    }

    /// Insert a payload at `time`.
    ///
    /// The event is placed after every existing event with the same time.
    /// NaN times are ignored since they cannot be ordered.
    pub fn insert(&mut self, time: f64, payload: T) {
        if time.is_nan() {
            log::warn!("[TIMELINE] Ignoring event with NaN time");
            return;
        }
        let index = self.count_at_or_before(time);
        self.events.insert(index, Event::new(time, payload));

        if let Some(limit) = self.memory {
            while self.events.len() > limit {
                self.events.pop_front();
            }
        }
    }

    /// The event with the greatest time `<= time`.
    ///
    /// Among events sharing that time, the most recently inserted wins.
    pub fn value_before_or_at(&self, time: f64) -> Option<&Event<T>> {
        match self.count_at_or_before(time) {
            0 => None,
            n => self.events.get(n - 1),
        }
    }

    /// The last event strictly before `time`.
    pub fn value_before(&self, time: f64) -> Option<&Event<T>> {
        match self.count_before(time) {
            0 => None,
            n => self.events.get(n - 1),
        }
    }

    /// The first event strictly after `time`.
    pub fn value_after(&self, time: f64) -> Option<&Event<T>> {
        self.events.get(self.count_at_or_before(time))
    }

    /// Remove every event with a time strictly greater than `time`.
    pub fn evict_after(&mut self, time: f64) {
        let keep = self.count_at_or_before(time);
        self.events.truncate(keep);
    }

    /// Remove every event with a time strictly less than `time`.
    pub fn evict_before(&mut self, time: f64) {
        let drop = self.count_before(time);
        self.events.drain(..drop);
    }

    /// Remove events strictly before `time`, except the last `keep` of them.
    pub fn trim_before(&mut self, time: f64, keep: usize) {
        let drop = self.count_before(time).saturating_sub(keep);
        self.events.drain(..drop);
    }

    /// Events with a time `<= time`, in chronological order.
    pub fn iter_until(&self, time: f64) -> impl DoubleEndedIterator<Item = &Event<T>> {
        self.events.range(..self.count_at_or_before(time))
    }

    /// Events with a time strictly greater than `time`, in chronological order.
    pub fn iter_after(&self, time: f64) -> impl DoubleEndedIterator<Item = &Event<T>> {
        self.events.range(self.count_at_or_before(time)..)
    }

    /// Events with `from <= time < to`, in chronological order.
    pub fn iter_between(&self, from: f64, to: f64) -> impl Iterator<Item = &Event<T>> {
        let start = self.count_before(from);
        let end = self.count_before(to).max(start);
        self.events.range(start..end)
    }

    /// The earliest event, if any.
    pub fn peek_earliest(&self) -> Option<&Event<T>> {
        self.events.front()
    }

    /// Remove and return the earliest event.
    pub fn pop_earliest(&mut self) -> Option<Event<T>> {
        self.events.pop_front()
    }

    fn count_at_or_before(&self, time: f64) -> usize {
        self.events.partition_point(|e| e.time <= time)
    }

    fn count_before(&self, time: f64) -> usize {
        self.events.partition_point(|e| e.time < time)
    }
}
