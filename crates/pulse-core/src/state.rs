//! Discrete lifecycle states over time.
//!
//! A [`StateTimeline`] answers "which state was active at time t" for the
//! clock. It performs no legality checks; the [`Clock`](crate::Clock)
//! decides which transitions may be scheduled.

use crate::timeline::{Event, Timeline};
use std::fmt;

/// Lifecycle state of a clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum State {
    /// Not running; tick count is reset when this state is entered.
    #[default]
    Stopped,
    /// Running and emitting ticks.
    Started,
    /// Suspended; tick count is preserved.
    Paused,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            State::Stopped => "stopped",
            State::Started => "started",
            State::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// A scheduled state transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateEvent {
    /// State entered at the event time.
    pub state: State,
    /// Tick count to force when a `Started` transition is processed.
    pub offset: Option<u64>,
}

impl StateEvent {
    /// A transition without a tick offset.
    pub fn new(state: State) -> Self {
        Self { state, offset: None }
    }

    /// A transition that forces the tick count when processed.
    pub fn with_offset(state: State, offset: Option<u64>) -> Self {
        Self { state, offset }
    }
}

/// A [`Timeline`] of state transitions with a default state.
#[derive(Clone, Debug)]
pub struct StateTimeline {
    timeline: Timeline<StateEvent>,
    initial: State,
    /// Superseded transitions kept by [`prune`](Self::prune).
    history: usize,
}

impl Default for StateTimeline {
    fn default() -> Self {
        Self::new(State::Stopped)
    }
}

impl StateTimeline {
    /// Create an unbounded state timeline.
    pub fn new(initial: State) -> Self {
        Self {
            timeline: Timeline::new(),
            initial,
            history: 0,
        }
    }

    /// Create a state timeline whose [`prune`](Self::prune) keeps up to
    /// `history` superseded transitions for queries about the past.
    pub fn with_history(initial: State, history: usize) -> Self {
        Self {
            history,
            ..Self::new(initial)
        }
    }

    /// The state reported before any transition.
    pub fn initial(&self) -> State {
        self.initial
    }

    /// Number of scheduled transitions.
    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    /// Whether no transition has been scheduled.
    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// The state active at `time`.
    pub fn state_at(&self, time: f64) -> State {
        self.timeline
            .value_before_or_at(time)
            .map(|e| e.payload.state)
            .unwrap_or(self.initial)
    }

    /// The transition governing `time`, if any.
    pub fn event_at(&self, time: f64) -> Option<&Event<StateEvent>> {
        self.timeline.value_before_or_at(time)
    }

    /// Schedule `state` at `time`.
    pub fn set_state_at(&mut self, time: f64, state: State) {
        self.timeline.insert(time, StateEvent::new(state));
    }

    /// Schedule `state` at `time`, carrying a tick offset.
    pub fn set_state_with_offset(&mut self, time: f64, state: State, offset: Option<u64>) {
        self.timeline.insert(time, StateEvent::with_offset(state, offset));
    }

    /// Cancel every transition scheduled after `time`.
    pub fn cancel(&mut self, time: f64) {
        self.timeline.evict_after(time);
    }

    /// The latest transition into `state` at or before `time`.
    pub fn last_state(&self, state: State, time: f64) -> Option<&Event<StateEvent>> {
        self.timeline
            .iter_until(time)
            .rev()
            .find(|e| e.payload.state == state)
    }

    /// The next transition into `state` strictly after `time`.
    pub fn next_state(&self, state: State, time: f64) -> Option<&Event<StateEvent>> {
        self.timeline
            .iter_after(time)
            .find(|e| e.payload.state == state)
    }

    /// The earliest time in `(after, until]` at which the state differs from `from`.
    ///
    /// Transitions superseded by a later one at the same time are skipped.
    pub fn next_change(&self, after: f64, until: f64, from: State) -> Option<f64> {
        self.timeline
            .iter_after(after)
            .take_while(|e| e.time <= until)
            .map(|e| e.time)
            .find(|&t| self.state_at(t) != from)
    }

    /// Drop transitions that no longer decide the state at or after `time`.
    ///
    /// The transition in effect at `time` and everything later is always
    /// kept, plus up to the configured number of superseded ones.
    pub fn prune(&mut self, time: f64) {
        if let Some(governing) = self.timeline.value_before_or_at(time).map(|e| e.time) {
            self.timeline.trim_before(governing, self.history);
        }
    }

    /// Iterate over all scheduled transitions.
    pub fn iter(&self) -> impl Iterator<Item = &Event<StateEvent>> {
        self.timeline.iter()
    }
}
