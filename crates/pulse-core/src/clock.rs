//! Sample-accurate tick clock.
//!
//! The [`Clock`] walks a virtual tick cursor forward through time,
//! spacing ticks by the reciprocal of the rate reported by its
//! [`RateSchedule`] at each tick time. A periodic driver calls
//! [`Clock::advance`] on an irregular schedule; each call computes ticks
//! up to a horizon slightly past `now`, so driver jitter never reaches the
//! listener. How the calls are chunked has no effect on which ticks are
//! emitted or when.
//!
//! Start, stop and pause are scheduled on a [`StateTimeline`] and only
//! take effect when the cursor reaches them. Each state boundary produces
//! exactly one lifecycle notification.

use crate::config::{SchedulerSettings, DEFAULT_LAG_FACTOR};
use crate::driver::{Driver, DriverTick};
use crate::error::{Error, Result};
use crate::rate::RateSchedule;
use crate::state::{State, StateTimeline};
use std::fmt;
use std::sync::Arc;

/// One emitted tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick {
    /// Virtual time of the tick in seconds.
    pub time: f64,
    /// Ticks emitted since the last start from `Stopped` (or the start offset).
    pub index: u64,
}

type TickCallback = Box<dyn FnMut(Tick) + Send>;
type StartCallback = Box<dyn FnMut(f64, u64) + Send>;
type TimeCallback = Box<dyn FnMut(f64) + Send>;

/// A scheduler that invokes a callback once per tick while started.
pub struct Clock {
    rate: Arc<dyn RateSchedule>,
    state: StateTimeline,
    tick_count: u64,
    next_tick_time: f64,
    last_observed_state: State,
    lag_factor: f64,
    on_tick: TickCallback,
    on_start: Option<StartCallback>,
    on_stop: Option<TimeCallback>,
    on_pause: Option<TimeCallback>,
}

impl Clock {
    /// Create a stopped clock that reads its rate from `rate`.
    pub fn new<F>(rate: Arc<dyn RateSchedule>, callback: F) -> Self
    where
        F: FnMut(Tick) + Send + 'static,
    {
        Self {
            rate,
            state: StateTimeline::new(State::Stopped),
            tick_count: 0,
            next_tick_time: 0.0,
            last_observed_state: State::Stopped,
            lag_factor: DEFAULT_LAG_FACTOR,
            on_tick: Box::new(callback),
            on_start: None,
            on_stop: None,
            on_pause: None,
        }
    }

    /// Create a stopped clock using the configured lag factor and state history.
    pub fn with_settings<F>(
        rate: Arc<dyn RateSchedule>,
        settings: &SchedulerSettings,
        callback: F,
    ) -> Self
    where
        F: FnMut(Tick) + Send + 'static,
    {
        let mut clock = Self::new(rate, callback);
        clock.lag_factor = settings.lag_factor;
        clock.state = StateTimeline::with_history(State::Stopped, settings.state_history);
        clock
    }

    /// Called with the transition time and tick count when the clock starts.
    pub fn on_start<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(f64, u64) + Send + 'static,
    {
        self.on_start = Some(Box::new(f));
        self
    }

    /// Called with the transition time when the clock stops.
    pub fn on_stop<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.on_stop = Some(Box::new(f));
        self
    }

    /// Called with the transition time when the clock pauses.
    pub fn on_pause<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.on_pause = Some(Box::new(f));
        self
    }

    /// Schedule a start at `at`.
    ///
    /// When the transition is processed the cursor snaps to exactly `at`,
    /// and the tick count is forced to `offset` if one is given. Starting
    /// at a time where the clock is already started does nothing.
    pub fn start(&mut self, at: f64, offset: Option<u64>) -> &mut Self {
        if self.state.state_at(at) != State::Started {
            log::debug!("[CLOCK] start scheduled at {:.6}s (offset {:?})", at, offset);
            self.state.set_state_with_offset(at, State::Started, offset);
        }
        self
    }

    /// Schedule a stop at `at`, cancelling every transition after it.
    pub fn stop(&mut self, at: f64) -> &mut Self {
        log::debug!("[CLOCK] stop scheduled at {:.6}s", at);
        self.state.cancel(at);
        self.state.set_state_at(at, State::Stopped);
        self
    }

    /// Schedule a pause at `at`. Ignored unless the clock is started at `at`.
    pub fn pause(&mut self, at: f64) -> &mut Self {
        if self.state.state_at(at) == State::Started {
            log::debug!("[CLOCK] pause scheduled at {:.6}s", at);
            self.state.set_state_at(at, State::Paused);
        } else {
            log::debug!("[CLOCK] pause at {:.6}s ignored (not started)", at);
        }
        self
    }

    /// The scheduled state at `time`.
    pub fn state_at(&self, time: f64) -> State {
        self.state.state_at(time)
    }

    /// The state most recently crossed by the tick cursor.
    pub fn state(&self) -> State {
        self.last_observed_state
    }

    /// Ticks emitted since the last start from `Stopped`.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Virtual time of the next tick that has not been emitted yet.
    pub fn next_tick_time(&self) -> f64 {
        self.next_tick_time
    }

    /// The scheduled state transitions.
    pub fn states(&self) -> &StateTimeline {
        &self.state
    }

    /// Multiplier applied to the measured lag when computing the horizon.
    pub fn lag_factor(&self) -> f64 {
        self.lag_factor
    }

    /// Change the lag multiplier.
    pub fn set_lag_factor(&mut self, lag_factor: f64) {
        self.lag_factor = lag_factor.max(0.0);
    }

    /// End of the scheduling window for the given driver values.
    pub fn horizon(&self, now: f64, lookahead: f64, update_interval: f64, measured_lag: f64) -> f64 {
        DriverTick {
            now,
            lookahead,
            update_interval,
            measured_lag,
        }
        .horizon(self.lag_factor)
    }

    /// Emit every tick and lifecycle notification up to the horizon.
    ///
    /// The cursor never steps over a state change: a step that would cross
    /// one lands on the change instead, so every boundary is observed and a
    /// start tick is emitted as soon as the horizon reaches it.
    ///
    /// On [`Error::InvalidRate`] the cursor stays on the tick whose rate
    /// was rejected, so a corrected rate resumes from there.
    pub fn advance(
        &mut self,
        now: f64,
        lookahead: f64,
        update_interval: f64,
        measured_lag: f64,
    ) -> Result<()> {
        let horizon = self.horizon(now, lookahead, update_interval, measured_lag);
        let mut emitted = 0usize;

        while self.next_tick_time <= horizon {
            let current = self.state.state_at(self.next_tick_time);
            if current != self.last_observed_state {
                self.cross_boundary(current);
            }

            let tick_time = self.next_tick_time;
            let rate = self.rate.value_at(tick_time);
            if !(rate.is_finite() && rate > 0.0) {
                return Err(Error::InvalidRate {
                    time: tick_time,
                    rate,
                });
            }

            if current == State::Started {
                (self.on_tick)(Tick {
                    time: tick_time,
                    index: self.tick_count,
                });
                self.tick_count += 1;
                emitted += 1;
            }

            let step = tick_time + 1.0 / rate;
            self.next_tick_time = self
                .state
                .next_change(tick_time, step, current)
                .unwrap_or(step);
        }
        self.state.prune(self.next_tick_time);

        log::trace!(
            "[CLOCK] advanced to {:.6}s (horizon {:.6}s, {} ticks)",
            self.next_tick_time,
            horizon,
            emitted
        );
        Ok(())
    }

    /// [`advance`](Self::advance) with values reported by a driver.
    pub fn advance_with(&mut self, tick: DriverTick) -> Result<()> {
        self.advance(tick.now, tick.lookahead, tick.update_interval, tick.measured_lag)
    }

    /// Poll `driver` once and advance.
    pub fn drive<D: Driver + ?Sized>(&mut self, driver: &mut D) -> Result<DriverTick> {
        let tick = driver.poll();
        self.advance_with(tick)?;
        Ok(tick)
    }

    fn cross_boundary(&mut self, current: State) {
        self.last_observed_state = current;

        let (time, offset) = match self.state.event_at(self.next_tick_time) {
            Some(event) => (event.time, event.payload.offset),
            None => (self.next_tick_time, None),
        };

        match current {
            State::Started => {
                self.next_tick_time = time;
                if let Some(offset) = offset {
                    self.tick_count = offset;
                }
                log::debug!("[CLOCK] started at {:.6}s (tick {})", time, self.tick_count);
                if let Some(cb) = self.on_start.as_mut() {
                    cb(time, self.tick_count);
                }
            }
            State::Stopped => {
                self.tick_count = 0;
                log::debug!("[CLOCK] stopped at {:.6}s", time);
                if let Some(cb) = self.on_stop.as_mut() {
                    cb(time);
                }
            }
            State::Paused => {
                log::debug!("[CLOCK] paused at {:.6}s (tick {})", time, self.tick_count);
                if let Some(cb) = self.on_pause.as_mut() {
                    cb(time);
                }
            }
        }
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("state", &self.last_observed_state)
            .field("tick_count", &self.tick_count)
            .field("next_tick_time", &self.next_tick_time)
            .field("lag_factor", &self.lag_factor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ManualDriver;
    use crate::rate::{ConstantRate, RateCurve, SharedRate};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    enum Seen {
        Tick(f64, u64),
        Start(f64, u64),
        Stop(f64),
        Pause(f64),
    }

    type Log = Arc<Mutex<Vec<Seen>>>;

    fn recording_clock(rate: Arc<dyn RateSchedule>) -> (Clock, Log) {
        let _ = env_logger::builder().is_test(true).try_init();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let ticks = log.clone();
        let mut clock = Clock::new(rate, move |tick| {
            ticks.lock().unwrap().push(Seen::Tick(tick.time, tick.index));
        });
        let starts = log.clone();
        let stops = log.clone();
        let pauses = log.clone();
        clock
            .on_start(move |t, n| starts.lock().unwrap().push(Seen::Start(t, n)))
            .on_stop(move |t| stops.lock().unwrap().push(Seen::Stop(t)))
            .on_pause(move |t| pauses.lock().unwrap().push(Seen::Pause(t)));
        (clock, log)
    }

    fn ticks(log: &Log) -> Vec<(f64, u64)> {
        log.lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Seen::Tick(t, n) => Some((*t, *n)),
                _ => None,
            })
            .collect()
    }

    fn constant(rate: f64) -> Arc<dyn RateSchedule> {
        Arc::new(ConstantRate(rate))
    }

    #[test]
    fn test_new_clock_is_stopped() {
        let (clock, _) = recording_clock(constant(2.0));
        assert_eq!(clock.state(), State::Stopped);
        assert_eq!(clock.state_at(100.0), State::Stopped);
        assert_eq!(clock.tick_count(), 0);
        assert!((clock.lag_factor() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_start_is_not_applied_until_advanced() {
        let (mut clock, log) = recording_clock(constant(2.0));
        clock.start(1.0, None);
        assert_eq!(clock.state(), State::Stopped);
        assert_eq!(clock.state_at(1.0), State::Started);
        clock.advance(0.0, 0.5, 0.0, 0.0).unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_scenario_two_ticks_per_second() {
        let (mut clock, log) = recording_clock(constant(2.0));
        clock.start(0.0, None);

        let mut now = 0.0;
        while now <= 1.0 + 1e-12 {
            clock.advance(now, 0.05, 0.03, 0.0).unwrap();
            now += 0.03;
        }

        let got = ticks(&log);
        // Last call: now ~= 0.99, horizon ~= 1.07, so ticks 0.0, 0.5, 1.0.
        assert_eq!(got.len(), 3);
        for (i, (time, index)) in got.iter().enumerate() {
            assert!((time - 0.5 * i as f64).abs() < 1e-9);
            assert_eq!(*index, i as u64);
        }
        assert_eq!(log.lock().unwrap()[0], Seen::Start(0.0, 0));
    }

    #[test]
    fn test_constant_rate_spacing() {
        let (mut clock, log) = recording_clock(constant(7.0));
        clock.start(0.25, None);
        clock.advance(3.0, 0.0, 0.0, 0.0).unwrap();
        let got = ticks(&log);
        assert!(got.len() > 10);
        for pair in got.windows(2) {
            assert!((pair[1].0 - pair[0].0 - 1.0 / 7.0).abs() < 1e-9);
            assert_eq!(pair[1].1, pair[0].1 + 1);
        }
        assert!((got[0].0 - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_offset_applies_when_processed() {
        let (mut clock, log) = recording_clock(constant(3.0));
        clock.start(5.0, Some(3));
        assert_eq!(clock.tick_count(), 0);

        clock.advance(5.5, 0.0, 0.0, 0.0).unwrap();
        let got = ticks(&log);
        assert_eq!(got.len(), 2);
        assert!((got[0].0 - 5.0).abs() < 1e-12);
        assert_eq!(got[0].1, 3);
        assert!((got[1].0 - (5.0 + 1.0 / 3.0)).abs() < 1e-12);
        assert_eq!(got[1].1, 4);
        assert_eq!(log.lock().unwrap()[0], Seen::Start(5.0, 3));
    }

    #[test]
    fn test_start_discards_drift_from_idle_cursor() {
        // At 3 ticks/s the idle cursor never lands on 5.0 exactly.
        let (mut clock, log) = recording_clock(constant(3.0));
        clock.start(5.05, None);
        clock.advance(6.0, 0.0, 0.0, 0.0).unwrap();
        let got = ticks(&log);
        assert!((got[0].0 - 5.05).abs() < 1e-12);
        assert!((got[1].0 - (5.05 + 1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_stop_resets_tick_count() {
        let (mut clock, log) = recording_clock(constant(2.0));
        clock.start(0.0, None).stop(2.0);
        clock.advance(3.0, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(clock.state_at(2.0), State::Stopped);
        assert_eq!(clock.tick_count(), 0);
        assert_eq!(ticks(&log).len(), 4);

        log.lock().unwrap().clear();
        clock.start(4.0, None);
        clock.advance(4.0, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(ticks(&log), vec![(4.0, 0)]);
    }

    #[test]
    fn test_stop_before_pending_start_cancels_it() {
        let (mut clock, log) = recording_clock(constant(2.0));
        clock.start(10.0, None);
        clock.stop(8.0);
        assert_eq!(clock.state_at(12.0), State::Stopped);
        clock.advance(20.0, 0.0, 0.0, 0.0).unwrap();
        assert!(ticks(&log).is_empty());
    }

    #[test]
    fn test_start_while_started_is_noop() {
        let (mut clock, _) = recording_clock(constant(2.0));
        clock.start(1.0, None).start(2.0, Some(9));
        assert_eq!(clock.states().len(), 1);
    }

    #[test]
    fn test_pause_while_not_started_is_ignored() {
        let (mut clock, _) = recording_clock(constant(2.0));
        clock.pause(1.0);
        assert!(clock.states().is_empty());
        clock.start(2.0, None).pause(1.0);
        assert_eq!(clock.states().len(), 1);
        assert_eq!(clock.state_at(1.5), State::Stopped);
    }

    #[test]
    fn test_pause_keeps_tick_count_and_resume_snaps_cursor() {
        let (mut clock, log) = recording_clock(constant(2.0));
        clock.start(0.0, None).pause(1.2).start(3.1, None);
        clock.advance(4.0, 0.0, 0.0, 0.0).unwrap();

        let got = ticks(&log);
        let times: Vec<f64> = got.iter().map(|t| t.0).collect();
        let indices: Vec<u64> = got.iter().map(|t| t.1).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!((times[2] - 1.0).abs() < 1e-12);
        assert!((times[3] - 3.1).abs() < 1e-12);
        assert!((times[4] - 3.6).abs() < 1e-12);

        let seen = log.lock().unwrap().clone();
        assert!(seen.contains(&Seen::Pause(1.2)));
        assert!(seen.contains(&Seen::Start(3.1, 3)));
    }

    #[test]
    fn test_no_ticks_while_paused_or_stopped() {
        let (mut clock, log) = recording_clock(constant(10.0));
        clock.start(0.0, None).pause(1.0);
        clock.advance(5.0, 0.0, 0.0, 0.0).unwrap();
        let got = ticks(&log);
        assert!(got.iter().all(|(t, _)| *t < 1.0));
        assert_eq!(clock.state(), State::Paused);
        assert!(clock.next_tick_time() > 5.0);
    }

    #[test]
    fn test_each_boundary_notifies_once() {
        let (mut clock, log) = recording_clock(constant(4.0));
        clock.start(0.5, None).pause(1.0).start(1.5, None).stop(2.0);

        let mut driver = ManualDriver::new(0.05, 0.01);
        for _ in 0..300 {
            clock.drive(&mut driver).unwrap();
        }

        let lifecycle: Vec<Seen> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|s| !matches!(s, Seen::Tick(..)))
            .cloned()
            .collect();
        assert_eq!(
            lifecycle,
            vec![
                Seen::Start(0.5, 0),
                Seen::Pause(1.0),
                Seen::Start(1.5, 2),
                Seen::Stop(2.0),
            ]
        );
    }

    #[test]
    fn test_lag_widens_horizon() {
        let (mut clock, log) = recording_clock(constant(10.0));
        clock.start(0.0, None);
        clock.advance(0.0, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(ticks(&log).len(), 1);

        // Horizon 0.2 + 2 * 0.12 = 0.44 -> ticks at 0.1 .. 0.4.
        clock.advance(0.2, 0.0, 0.0, 0.12).unwrap();
        assert_eq!(ticks(&log).len(), 5);

        clock.set_lag_factor(0.0);
        clock.advance(0.45, 0.0, 0.0, 1.0).unwrap();
        assert_eq!(ticks(&log).len(), 5);
    }

    #[test]
    fn test_invalid_rate_halts_and_resumes() {
        let rate = SharedRate::new(2.0);
        rate.set_value_at(0.0, 1.0);
        let (mut clock, log) = recording_clock(Arc::new(rate.clone()));
        clock.start(0.0, None);

        let err = clock.advance(2.0, 0.0, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, Error::InvalidRate { time, rate } if (time - 1.0).abs() < 1e-12 && rate == 0.0));
        assert!((clock.next_tick_time() - 1.0).abs() < 1e-12);
        assert_eq!(ticks(&log).len(), 2);

        // Retrying without a fix fails at the same place.
        assert!(clock.advance(2.0, 0.0, 0.0, 0.0).is_err());
        assert_eq!(ticks(&log).len(), 2);

        rate.with_write(|c| {
            c.cancel_after(0.5).set_value_at(4.0, 1.0);
        });
        clock.advance(2.0, 0.0, 0.0, 0.0).unwrap();
        let got = ticks(&log);
        assert_eq!(got.len(), 7);
        assert!((got[2].0 - 1.0).abs() < 1e-12);
        assert_eq!(got[2].1, 2);
    }

    #[test]
    fn test_nan_rate_is_rejected() {
        let (mut clock, _) = recording_clock(constant(f64::NAN));
        clock.start(0.0, None);
        assert!(matches!(
            clock.advance(1.0, 0.0, 0.0, 0.0),
            Err(Error::InvalidRate { .. })
        ));
    }

    #[test]
    fn test_variable_rate_tracks_ramp() {
        let mut curve = RateCurve::new(1.0);
        curve.set_value_at(2.0, 0.0).linear_ramp_to(8.0, 4.0);
        let curve = Arc::new(curve);
        let (mut clock, log) = recording_clock(curve.clone());
        clock.start(0.0, None);
        clock.advance(4.0, 0.0, 0.0, 0.0).unwrap();

        let got = ticks(&log);
        for pair in got.windows(2) {
            let expected = 1.0 / curve.value_at(pair[0].0);
            assert!((pair[1].0 - pair[0].0 - expected).abs() < 1e-9);
        }
        // Spacing shrinks as the rate ramps up.
        let first_gap = got[1].0 - got[0].0;
        let last_gap = got[got.len() - 1].0 - got[got.len() - 2].0;
        assert!(last_gap < first_gap);
    }

    fn schedule(clock: &mut Clock) {
        clock
            .start(0.1, None)
            .pause(1.37)
            .start(2.0, None)
            .stop(3.3)
            .start(3.9, Some(40))
            .stop(6.2);
    }

    fn tempo_ramp() -> Arc<dyn RateSchedule> {
        let mut curve = RateCurve::new(3.0);
        curve
            .set_value_at(3.0, 0.0)
            .linear_ramp_to(11.0, 2.5)
            .exponential_ramp_to(5.0, 5.0)
            .set_value_at(7.0, 5.5);
        Arc::new(curve)
    }

    #[test]
    fn test_rechunking_is_invisible() {
        let (mut whole, whole_log) = recording_clock(tempo_ramp());
        schedule(&mut whole);
        whole.advance(7.0, 0.0, 0.0, 0.0).unwrap();
        let expected = whole_log.lock().unwrap().clone();
        assert!(ticks(&whole_log).len() > 20);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let (mut chunked, chunked_log) = recording_clock(tempo_ramp());
            schedule(&mut chunked);
            let mut now: f64 = 0.0;
            while now < 7.0 {
                now = (now + rng.random_range(0.001..0.4)).min(7.0);
                let lookahead: f64 = rng.random_range(0.0..0.1);
                let lag: f64 = rng.random_range(0.0..0.05);
                let horizon_cap = 7.0 - now;
                // Never look past the single-pass horizon.
                let lookahead = lookahead.min(horizon_cap);
                let lag = lag.min((horizon_cap - lookahead).max(0.0) / 2.0);
                chunked.advance(now, lookahead, 0.0, lag).unwrap();
            }
            assert_eq!(*chunked_log.lock().unwrap(), expected);
        }
    }

    #[test]
    fn test_with_settings_applies_history_and_factor() {
        let settings = SchedulerSettings {
            lag_factor: 1.0,
            state_history: 1,
            ..SchedulerSettings::default()
        };
        let mut clock = Clock::with_settings(constant(2.0), &settings, |_| {});
        clock.start(1.0, None).pause(2.0).start(3.0, None).stop(4.0);
        clock.advance(3.2, 0.0, 0.0, 0.0).unwrap();
        // start(3.0) governs, pause(2.0) is kept as history, start(1.0) is gone.
        assert_eq!(clock.states().len(), 3);
        assert_eq!(clock.state_at(2.5), State::Paused);
        assert!((clock.horizon(1.0, 0.1, 0.0, 0.5) - 1.6).abs() < 1e-12);
    }

    #[test]
    fn test_transitions_within_one_period_are_all_observed() {
        let (mut clock, log) = recording_clock(constant(2.0));
        clock.start(0.0, None).stop(2.2).start(2.3, None);
        clock.advance(3.0, 0.0, 0.0, 0.0).unwrap();

        let seen = log.lock().unwrap().clone();
        let stop = seen.iter().position(|s| *s == Seen::Stop(2.2)).unwrap();
        let restart = seen.iter().position(|s| *s == Seen::Start(2.3, 0)).unwrap();
        assert_eq!(seen[stop - 1], Seen::Tick(2.0, 4));
        assert_eq!(restart, stop + 1);
        assert_eq!(seen[restart + 1], Seen::Tick(2.3, 0));
        assert!(matches!(seen[restart + 2], Seen::Tick(t, 1) if (t - 2.8).abs() < 1e-9));
        assert_eq!(seen.len(), restart + 3);
    }

    #[test]
    fn test_pause_and_resume_within_one_period() {
        let (mut clock, log) = recording_clock(constant(2.0));
        clock.start(0.0, None).pause(1.2).start(1.3, None);
        clock.advance(2.0, 0.0, 0.0, 0.0).unwrap();

        let seen = log.lock().unwrap().clone();
        assert_eq!(
            &seen[..6],
            &[
                Seen::Start(0.0, 0),
                Seen::Tick(0.0, 0),
                Seen::Tick(0.5, 1),
                Seen::Tick(1.0, 2),
                Seen::Pause(1.2),
                Seen::Start(1.3, 3),
            ]
        );
        assert_eq!(seen[6], Seen::Tick(1.3, 3));
        assert!(matches!(seen[7], Seen::Tick(t, 4) if (t - 1.8).abs() < 1e-9));
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn test_start_tick_emitted_once_horizon_reaches_it() {
        let (mut clock, log) = recording_clock(constant(0.5));
        clock.start(4.1, None);

        let lookahead = 0.05;
        for i in 0..200 {
            let now = i as f64 * 0.03;
            clock.advance(now, lookahead, 0.0, 0.0).unwrap();
            if now + lookahead >= 4.1 {
                assert_eq!(ticks(&log), vec![(4.1, 0)]);
                return;
            }
            assert!(ticks(&log).is_empty(), "early tick at now {}", now);
        }
        panic!("horizon never reached the start");
    }

    #[test]
    fn test_passed_transitions_are_pruned() {
        let (mut clock, log) = recording_clock(constant(4.0));
        for k in 0..50 {
            let at = 2.0 * k as f64;
            clock.start(at, None).stop(at + 1.0);
        }
        assert_eq!(clock.states().len(), 100);

        clock.advance(200.0, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(clock.states().len(), 1);
        assert_eq!(clock.state(), State::Stopped);
        assert_eq!(ticks(&log).len(), 200);
    }

    #[test]
    fn test_pruning_never_drops_pending_transitions() {
        let settings = SchedulerSettings::default();
        let mut clock = Clock::with_settings(constant(2.0), &settings, |_| {});
        clock.start(1.0, None).pause(2.0).start(3.0, None);
        clock.advance(0.5, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(clock.states().len(), 3);

        clock.advance(2.2, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(clock.tick_count(), 2);
        assert_eq!(clock.state(), State::Paused);
        assert_eq!(clock.states().len(), 2);
        assert_eq!(clock.state_at(3.0), State::Started);
    }
}
