//! Periodic drivers and time sources.
//!
//! A [`Driver`] is whatever invokes [`Clock::advance`](crate::Clock::advance):
//! a timer thread, an OS timer, or an audio render callback. Each poll
//! reports the current time together with the lookahead, the intended
//! update interval, and the lag measured between the intended and the
//! actual firing interval.
//!
//! - [`TimerDriver`] - Real-time driver over a [`TimeSource`]
//! - [`ManualDriver`] - Deterministic fake for tests and offline runs
//! - [`LagMeter`] - Smoothed lag measurement shared by both

use crate::config::{Config, LagSettings};
use std::thread;
use std::time::{Duration, Instant};

/// A monotonic source of seconds.
pub trait TimeSource: Send {
    /// Current time in seconds. Never decreases.
    fn now(&self) -> f64;
}

/// Seconds elapsed since a fixed [`Instant`].
///
/// Copies share the same origin, so a runtime thread and its callers
/// agree on what "now" means.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicTime {
    origin: Instant,
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicTime {
    /// Start counting from the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// The instant that corresponds to time zero.
    pub fn origin(&self) -> Instant {
        self.origin
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// One driver invocation's view of time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DriverTick {
    /// Current time in seconds.
    pub now: f64,
    /// How far past `now` ticks may be computed.
    pub lookahead: f64,
    /// Intended period between driver invocations.
    pub update_interval: f64,
    /// Smoothed amount by which the driver fired late.
    pub measured_lag: f64,
}

impl DriverTick {
    /// End of the scheduling window for this invocation.
    pub fn horizon(&self, lag_factor: f64) -> f64 {
        self.now + self.lookahead + self.update_interval + lag_factor * self.measured_lag
    }
}

/// Anything that can report the time for the next clock advance.
pub trait Driver {
    /// Read the current time and lag.
    fn poll(&mut self) -> DriverTick;
}

/// Measures how late a periodic driver fires.
///
/// Each observation contributes `max(0, observed_interval - update_interval)`
/// to an exponential moving average, clamped to a maximum.
#[derive(Clone, Debug)]
pub struct LagMeter {
    update_interval: f64,
    smoothing: f64,
    max_lag: f64,
    last: Option<f64>,
    lag: f64,
}

impl LagMeter {
    /// Create a meter for a driver firing every `update_interval` seconds.
    pub fn new(update_interval: f64, settings: &LagSettings) -> Self {
        Self {
            update_interval,
            smoothing: settings.smoothing.clamp(f64::EPSILON, 1.0),
            max_lag: settings.max_lag_secs(),
            last: None,
            lag: 0.0,
        }
    }

    /// Record a firing at `now` and return the updated lag.
    ///
    /// The first observation only establishes a reference point.
    pub fn observe(&mut self, now: f64) -> f64 {
        if let Some(last) = self.last {
            let excess = (now - last - self.update_interval).max(0.0);
            self.lag += self.smoothing * (excess - self.lag);
            self.lag = self.lag.clamp(0.0, self.max_lag);
        }
        self.last = Some(now);
        self.lag
    }

    /// The current smoothed lag in seconds.
    pub fn lag(&self) -> f64 {
        self.lag
    }

    /// Forget all observations.
    pub fn reset(&mut self) {
        self.last = None;
        self.lag = 0.0;
    }
}

/// Real-time driver backed by a [`TimeSource`].
pub struct TimerDriver<S: TimeSource = MonotonicTime> {
    source: S,
    lookahead: f64,
    update_interval: Duration,
    meter: LagMeter,
}

impl TimerDriver<MonotonicTime> {
    /// Create a driver over a fresh monotonic clock.
    pub fn new(config: &Config) -> Self {
        Self::with_source(MonotonicTime::new(), config)
    }
}

impl<S: TimeSource> TimerDriver<S> {
    /// Create a driver over an existing time source.
    pub fn with_source(source: S, config: &Config) -> Self {
        let scheduler = &config.scheduler;
        Self {
            source,
            lookahead: scheduler.lookahead_secs(),
            update_interval: scheduler.update_interval(),
            meter: LagMeter::new(scheduler.update_interval_secs(), &config.lag),
        }
    }

    /// The underlying time source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Current time without recording a firing.
    pub fn now(&self) -> f64 {
        self.source.now()
    }

    /// Intended period between polls.
    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// The most recent lag measurement.
    pub fn measured_lag(&self) -> f64 {
        self.meter.lag()
    }

    /// Sleep until the next intended firing.
    pub fn wait(&self) {
        thread::sleep(self.update_interval);
    }
}

impl<S: TimeSource> Driver for TimerDriver<S> {
    fn poll(&mut self) -> DriverTick {
        let now = self.source.now();
        let measured_lag = self.meter.observe(now);
        DriverTick {
            now,
            lookahead: self.lookahead,
            update_interval: self.update_interval.as_secs_f64(),
            measured_lag,
        }
    }
}

/// Deterministic driver for tests and offline rendering.
///
/// Every poll reports the current simulated time, then moves time forward
/// by the update interval plus the next entry of an optional, cyclic
/// jitter sequence. Lag is measured exactly like [`TimerDriver`] does.
#[derive(Clone, Debug)]
pub struct ManualDriver {
    now: f64,
    lookahead: f64,
    update_interval: f64,
    jitter: Vec<f64>,
    polls: usize,
    meter: LagMeter,
}

impl ManualDriver {
    /// Create a driver at time zero.
    pub fn new(lookahead: f64, update_interval: f64) -> Self {
        Self {
            now: 0.0,
            lookahead,
            update_interval,
            jitter: Vec::new(),
            polls: 0,
            meter: LagMeter::new(update_interval, &LagSettings::default()),
        }
    }

    /// Create a driver using the configured window and lag settings.
    pub fn from_config(config: &Config) -> Self {
        let scheduler = &config.scheduler;
        Self::new(scheduler.lookahead_secs(), scheduler.update_interval_secs())
            .with_lag_settings(&config.lag)
    }

    /// Start at `now` instead of zero.
    pub fn starting_at(mut self, now: f64) -> Self {
        self.now = now;
        self
    }

    /// Add `jitter[i % len]` seconds to the i-th interval.
    pub fn with_jitter(mut self, jitter: Vec<f64>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Use custom lag smoothing.
    pub fn with_lag_settings(mut self, settings: &LagSettings) -> Self {
        self.meter = LagMeter::new(self.update_interval, settings);
        self
    }

    /// The time the next poll will report.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Jump to `now`.
    pub fn set_now(&mut self, now: f64) {
        self.now = now;
    }

    /// Move time forward by `dt` seconds.
    pub fn advance_by(&mut self, dt: f64) {
        self.now += dt.max(0.0);
    }

    /// The most recent lag measurement.
    pub fn measured_lag(&self) -> f64 {
        self.meter.lag()
    }

    /// Number of polls so far.
    pub fn polls(&self) -> usize {
        self.polls
    }
}

impl Driver for ManualDriver {
    fn poll(&mut self) -> DriverTick {
        let tick = DriverTick {
            now: self.now,
            lookahead: self.lookahead,
            update_interval: self.update_interval,
            measured_lag: self.meter.observe(self.now),
        };

        let jitter = match self.jitter.len() {
            0 => 0.0,
            n => self.jitter[self.polls % n],
        };
        self.polls += 1;
        self.now += (self.update_interval + jitter).max(0.0);
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(smoothing: f64, max_lag_ms: u64) -> LagSettings {
        LagSettings {
            smoothing,
            max_lag_ms,
        }
    }

    #[test]
    fn test_lag_meter_first_observation_has_no_lag() {
        let mut meter = LagMeter::new(0.03, &settings(1.0, 250));
        assert_eq!(meter.observe(5.0), 0.0);
    }

    #[test]
    fn test_lag_meter_measures_late_firing() {
        let mut meter = LagMeter::new(0.03, &settings(1.0, 250));
        meter.observe(0.0);
        let lag = meter.observe(0.05);
        assert!((lag - 0.02).abs() < 1e-9);
        // Early firings never produce negative lag.
        let lag = meter.observe(0.06);
        assert_eq!(lag, 0.0);
    }

    #[test]
    fn test_lag_meter_smooths_and_clamps() {
        let mut meter = LagMeter::new(0.01, &settings(0.5, 20));
        meter.observe(0.0);
        let lag = meter.observe(0.03);
        assert!((lag - 0.01).abs() < 1e-9);

        let mut meter = LagMeter::new(0.01, &settings(1.0, 20));
        meter.observe(0.0);
        assert!((meter.observe(1.0) - 0.02).abs() < 1e-12);
        meter.reset();
        assert_eq!(meter.lag(), 0.0);
    }

    #[test]
    fn test_driver_tick_horizon() {
        let tick = DriverTick {
            now: 1.0,
            lookahead: 0.1,
            update_interval: 0.03,
            measured_lag: 0.01,
        };
        assert!((tick.horizon(2.0) - 1.15).abs() < 1e-12);
        assert!((tick.horizon(0.0) - 1.13).abs() < 1e-12);
    }

    #[test]
    fn test_manual_driver_steps_by_interval() {
        let mut driver = ManualDriver::new(0.05, 0.03);
        let first = driver.poll();
        let second = driver.poll();
        assert_eq!(first.now, 0.0);
        assert!((second.now - 0.03).abs() < 1e-12);
        assert!(second.measured_lag < 1e-12);
        assert_eq!(driver.polls(), 2);
    }

    #[test]
    fn test_manual_driver_jitter_produces_lag() {
        let mut driver = ManualDriver::new(0.05, 0.03)
            .with_lag_settings(&settings(1.0, 250))
            .with_jitter(vec![0.0, 0.02]);
        driver.poll();
        driver.poll();
        let third = driver.poll();
        assert!((third.now - 0.08).abs() < 1e-12);
        assert!((third.measured_lag - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_timer_driver_reports_configured_window() {
        let config = Config::default();
        let mut driver = TimerDriver::new(&config);
        let tick = driver.poll();
        assert!(tick.now >= 0.0);
        assert!((tick.lookahead - 0.1).abs() < 1e-12);
        assert!((tick.update_interval - 0.03).abs() < 1e-12);
        assert_eq!(tick.measured_lag, 0.0);
    }
}
