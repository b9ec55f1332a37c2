//! Tick-rate schedules.
//!
//! The clock asks a [`RateSchedule`] for the instantaneous tick rate at
//! every virtual tick time, including times inside the lookahead window
//! that the driver has not reached yet.
//!
//! - [`ConstantRate`] - A fixed number of ticks per second
//! - [`RateCurve`] - Step, linear and exponential automation of the rate
//! - [`SharedRate`] - A [`RateCurve`] shared between the clock and observers

use crate::timeline::Timeline;
use std::sync::{Arc, PoisonError, RwLock};

/// A time-varying tick rate, in ticks per second.
///
/// Implementations must be queryable for any time, and must not change
/// the value for times whose ticks have already been emitted.
pub trait RateSchedule: Send + Sync {
    /// Ticks per second at virtual time `time`.
    fn value_at(&self, time: f64) -> f64;
}

/// A rate that never changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantRate(pub f64);

impl RateSchedule for ConstantRate {
    fn value_at(&self, _time: f64) -> f64 {
        self.0
    }
}

/// Convert a tempo in beats per minute to ticks per second.
///
/// `ppq` is the number of ticks per quarter note.
pub fn rate_for_bpm(bpm: f64, ppq: u32) -> f64 {
    bpm / 60.0 * ppq as f64
}

/// Convert ticks per second back to beats per minute.
pub fn bpm_for_rate(rate: f64, ppq: u32) -> f64 {
    rate * 60.0 / ppq.max(1) as f64
}

/// How the curve approaches a point from the point before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RampKind {
    /// Jump to the value at the point's time.
    Step,
    /// Interpolate linearly from the previous point.
    Linear,
    /// Interpolate geometrically from the previous point.
    Exponential,
}

/// A point on a [`RateCurve`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatePoint {
    pub value: f64,
    pub kind: RampKind,
}

/// An automation curve for the tick rate.
///
/// Ramps interpolate from the nearest point before them. A ramp with no
/// earlier point holds the initial value until the ramp's end time.
#[derive(Clone, Debug)]
pub struct RateCurve {
    points: Timeline<RatePoint>,
    initial: f64,
}

impl RateCurve {
    /// Create a curve that reports `initial` until the first point.
    pub fn new(initial: f64) -> Self {
        Self {
            points: Timeline::new(),
            initial,
        }
    }

    /// The value reported before any point.
    pub fn initial(&self) -> f64 {
        self.initial
    }

    /// Number of automation points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the curve has no automation points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Jump to `value` at `time`.
    pub fn set_value_at(&mut self, value: f64, time: f64) -> &mut Self {
        log::debug!("[RATE] set {:.4} at {:.4}s", value, time);
        self.points.insert(
            time,
            RatePoint {
                value,
                kind: RampKind::Step,
            },
        );
        self
    }

    /// Ramp linearly from the previous point to `value`, arriving at `end_time`.
    pub fn linear_ramp_to(&mut self, value: f64, end_time: f64) -> &mut Self {
        log::debug!("[RATE] linear ramp to {:.4} at {:.4}s", value, end_time);
        self.points.insert(
            end_time,
            RatePoint {
                value,
                kind: RampKind::Linear,
            },
        );
        self
    }

    /// Ramp geometrically from the previous point to `value`, arriving at `end_time`.
    ///
    /// Exponential ramps are only defined between positive values, so a
    /// non-positive target is ignored.
    pub fn exponential_ramp_to(&mut self, value: f64, end_time: f64) -> &mut Self {
        if value <= 0.0 || !value.is_finite() {
            log::warn!("[RATE] Ignoring exponential ramp to non-positive value {}", value);
            return self;
        }
        log::debug!("[RATE] exponential ramp to {:.4} at {:.4}s", value, end_time);
        self.points.insert(
            end_time,
            RatePoint {
                value,
                kind: RampKind::Exponential,
            },
        );
        self
    }

    /// Remove every point after `time`.
    pub fn cancel_after(&mut self, time: f64) -> &mut Self {
        self.points.evict_after(time);
        self
    }

    /// Freeze the curve at whatever value it has at `time`.
    ///
    /// Points after `time` are removed, and a ramp in progress is cut off
    /// at its current value instead of jumping.
    pub fn cancel_and_hold(&mut self, time: f64) -> &mut Self {
        let held = self.value_at(time);
        self.points.evict_after(time);
        self.set_value_at(held, time)
    }

    /// The rate at `time`.
    pub fn value_at(&self, time: f64) -> f64 {
        let Some(before) = self.points.value_before_or_at(time) else {
            return self.initial;
        };
        let (t0, v0) = (before.time, before.payload.value);

        let Some(after) = self.points.value_after(time) else {
            return v0;
        };
        let (t1, v1) = (after.time, after.payload.value);
        let progress = ((time - t0) / (t1 - t0)).clamp(0.0, 1.0);

        match after.payload.kind {
            RampKind::Step => v0,
            RampKind::Linear => v0 + (v1 - v0) * progress,
            RampKind::Exponential if v0 > 0.0 => v0 * (v1 / v0).powf(progress),
            RampKind::Exponential => v0 + (v1 - v0) * progress,
        }
    }
}

impl RateSchedule for RateCurve {
    fn value_at(&self, time: f64) -> f64 {
        RateCurve::value_at(self, time)
    }
}

/// Thread-safe handle to a [`RateCurve`].
///
/// Clones share the same curve, so a tempo display or controller can
/// observe and edit the rate the clock is reading.
#[derive(Clone, Debug)]
pub struct SharedRate {
    curve: Arc<RwLock<RateCurve>>,
}

impl SharedRate {
    /// Create a shared curve starting at `initial` ticks per second.
    pub fn new(initial: f64) -> Self {
        Self::from_curve(RateCurve::new(initial))
    }

    /// Share an existing curve.
    pub fn from_curve(curve: RateCurve) -> Self {
        Self {
            curve: Arc::new(RwLock::new(curve)),
        }
    }

    /// Read the curve with a closure.
    pub fn with_read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RateCurve) -> R,
    {
        let curve = self.curve.read().unwrap_or_else(PoisonError::into_inner);
        f(&curve)
    }

    /// Edit the curve with a closure.
    pub fn with_write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut RateCurve) -> R,
    {
        let mut curve = self.curve.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut curve)
    }

    /// Jump to `value` at `time`.
    pub fn set_value_at(&self, value: f64, time: f64) {
        self.with_write(|c| {
            c.set_value_at(value, time);
        });
    }

    /// Ramp linearly to `value` by `end_time`.
    pub fn linear_ramp_to(&self, value: f64, end_time: f64) {
        self.with_write(|c| {
            c.linear_ramp_to(value, end_time);
        });
    }

    /// Ramp geometrically to `value` by `end_time`.
    pub fn exponential_ramp_to(&self, value: f64, end_time: f64) {
        self.with_write(|c| {
            c.exponential_ramp_to(value, end_time);
        });
    }

    /// Freeze the rate at its value at `time`.
    pub fn cancel_and_hold(&self, time: f64) {
        self.with_write(|c| {
            c.cancel_and_hold(time);
        });
    }
}

impl RateSchedule for SharedRate {
    fn value_at(&self, time: f64) -> f64 {
        self.with_read(|c| c.value_at(time))
    }
}
