//! Pulse Core - Lookahead tick scheduling over time-ordered timelines.
//!
//! This crate provides the building blocks for a sample-accurate clock:
//!
//! - **Timeline** - Time-ordered event storage with neighbour queries
//! - **State** - Started/stopped/paused transitions on a timeline
//! - **Rate** - Constant and automated tick rates
//! - **Clock** - Lookahead tick emission with lifecycle notifications
//! - **Driver** - Periodic drivers and lag measurement
//! - **Runtime** - A clock driven on its own thread
//!
//! # Architecture
//!
//! A periodic [`Driver`] reports the current time and its measured lag.
//! The [`Clock`] turns that into a scheduling horizon and emits every
//! tick up to it, reading the tick rate from a [`RateSchedule`] and the
//! transport state from a [`StateTimeline`]. Ticks carry their exact
//! virtual time, so a listener can schedule work ahead of the driver
//! without inheriting its jitter.

pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod rate;
pub mod runtime;
pub mod state;
pub mod timeline;

// Re-export main types for convenience
pub use clock::{Clock, Tick};
pub use config::{Config, LagSettings, SchedulerSettings};
pub use driver::{Driver, DriverTick, LagMeter, ManualDriver, MonotonicTime, TimeSource, TimerDriver};
pub use error::{Error, Result};
pub use rate::{
    bpm_for_rate, rate_for_bpm, ConstantRate, RampKind, RateCurve, RatePoint, RateSchedule,
    SharedRate,
};
pub use runtime::{ClockCommand, ClockEvent, Runtime, RuntimeHandle, RuntimeStatus};
pub use state::{State, StateEvent, StateTimeline};
pub use timeline::{Event, Timeline};
