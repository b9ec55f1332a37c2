//! Pulse Runtime - Drives a clock in real time.
//!
//! The runtime manages:
//! - The runtime thread and its timer driver
//! - Start/stop/pause commands from any thread
//! - Forwarding ticks and lifecycle notifications to listeners

pub mod thread;

pub use thread::{ClockCommand, ClockEvent, Runtime, RuntimeHandle, RuntimeStatus};
