//! Runtime thread for pulse.
//!
//! The runtime thread is the production periodic driver. It:
//! - Owns the [`Clock`] and a [`TimerDriver`]
//! - Applies start/stop/pause commands sent through [`RuntimeHandle`]
//! - Advances the clock every update interval
//! - Forwards ticks and lifecycle notifications as [`ClockEvent`]s

use crate::clock::{Clock, Tick};
use crate::config::Config;
use crate::driver::{Driver, MonotonicTime, TimeSource, TimerDriver};
use crate::error::{Error, Result};
use crate::rate::RateSchedule;
use crate::state::State;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A scheduling request for the runtime's clock.
///
/// `at` is in runtime seconds (see [`RuntimeHandle::now`]); `None` means
/// the moment the runtime thread receives the command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClockCommand {
    Start { at: Option<f64>, offset: Option<u64> },
    Stop { at: Option<f64> },
    Pause { at: Option<f64> },
}

/// Output of the runtime's clock.
#[derive(Clone, Debug, PartialEq)]
pub enum ClockEvent {
    /// A tick was emitted.
    Tick(Tick),
    /// The clock crossed into `Started`.
    Started { time: f64, tick_count: u64 },
    /// The clock crossed into `Stopped`.
    Stopped { time: f64 },
    /// The clock crossed into `Paused`.
    Paused { time: f64 },
    /// Advancing failed; the clock resumes once the cause is fixed.
    Fault(String),
}

/// Snapshot of the runtime after its latest advance.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RuntimeStatus {
    /// Driver time of the latest advance.
    pub now: f64,
    /// Lag measured at the latest advance.
    pub measured_lag: f64,
    /// State most recently crossed by the tick cursor.
    pub state: State,
    /// Clock tick count.
    pub tick_count: u64,
    /// Virtual time of the next pending tick.
    pub next_tick_time: f64,
    /// Whether the latest advance failed.
    pub faulted: bool,
}

/// Handle to a running [`Runtime`].
///
/// Handles are cheap to clone and can be used from any thread. Events
/// accumulate until they are received, so a handle owner should drain
/// [`events`](Self::events) while the runtime is running.
#[derive(Clone)]
pub struct RuntimeHandle {
    /// Sender for clock commands.
    command_tx: Sender<ClockCommand>,
    /// Receiver for clock output.
    event_rx: Receiver<ClockEvent>,
    /// Status published by the runtime thread.
    status: Arc<RwLock<RuntimeStatus>>,
    /// Flag to signal shutdown.
    shutdown: Arc<AtomicBool>,
    /// Time base shared with the runtime thread.
    time: MonotonicTime,
}

impl RuntimeHandle {
    /// Send a command to the runtime thread.
    pub fn send(&self, command: ClockCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::RuntimeStopped)
    }

    /// Schedule a start.
    pub fn start(&self, at: Option<f64>, offset: Option<u64>) -> Result<()> {
        self.send(ClockCommand::Start { at, offset })
    }

    /// Schedule a stop.
    pub fn stop(&self, at: Option<f64>) -> Result<()> {
        self.send(ClockCommand::Stop { at })
    }

    /// Schedule a pause.
    pub fn pause(&self, at: Option<f64>) -> Result<()> {
        self.send(ClockCommand::Pause { at })
    }

    /// Current runtime time in seconds.
    pub fn now(&self) -> f64 {
        self.time.now()
    }

    /// The latest published status.
    pub fn status(&self) -> RuntimeStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// A receiver for clock output.
    pub fn events(&self) -> Receiver<ClockEvent> {
        self.event_rx.clone()
    }

    /// Receive one event without blocking.
    pub fn try_recv_event(&self) -> Option<ClockEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for one event.
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<ClockEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Signal the runtime to shut down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// A clock driven in real time on its own thread.
pub struct Runtime {
    /// Handle for interacting with the runtime.
    handle: RuntimeHandle,
    /// Join handle for the runtime thread.
    thread_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Start a runtime with the default configuration.
    pub fn start_default(rate: Arc<dyn RateSchedule>) -> Result<Self> {
        Self::start(Config::default(), rate)
    }

    /// Start a runtime.
    ///
    /// The clock begins stopped; send [`ClockCommand::Start`] to run it.
    pub fn start(config: Config, rate: Arc<dyn RateSchedule>) -> Result<Self> {
        config.validate()?;

        let time = MonotonicTime::new();
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let status = Arc::new(RwLock::new(RuntimeStatus::default()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = RuntimeHandle {
            command_tx,
            event_rx,
            status: status.clone(),
            shutdown: shutdown.clone(),
            time,
        };

        log::info!(
            "[RUNTIME] Starting (lookahead {}ms, update interval {}ms, lag factor {})",
            config.scheduler.lookahead_ms,
            config.scheduler.update_interval_ms,
            config.scheduler.lag_factor
        );
        let thread_handle = thread::Builder::new()
            .name("pulse-runtime".to_string())
            .spawn(move || {
                let mut rt = RuntimeThread::new(&config, time, rate, command_rx, event_tx, status);
                rt.run(shutdown);
            })
            .map_err(|e| Error::Thread(e.to_string()))?;

        Ok(Self {
            handle,
            thread_handle: Some(thread_handle),
        })
    }

    /// Get a handle to interact with the runtime.
    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// Shut down the runtime and wait for its thread.
    pub fn shutdown(mut self) -> Result<()> {
        self.join()
    }

    fn join(&mut self) -> Result<()> {
        self.handle.shutdown();
        match self.thread_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Thread("runtime thread panicked".to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            log::warn!("[RUNTIME] {}", e);
        }
    }
}

/// The thread that owns and drives the clock.
struct RuntimeThread {
    clock: Clock,
    driver: TimerDriver<MonotonicTime>,
    command_rx: Receiver<ClockCommand>,
    event_tx: Sender<ClockEvent>,
    status: Arc<RwLock<RuntimeStatus>>,
    faulted: bool,
}

impl RuntimeThread {
    fn new(
        config: &Config,
        time: MonotonicTime,
        rate: Arc<dyn RateSchedule>,
        command_rx: Receiver<ClockCommand>,
        event_tx: Sender<ClockEvent>,
        status: Arc<RwLock<RuntimeStatus>>,
    ) -> Self {
        let tick_tx = event_tx.clone();
        let mut clock = Clock::with_settings(rate, &config.scheduler, move |tick| {
            let _ = tick_tx.send(ClockEvent::Tick(tick));
        });

        let start_tx = event_tx.clone();
        let stop_tx = event_tx.clone();
        let pause_tx = event_tx.clone();
        clock
            .on_start(move |time, tick_count| {
                let _ = start_tx.send(ClockEvent::Started { time, tick_count });
            })
            .on_stop(move |time| {
                let _ = stop_tx.send(ClockEvent::Stopped { time });
            })
            .on_pause(move |time| {
                let _ = pause_tx.send(ClockEvent::Paused { time });
            });

        Self {
            clock,
            driver: TimerDriver::with_source(time, config),
            command_rx,
            event_tx,
            status,
            faulted: false,
        }
    }

    fn run(&mut self, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Relaxed) {
            self.drain_commands();
            self.tick();
            self.driver.wait();
        }
        log::info!("[RUNTIME] Stopped");
    }

    /// Apply all pending commands to the clock.
    fn drain_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            let now = self.driver.now();
            log::debug!("[RUNTIME] {:?} (now {:.6}s)", command, now);
            match command {
                ClockCommand::Start { at, offset } => {
                    self.clock.start(at.unwrap_or(now), offset);
                }
                ClockCommand::Stop { at } => {
                    self.clock.stop(at.unwrap_or(now));
                }
                ClockCommand::Pause { at } => {
                    self.clock.pause(at.unwrap_or(now));
                }
            }
        }
    }

    fn tick(&mut self) {
        let tick = self.driver.poll();

        match self.clock.advance_with(tick) {
            Ok(()) => {
                if self.faulted {
                    log::info!("[RUNTIME] Clock resumed at {:.6}s", self.clock.next_tick_time());
                    self.faulted = false;
                }
            }
            Err(e) => {
                // Report once per fault, not once per poll.
                if !self.faulted {
                    log::error!("[RUNTIME] {}", e);
                    let _ = self.event_tx.send(ClockEvent::Fault(e.to_string()));
                }
                self.faulted = true;
            }
        }

        let snapshot = RuntimeStatus {
            now: tick.now,
            measured_lag: tick.measured_lag,
            state: self.clock.state(),
            tick_count: self.clock.tick_count(),
            next_tick_time: self.clock.next_tick_time(),
            faulted: self.faulted,
        };
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}
