//! Pulse CLI - The `pulse` command.
//!
//! Drives a clock either live on the runtime thread or in deterministic
//! simulation, printing every tick and transport change.
//!
//! # Architecture
//!
//! - **pulse-core**: Timelines, rate curves, the clock, drivers and the runtime thread

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use pulse_core::{
    rate_for_bpm, Clock, ClockEvent, Config, ManualDriver, RateCurve, Runtime, SharedRate,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Rate used when neither `--rate` nor `--bpm` is given.
const DEFAULT_RATE: f64 = 2.0;

/// Pulse - Sample-accurate tick clock
#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A lookahead tick clock with lag compensation", long_about = None)]
struct Args {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a clock in real time, printing ticks until the duration elapses or Ctrl-C
    Run {
        #[command(flatten)]
        rate: RateArgs,

        /// How long to run (e.g. "10s", "2m"); runs until Ctrl-C if unset
        #[arg(long, value_parser = humantime::parse_duration)]
        duration: Option<Duration>,

        /// Tick count to start from
        #[arg(long)]
        offset: Option<u64>,

        /// Config file to use instead of the default location
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run a clock offline on a simulated driver and print its output
    Simulate {
        #[command(flatten)]
        rate: RateArgs,

        /// Simulated run length (e.g. "4s")
        #[arg(long, value_parser = humantime::parse_duration, default_value = "4s")]
        duration: Duration,

        /// Extra delay added to successive driver intervals, cycled (e.g. "0,12,3")
        #[arg(long, value_name = "MS", value_delimiter = ',')]
        jitter_ms: Vec<f64>,

        /// Tick count to start from
        #[arg(long)]
        offset: Option<u64>,

        /// Schedule a stop at this time in seconds
        #[arg(long, value_name = "SECS")]
        stop_at: Option<f64>,

        /// Schedule a pause at this time in seconds
        #[arg(long, value_name = "SECS", requires = "resume_at")]
        pause_at: Option<f64>,

        /// Resume after the pause at this time in seconds
        #[arg(long, value_name = "SECS", requires = "pause_at")]
        resume_at: Option<f64>,

        /// Config file to use instead of the default location
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write the default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the active configuration
    Show,
    /// Print the config file location
    Path,
}

/// Tick rate selection shared by `run` and `simulate`.
#[derive(clap::Args, Debug, Clone)]
struct RateArgs {
    /// Tick rate in ticks per second
    #[arg(long, conflicts_with = "bpm")]
    rate: Option<f64>,

    /// Tempo in beats per minute
    #[arg(long)]
    bpm: Option<f64>,

    /// Ticks per quarter note when using --bpm
    #[arg(long, default_value_t = 1)]
    ppq: u32,

    /// Ramp linearly to this value, in the unit of --rate or --bpm
    #[arg(long, requires = "ramp_over")]
    ramp_to: Option<f64>,

    /// Length of the ramp (e.g. "4s", "500ms")
    #[arg(long, value_parser = humantime::parse_duration, requires = "ramp_to")]
    ramp_over: Option<Duration>,
}

impl RateArgs {
    fn to_rate(&self, value: f64) -> f64 {
        if self.bpm.is_some() {
            rate_for_bpm(value, self.ppq)
        } else {
            value
        }
    }

    /// Starting rate in ticks per second.
    fn base_rate(&self) -> Result<f64> {
        let rate = match (self.rate, self.bpm) {
            (Some(rate), _) => rate,
            (None, Some(bpm)) => rate_for_bpm(bpm, self.ppq),
            (None, None) => DEFAULT_RATE,
        };
        if !(rate.is_finite() && rate > 0.0) {
            bail!("Tick rate must be positive, got {}", rate);
        }
        Ok(rate)
    }

    /// Write this rate into `curve`, anchored at `start`.
    fn apply(&self, curve: &mut RateCurve, start: f64) -> Result<()> {
        curve.set_value_at(self.base_rate()?, start);
        if let (Some(target), Some(over)) = (self.ramp_to, self.ramp_over) {
            let target = self.to_rate(target);
            if !(target.is_finite() && target > 0.0) {
                bail!("Ramp target must be positive, got {}", target);
            }
            curve.linear_ramp_to(target, start + over.as_secs_f64());
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    match args.command {
        Commands::Run {
            rate,
            duration,
            offset,
            config,
        } => run_live(&rate, duration, offset, config.as_deref()),
        Commands::Simulate {
            rate,
            duration,
            jitter_ms,
            offset,
            stop_at,
            pause_at,
            resume_at,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let mut curve = RateCurve::new(rate.base_rate()?);
            rate.apply(&mut curve, 0.0)?;
            let plan = SimulationPlan {
                offset,
                duration: duration.as_secs_f64(),
                jitter: jitter_ms.iter().map(|ms| ms / 1000.0).collect(),
                stop_at,
                pause: pause_at.zip(resume_at),
            };
            for event in simulate(&config, curve, &plan)? {
                print_event(&event, rate.ppq);
            }
            Ok(())
        }
        Commands::Config { action } => run_config(action),
        Commands::Version => {
            println!("pulse {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Sample-accurate tick clock with lookahead scheduling");
            println!();
            println!("Modular Architecture:");
            println!("  - pulse-core: Timelines, rate curves, clock and runtime");
            Ok(())
        }
    }
}

fn init_logger(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(Config::load_or_default()),
    }
}

fn run_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let path = Config::config_path()?;
            if path.exists() && !force {
                bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default()
                .save_to(&path)
                .with_context(|| format!("Failed to write config: {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Show => {
            let config = Config::load_or_default();
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}

fn run_live(
    rate_args: &RateArgs,
    duration: Option<Duration>,
    offset: Option<u64>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let rate = SharedRate::new(rate_args.base_rate()?);

    log::info!("Starting runtime...");
    let runtime =
        Runtime::start(config, Arc::new(rate.clone())).context("Failed to start runtime")?;
    let handle = runtime.handle().clone();

    let t0 = handle.now();
    rate.with_write(|curve| rate_args.apply(curve, t0))?;
    handle.start(Some(t0), offset)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, interrupted.clone())
        .context("Failed to register Ctrl-C handler")?;

    let deadline = duration.map(|d| t0 + d.as_secs_f64());
    match deadline {
        Some(end) => log::info!("Running for {:.3}s (Ctrl+C to exit)", end - t0),
        None => log::info!("Running... (Press Ctrl+C to exit)"),
    }

    loop {
        if interrupted.load(Ordering::Relaxed) {
            log::info!("Interrupted by user (Ctrl+C)");
            break;
        }
        if deadline.is_some_and(|end| handle.now() >= end) {
            break;
        }
        if let Some(event) = handle.recv_event_timeout(Duration::from_millis(50)) {
            print_event(&event, rate_args.ppq);
        }
    }

    handle.stop(None)?;
    while let Some(event) = handle.recv_event_timeout(Duration::from_millis(200)) {
        let stopped = matches!(event, ClockEvent::Stopped { .. });
        print_event(&event, rate_args.ppq);
        if stopped {
            break;
        }
    }

    let status = handle.status();
    runtime.shutdown()?;
    log::info!(
        "Stopped at {:.3}s (lag {:.1}ms)",
        status.now,
        status.measured_lag * 1000.0
    );
    Ok(())
}

/// A deterministic run on a [`ManualDriver`].
#[derive(Debug, Clone, Default)]
struct SimulationPlan {
    offset: Option<u64>,
    /// Run length in seconds.
    duration: f64,
    /// Cyclic extra delay per driver interval, in seconds.
    jitter: Vec<f64>,
    stop_at: Option<f64>,
    /// Pause and resume times.
    pause: Option<(f64, f64)>,
}

/// Start a clock at time zero and collect everything it emits before `plan.duration`.
fn simulate(config: &Config, curve: RateCurve, plan: &SimulationPlan) -> Result<Vec<ClockEvent>> {
    let (tx, rx) = crossbeam_channel::unbounded();

    let tick_tx = tx.clone();
    let mut clock = Clock::with_settings(Arc::new(curve), &config.scheduler, move |tick| {
        let _ = tick_tx.send(ClockEvent::Tick(tick));
    });
    let (start_tx, stop_tx, pause_tx) = (tx.clone(), tx.clone(), tx);
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

    clock.start(0.0, plan.offset);
    if let Some((pause_at, resume_at)) = plan.pause {
        clock.pause(pause_at).start(resume_at, None);
    }
    if let Some(stop_at) = plan.stop_at {
        clock.stop(stop_at);
    }

    let end = plan.duration;
    let mut driver = ManualDriver::from_config(config).with_jitter(plan.jitter.clone());
    while driver.now() <= end {
        clock
            .drive(&mut driver)
            .with_context(|| format!("Clock halted at {:.6}s", clock.next_tick_time()))?;
    }
    log::debug!(
        "Simulated {} driver polls (final lag {:.3}ms)",
        driver.polls(),
        driver.measured_lag() * 1000.0
    );

    Ok(rx
        .try_iter()
        .filter(|event| event_time(event).map_or(true, |time| time < end))
        .collect())
}

fn event_time(event: &ClockEvent) -> Option<f64> {
    match event {
        ClockEvent::Tick(tick) => Some(tick.time),
        ClockEvent::Started { time, .. }
        | ClockEvent::Stopped { time }
        | ClockEvent::Paused { time } => Some(*time),
        ClockEvent::Fault(_) => None,
    }
}

fn print_event(event: &ClockEvent, ppq: u32) {
    match event {
        ClockEvent::Tick(tick) => println!(
            "{:>12.6}s  tick {:>6}  beat {:>8.3}",
            tick.time,
            tick.index,
            tick.index as f64 / ppq.max(1) as f64
        ),
        ClockEvent::Started { time, tick_count } => {
            println!("{:>12.6}s  started at tick {}", time, tick_count)
        }
        ClockEvent::Stopped { time } => println!("{:>12.6}s  stopped", time),
        ClockEvent::Paused { time } => println!("{:>12.6}s  paused", time),
        ClockEvent::Fault(message) => eprintln!("fault: {}", message),
    }
}
