//! Error types for pulse-core

use thiserror::Error;

/// Result type alias for pulse-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while scheduling or running a clock
#[derive(Debug, Error)]
pub enum Error {
    /// The rate schedule produced a value that cannot advance the tick cursor
    #[error("Invalid tick rate {rate} at time {time:.6}s (must be finite and > 0)")]
    InvalidRate { time: f64, rate: f64 },

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The runtime thread is no longer receiving commands
    #[error("Runtime stopped")]
    RuntimeStopped,

    /// The runtime thread could not be spawned or panicked
    #[error("Runtime thread error: {0}")]
    Thread(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
