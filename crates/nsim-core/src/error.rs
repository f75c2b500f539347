//! Error types for nsim
//!
//! Only value parsing is recoverable. Broken kernel invariants (recursive
//! run, negative delays, misuse of destroy-time events) abort through
//! `panic!` and never surface here.

use thiserror::Error;

/// Core nsim errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NsimError {
    // Time parsing
    #[error("Invalid time value: {0:?}")]
    InvalidTimeValue(String),

    #[error("Unknown time unit: {0:?}")]
    UnknownTimeUnit(String),

    // Type selection
    #[error("Unknown simulator implementation: {0:?}")]
    UnknownImplementation(String),

    #[error("Unknown scheduler type: {0:?}")]
    UnknownScheduler(String),

    #[error("Unknown synchronization mode: {0:?}")]
    UnknownSynchronizationMode(String),

    // Configuration strings
    #[error("Unknown configuration key: {0:?}")]
    UnknownConfigKey(String),

    #[error("Malformed configuration entry: {0:?}")]
    MalformedConfigEntry(String),
}

/// Result type for nsim operations
pub type NsimResult<T> = Result<T, NsimError>;
