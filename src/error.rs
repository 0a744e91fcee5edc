//! Crate-wide error type.
//!
//! Mirrors the error kinds in the design: config/contract errors abort
//! startup, format errors abort one extraction, capacity/transport errors
//! are localized. See [`crate::error`] callers for which kind maps where.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SeismuxError>;

/// All errors this crate can produce.
#[derive(Error, Debug)]
pub enum SeismuxError {
    /// Missing or invalid configuration key.
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem or socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// On-disk or on-wire data didn't match the expected layout.
    #[error("format error: {0}")]
    Format(String),

    /// A caller-supplied invariant didn't hold (channel count mismatch,
    /// unknown board type, ...).
    #[error("contract violation: {0}")]
    Contract(String),

    /// A bounded resource (queue, subscriber table) was full.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// A network peer misbehaved or went away.
    #[error("transport error: {0}")]
    Transport(String),
}

impl SeismuxError {
    /// Build a [`SeismuxError::Format`] error with a formatted message.
    pub fn format(msg: impl Into<String>) -> Self {
        SeismuxError::Format(msg.into())
    }

    /// Build a [`SeismuxError::Contract`] error with a formatted message.
    pub fn contract(msg: impl Into<String>) -> Self {
        SeismuxError::Contract(msg.into())
    }

    /// Build a [`SeismuxError::Config`] error with a formatted message.
    pub fn config(msg: impl Into<String>) -> Self {
        SeismuxError::Config(msg.into())
    }
}
