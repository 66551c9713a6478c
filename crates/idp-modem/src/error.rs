//! Error types for the modem engine.

use std::time::Duration;

use idp_at_protocol::{AtErrorCode, ProtocolError};
use thiserror::Error;

/// Errors raised by a [`Transport`](crate::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// No complete line arrived within the read timeout.
    #[error("read timed out")]
    Timeout,

    /// The peer closed the stream.
    #[error("transport closed")]
    Closed,

    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while talking to the modem.
#[derive(Debug, Error)]
pub enum ModemError {
    /// A response line did not arrive in time.
    #[error("timeout after {elapsed:?} waiting for response to {command}")]
    Timeout {
        /// Command text.
        command: String,
        /// Time spent in the exchange.
        elapsed: Duration,
    },

    /// The response checksum did not match (retried by the dispatcher).
    #[error("CRC mismatch on {command}: {source}")]
    CrcMismatch {
        /// Command text.
        command: String,
        /// Details of the mismatch.
        source: ProtocolError,
    },

    /// Every attempt failed CRC validation.
    #[error("too many CRC failures on {command} ({attempts} attempts)")]
    TooManyCrcFailures {
        /// Command text.
        command: String,
        /// Attempts made.
        attempts: u32,
    },

    /// A response could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The modem answered `ERROR`.
    #[error("{command} failed: {code}")]
    Device {
        /// Command text.
        command: String,
        /// Decoded last-error register value.
        code: AtErrorCode,
    },

    /// No GNSS fix was obtained within the requested wait time.
    #[error("GNSS fix timed out")]
    GnssTimeout,

    /// An argument was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The configuration is invalid or could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ModemError {
    /// The decoded device error code, if this is a device error.
    pub fn device_code(&self) -> Option<AtErrorCode> {
        match self {
            ModemError::Device { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type alias for modem operations.
pub type ModemResult<T> = Result<T, ModemError>;
