//! Error types for the AT protocol.

use thiserror::Error;

/// Errors that can occur while framing or decoding AT exchanges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A line did not have the shape expected for the command.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The response checksum does not match the bytes received.
    #[error("CRC mismatch: expected {expected}, received {received} for {source_text:?}")]
    CrcMismatch {
        /// Checksum computed over the received bytes.
        expected: String,
        /// Checksum carried by the `*HHHH` tail line.
        received: String,
        /// Text the checksum was computed over.
        source_text: String,
    },

    /// A command could not be built from the given arguments.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The collector was asked for a frame before a result code arrived.
    #[error("response incomplete: no result code received")]
    Incomplete,
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
