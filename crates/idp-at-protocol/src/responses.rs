//! Response types for the AT protocol.
//!
//! A complete exchange produces a [`ResponseFrame`]: the non-empty lines the
//! modem sent between the echo and the result code, the result code itself,
//! and the optional checksum tail. When the result is `ERROR` the dispatcher
//! attaches the decoded last-error register value ([`AtErrorCode`]).

use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

/// Terminal result code of an exchange (verbose form).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// `OK`
    Ok,
    /// `ERROR`
    Error,
}

impl ResultCode {
    /// Parse a trimmed line as a result code.
    pub fn parse(line: &str) -> Option<ResultCode> {
        match line {
            "OK" => Some(ResultCode::Ok),
            "ERROR" => Some(ResultCode::Error),
            _ => None,
        }
    }

    /// The result code text as transmitted.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Ok => "OK",
            ResultCode::Error => "ERROR",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes reported in the last-error register (S80).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtErrorCode {
    /// 0
    Ok,
    /// 4
    Error,
    /// 100: command sent without (or with a wrong) CRC while CRC is enabled.
    InvalidCrcSequence,
    /// 101
    UnknownCommand,
    /// 102
    InvalidCommandParameters,
    /// 103
    MessageLengthExceedsFormatSize,
    /// 105
    SystemError,
    /// 106
    QueueInsufficientResources,
    /// 107
    MessageNameAlreadyInUse,
    /// 108
    TimeoutOccurred,
    /// 109
    Unavailable,
    /// 112
    AttemptToWriteReadOnlyParameter,
    /// Reserved or undocumented code.
    Other(u16),
}

impl AtErrorCode {
    /// Numeric register value.
    pub fn code(&self) -> u16 {
        match self {
            AtErrorCode::Ok => 0,
            AtErrorCode::Error => 4,
            AtErrorCode::InvalidCrcSequence => 100,
            AtErrorCode::UnknownCommand => 101,
            AtErrorCode::InvalidCommandParameters => 102,
            AtErrorCode::MessageLengthExceedsFormatSize => 103,
            AtErrorCode::SystemError => 105,
            AtErrorCode::QueueInsufficientResources => 106,
            AtErrorCode::MessageNameAlreadyInUse => 107,
            AtErrorCode::TimeoutOccurred => 108,
            AtErrorCode::Unavailable => 109,
            AtErrorCode::AttemptToWriteReadOnlyParameter => 112,
            AtErrorCode::Other(code) => *code,
        }
    }

    /// Symbolic name as documented for the modem.
    pub fn name(&self) -> String {
        match self {
            AtErrorCode::Ok => "OK".into(),
            AtErrorCode::Error => "ERROR".into(),
            AtErrorCode::InvalidCrcSequence => "ERR_INVALID_CRC_SEQUENCE".into(),
            AtErrorCode::UnknownCommand => "ERR_UNKNOWN_COMMAND".into(),
            AtErrorCode::InvalidCommandParameters => "ERR_INVALID_COMMAND_PARAMETERS".into(),
            AtErrorCode::MessageLengthExceedsFormatSize => {
                "ERR_MESSAGE_LENGTH_EXCEEDS_FORMAT_SIZE".into()
            }
            AtErrorCode::SystemError => "ERR_SYSTEM_ERROR".into(),
            AtErrorCode::QueueInsufficientResources => "ERR_QUEUE_INSUFFICIENT_RESOURCES".into(),
            AtErrorCode::MessageNameAlreadyInUse => "ERR_MESSAGE_NAME_ALREADY_IN_USE".into(),
            AtErrorCode::TimeoutOccurred => "ERR_TIMEOUT_OCCURRED".into(),
            AtErrorCode::Unavailable => "ERR_UNAVAILABLE".into(),
            AtErrorCode::AttemptToWriteReadOnlyParameter => {
                "ERR_ATTEMPT_TO_WRITE_READ_ONLY_PARAMETER".into()
            }
            AtErrorCode::Other(code) => format!("ERR_RESERVED_{}", code),
        }
    }

    /// Parse the S80 register line.
    pub fn parse(line: &str) -> ProtocolResult<AtErrorCode> {
        line.trim()
            .parse::<u16>()
            .map(AtErrorCode::from)
            .map_err(|_| ProtocolError::Malformed(format!("invalid error code: {}", line)))
    }
}

impl From<u16> for AtErrorCode {
    fn from(code: u16) -> Self {
        match code {
            0 => AtErrorCode::Ok,
            4 => AtErrorCode::Error,
            100 => AtErrorCode::InvalidCrcSequence,
            101 => AtErrorCode::UnknownCommand,
            102 => AtErrorCode::InvalidCommandParameters,
            103 => AtErrorCode::MessageLengthExceedsFormatSize,
            105 => AtErrorCode::SystemError,
            106 => AtErrorCode::QueueInsufficientResources,
            107 => AtErrorCode::MessageNameAlreadyInUse,
            108 => AtErrorCode::TimeoutOccurred,
            109 => AtErrorCode::Unavailable,
            112 => AtErrorCode::AttemptToWriteReadOnlyParameter,
            other => AtErrorCode::Other(other),
        }
    }
}

impl fmt::Display for AtErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// A complete response to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Echo of the command, if the modem echoed it.
    pub echo: Option<String>,
    /// Non-empty, non-echo lines before the result code.
    pub lines: Vec<String>,
    /// Result code that ended the exchange.
    pub result: ResultCode,
    /// Checksum from the `*HHHH` tail, without the prefix.
    pub checksum: Option<String>,
    /// True once the checksum has been validated.
    pub crc_verified: bool,
    /// Decoded last-error register value when `result` is `ERROR`.
    pub error: Option<AtErrorCode>,
}

impl ResponseFrame {
    /// Whether the exchange ended with `OK`.
    pub fn is_ok(&self) -> bool {
        self.result == ResultCode::Ok
    }

    /// Whether the exchange ended with `ERROR`.
    pub fn is_error(&self) -> bool {
        self.result == ResultCode::Error
    }

    /// Response lines followed by the result code.
    pub fn all_lines(&self) -> Vec<String> {
        let mut lines = self.lines.clone();
        lines.push(self.result.as_str().to_string());
        lines
    }

    /// First response line, if any.
    pub fn first_line(&self) -> Option<&str> {
        self.lines.first().map(String::as_str)
    }

    /// First response line starting with `prefix` (e.g. `%UTC:`), with the
    /// prefix and surrounding whitespace removed. `None` if no line has it.
    pub fn value(&self, prefix: &str) -> Option<&str> {
        self.lines
            .iter()
            .find_map(|line| line.trim().strip_prefix(prefix))
            .map(str::trim)
    }
}

/// Removes a response prefix such as `%MGRS:` and surrounding whitespace.
pub fn strip_prefix<'a>(line: &'a str, prefix: &str) -> &'a str {
    line.trim()
        .strip_prefix(prefix)
        .unwrap_or(line.trim())
        .trim()
}

/// Removes one pair of surrounding double quotes.
pub fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Parses one comma-separated field as an integer.
pub fn parse_field<T: std::str::FromStr>(field: Option<&str>, what: &str) -> ProtocolResult<T> {
    let field = field.ok_or_else(|| ProtocolError::Malformed(format!("missing {}", what)))?;
    field
        .trim()
        .parse()
        .map_err(|_| ProtocolError::Malformed(format!("invalid {}: {}", what, field)))
}
