//! Response collection state machine.
//!
//! The modem gives no length or framing for its replies, so a response is
//! reconstructed line by line:
//!
//! ```text
//! AwaitingEcho ──echo / first line──▶ AwaitingTerminal ──OK|ERROR──▶ AwaitingChecksum ──▶ Done
//! ```
//!
//! The collector is fed raw lines (delimiter included) by whoever owns the
//! transport and is told when the bounded checksum read times out. It keeps
//! the raw bytes, minus the echoed command and its carriage return, for
//! checksum validation.

use bytes::BytesMut;
use log::{trace, warn};

use crate::codec::{printable, COMMAND_TERMINATOR};
use crate::crc::is_checksum_line;
use crate::error::{ProtocolError, ProtocolResult};
use crate::responses::{ResponseFrame, ResultCode};

/// Where the collector is in the current exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// Nothing but blank lines seen yet.
    AwaitingEcho,
    /// Collecting response lines until `OK` or `ERROR`.
    AwaitingTerminal,
    /// Result code seen; one more line may carry the checksum.
    AwaitingChecksum,
    /// The exchange is complete.
    Done,
}

/// What followed the result code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumTail {
    /// A `*HHHH` line (stored without the prefix).
    Present(String),
    /// The bounded read timed out.
    Absent,
    /// Some other line arrived; it is not part of this response.
    Unsolicited(String),
}

/// A finished exchange, ready for checksum validation.
#[derive(Debug, Clone)]
pub struct CollectedResponse {
    /// The decoded response.
    pub frame: ResponseFrame,
    /// What followed the result code.
    pub tail: ChecksumTail,
    /// Bytes the response checksum is computed over.
    pub source: Vec<u8>,
}

/// Reconstructs one response from a stream of lines.
#[derive(Debug)]
pub struct ResponseCollector {
    command: String,
    state: CollectorState,
    echo: Option<String>,
    lines: Vec<String>,
    result: Option<ResultCode>,
    tail: Option<ChecksumTail>,
    source: BytesMut,
}

impl ResponseCollector {
    /// Create a collector for `command`, the text as transmitted (checksum
    /// suffix included, terminator excluded).
    pub fn new(command: &str) -> Self {
        ResponseCollector {
            command: command.to_string(),
            state: CollectorState::AwaitingEcho,
            echo: None,
            lines: Vec::new(),
            result: None,
            tail: None,
            source: BytesMut::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// True once a result code has been received.
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// Feed one raw line (delimiter included).
    pub fn push_line(&mut self, raw: &[u8]) -> CollectorState {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        trace!("processing {}", printable(&text));

        match self.state {
            CollectorState::AwaitingEcho | CollectorState::AwaitingTerminal
                if self.echo.is_none() && line == self.command =>
            {
                if !self.lines.is_empty() {
                    // Anything ahead of the echo arrived before the command.
                    warn!("discarding {} line(s) received before echo", self.lines.len());
                    self.lines.clear();
                    self.source.clear();
                }
                self.echo = Some(line.to_string());
                let remainder = self.strip_echo(raw);
                self.source.extend_from_slice(remainder);
                self.state = CollectorState::AwaitingTerminal;
            }
            CollectorState::AwaitingEcho | CollectorState::AwaitingTerminal => {
                self.source.extend_from_slice(raw);
                if line.is_empty() {
                    return self.state;
                }
                self.state = CollectorState::AwaitingTerminal;
                match ResultCode::parse(line) {
                    Some(code) => {
                        self.result = Some(code);
                        self.state = CollectorState::AwaitingChecksum;
                    }
                    None => self.lines.push(line.to_string()),
                }
            }
            CollectorState::AwaitingChecksum => {
                self.tail = Some(if is_checksum_line(line) {
                    ChecksumTail::Present(line[1..].to_string())
                } else {
                    ChecksumTail::Unsolicited(line.to_string())
                });
                self.state = CollectorState::Done;
            }
            CollectorState::Done => {
                warn!("line after completed response ignored: {}", printable(&text));
            }
        }
        self.state
    }

    /// The bounded read for the checksum line timed out.
    pub fn checksum_timeout(&mut self) {
        if self.state == CollectorState::AwaitingChecksum {
            self.tail = Some(ChecksumTail::Absent);
            self.state = CollectorState::Done;
        }
    }

    /// Consume the collector and return the response.
    pub fn finish(self) -> ProtocolResult<CollectedResponse> {
        let result = self.result.ok_or(ProtocolError::Incomplete)?;
        let tail = self.tail.unwrap_or(ChecksumTail::Absent);
        let checksum = match &tail {
            ChecksumTail::Present(crc) => Some(crc.clone()),
            _ => None,
        };
        Ok(CollectedResponse {
            frame: ResponseFrame {
                echo: self.echo,
                lines: self.lines,
                result,
                checksum,
                crc_verified: false,
                error: None,
            },
            tail,
            source: self.source.to_vec(),
        })
    }

    /// The raw echo line minus the command and its carriage return.
    fn strip_echo<'a>(&self, raw: &'a [u8]) -> &'a [u8] {
        let start = raw
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(0);
        let rest = &raw[start..];
        match rest.strip_prefix(self.command.as_bytes()) {
            Some(after) => after.strip_prefix(&[COMMAND_TERMINATOR]).unwrap_or(after),
            None => raw,
        }
    }
}
