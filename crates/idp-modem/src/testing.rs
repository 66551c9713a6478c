//! Scripted transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use idp_at_protocol::{crc16_with_preset, format_crc};

use crate::config::ModemConfig;
use crate::error::TransportError;
use crate::modem::IdpModem;
use crate::transport::Transport;

/// Something that happened on the scripted link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// Bytes written by the host, terminator stripped.
    Write(String),
    /// A line handed to the host.
    Read(String),
    /// A read that found nothing queued.
    Timeout,
}

/// A transport that answers commands from a script.
///
/// Replies are keyed by the command as written (checksum suffix included,
/// terminator excluded). Reads with nothing queued fail with
/// [`TransportError::Timeout`] immediately.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: HashMap<String, VecDeque<String>>,
    incoming: VecDeque<Vec<u8>>,
    events: Vec<WireEvent>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reply` for the next write of `command`.
    pub fn expect(&mut self, command: &str, reply: &str) -> &mut Self {
        self.replies
            .entry(command.to_string())
            .or_default()
            .push_back(reply.to_string());
        self
    }

    /// Queue lines that arrive without being asked for.
    pub fn unsolicited(&mut self, text: &str) -> &mut Self {
        self.queue(text);
        self
    }

    pub fn events(&self) -> &[WireEvent] {
        &self.events
    }

    pub fn writes(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                WireEvent::Write(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Scripted replies that were never used.
    pub fn unused(&self) -> usize {
        self.replies.values().map(VecDeque::len).sum()
    }

    fn queue(&mut self, text: &str) {
        for line in text.split_inclusive('\n') {
            self.incoming.push_back(line.as_bytes().to_vec());
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let text = String::from_utf8_lossy(data);
        let command = text.trim_end_matches('\r').to_string();
        self.events.push(WireEvent::Write(command.clone()));
        if let Some(reply) = self.replies.get_mut(&command).and_then(VecDeque::pop_front) {
            self.queue(&reply);
        }
        Ok(())
    }

    async fn read_line(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        match self.incoming.pop_front() {
            Some(line) => {
                self.events
                    .push(WireEvent::Read(String::from_utf8_lossy(&line).into_owned()));
                Ok(line)
            }
            None => {
                self.events.push(WireEvent::Timeout);
                Err(TransportError::Timeout)
            }
        }
    }
}

/// Echo plus response body without a checksum tail.
pub fn reply(echo: &str, body: &str) -> String {
    format!("{}\r{}", echo, body)
}

/// Echo plus response body followed by a valid checksum tail.
pub fn crc_reply(echo: &str, body: &str, preset: u16) -> String {
    let crc = crc16_with_preset(body.as_bytes(), preset);
    format!("{}\r{}*{}\r\n", echo, body, format_crc(crc))
}

/// The command as written with CRC enabled.
pub fn with_crc(command: &str, preset: u16) -> String {
    let crc = crc16_with_preset(command.as_bytes(), preset);
    format!("{}*{}", command, format_crc(crc))
}

/// Install a test log writer once per process.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A modem with default configuration over a scripted transport.
pub fn modem(transport: ScriptedTransport) -> IdpModem<ScriptedTransport> {
    init_logging();
    IdpModem::new(transport, ModemConfig::default())
}
