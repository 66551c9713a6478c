//! Mobile-originated (return) and mobile-terminated (forward) message queues.
//!
//! Payloads are exchanged with the modem without their first byte, the
//! Service Identification Number (SIN), which travels as its own field. The
//! Message Identification Number (MIN) is the first payload byte after it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use idp_at_protocol::{
    constants::{DEFAULT_MO_PRIORITY, MAX_MESSAGE_NAME_LENGTH},
    parse_field, strip_prefix, truncate_name, unquote, Command, DataFormat, MessageState,
    ProtocolError, ProtocolResult,
};
use tracing::{debug, warn};

use crate::error::{ModemError, ModemResult};
use crate::modem::IdpModem;
use crate::transport::Transport;

// ============================================================================
// Types
// ============================================================================

/// A mobile-originated message ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoMessage {
    /// Queue name; generated from the clock if `None`.
    pub name: Option<String>,
    /// Priority 1 (high) to 4 (low).
    pub priority: u8,
    pub sin: u8,
    pub min: Option<u8>,
    pub format: DataFormat,
    /// Payload after SIN (and MIN, if given), in `format` encoding.
    pub data: String,
}

impl MoMessage {
    fn new(sin: u8, format: DataFormat, data: String) -> Self {
        MoMessage {
            name: None,
            priority: DEFAULT_MO_PRIORITY,
            sin,
            min: None,
            format,
            data,
        }
    }

    /// A text payload. Non-printable bytes must already be `\HH` escaped.
    pub fn text(sin: u8, text: &str) -> Self {
        Self::new(sin, DataFormat::Text, text.to_string())
    }

    /// A binary payload sent hex encoded.
    pub fn hex(sin: u8, payload: &[u8]) -> Self {
        Self::new(sin, DataFormat::Hex, hex::encode_upper(payload))
    }

    /// A binary payload sent base64 encoded.
    pub fn base64(sin: u8, payload: &[u8]) -> Self {
        Self::new(sin, DataFormat::Base64, STANDARD.encode(payload))
    }

    pub fn with_min(mut self, min: u8) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// State of a queued mobile-originated message (`%MGRS`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoMessageStatus {
    pub name: String,
    pub number: u32,
    pub priority: u8,
    pub sin: u8,
    pub state: MessageState,
    /// Payload size in bytes.
    pub size: u32,
    pub bytes_sent: u32,
}

impl MoMessageStatus {
    /// Parse `"<name>",<number>,<priority>,<sin>,<state>,<size>,<sent>`,
    /// with or without the `%MGRS:` prefix.
    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let mut fields = strip_prefix(line, "%MGRS:").split(',');
        let name = fields
            .next()
            .map(|n| unquote(n).to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProtocolError::Malformed(format!("no message name in {:?}", line)))?;
        Ok(MoMessageStatus {
            name,
            number: parse_field(fields.next(), "message number")?,
            priority: parse_field(fields.next(), "priority")?,
            sin: parse_field(fields.next(), "SIN")?,
            state: MessageState::from(parse_field::<u8>(fields.next(), "state")?),
            size: parse_field(fields.next(), "size")?,
            bytes_sent: parse_field(fields.next(), "bytes sent")?,
        })
    }
}

/// A received mobile-terminated message waiting in the queue (`%MGFN`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtMessage {
    /// Queue name, e.g. `FM01.01`.
    pub name: String,
    pub number: String,
    pub priority: u8,
    pub sin: u8,
    pub state: MessageState,
    pub length: u32,
    pub received: u32,
}

impl MtMessage {
    /// Parse one `%MGFN` entry.
    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let fields: Vec<&str> = strip_prefix(line, "%MGFN:").split(',').collect();
        let [name, number, priority, sin, state, length, received] = fields.as_slice() else {
            return Err(ProtocolError::Malformed(format!(
                "expected 7 fields in {:?}",
                line
            )));
        };
        Ok(MtMessage {
            name: unquote(name).to_string(),
            number: number.trim().to_string(),
            priority: parse_field(Some(*priority), "priority")?,
            sin: parse_field(Some(*sin), "SIN")?,
            state: MessageState::from(parse_field::<u8>(Some(*state), "state")?),
            length: parse_field(Some(*length), "length")?,
            received: parse_field(Some(*received), "bytes received")?,
        })
    }
}

/// A retrieved mobile-terminated message with its payload rebuilt to
/// include the SIN byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtMessagePayload {
    pub name: String,
    pub system_message_number: u32,
    pub system_message_sequence: u32,
    pub priority: u8,
    pub sin: u8,
    /// Second payload byte, if present.
    pub min: Option<u8>,
    pub state: MessageState,
    pub length: u32,
    pub format: DataFormat,
    /// Complete payload (SIN first) in `format` encoding.
    pub raw_payload: String,
    /// Complete payload bytes, SIN first.
    pub bytes: Vec<u8>,
}

impl MtMessagePayload {
    /// Parse a `%MGFG` line:
    /// `"<name>",<num>.<seq>,<priority>,<sin>,<state>,<length>,<format>,<data>`.
    ///
    /// `format` is the encoding that was requested.
    pub fn parse(line: &str, format: DataFormat) -> ProtocolResult<Self> {
        let fields: Vec<&str> = strip_prefix(line, "%MGFG:").splitn(8, ',').collect();
        let [name, number, priority, sin, state, length, _format, data] = fields.as_slice() else {
            return Err(ProtocolError::Malformed(format!(
                "expected 8 fields in {:?}",
                line
            )));
        };
        let (msg_num, msg_seq) = number
            .trim()
            .split_once('.')
            .ok_or_else(|| ProtocolError::Malformed(format!("bad message number {:?}", number)))?;
        let sin: u8 = parse_field(Some(*sin), "SIN")?;
        let data = data.trim();

        let (raw_payload, bytes) = match format {
            DataFormat::Hex => {
                let raw = format!("{:02X}{}", sin, data);
                let bytes = hex::decode(&raw)
                    .map_err(|e| ProtocolError::Malformed(format!("bad hex payload: {}", e)))?;
                (raw, bytes)
            }
            DataFormat::Base64 => {
                let decoded = STANDARD
                    .decode(data)
                    .map_err(|e| ProtocolError::Malformed(format!("bad base64 payload: {}", e)))?;
                let mut bytes = Vec::with_capacity(decoded.len() + 1);
                bytes.push(sin);
                bytes.extend_from_slice(&decoded);
                (STANDARD.encode(&bytes), bytes)
            }
            DataFormat::Text => {
                let text = unquote(data);
                let mut bytes = vec![sin];
                bytes.extend(decode_text(text));
                (format!("\\{:02x}{}", sin, text), bytes)
            }
        };

        Ok(MtMessagePayload {
            name: unquote(name).to_string(),
            system_message_number: parse_field(Some(msg_num), "message number")?,
            system_message_sequence: parse_field(Some(msg_seq), "message sequence")?,
            priority: parse_field(Some(*priority), "priority")?,
            sin,
            min: bytes.get(1).copied(),
            state: MessageState::from(parse_field::<u8>(Some(*state), "state")?),
            length: parse_field(Some(*length), "length")?,
            format,
            raw_payload,
            bytes,
        })
    }
}

/// Decode text-format payload: `\HH` is a byte, anything else is literal.
pub fn decode_text(text: &str) -> Vec<u8> {
    let raw = text.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' {
            let escape = raw
                .get(i + 1..i + 3)
                .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = escape {
                bytes.push(byte);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }
    bytes
}

/// Name for a message submitted without one: the low-order digits of the
/// Unix time.
fn generated_name() -> String {
    let stamp = Utc::now().timestamp().to_string();
    let start = stamp.len().saturating_sub(MAX_MESSAGE_NAME_LENGTH);
    stamp[start..].to_string()
}

// ============================================================================
// Operations
// ============================================================================

impl<T: Transport> IdpModem<T> {
    /// Submit a mobile-originated message. Returns the name it was queued
    /// under.
    pub async fn message_mo_send(&mut self, message: &MoMessage) -> ModemResult<String> {
        if !(1..=4).contains(&message.priority) {
            return Err(ModemError::InvalidArgument(format!(
                "priority {} not in 1..=4",
                message.priority
            )));
        }
        let name = match &message.name {
            Some(name) => {
                let truncated = truncate_name(name);
                if truncated.len() < name.len() {
                    warn!("{}: message name {} truncated to {}", self.name(), name, truncated);
                }
                truncated.to_string()
            }
            None => {
                let name = generated_name();
                debug!("{}: assigned message name {}", self.name(), name);
                name
            }
        };
        debug!("{}: submitting message {} (SIN {})", self.name(), name, message.sin);
        self.execute(Command::MessageMoSend {
            name: name.clone(),
            priority: message.priority,
            sin: message.sin,
            min: message.min,
            format: message.format,
            data: message.data.clone(),
        })
        .await?;
        Ok(name)
    }

    /// State of one queued message, or of all of them.
    pub async fn message_mo_state(&mut self, name: Option<&str>) -> Option<Vec<MoMessageStatus>> {
        let frame = self
            .query(Command::MessageMoState {
                name: name.map(str::to_string),
            })
            .await?;
        let mut states = Vec::new();
        for line in &frame.lines {
            if strip_prefix(line, "%MGRS:").is_empty() {
                continue;
            }
            match MoMessageStatus::parse(line) {
                Ok(status) => states.push(status),
                Err(e) => {
                    warn!("{}: bad message state: {}", self.name(), e);
                    return None;
                }
            }
        }
        Some(states)
    }

    /// Cancel a queued mobile-originated message.
    pub async fn message_mo_cancel(&mut self, name: &str) -> ModemResult<()> {
        debug!("{}: cancelling message {}", self.name(), name);
        self.execute(Command::MessageMoCancel {
            name: name.to_string(),
        })
        .await
        .map(|_| ())
    }

    /// Clear the transmit queue, explicitly cancelling messages the clear
    /// left open. Returns the number of messages cancelled.
    pub async fn message_mo_clear(&mut self) -> ModemResult<usize> {
        debug!("{}: clearing transmit queue", self.name());
        let frame = self.execute(Command::MessageMoClear).await?;
        let mut cancelled = 0;
        let mut open = Vec::new();
        for line in &frame.lines {
            if strip_prefix(line, "%MGRS:").is_empty() {
                continue;
            }
            let status = MoMessageStatus::parse(line)?;
            if status.state == MessageState::TxCancelled {
                cancelled += 1;
            } else if status.state.is_open() {
                open.push(status.name);
            }
        }
        let mut still_open = 0;
        for name in open {
            match self.message_mo_cancel(&name).await {
                Ok(()) => cancelled += 1,
                Err(e) => {
                    warn!("{}: could not cancel {}: {}", self.name(), name, e);
                    still_open += 1;
                }
            }
        }
        if still_open > 0 {
            warn!("{}: {} messages still in transmit queue", self.name(), still_open);
        }
        Ok(cancelled)
    }

    /// Received mobile-terminated messages.
    pub async fn message_mt_waiting(&mut self) -> Option<Vec<MtMessage>> {
        let frame = self.query(Command::MessageMtWaiting).await?;
        let mut waiting = Vec::new();
        for line in &frame.lines {
            if !strip_prefix(line, "%MGFN:").starts_with("\"FM") {
                continue;
            }
            match MtMessage::parse(line) {
                Ok(message) => waiting.push(message),
                Err(e) => warn!("{}: bad forward message entry: {}", self.name(), e),
            }
        }
        Some(waiting)
    }

    /// Retrieve a mobile-terminated message.
    pub async fn message_mt_get(
        &mut self,
        name: &str,
        format: DataFormat,
    ) -> Option<MtMessagePayload> {
        debug!("{}: retrieving forward message {}", self.name(), name);
        let frame = self
            .query(Command::MessageMtGet {
                name: name.to_string(),
                format,
            })
            .await?;
        let line = frame.first_line()?;
        MtMessagePayload::parse(line, format)
            .map_err(|e| warn!("{}: bad forward message {}: {}", self.name(), name, e))
            .ok()
    }

    /// Mark a mobile-terminated message for deletion.
    pub async fn message_mt_delete(&mut self, name: &str) -> ModemResult<()> {
        debug!("{}: deleting forward message {}", self.name(), name);
        self.execute(Command::MessageMtDelete {
            name: name.to_string(),
        })
        .await
        .map(|_| ())
    }
}
