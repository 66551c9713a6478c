//! Line-based codec for AT command communication.
//!
//! Commands are terminated with a carriage return (`\r`, S3). The modem echoes
//! the command and answers with CRLF-delimited lines ending in a result code.
//! When CRC is enabled, commands carry a `*HHHH` suffix before the terminator.

use bytes::BytesMut;
use log::warn;

use crate::crc::{crc16_with_preset, format_crc, CRC_PREFIX};

/// Command line terminator (S3).
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// Response line delimiter (last byte of S3+S4).
pub const LINE_DELIMITER: u8 = b'\n';

/// Longest line buffered before it is flushed without a delimiter.
pub const MAX_LINE_LENGTH: usize = 16 * 1024;

/// A codec for framing commands and splitting received bytes into lines.
///
/// Lines are returned raw, delimiter included, because the checksum covers
/// every received byte.
#[derive(Debug)]
pub struct LineCodec {
    buffer: BytesMut,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// Create a new line codec.
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(512),
        }
    }

    /// Append bytes read from the link.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to take one raw line (up to and including `\n`) from the buffer.
    ///
    /// Returns `None` if more data is needed.
    pub fn decode_line(&mut self) -> Option<Vec<u8>> {
        if let Some(pos) = self.buffer.iter().position(|&b| b == LINE_DELIMITER) {
            return Some(self.buffer.split_to(pos + 1).to_vec());
        }
        if self.buffer.len() > MAX_LINE_LENGTH {
            warn!(
                "no line delimiter in {} buffered bytes, flushing",
                self.buffer.len()
            );
            return Some(self.buffer.split().to_vec());
        }
        None
    }

    /// Text of a command as it appears on the wire, without the terminator.
    ///
    /// This is also the text the modem echoes back.
    pub fn frame_text(command: &str, crc_enabled: bool, preset: u16) -> String {
        if crc_enabled {
            let crc = crc16_with_preset(command.as_bytes(), preset);
            format!("{}{}{}", command, CRC_PREFIX, format_crc(crc))
        } else {
            command.to_string()
        }
    }

    /// Encode a command for transmission.
    ///
    /// Appends the checksum when `crc_enabled`, then the carriage return.
    pub fn encode_command(command: &str, crc_enabled: bool, preset: u16) -> Vec<u8> {
        let text = Self::frame_text(command, crc_enabled, preset);
        let mut buf = Vec::with_capacity(text.len() + 1);
        buf.extend_from_slice(text.as_bytes());
        buf.push(COMMAND_TERMINATOR);
        buf
    }

    /// Bytes held back waiting for a delimiter.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Makes control characters visible for logging.
pub fn printable(text: &str) -> String {
    text.replace('\r', "<cr>").replace('\n', "<lf>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::{crc16, validate_crc, CRC_PRESET};

    #[test]
    fn test_encode_command() {
        let encoded = LineCodec::encode_command("AT", false, CRC_PRESET);
        assert_eq!(encoded, b"AT\r");
    }

    #[test]
    fn test_encode_command_with_crc() {
        let encoded = LineCodec::encode_command("AT", true, CRC_PRESET);
        let expected = format!("AT*{:04X}\r", crc16(b"AT"));
        assert_eq!(encoded, expected.as_bytes());
    }

    #[test]
    fn test_encoded_checksum_verifies() {
        for command in ["AT", "ATS80?", "AT%MGRT=\"test\",4,128.1,3,AQID", "AT&V"] {
            let text = LineCodec::frame_text(command, true, CRC_PRESET);
            let (body, checksum) = text.rsplit_once(CRC_PREFIX).unwrap();
            assert_eq!(body, command);
            assert!(validate_crc(body.as_bytes(), checksum, CRC_PRESET).is_ok());
        }
    }

    #[test]
    fn test_decode_line() {
        let mut codec = LineCodec::new();
        codec.push(b"AT\r\r\nOK\r\n");

        assert_eq!(codec.decode_line(), Some(b"AT\r\r\n".to_vec()));
        assert_eq!(codec.decode_line(), Some(b"OK\r\n".to_vec()));
        assert!(codec.decode_line().is_none());
    }

    #[test]
    fn test_partial_line() {
        let mut codec = LineCodec::new();
        codec.push(b"%UTC: 2021-");
        assert!(codec.decode_line().is_none());
        assert_eq!(codec.buffered_len(), 11);

        codec.push(b"03-12 15:02:33\r\n");
        assert_eq!(
            codec.decode_line(),
            Some(b"%UTC: 2021-03-12 15:02:33\r\n".to_vec())
        );
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_printable() {
        assert_eq!(printable("AT\r\n"), "AT<cr><lf>");
    }
}
