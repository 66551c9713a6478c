//! CRC16-CCITT (XModem) checksums and link CRC negotiation.
//!
//! When CRC is enabled on the modem every command must carry a `*HHHH` suffix
//! and every response is followed by a `*HHHH` line computed over the response
//! bytes (the echoed command excluded). The host never asks the modem which
//! mode it is in; [`CrcNegotiator`] infers it from whether a checksum line
//! follows the result code.

use log::{debug, warn};

use crate::error::{ProtocolError, ProtocolResult};

/// CRC16-CCITT generator polynomial.
pub const CRC_POLYNOMIAL: u16 = 0x1021;

/// Initial register value for the XModem variant.
pub const CRC_PRESET: u16 = 0x0000;

/// Prefix character of the checksum sequence (S64 default).
pub const CRC_PREFIX: char = '*';

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc: u16 = 0;
        let mut c: u16 = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            if (crc ^ c) & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC_POLYNOMIAL;
            } else {
                crc <<= 1;
            }
            c <<= 1;
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u16; 256] = build_table();

/// Computes the CRC16-CCITT XModem checksum of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    crc16_with_preset(data, CRC_PRESET)
}

/// Computes the CRC16-CCITT checksum of `data` starting from `preset`.
pub fn crc16_with_preset(data: &[u8], preset: u16) -> u16 {
    data.iter().fold(preset, |crc, &byte| {
        let index = ((crc >> 8) ^ byte as u16) & 0xff;
        (crc << 8) ^ CRC_TABLE[index as usize]
    })
}

/// Formats a checksum the way the modem transmits it (4 uppercase hex digits).
pub fn format_crc(crc: u16) -> String {
    format!("{:04X}", crc)
}

/// Returns true if `line` has the shape of a checksum tail (`*` + 4 hex digits).
pub fn is_checksum_line(line: &str) -> bool {
    line.len() == 5
        && line.starts_with(CRC_PREFIX)
        && line[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Checks `candidate` (with or without the `*` prefix) against `data`.
pub fn validate_crc(data: &[u8], candidate: &str, preset: u16) -> ProtocolResult<()> {
    let received = candidate.trim_start_matches(CRC_PREFIX);
    let expected = crc16_with_preset(data, preset);
    match u16::from_str_radix(received, 16) {
        Ok(value) if value == expected => Ok(()),
        _ => Err(ProtocolError::CrcMismatch {
            expected: format_crc(expected),
            received: received.to_string(),
            source_text: String::from_utf8_lossy(data).into_owned(),
        }),
    }
}

/// Current CRC setting of the serial link as inferred by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrcState {
    /// Nothing has been observed yet this session.
    #[default]
    Unknown,
    /// The modem appends checksums and expects them on commands.
    Enabled,
    /// The last exchange ended without a checksum tail.
    Disabled,
}

impl CrcState {
    /// Whether outgoing commands should carry a checksum.
    pub fn is_enabled(&self) -> bool {
        matches!(self, CrcState::Enabled)
    }
}

/// Tracks the link CRC state and validates response checksums.
#[derive(Debug, Clone)]
pub struct CrcNegotiator {
    state: CrcState,
    preset: u16,
    lost_bytes: u32,
}

impl Default for CrcNegotiator {
    fn default() -> Self {
        Self::new(CRC_PRESET)
    }
}

impl CrcNegotiator {
    /// Create a negotiator in the unknown state.
    pub fn new(preset: u16) -> Self {
        CrcNegotiator {
            state: CrcState::Unknown,
            preset,
            lost_bytes: 0,
        }
    }

    /// Current inferred state.
    pub fn state(&self) -> CrcState {
        self.state
    }

    /// CRC preset in use.
    pub fn preset(&self) -> u16 {
        self.preset
    }

    /// Number of responses that looked like they had dropped or merged bytes.
    pub fn lost_bytes(&self) -> u32 {
        self.lost_bytes
    }

    /// Records a checksum tail received after the result code and validates it
    /// against `source`, the response bytes with the echo removed.
    ///
    /// Any checksum at all means the modem has CRC enabled, so the state is
    /// updated before validation.
    pub fn observe_checksum(&mut self, checksum: &str, source: &[u8]) -> ProtocolResult<()> {
        if self.state != CrcState::Enabled {
            debug!("checksum {} received, CRC enabled on link", checksum);
            self.state = CrcState::Enabled;
        }
        if Self::looks_lossy(source) {
            self.lost_bytes += 1;
            warn!(
                "possible lost bytes in response ({} so far)",
                self.lost_bytes
            );
        }
        validate_crc(source, checksum, self.preset)
    }

    /// Records that no checksum followed the result code in time.
    pub fn observe_timeout(&mut self) {
        if self.state != CrcState::Disabled {
            debug!("no checksum after result code, CRC disabled on link");
        }
        self.state = CrcState::Disabled;
    }

    /// The modem rejected a command for missing its checksum.
    pub fn observe_crc_required(&mut self) {
        self.state = CrcState::Enabled;
    }

    /// The modem accepted an explicit `AT%CRC=<n>` command.
    pub fn set_requested(&mut self, enabled: bool) {
        self.state = if enabled {
            CrcState::Enabled
        } else {
            CrcState::Disabled
        };
    }

    fn looks_lossy(source: &[u8]) -> bool {
        source.windows(2).any(|w| w == b"AT" || w == b"\r\r")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_golden_vectors() {
        assert_eq!(crc16(b""), 0x0000);
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_preset_changes_result() {
        assert_eq!(crc16_with_preset(b"123456789", 0xFFFF), 0x29B1);
    }

    #[test]
    fn test_is_checksum_line() {
        assert!(is_checksum_line("*ABCD"));
        assert!(is_checksum_line("*0a1f"));
        assert!(!is_checksum_line("*ABC"));
        assert!(!is_checksum_line("ABCDE"));
        assert!(!is_checksum_line("*ABCG"));
    }

    #[test]
    fn test_validate_crc() {
        let body = b"\r\nOK\r\n";
        let crc = format_crc(crc16(body));
        assert!(validate_crc(body, &crc, CRC_PRESET).is_ok());
        assert!(validate_crc(body, &format!("*{}", crc), CRC_PRESET).is_ok());
        assert!(validate_crc(body, &crc.to_lowercase(), CRC_PRESET).is_ok());

        let err = validate_crc(body, "*0000", CRC_PRESET).unwrap_err();
        match err {
            ProtocolError::CrcMismatch { expected, received, .. } => {
                assert_eq!(expected, crc);
                assert_eq!(received, "0000");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_negotiator_transitions() {
        let mut negotiator = CrcNegotiator::default();
        assert_eq!(negotiator.state(), CrcState::Unknown);

        negotiator.observe_timeout();
        assert_eq!(negotiator.state(), CrcState::Disabled);

        let body = b"\r\nOK\r\n";
        let crc = format_crc(crc16(body));
        negotiator.observe_checksum(&crc, body).unwrap();
        assert_eq!(negotiator.state(), CrcState::Enabled);
        assert_eq!(negotiator.lost_bytes(), 0);
    }

    #[test]
    fn test_mismatch_still_enables() {
        let mut negotiator = CrcNegotiator::default();
        assert!(negotiator.observe_checksum("*FFFF", b"\r\nOK\r\n").is_err());
        assert!(negotiator.state().is_enabled());
    }

    #[test]
    fn test_lost_bytes_is_diagnostic_only() {
        let mut negotiator = CrcNegotiator::default();
        let body = b"\r\nATOK\r\r\n";
        let crc = format_crc(crc16(body));
        assert!(negotiator.observe_checksum(&crc, body).is_ok());
        assert_eq!(negotiator.lost_bytes(), 1);
    }
}
