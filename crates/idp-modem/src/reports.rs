//! Decoded configuration, identity and status reports.

use std::collections::BTreeMap;

use idp_at_protocol::{
    parse_field, strip_prefix, BeamSearchState, ControlState, ProtocolError, ProtocolResult,
};

/// Serial interface settings reported by `AT&V`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtConfig {
    /// `%CRC`
    pub crc: bool,
    /// `E`
    pub echo: bool,
    /// `Q`
    pub quiet: bool,
    /// `V`
    pub verbose: bool,
}

impl AtConfig {
    /// Parse a line such as `E1 Q0 V1 CRC=0`.
    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let mut config = AtConfig {
            crc: false,
            echo: false,
            quiet: false,
            verbose: false,
        };
        let mut seen = 0;
        for token in line.split_whitespace() {
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key, value),
                None if token.len() >= 2 => token.split_at(1),
                None => continue,
            };
            let flag = value == "1";
            match key {
                "CRC" => config.crc = flag,
                "E" => config.echo = flag,
                "Q" => config.quiet = flag,
                "V" => config.verbose = flag,
                _ => continue,
            }
            seen += 1;
        }
        if seen == 0 {
            return Err(ProtocolError::Malformed(format!("no settings in {:?}", line)));
        }
        Ok(config)
    }
}

/// Parse `AT&V` response lines into interface settings and saved register
/// values (`S0:000 S3:013 ...`).
pub fn parse_config_report(lines: &[String]) -> ProtocolResult<(AtConfig, BTreeMap<String, i64>)> {
    let at_line = lines
        .iter()
        .find(|line| line.contains("CRC="))
        .ok_or_else(|| ProtocolError::Malformed("no interface settings in report".into()))?;
    let at_config = AtConfig::parse(at_line)?;

    let mut registers = BTreeMap::new();
    for line in lines.iter().filter(|line| line.trim_start().starts_with('S')) {
        for token in line.split_whitespace() {
            let (name, value) = token
                .split_once(':')
                .ok_or_else(|| ProtocolError::Malformed(format!("bad register {:?}", token)))?;
            let value = parse_field::<i64>(Some(value), name)?;
            registers.insert(name.to_string(), value);
        }
    }
    Ok((at_config, registers))
}

/// Firmware, hardware and AT command set versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceVersion {
    pub firmware: String,
    pub hardware: String,
    pub at: String,
}

impl DeviceVersion {
    /// Parse a `+GMR: <fw>,<hw>,<at>` line.
    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let fields: Vec<&str> = strip_prefix(line, "+GMR:").split(',').collect();
        match fields.as_slice() {
            [firmware, hardware, at] => Ok(DeviceVersion {
                firmware: firmware.trim().to_string(),
                hardware: hardware.trim().to_string(),
                at: at.trim().to_string(),
            }),
            _ => Err(ProtocolError::Malformed(format!("bad version {:?}", line))),
        }
    }
}

/// Satellite link state and signal quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatelliteStatus {
    /// Carrier to noise density in dB-Hz.
    pub snr: f32,
    pub control: ControlState,
    pub beam_search: BeamSearchState,
}

impl SatelliteStatus {
    /// Parse the three register lines: C/N0 (hundredths), control state,
    /// beam search state.
    pub fn parse(lines: &[String]) -> ProtocolResult<Self> {
        match lines {
            [cn0, control, beam_search] => Ok(SatelliteStatus {
                snr: parse_field::<i64>(Some(cn0.as_str()), "C/N0")? as f32 / 100.0,
                control: ControlState(parse_field(Some(control.as_str()), "control state")?),
                beam_search: BeamSearchState(parse_field(
                    Some(beam_search.as_str()),
                    "beam search state",
                )?),
            }),
            _ => Err(ProtocolError::Malformed(format!(
                "expected 3 status lines, got {}",
                lines.len()
            ))),
        }
    }
}

/// One row of the `AT%SREG` register table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SRegisterInfo {
    pub register: u8,
    /// Access flags: `R` read-only, `S` signed, `V` volatile.
    pub flags: String,
    pub current: i64,
    pub default: i64,
    pub minimum: i64,
    pub maximum: i64,
}

impl SRegisterInfo {
    /// Parse a whitespace-separated table row. Returns `None` for headers.
    pub fn parse(row: &str) -> Option<Self> {
        let fields: Vec<&str> = row.split_whitespace().collect();
        if fields.len() < 6 {
            return None;
        }
        let register = fields[0].trim_start_matches('S').parse().ok()?;
        let number = |i: usize| fields[i].parse::<i64>().ok();
        Some(SRegisterInfo {
            register,
            flags: fields[1].to_string(),
            current: number(2)?,
            default: number(3)?,
            minimum: number(4)?,
            maximum: number(5)?,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains('R')
    }

    pub fn is_signed(&self) -> bool {
        self.flags.contains('S')
    }

    pub fn is_volatile(&self) -> bool {
        self.flags.contains('V')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_config_report() {
        let (at, regs) = parse_config_report(&lines(&[
            "ACTIVE CONFIGURATION:",
            "E1 Q0 V1 CRC=0",
            "S0:000 S3:013 S4:010 S88:1030",
        ]))
        .unwrap();
        assert_eq!(
            at,
            AtConfig {
                crc: false,
                echo: true,
                quiet: false,
                verbose: true
            }
        );
        assert_eq!(regs.get("S3"), Some(&13));
        assert_eq!(regs.get("S88"), Some(&1030));
        assert_eq!(regs.len(), 4);

        assert!(parse_config_report(&lines(&["S0:000"])).is_err());
    }

    #[test]
    fn test_device_version() {
        let version = DeviceVersion::parse("+GMR: 3.003,3.1,8").unwrap();
        assert_eq!(version.firmware, "3.003");
        assert_eq!(version.hardware, "3.1");
        assert_eq!(version.at, "8");
        assert!(DeviceVersion::parse("+GMR: 3.003").is_err());
    }

    #[test]
    fn test_satellite_status() {
        let status = SatelliteStatus::parse(&lines(&["4150", "10", "0"])).unwrap();
        assert!((status.snr - 41.5).abs() < f32::EPSILON);
        assert!(status.control.is_active());
        assert_eq!(status.control.name(), Some("Active"));
        assert_eq!(status.beam_search.name(), Some("Idle"));
        assert!(SatelliteStatus::parse(&lines(&["4150", "10"])).is_err());
    }

    #[test]
    fn test_sreg_row() {
        let row = SRegisterInfo::parse("S88  -V   1030  0  0  65535").unwrap();
        assert_eq!(row.register, 88);
        assert_eq!(row.current, 1030);
        assert!(row.is_volatile());
        assert!(!row.is_read_only());
        assert!(SRegisterInfo::parse("REG  T  VALUE  DEFAULT  MIN  MAX").is_none());
        assert!(SRegisterInfo::parse("---").is_none());
    }
}
