//! Commands that can be sent to the modem.
//!
//! The modem supports several categories of commands:
//! - Configuration (reset, restore, save, report, CRC)
//! - Device information and GNSS
//! - Mobile-originated and mobile-terminated message queues
//! - Event traces and notifications
//! - S-register access

use crate::constants::{MAX_MESSAGE_NAME_LENGTH, VOLATILE_REGISTERS};
use crate::types::{DataFormat, NmeaSentence};

/// Commands that can be sent to the modem.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ========== Configuration Commands ==========
    /// Bare `AT` attention command.
    Attention,

    /// Reset from NVM, enable echo and verbose results, optionally enable CRC.
    Initialize {
        /// Append `%CRC=1`.
        crc: bool,
    },

    /// Restore the saved configuration (`ATZ`).
    RestoreNvm,

    /// Restore factory defaults (`AT&F`).
    RestoreFactory,

    /// Report the saved configuration (`AT&V`).
    ConfigReport,

    /// Query the volatile registers of interest in one command.
    VolatileReport,

    /// Save the configuration to NVM (`AT&W`).
    SaveConfig,

    /// Enable or disable CRC on the serial link.
    SetCrc {
        /// New setting.
        enabled: bool,
    },

    /// Prepare for power-down.
    PowerOff,

    // ========== Device Commands ==========
    /// Query the mobile ID.
    MobileId,

    /// Query firmware, hardware and AT versions.
    Version,

    /// Query network UTC time.
    UtcTime,

    // ========== GNSS Commands ==========
    /// Set GNSS continuous refresh.
    GnssContinuous {
        /// Refresh interval in seconds, 0 for on-demand.
        interval: u16,
        /// Enable doppler measurement.
        doppler: bool,
    },

    /// Request NMEA sentences.
    GnssNmea {
        /// Maximum age of the fix in seconds.
        stale_secs: u16,
        /// Maximum time to wait for a fix in seconds.
        wait_secs: u16,
        /// Sentence types to return.
        sentences: Vec<NmeaSentence>,
    },

    // ========== Message Commands ==========
    /// Submit a mobile-originated message.
    MessageMoSend {
        /// Message name (truncated to 8 characters).
        name: String,
        /// Priority 1 (high) to 4 (low).
        priority: u8,
        /// Service identification number.
        sin: u8,
        /// Message identification number.
        min: Option<u8>,
        /// Payload encoding.
        format: DataFormat,
        /// Encoded payload (without SIN/MIN).
        data: String,
    },

    /// Query mobile-originated message state(s).
    MessageMoState {
        /// Message name, or all messages if `None`.
        name: Option<String>,
    },

    /// Cancel a mobile-originated message.
    MessageMoCancel {
        /// Message name.
        name: String,
    },

    /// Clear the mobile-originated queue.
    MessageMoClear,

    /// List received mobile-terminated messages.
    MessageMtWaiting,

    /// Retrieve a mobile-terminated message.
    MessageMtGet {
        /// Message name (e.g. `FM01.01`).
        name: String,
        /// Payload encoding to return.
        format: DataFormat,
    },

    /// Mark a mobile-terminated message for deletion.
    MessageMtDelete {
        /// Message name.
        name: String,
    },

    // ========== Event Commands ==========
    /// Query monitored events.
    EventMonitorGet,

    /// Set monitored events.
    EventMonitorSet {
        /// `(class, subclass)` pairs.
        events: Vec<(u8, u8)>,
    },

    /// Retrieve a cached event.
    EventGet {
        /// Trace class.
        class: u8,
        /// Trace subclass.
        subclass: u8,
    },

    /// Enable low power notifications.
    LowPowerNotifications {
        /// Event to monitor.
        event: (u8, u8),
        /// Notification control bitmask.
        bitmask: u32,
    },

    // ========== Register Commands ==========
    /// Read an S-register.
    RegisterGet {
        /// Register number.
        register: u8,
    },

    /// Write an S-register.
    RegisterSet {
        /// Register number.
        register: u8,
        /// New value.
        value: i64,
    },

    /// Dump all S-register definitions (`AT%SREG`).
    RegisterGetAll,

    /// Capture the satellite trace and read C/N0, control and beam search state.
    SatelliteStatus,
}

impl Command {
    /// Convert the command to the string sent to the modem (without CRC or
    /// terminator).
    pub fn to_command_string(&self) -> String {
        match self {
            Command::Attention => "AT".to_string(),
            Command::Initialize { crc } => {
                format!("ATZ;E1;V1{}", if *crc { ";%CRC=1" } else { "" })
            }
            Command::RestoreNvm => "ATZ".to_string(),
            Command::RestoreFactory => "AT&F".to_string(),
            Command::ConfigReport => "AT&V".to_string(),
            Command::VolatileReport => {
                let queries: Vec<String> = VOLATILE_REGISTERS
                    .iter()
                    .map(|reg| format!("S{}?", reg))
                    .collect();
                format!("AT{}", queries.join(" "))
            }
            Command::SaveConfig => "AT&W".to_string(),
            Command::SetCrc { enabled } => format!("AT%CRC={}", u8::from(*enabled)),
            Command::PowerOff => "AT%OFF".to_string(),
            Command::MobileId => "AT+GSN".to_string(),
            Command::Version => "AT+GMR".to_string(),
            Command::UtcTime => "AT%UTC".to_string(),
            Command::GnssContinuous { interval, doppler } => {
                format!("AT%TRK={},{}", interval, u8::from(*doppler))
            }
            Command::GnssNmea {
                stale_secs,
                wait_secs,
                sentences,
            } => {
                let list: Vec<String> = sentences
                    .iter()
                    .map(|s| format!("\"{}\"", s.as_str()))
                    .collect();
                format!("AT%GPS={},{},{}", stale_secs, wait_secs, list.join(","))
            }
            Command::MessageMoSend {
                name,
                priority,
                sin,
                min,
                format,
                data,
            } => {
                let min = min.map(|m| format!(".{}", m)).unwrap_or_default();
                let data = match format {
                    DataFormat::Text => format!("\"{}\"", data),
                    _ => data.clone(),
                };
                format!(
                    "AT%MGRT=\"{}\",{},{}{},{},{}",
                    truncate_name(name),
                    priority,
                    sin,
                    min,
                    format.code(),
                    data
                )
            }
            Command::MessageMoState { name } => match name {
                Some(name) => format!("AT%MGRS=\"{}\"", name),
                None => "AT%MGRS".to_string(),
            },
            Command::MessageMoCancel { name } => format!("AT%MGRC=\"{}\"", name),
            Command::MessageMoClear => "AT%MGRSC".to_string(),
            Command::MessageMtWaiting => "AT%MGFN".to_string(),
            Command::MessageMtGet { name, format } => {
                format!("AT%MGFG=\"{}\",{}", name, format.code())
            }
            Command::MessageMtDelete { name } => format!("AT%MGFM=\"{}\"", name),
            Command::EventMonitorGet => "AT%EVMON".to_string(),
            Command::EventMonitorSet { events } => {
                let list: Vec<String> = events
                    .iter()
                    .map(|(class, subclass)| format!("{}.{}", class, subclass))
                    .collect();
                format!("AT%EVMON={}", list.join(","))
            }
            Command::EventGet { class, subclass } => format!("AT%EVNT={},{}", class, subclass),
            Command::LowPowerNotifications { event, bitmask } => {
                format!("AT%EVMON={}.{};S88={}", event.0, event.1, bitmask)
            }
            Command::RegisterGet { register } => format!("ATS{}?", register),
            Command::RegisterSet { register, value } => format!("ATS{}={}", register, value),
            Command::RegisterGetAll => "AT%SREG".to_string(),
            Command::SatelliteStatus => "ATS90=3 S91=1 S92=1 S116? S122? S123?".to_string(),
        }
    }
}

/// Truncate a message name to the length the modem accepts.
pub fn truncate_name(name: &str) -> &str {
    match name.char_indices().nth(MAX_MESSAGE_NAME_LENGTH) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize() {
        assert_eq!(Command::Initialize { crc: false }.to_command_string(), "ATZ;E1;V1");
        assert_eq!(
            Command::Initialize { crc: true }.to_command_string(),
            "ATZ;E1;V1;%CRC=1"
        );
    }

    #[test]
    fn test_mo_send_formats() {
        let cmd = Command::MessageMoSend {
            name: "test".into(),
            priority: 4,
            sin: 128,
            min: Some(1),
            format: DataFormat::Text,
            data: "hello".into(),
        };
        assert_eq!(cmd.to_command_string(), "AT%MGRT=\"test\",4,128.1,1,\"hello\"");

        let cmd = Command::MessageMoSend {
            name: "0123456789".into(),
            priority: 2,
            sin: 255,
            min: None,
            format: DataFormat::Base64,
            data: "AQID".into(),
        };
        assert_eq!(cmd.to_command_string(), "AT%MGRT=\"01234567\",2,255,3,AQID");
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("abcdefghij"), "abcdefgh");
        assert_eq!(truncate_name("short"), "short");
        assert_eq!(truncate_name("abcdefgh"), "abcdefgh");
    }

    #[test]
    fn test_query_commands() {
        assert_eq!(
            Command::VolatileReport.to_command_string(),
            "ATS39? S41? S51? S55? S56? S57?"
        );
        assert_eq!(
            Command::GnssNmea {
                stale_secs: 1,
                wait_secs: 35,
                sentences: NmeaSentence::DEFAULT.to_vec(),
            }
            .to_command_string(),
            "AT%GPS=1,35,\"RMC\",\"GSA\",\"GGA\",\"GSV\""
        );
        assert_eq!(
            Command::EventMonitorSet { events: vec![(3, 1), (2, 0)] }.to_command_string(),
            "AT%EVMON=3.1,2.0"
        );
        assert_eq!(
            Command::LowPowerNotifications { event: (3, 1), bitmask: 1030 }.to_command_string(),
            "AT%EVMON=3.1;S88=1030"
        );
        assert_eq!(Command::RegisterGet { register: 80 }.to_command_string(), "ATS80?");
        assert_eq!(
            Command::RegisterSet { register: 88, value: 1030 }.to_command_string(),
            "ATS88=1030"
        );
        assert_eq!(
            Command::MessageMoState { name: Some("a".into()) }.to_command_string(),
            "AT%MGRS=\"a\""
        );
        assert_eq!(Command::SetCrc { enabled: true }.to_command_string(), "AT%CRC=1");
    }
}
