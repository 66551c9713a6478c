//! Common types used in the AT protocol.

use std::fmt;

use crate::constants::{BEAMSEARCH_STATES, CONTROL_STATES, NOTIFICATION_NAMES};

/// Payload encoding used by the message commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Quoted text with `\HH` escapes for non-printable bytes.
    Text,
    /// Hexadecimal string.
    Hex,
    /// Base64 string.
    Base64,
}

impl DataFormat {
    /// Numeric value used in commands.
    pub fn code(&self) -> u8 {
        match self {
            DataFormat::Text => 1,
            DataFormat::Hex => 2,
            DataFormat::Base64 => 3,
        }
    }

    /// Parse the numeric value used in commands.
    pub fn from_code(code: u8) -> Option<DataFormat> {
        match code {
            1 => Some(DataFormat::Text),
            2 => Some(DataFormat::Hex),
            3 => Some(DataFormat::Base64),
            _ => None,
        }
    }
}

/// Queue state of a mobile-originated or mobile-terminated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// 0
    Unavailable,
    /// 1
    RxPending,
    /// 2
    RxComplete,
    /// 3
    RxRetrieved,
    /// 4
    TxReady,
    /// 5
    TxSending,
    /// 6
    TxComplete,
    /// 7
    TxFailed,
    /// 8
    TxCancelled,
    /// Undocumented value.
    Unknown(u8),
}

impl MessageState {
    /// Numeric state value.
    pub fn code(&self) -> u8 {
        match self {
            MessageState::Unavailable => 0,
            MessageState::RxPending => 1,
            MessageState::RxComplete => 2,
            MessageState::RxRetrieved => 3,
            MessageState::TxReady => 4,
            MessageState::TxSending => 5,
            MessageState::TxComplete => 6,
            MessageState::TxFailed => 7,
            MessageState::TxCancelled => 8,
            MessageState::Unknown(code) => *code,
        }
    }

    /// Name as documented for the modem.
    pub fn name(&self) -> &'static str {
        match self {
            MessageState::Unavailable => "UNAVAILABLE",
            MessageState::RxPending => "RX_PENDING",
            MessageState::RxComplete => "RX_COMPLETE",
            MessageState::RxRetrieved => "RX_RETRIEVED",
            MessageState::TxReady => "TX_READY",
            MessageState::TxSending => "TX_SENDING",
            MessageState::TxComplete => "TX_COMPLETE",
            MessageState::TxFailed => "TX_FAILED",
            MessageState::TxCancelled => "TX_CANCELLED",
            MessageState::Unknown(_) => "UNKNOWN",
        }
    }

    /// Whether a mobile-originated message in this state can still be
    /// cancelled.
    pub fn is_open(&self) -> bool {
        self.code() < 6
    }
}

impl From<u8> for MessageState {
    fn from(code: u8) -> Self {
        match code {
            0 => MessageState::Unavailable,
            1 => MessageState::RxPending,
            2 => MessageState::RxComplete,
            3 => MessageState::RxRetrieved,
            4 => MessageState::TxReady,
            5 => MessageState::TxSending,
            6 => MessageState::TxComplete,
            7 => MessageState::TxFailed,
            8 => MessageState::TxCancelled,
            other => MessageState::Unknown(other),
        }
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Satellite control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState(pub u8);

impl ControlState {
    /// Human-readable description, if the value is documented.
    pub fn name(&self) -> Option<&'static str> {
        CONTROL_STATES.get(self.0 as usize).copied()
    }

    /// Whether the modem is registered and able to send.
    pub fn is_active(&self) -> bool {
        self.0 == 10
    }
}

/// Beam search state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeamSearchState(pub u8);

impl BeamSearchState {
    /// Human-readable description, if the value is documented.
    pub fn name(&self) -> Option<&'static str> {
        BEAMSEARCH_STATES.get(self.0 as usize).copied()
    }
}

/// Power mode (S50).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    MobilePowered,
    FixedPowered,
    MobileBattery,
    FixedBattery,
    MobileMinimal,
    MobileStationary,
}

impl PowerMode {
    /// Register value.
    pub fn code(&self) -> u8 {
        match self {
            PowerMode::MobilePowered => 0,
            PowerMode::FixedPowered => 1,
            PowerMode::MobileBattery => 2,
            PowerMode::FixedBattery => 3,
            PowerMode::MobileMinimal => 4,
            PowerMode::MobileStationary => 5,
        }
    }

    /// Parse a register value.
    pub fn from_code(code: i64) -> Option<PowerMode> {
        match code {
            0 => Some(PowerMode::MobilePowered),
            1 => Some(PowerMode::FixedPowered),
            2 => Some(PowerMode::MobileBattery),
            3 => Some(PowerMode::FixedBattery),
            4 => Some(PowerMode::MobileMinimal),
            5 => Some(PowerMode::MobileStationary),
            _ => None,
        }
    }
}

/// Low power wakeup interval (S51).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupInterval {
    Seconds5,
    Seconds30,
    Minutes1,
    Minutes3,
    Minutes10,
    Minutes30,
    Minutes60,
    Minutes2,
    Minutes5,
    Minutes15,
    Minutes20,
}

impl WakeupInterval {
    const ALL: [WakeupInterval; 11] = [
        WakeupInterval::Seconds5,
        WakeupInterval::Seconds30,
        WakeupInterval::Minutes1,
        WakeupInterval::Minutes3,
        WakeupInterval::Minutes10,
        WakeupInterval::Minutes30,
        WakeupInterval::Minutes60,
        WakeupInterval::Minutes2,
        WakeupInterval::Minutes5,
        WakeupInterval::Minutes15,
        WakeupInterval::Minutes20,
    ];

    /// Register value.
    pub fn code(&self) -> u8 {
        Self::ALL.iter().position(|w| w == self).unwrap_or(0) as u8
    }

    /// Parse a register value.
    pub fn from_code(code: i64) -> Option<WakeupInterval> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Interval length in seconds.
    pub fn seconds(&self) -> u32 {
        match self {
            WakeupInterval::Seconds5 => 5,
            WakeupInterval::Seconds30 => 30,
            WakeupInterval::Minutes1 => 60,
            WakeupInterval::Minutes3 => 180,
            WakeupInterval::Minutes10 => 600,
            WakeupInterval::Minutes30 => 1800,
            WakeupInterval::Minutes60 => 3600,
            WakeupInterval::Minutes2 => 120,
            WakeupInterval::Minutes5 => 300,
            WakeupInterval::Minutes15 => 900,
            WakeupInterval::Minutes20 => 1200,
        }
    }
}

/// NMEA sentence types the GNSS query can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmeaSentence {
    Rmc,
    Gga,
    Gsa,
    Gsv,
}

impl NmeaSentence {
    /// Sentences requested by default.
    pub const DEFAULT: [NmeaSentence; 4] = [
        NmeaSentence::Rmc,
        NmeaSentence::Gsa,
        NmeaSentence::Gga,
        NmeaSentence::Gsv,
    ];

    /// Sentence identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            NmeaSentence::Rmc => "RMC",
            NmeaSentence::Gga => "GGA",
            NmeaSentence::Gsa => "GSA",
            NmeaSentence::Gsv => "GSV",
        }
    }
}

/// Event notification flags (S88 control / S89 status).
///
/// The discriminant is the bit position in the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum NotificationFlag {
    GnssFixNew = 0,
    MessageMtReceived = 1,
    MessageMoComplete = 2,
    NetworkRegistered = 3,
    ModemReset = 4,
    JammingAntennaChange = 5,
    ModemResetPending = 6,
    WakeupPeriodChanged = 7,
    UtcTimeSet = 8,
    GnssFixTimeout = 9,
    EventCached = 10,
    NetworkPingAcknowledged = 11,
}

impl NotificationFlag {
    /// All flags in bit order.
    pub const ALL: [NotificationFlag; 12] = [
        NotificationFlag::GnssFixNew,
        NotificationFlag::MessageMtReceived,
        NotificationFlag::MessageMoComplete,
        NotificationFlag::NetworkRegistered,
        NotificationFlag::ModemReset,
        NotificationFlag::JammingAntennaChange,
        NotificationFlag::ModemResetPending,
        NotificationFlag::WakeupPeriodChanged,
        NotificationFlag::UtcTimeSet,
        NotificationFlag::GnssFixTimeout,
        NotificationFlag::EventCached,
        NotificationFlag::NetworkPingAcknowledged,
    ];

    /// Bit position in the register.
    pub fn bit(&self) -> u8 {
        *self as u8
    }

    /// Flag name.
    pub fn name(&self) -> &'static str {
        NOTIFICATION_NAMES[self.bit() as usize]
    }

    /// Look up a flag by name.
    pub fn from_name(name: &str) -> Option<NotificationFlag> {
        Self::ALL.iter().copied().find(|flag| flag.name() == name)
    }
}

impl fmt::Display for NotificationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of notification flags packed into S88/S89.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct NotificationBitmask {
    bits: u16,
}

impl NotificationBitmask {
    const DEFINED: u16 = (1 << NotificationFlag::ALL.len()) - 1;

    /// No flags set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode a register value. Bits above the defined flags are dropped.
    pub fn from_register(value: u32) -> Self {
        NotificationBitmask {
            bits: (value & Self::DEFINED as u32) as u16,
        }
    }

    /// Encode as a register value.
    pub fn to_register(&self) -> u32 {
        self.bits as u32
    }

    /// Whether `flag` is set.
    pub fn is_set(&self, flag: NotificationFlag) -> bool {
        self.bits & (1 << flag.bit()) != 0
    }

    /// Set or clear `flag`.
    pub fn set(&mut self, flag: NotificationFlag, on: bool) {
        if on {
            self.bits |= 1 << flag.bit();
        } else {
            self.bits &= !(1 << flag.bit());
        }
    }

    /// All flags with their values, in bit order.
    pub fn iter(&self) -> impl Iterator<Item = (NotificationFlag, bool)> + '_ {
        NotificationFlag::ALL
            .iter()
            .map(move |&flag| (flag, self.is_set(flag)))
    }

    /// Flags that are set, in bit order.
    pub fn active(&self) -> Vec<NotificationFlag> {
        self.iter()
            .filter_map(|(flag, on)| on.then_some(flag))
            .collect()
    }
}

impl FromIterator<NotificationFlag> for NotificationBitmask {
    fn from_iter<I: IntoIterator<Item = NotificationFlag>>(iter: I) -> Self {
        let mut mask = NotificationBitmask::empty();
        for flag in iter {
            mask.set(flag, true);
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_round_trip_every_subset() {
        for subset in 0u32..(1 << NotificationFlag::ALL.len()) {
            let flags: Vec<NotificationFlag> = NotificationFlag::ALL
                .iter()
                .copied()
                .filter(|flag| subset & (1 << flag.bit()) != 0)
                .collect();
            let mask: NotificationBitmask = flags.iter().copied().collect();
            let decoded = NotificationBitmask::from_register(mask.to_register());
            assert_eq!(decoded.active(), flags);
        }
    }

    #[test]
    fn test_notification_bit_order() {
        let mask = NotificationBitmask::from_register(1030);
        assert_eq!(
            mask.active(),
            vec![
                NotificationFlag::MessageMtReceived,
                NotificationFlag::MessageMoComplete,
                NotificationFlag::EventCached,
            ]
        );
        assert_eq!(NotificationFlag::GnssFixNew.name(), "gnss_fix_new");
        assert_eq!(
            NotificationFlag::from_name("network_ping_acknowledged"),
            Some(NotificationFlag::NetworkPingAcknowledged)
        );
    }

    #[test]
    fn test_notification_ignores_undefined_bits() {
        let mask = NotificationBitmask::from_register(0xF001);
        assert_eq!(mask.to_register(), 1);
    }

    #[test]
    fn test_message_state_codes() {
        for code in 0..=9u8 {
            assert_eq!(MessageState::from(code).code(), code);
        }
        assert!(MessageState::TxReady.is_open());
        assert!(!MessageState::TxComplete.is_open());
        assert_eq!(MessageState::from(9).name(), "UNKNOWN");
    }

    #[test]
    fn test_register_enums() {
        assert_eq!(WakeupInterval::from_code(7), Some(WakeupInterval::Minutes2));
        assert_eq!(WakeupInterval::Minutes20.code(), 10);
        assert_eq!(WakeupInterval::from_code(11), None);
        assert_eq!(PowerMode::from_code(2), Some(PowerMode::MobileBattery));
        assert_eq!(ControlState(10).name(), Some("Active"));
        assert_eq!(BeamSearchState(9).name(), None);
        assert_eq!(DataFormat::from_code(3), Some(DataFormat::Base64));
    }
}
