//! Protocol constants
//!
//! S-register numbers, limits and name tables used by the IsatData Pro AT
//! command set.

// ============================================================================
// S-Registers
// ============================================================================

/// GNSS mode.
pub const SREG_GNSS_MODE: u8 = 39;
/// GNSS fix timeout.
pub const SREG_GNSS_FIX_TIMEOUT: u8 = 41;
/// Power mode.
pub const SREG_POWER_MODE: u8 = 50;
/// Low power wakeup interval.
pub const SREG_WAKEUP_INTERVAL: u8 = 51;
/// GNSS continuous mode refresh interval.
pub const SREG_GNSS_CONTINUOUS: u8 = 55;
/// GNSS jamming status.
pub const SREG_GNSS_JAMMING_STATUS: u8 = 56;
/// GNSS jamming indicator.
pub const SREG_GNSS_JAMMING_INDICATOR: u8 = 57;
/// Last error code.
pub const SREG_LAST_ERROR: u8 = 80;
/// Event notification control bitmask.
pub const SREG_NOTIFICATION_CONTROL: u8 = 88;
/// Event notification status bitmask (cleared on read).
pub const SREG_NOTIFICATION_STATUS: u8 = 89;

/// Registers reported by the volatile configuration report.
pub const VOLATILE_REGISTERS: [u8; 6] = [
    SREG_GNSS_MODE,
    SREG_GNSS_FIX_TIMEOUT,
    SREG_WAKEUP_INTERVAL,
    SREG_GNSS_CONTINUOUS,
    SREG_GNSS_JAMMING_STATUS,
    SREG_GNSS_JAMMING_INDICATOR,
];

// ============================================================================
// Limits
// ============================================================================

/// Maximum length of a mobile-originated message name.
pub const MAX_MESSAGE_NAME_LENGTH: usize = 8;
/// Maximum GNSS continuous refresh interval in seconds.
pub const MAX_GNSS_CONTINUOUS_SECS: u16 = 30;
/// Valid range for GNSS fix age and wait time in seconds.
pub const GNSS_SECS_RANGE: std::ops::RangeInclusive<u16> = 1..=600;
/// Extra response time allowed beyond the GNSS wait time.
pub const GNSS_RESPONSE_MARGIN_SECS: u64 = 5;
/// Default priority for mobile-originated messages (low).
pub const DEFAULT_MO_PRIORITY: u8 = 4;
/// Notification bitmask set by the low power helper (MT received, MO
/// complete, event cached).
pub const LOWPOWER_NOTIFICATIONS: u32 = 1030;
/// Event monitored by the low power helper (satellite general trace).
pub const LOWPOWER_EVENT: (u8, u8) = (3, 1);

// ============================================================================
// Name Tables
// ============================================================================

/// Satellite control states (trace class 3, subclass 1, index 22).
pub const CONTROL_STATES: [&str; 15] = [
    "Stopped",
    "Waiting for GNSS fix",
    "Starting search",
    "Beam search",
    "Beam found",
    "Beam acquired",
    "Beam switch in progress",
    "Registration in progress",
    "Receive only",
    "Downloading Bulletin Board",
    "Active",
    "Blocked",
    "Confirm previously registered beam",
    "Confirm requested beam",
    "Connect to confirmed beam",
];

/// Beam search states.
pub const BEAMSEARCH_STATES: [&str; 7] = [
    "Idle",
    "Search for any traffic channel",
    "Search for last acquired traffic channel",
    "reserved",
    "Search for another traffic channel",
    "Search for bulletin board",
    "Delay traffic channel search",
];

/// Notification flag names in bit order (bit 0 first).
pub const NOTIFICATION_NAMES: [&str; 12] = [
    "gnss_fix_new",
    "message_mt_received",
    "message_mo_complete",
    "network_registered",
    "modem_reset",
    "jamming_antenna_change",
    "modem_reset_pending",
    "wakeup_period_changed",
    "utc_time_set",
    "gnss_fix_timeout",
    "event_cached",
    "network_ping_acknowledged",
];
