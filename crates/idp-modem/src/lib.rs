//! IsatData Pro Modem
//!
//! Async AT command engine for IsatData Pro satellite modems, plus the
//! catalog of modem operations built on it.
//!
//! # Architecture
//!
//! - [`Transport`]: byte stream to the modem (serial bridge, TCP, test script)
//! - [`AtClient`]: serialized command dispatcher; drains unsolicited lines,
//!   frames commands, collects responses, tracks the link CRC state and
//!   retries on checksum mismatch
//! - [`IdpModem`]: typed operations (configuration, messaging, GNSS, events,
//!   registers) on top of the dispatcher
//!
//! One exchange is in flight at a time. Every operation takes `&mut self`,
//! so callers sharing a modem between tasks wrap it in a
//! `tokio::sync::Mutex`.
//!
//! # Example
//!
//! ```rust,ignore
//! use idp_modem::{IdpModem, ModemConfig, MoMessage};
//!
//! let config = ModemConfig::from_yaml_file("modem.yaml")?;
//! let mut modem = IdpModem::connect(config).await?;
//!
//! let name = modem
//!     .message_mo_send(&MoMessage::hex(128, &[0x01, 0x02]).with_min(1))
//!     .await?;
//! if let Some(states) = modem.message_mo_state(Some(&name)).await {
//!     println!("{:?}", states);
//! }
//! ```

mod client;
mod config;
mod error;
mod events;
mod messages;
mod modem;
mod reports;
mod transport;

#[cfg(test)]
mod testing;

pub use client::{AtClient, PendingCommand};
pub use config::ModemConfig;
pub use error::{ModemError, ModemResult, TransportError};
pub use events::{EventMonitor, EventRecord};
pub use messages::{decode_text, MoMessage, MoMessageStatus, MtMessage, MtMessagePayload};
pub use modem::IdpModem;
pub use reports::{
    parse_config_report, AtConfig, DeviceVersion, SRegisterInfo, SatelliteStatus,
};
pub use transport::{StreamTransport, Transport};

// Re-export the protocol crate for convenience
pub use idp_at_protocol as protocol;
