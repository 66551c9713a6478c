//! IsatData Pro AT Command Protocol
//!
//! This crate provides types and utilities for talking to IsatData Pro
//! satellite modems over their serial AT command interface. It contains no
//! I/O: the async dispatcher in `idp-modem` owns the transport and drives the
//! pieces defined here.
//!
//! # Protocol Overview
//!
//! The AT protocol is a line-based text interface:
//!
//! - **Commands** (host → modem): Text commands terminated with `\r`, optionally
//!   followed by `*HHHH` when CRC is enabled on the link
//! - **Echo**: The modem echoes the command back (when `E1` is set)
//! - **Responses** (modem → host): Zero or more lines terminated with `\r\n`
//! - **Result**: `OK` or `ERROR`, then a `*HHHH` checksum line if CRC is enabled
//!
//! The modem gives no notice that CRC is on or off. The host learns it from
//! whether a checksum line follows the result code ([`CrcNegotiator`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use idp_at_protocol::{Command, LineCodec, ResponseCollector};
//!
//! // Build a command
//! let text = Command::RegisterGet { register: 80 }.to_command_string();
//! let bytes = LineCodec::encode_command(&text, false, 0);
//!
//! // Feed reply lines to a collector
//! let mut collector = ResponseCollector::new(&text);
//! collector.push_line(b"ATS80?\r\r\n");
//! ```

mod codec;
mod collector;
mod commands;
pub mod constants;
mod crc;
mod error;
mod responses;
mod types;

pub use codec::*;
pub use collector::*;
pub use commands::*;
pub use crc::*;
pub use error::*;
pub use responses::*;
pub use types::*;
