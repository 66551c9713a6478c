//! High level modem operations.
//!
//! Operations are split by what they do with the answer:
//! - status queries return `Option<T>` and log why they came back empty,
//! - operations that change modem state return [`ModemResult<T>`] and fail
//!   with [`ModemError::Device`] when the modem answers `ERROR`.
//!
//! Message and event operations live in the `messages` and `events`
//! modules.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use idp_at_protocol::{
    constants::{
        GNSS_RESPONSE_MARGIN_SECS, GNSS_SECS_RANGE, MAX_GNSS_CONTINUOUS_SECS, SREG_LAST_ERROR,
        SREG_POWER_MODE, SREG_WAKEUP_INTERVAL, VOLATILE_REGISTERS,
    },
    AtErrorCode, Command, CrcState, NmeaSentence, PowerMode, ResponseFrame, WakeupInterval,
};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::client::AtClient;
use crate::config::ModemConfig;
use crate::error::{ModemError, ModemResult};
use crate::reports::{parse_config_report, AtConfig, DeviceVersion, SRegisterInfo, SatelliteStatus};
use crate::transport::{StreamTransport, Transport};

/// An IsatData Pro modem.
pub struct IdpModem<T> {
    pub(crate) client: AtClient<T>,
}

impl IdpModem<StreamTransport<TcpStream>> {
    /// Connect to the TCP serial bridge named in `config.address` and
    /// initialize the modem, enabling CRC if `config.crc` is set.
    pub async fn connect(config: ModemConfig) -> ModemResult<Self> {
        config.validate()?;
        let address = config
            .address
            .clone()
            .ok_or_else(|| ModemError::Config("no address configured".into()))?;
        let transport = StreamTransport::connect_tcp(&address).await?;
        let crc = config.crc;
        let mut modem = Self::new(transport, config);
        modem.initialize(crc).await?;
        Ok(modem)
    }
}

impl<T: Transport> IdpModem<T> {
    /// Wrap a transport.
    pub fn new(transport: T, config: ModemConfig) -> Self {
        IdpModem {
            client: AtClient::new(transport, config),
        }
    }

    /// The command dispatcher, for commands not covered here.
    pub fn client(&mut self) -> &mut AtClient<T> {
        &mut self.client
    }

    /// Current inferred CRC state of the link.
    pub fn crc_state(&self) -> CrcState {
        self.client.crc_state()
    }

    pub(crate) fn name(&self) -> &str {
        &self.client.config().name
    }

    // ========================================================================
    // Dispatch helpers
    // ========================================================================

    /// Run a status query; `None` on any failure.
    pub(crate) async fn query(&mut self, command: Command) -> Option<ResponseFrame> {
        let text = command.to_command_string();
        match self.client.exchange(&text).await {
            Ok(frame) if frame.is_ok() => Some(frame),
            Ok(frame) => {
                warn!(
                    "{}: {} failed: {}",
                    self.name(),
                    text,
                    frame.error.unwrap_or(AtErrorCode::Error)
                );
                None
            }
            Err(e) => {
                warn!("{}: {} failed: {}", self.name(), text, e);
                None
            }
        }
    }

    /// Run a state-changing command; `ERROR` becomes [`ModemError::Device`].
    pub(crate) async fn execute(&mut self, command: Command) -> ModemResult<ResponseFrame> {
        let timeout = self.client.config().command_timeout();
        self.execute_with_timeout(command, timeout).await
    }

    pub(crate) async fn execute_with_timeout(
        &mut self,
        command: Command,
        timeout: Duration,
    ) -> ModemResult<ResponseFrame> {
        let text = command.to_command_string();
        let retries = self.client.config().crc_retries;
        let frame = self.client.command(&text, timeout, retries).await?;
        if frame.is_error() {
            return Err(ModemError::Device {
                command: text,
                code: frame.error.unwrap_or(AtErrorCode::Error),
            });
        }
        Ok(frame)
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Reset to the saved configuration with echo and verbose results on,
    /// optionally enabling CRC.
    pub async fn initialize(&mut self, crc: bool) -> ModemResult<()> {
        debug!("{}: initializing{}", self.name(), if crc { " (CRC)" } else { "" });
        let command = Command::Initialize { crc };
        match self.execute(command.clone()).await {
            Ok(_) => {}
            Err(ModemError::Device {
                code: AtErrorCode::InvalidCrcSequence,
                ..
            }) => {
                if crc && self.client.crc_state() == CrcState::Enabled {
                    debug!("{}: CRC already enabled", self.name());
                    return Ok(());
                }
                self.client.negotiator_mut().observe_crc_required();
                self.execute(command).await?;
            }
            Err(e) => return Err(e),
        }
        if crc {
            self.client.negotiator_mut().set_requested(true);
        }
        Ok(())
    }

    /// Restore the configuration saved in non-volatile memory (`ATZ`).
    pub async fn config_restore_nvm(&mut self) -> ModemResult<()> {
        self.execute(Command::RestoreNvm).await.map(|_| ())
    }

    /// Restore factory defaults (`AT&F`).
    pub async fn config_restore_factory(&mut self) -> ModemResult<()> {
        debug!("{}: restoring factory defaults", self.name());
        self.execute(Command::RestoreFactory).await.map(|_| ())
    }

    /// Interface settings and saved S-register values.
    pub async fn config_report(&mut self) -> Option<(AtConfig, BTreeMap<String, i64>)> {
        let frame = self.query(Command::ConfigReport).await?;
        parse_config_report(&frame.lines)
            .map_err(|e| warn!("{}: bad configuration report: {}", self.name(), e))
            .ok()
    }

    /// Current values of the volatile registers of interest.
    pub async fn config_volatile_report(&mut self) -> Option<BTreeMap<u8, i64>> {
        let frame = self.query(Command::VolatileReport).await?;
        if frame.lines.len() != VOLATILE_REGISTERS.len() {
            warn!(
                "{}: expected {} register values, got {:?}",
                self.name(),
                VOLATILE_REGISTERS.len(),
                frame.lines
            );
            return None;
        }
        let mut report = BTreeMap::new();
        for (register, line) in VOLATILE_REGISTERS.iter().zip(&frame.lines) {
            match line.trim().parse::<i64>() {
                Ok(value) => {
                    report.insert(*register, value);
                }
                Err(_) => {
                    warn!("{}: bad value for S{}: {}", self.name(), register, line);
                    return None;
                }
            }
        }
        Some(report)
    }

    /// Save the current configuration to non-volatile memory (`AT&W`).
    pub async fn config_save(&mut self) -> ModemResult<()> {
        debug!("{}: saving configuration", self.name());
        self.execute(Command::SaveConfig).await.map(|_| ())
    }

    /// Enable or disable CRC on the serial link.
    pub async fn config_crc_enable(&mut self, enabled: bool) -> ModemResult<()> {
        debug!(
            "{}: {} CRC",
            self.name(),
            if enabled { "enabling" } else { "disabling" }
        );
        match self.execute(Command::SetCrc { enabled }).await {
            Ok(_) => {}
            Err(ModemError::Device { code, .. })
                if self.client.crc_state().is_enabled() == enabled =>
            {
                debug!("{}: CRC already in requested state ({})", self.name(), code);
            }
            Err(e) => return Err(e),
        }
        self.client.negotiator_mut().set_requested(enabled);
        Ok(())
    }

    // ========================================================================
    // Device
    // ========================================================================

    /// The unique mobile ID.
    pub async fn device_mobile_id(&mut self) -> Option<String> {
        let frame = self.query(Command::MobileId).await?;
        frame.value("+GSN:").map(str::to_string)
    }

    /// Firmware, hardware and AT versions.
    pub async fn device_version(&mut self) -> Option<DeviceVersion> {
        let frame = self.query(Command::Version).await?;
        let line = frame.first_line()?;
        DeviceVersion::parse(line)
            .map_err(|e| warn!("{}: {}", self.name(), e))
            .ok()
    }

    /// Prepare the modem for power-down.
    pub async fn shutdown(&mut self) -> ModemResult<()> {
        debug!("{}: requesting power down", self.name());
        self.execute(Command::PowerOff).await.map(|_| ())
    }

    /// Network UTC time.
    pub async fn time_utc(&mut self) -> Option<DateTime<Utc>> {
        let frame = self.query(Command::UtcTime).await?;
        let value = frame.value("%UTC:")?;
        match NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
            Ok(time) => Some(time.and_utc()),
            Err(e) => {
                warn!("{}: bad UTC time {:?}: {}", self.name(), value, e);
                None
            }
        }
    }

    // ========================================================================
    // GNSS
    // ========================================================================

    /// Set the GNSS continuous refresh interval (0 for on-demand fixes).
    pub async fn gnss_continuous_set(&mut self, interval: u16, doppler: bool) -> ModemResult<()> {
        if interval > MAX_GNSS_CONTINUOUS_SECS {
            return Err(ModemError::InvalidArgument(format!(
                "GNSS continuous interval must be 0..={}",
                MAX_GNSS_CONTINUOUS_SECS
            )));
        }
        debug!("{}: GNSS refresh every {} s", self.name(), interval);
        self.execute(Command::GnssContinuous { interval, doppler })
            .await
            .map(|_| ())
    }

    /// NMEA sentences for a fix no older than `stale_secs`, waiting up to
    /// `wait_secs` for one.
    pub async fn gnss_nmea_get(
        &mut self,
        stale_secs: u16,
        wait_secs: u16,
        sentences: &[NmeaSentence],
    ) -> ModemResult<Vec<String>> {
        if !GNSS_SECS_RANGE.contains(&stale_secs) || !GNSS_SECS_RANGE.contains(&wait_secs) {
            return Err(ModemError::InvalidArgument(format!(
                "stale_secs and wait_secs must be {}..={}",
                GNSS_SECS_RANGE.start(),
                GNSS_SECS_RANGE.end()
            )));
        }
        if sentences.is_empty() {
            return Err(ModemError::InvalidArgument("no NMEA sentences requested".into()));
        }
        debug!("{}: requesting GNSS fix", self.name());
        let timeout = Duration::from_secs(u64::from(wait_secs) + GNSS_RESPONSE_MARGIN_SECS);
        let command = Command::GnssNmea {
            stale_secs,
            wait_secs,
            sentences: sentences.to_vec(),
        };
        let frame = match self.execute_with_timeout(command, timeout).await {
            Err(ModemError::Device {
                code: AtErrorCode::TimeoutOccurred,
                ..
            }) => return Err(ModemError::GnssTimeout),
            result => result?,
        };
        let mut lines = frame.lines;
        if let Some(first) = lines.first_mut() {
            *first = idp_at_protocol::strip_prefix(first, "%GPS:").to_string();
        }
        Ok(lines)
    }

    // ========================================================================
    // Status and registers
    // ========================================================================

    /// Satellite control state, beam search state and C/N0.
    pub async fn sat_status_snr(&mut self) -> Option<SatelliteStatus> {
        let frame = self.query(Command::SatelliteStatus).await?;
        SatelliteStatus::parse(&frame.lines)
            .map_err(|e| warn!("{}: bad satellite status: {}", self.name(), e))
            .ok()
    }

    /// Read an S-register.
    pub async fn s_register_get(&mut self, register: u8) -> Option<i64> {
        let frame = self.query(Command::RegisterGet { register }).await?;
        let line = frame.first_line()?;
        line.trim()
            .parse()
            .map_err(|_| warn!("{}: bad value for S{}: {}", self.name(), register, line))
            .ok()
    }

    /// Write an S-register.
    pub async fn s_register_set(&mut self, register: u8, value: i64) -> ModemResult<()> {
        debug!("{}: S{} = {}", self.name(), register, value);
        self.execute(Command::RegisterSet { register, value })
            .await
            .map(|_| ())
    }

    /// Definitions and values of every S-register.
    pub async fn s_register_get_all(&mut self) -> Option<Vec<SRegisterInfo>> {
        let frame = self.query(Command::RegisterGetAll).await?;
        Some(
            frame
                .lines
                .iter()
                .filter_map(|row| SRegisterInfo::parse(row))
                .collect(),
        )
    }

    /// Last error code reported by the modem (S80).
    pub async fn error_detail(&mut self) -> Option<AtErrorCode> {
        let value = self.s_register_get(SREG_LAST_ERROR).await?;
        u16::try_from(value).ok().map(AtErrorCode::from)
    }

    /// Power mode (S50).
    pub async fn power_mode_get(&mut self) -> Option<PowerMode> {
        let value = self.s_register_get(SREG_POWER_MODE).await?;
        PowerMode::from_code(value)
    }

    /// Set the power mode (S50).
    pub async fn power_mode_set(&mut self, mode: PowerMode) -> ModemResult<()> {
        self.s_register_set(SREG_POWER_MODE, i64::from(mode.code()))
            .await
    }

    /// Low power wakeup interval (S51).
    pub async fn wakeup_interval_get(&mut self) -> Option<WakeupInterval> {
        let value = self.s_register_get(SREG_WAKEUP_INTERVAL).await?;
        WakeupInterval::from_code(value)
    }

    /// Set the low power wakeup interval (S51).
    pub async fn wakeup_interval_set(&mut self, interval: WakeupInterval) -> ModemResult<()> {
        self.s_register_set(SREG_WAKEUP_INTERVAL, i64::from(interval.code()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{crc_reply, modem, reply, with_crc, ScriptedTransport};
    use chrono::{Datelike, Timelike};

    fn writes(modem: &IdpModem<ScriptedTransport>) -> Vec<String> {
        modem.client.transport().writes()
    }

    #[tokio::test]
    async fn test_initialize() {
        let mut transport = ScriptedTransport::new();
        transport.expect("ATZ;E1;V1", &reply("ATZ;E1;V1", "\r\nOK\r\n"));
        let mut modem = modem(transport);

        modem.initialize(false).await.unwrap();
        assert_eq!(modem.crc_state(), CrcState::Disabled);
    }

    #[tokio::test]
    async fn test_initialize_crc_already_enabled() {
        let mut transport = ScriptedTransport::new();
        transport.expect(
            "ATZ;E1;V1;%CRC=1",
            &crc_reply("ATZ;E1;V1;%CRC=1", "\r\nERROR\r\n", 0),
        );
        let s80 = with_crc("ATS80?", 0);
        transport.expect(&s80, &crc_reply(&s80, "\r\n100\r\n\r\nOK\r\n", 0));
        let mut modem = modem(transport);

        modem.initialize(true).await.unwrap();
        assert_eq!(modem.crc_state(), CrcState::Enabled);
        assert_eq!(writes(&modem).len(), 2);
    }

    #[tokio::test]
    async fn test_initialize_retries_with_crc() {
        let mut transport = ScriptedTransport::new();
        transport.expect("ATZ;E1;V1", &reply("ATZ;E1;V1", "\r\nERROR\r\n"));
        transport.expect("ATS80?", &reply("ATS80?", "\r\n100\r\n\r\nOK\r\n"));
        let retry = with_crc("ATZ;E1;V1", 0);
        transport.expect(&retry, &crc_reply(&retry, "\r\nOK\r\n", 0));
        let mut modem = modem(transport);

        modem.initialize(false).await.unwrap();
        assert_eq!(writes(&modem), vec!["ATZ;E1;V1".to_string(), "ATS80?".into(), retry]);
        assert_eq!(modem.crc_state(), CrcState::Enabled);
    }

    #[tokio::test]
    async fn test_crc_enable_and_disable() {
        let mut transport = ScriptedTransport::new();
        transport.expect("AT%CRC=1", &crc_reply("AT%CRC=1", "\r\nOK\r\n", 0));
        let off = with_crc("AT%CRC=0", 0);
        transport.expect(&off, &reply(&off, "\r\nOK\r\n"));
        let mut modem = modem(transport);

        modem.config_crc_enable(true).await.unwrap();
        assert_eq!(modem.crc_state(), CrcState::Enabled);
        modem.config_crc_enable(false).await.unwrap();
        assert_eq!(modem.crc_state(), CrcState::Disabled);
    }

    #[tokio::test]
    async fn test_device_error_decoded() {
        let mut transport = ScriptedTransport::new();
        transport.expect("AT&W", &reply("AT&W", "\r\nERROR\r\n"));
        transport.expect("ATS80?", &reply("ATS80?", "\r\n105\r\n\r\nOK\r\n"));
        let mut modem = modem(transport);

        let err = modem.config_save().await.unwrap_err();
        assert_eq!(err.device_code(), Some(AtErrorCode::SystemError));
    }

    #[tokio::test]
    async fn test_device_queries() {
        let mut transport = ScriptedTransport::new();
        transport
            .expect("AT+GSN", &reply("AT+GSN", "\r\n+GSN: 01097623SKYFDA4\r\n\r\nOK\r\n"))
            .expect("AT+GMR", &reply("AT+GMR", "\r\n+GMR: 3.003,3.1,8\r\n\r\nOK\r\n"))
            .expect("AT%UTC", &reply("AT%UTC", "\r\n%UTC: 2021-03-12 15:02:33\r\n\r\nOK\r\n"));
        let mut modem = modem(transport);

        assert_eq!(
            modem.device_mobile_id().await.as_deref(),
            Some("01097623SKYFDA4")
        );
        assert_eq!(modem.device_version().await.unwrap().firmware, "3.003");
        let time = modem.time_utc().await.unwrap();
        assert_eq!((time.year(), time.month(), time.day()), (2021, 3, 12));
        assert_eq!((time.hour(), time.minute(), time.second()), (15, 2, 33));
    }

    #[tokio::test]
    async fn test_mobile_id_after_unrelated_line() {
        let mut transport = ScriptedTransport::new();
        transport
            .expect(
                "AT+GSN",
                &reply("AT+GSN", "\r\n%EVMON: 3.1*\r\n+GSN: 01097623SKYFDA4\r\n\r\nOK\r\n"),
            )
            .expect("AT+GSN", &reply("AT+GSN", "\r\n%EVMON: 3.1*\r\n\r\nOK\r\n"));
        let mut modem = modem(transport);

        assert_eq!(
            modem.device_mobile_id().await.as_deref(),
            Some("01097623SKYFDA4")
        );
        assert_eq!(modem.device_mobile_id().await, None);
    }

    #[tokio::test]
    async fn test_query_failure_is_none() {
        let mut transport = ScriptedTransport::new();
        transport.expect("AT+GSN", &reply("AT+GSN", "\r\nERROR\r\n"));
        transport.expect("ATS80?", &reply("ATS80?", "\r\n109\r\n\r\nOK\r\n"));
        let mut modem = modem(transport);

        assert_eq!(modem.device_mobile_id().await, None);
        // timeout
        assert_eq!(modem.time_utc().await, None);
    }

    #[tokio::test]
    async fn test_config_report_and_restore() {
        let mut transport = ScriptedTransport::new();
        transport
            .expect(
                "AT&V",
                &reply(
                    "AT&V",
                    "\r\nACTIVE CONFIGURATION:\r\nE1 Q0 V1 CRC=0\r\nS0:000 S3:013 S4:010\r\n\r\nOK\r\n",
                ),
            )
            .expect("ATZ", &reply("ATZ", "\r\nOK\r\n"))
            .expect("AT&F", &reply("AT&F", "\r\nOK\r\n"));
        let mut modem = modem(transport);

        let (at, registers) = modem.config_report().await.unwrap();
        assert!(at.echo);
        assert!(!at.crc);
        assert_eq!(registers.get("S3"), Some(&13));

        modem.config_restore_nvm().await.unwrap();
        modem.config_restore_factory().await.unwrap();
        assert_eq!(writes(&modem), vec!["AT&V", "ATZ", "AT&F"]);
    }

    #[tokio::test]
    async fn test_volatile_report() {
        let mut transport = ScriptedTransport::new();
        let command = "ATS39? S41? S51? S55? S56? S57?";
        transport.expect(
            command,
            &reply(command, "\r\n2\r\n180\r\n6\r\n0\r\n0\r\n33\r\n\r\nOK\r\n"),
        );
        let mut modem = modem(transport);

        let report = modem.config_volatile_report().await.unwrap();
        assert_eq!(report.get(&41), Some(&180));
        assert_eq!(report.get(&57), Some(&33));
        assert_eq!(report.len(), 6);
    }

    #[tokio::test]
    async fn test_gnss_argument_checks() {
        let mut modem = modem(ScriptedTransport::new());
        assert!(matches!(
            modem.gnss_continuous_set(31, true).await,
            Err(ModemError::InvalidArgument(_))
        ));
        assert!(matches!(
            modem.gnss_nmea_get(0, 35, &NmeaSentence::DEFAULT).await,
            Err(ModemError::InvalidArgument(_))
        ));
        assert!(matches!(
            modem.gnss_nmea_get(1, 601, &NmeaSentence::DEFAULT).await,
            Err(ModemError::InvalidArgument(_))
        ));
        assert!(writes(&modem).is_empty());
    }

    #[tokio::test]
    async fn test_gnss_nmea() {
        let mut transport = ScriptedTransport::new();
        let command = "AT%GPS=1,35,\"RMC\",\"GGA\"";
        transport.expect(
            command,
            &reply(
                command,
                "\r\n%GPS: $GPRMC,221511.000,A,4517.1073,N,07550.9222,W*6C\r\n$GPGGA,221511.000*43\r\n\r\nOK\r\n",
            ),
        );
        let mut modem = modem(transport);

        let sentences = modem
            .gnss_nmea_get(1, 35, &[NmeaSentence::Rmc, NmeaSentence::Gga])
            .await
            .unwrap();
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].starts_with("$GPRMC"));
    }

    #[tokio::test]
    async fn test_gnss_timeout() {
        let mut transport = ScriptedTransport::new();
        let command = "AT%GPS=1,5,\"RMC\"";
        transport.expect(command, &reply(command, "\r\nERROR\r\n"));
        transport.expect("ATS80?", &reply("ATS80?", "\r\n108\r\n\r\nOK\r\n"));
        let mut modem = modem(transport);

        let err = modem
            .gnss_nmea_get(1, 5, &[NmeaSentence::Rmc])
            .await
            .unwrap_err();
        assert!(matches!(err, ModemError::GnssTimeout));
    }

    #[tokio::test]
    async fn test_registers() {
        let mut transport = ScriptedTransport::new();
        transport
            .expect("ATS50?", &reply("ATS50?", "\r\n2\r\n\r\nOK\r\n"))
            .expect("ATS51=4", &reply("ATS51=4", "\r\nOK\r\n"))
            .expect("ATS80?", &reply("ATS80?", "\r\n102\r\n\r\nOK\r\n"))
            .expect(
                "AT%SREG",
                &reply(
                    "AT%SREG",
                    "\r\nREG T VALUE DEFAULT MIN MAX\r\n--- - ----- ------- --- ---\r\nS0 R 0 0 0 255\r\nS88 - 1030 0 0 65535\r\n\r\nOK\r\n",
                ),
            );
        let mut modem = modem(transport);

        assert_eq!(modem.power_mode_get().await, Some(PowerMode::MobileBattery));
        modem
            .wakeup_interval_set(WakeupInterval::Minutes10)
            .await
            .unwrap();
        assert_eq!(
            modem.error_detail().await,
            Some(AtErrorCode::InvalidCommandParameters)
        );
        let table = modem.s_register_get_all().await.unwrap();
        assert_eq!(table.len(), 2);
        assert!(table[0].is_read_only());
        assert_eq!(table[1].register, 88);
    }

    #[tokio::test]
    async fn test_satellite_status() {
        let mut transport = ScriptedTransport::new();
        let command = "ATS90=3 S91=1 S92=1 S116? S122? S123?";
        transport.expect(command, &reply(command, "\r\n4250\r\n10\r\n0\r\n\r\nOK\r\n"));
        let mut modem = modem(transport);

        let status = modem.sat_status_snr().await.unwrap();
        assert!(status.control.is_active());
        assert!((status.snr - 42.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_connect_requires_address() {
        let err = IdpModem::<StreamTransport<TcpStream>>::connect(ModemConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ModemError::Config(_)));
    }
}
