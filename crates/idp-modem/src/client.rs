//! AT command dispatcher.
//!
//! [`AtClient`] owns the transport and runs one exchange at a time:
//!
//! 1. drain anything the modem sent unprompted,
//! 2. write the command (with a checksum suffix once CRC is known to be on),
//! 3. collect lines until `OK`/`ERROR`, then give the modem a short window
//!    to send a `*HHHH` checksum line,
//! 4. validate the checksum, retrying the whole exchange on a mismatch,
//! 5. on `ERROR`, read the last-error register and attach the code.
//!
//! Every exchange takes `&mut self`, so a second command cannot be written
//! until the previous one (checksum tail included) is resolved.

use std::time::Duration;

use idp_at_protocol::{
    constants::SREG_LAST_ERROR, printable, AtErrorCode, ChecksumTail, Command, CrcNegotiator,
    CrcState, LineCodec, ProtocolError, ResponseCollector, ResponseFrame,
};
use idp_metrics::{metric_defs, MetricLabels};
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::config::ModemConfig;
use crate::error::{ModemError, ModemResult, TransportError};
use crate::transport::Transport;

/// Upper bound on lines discarded before a command.
const MAX_DRAIN_LINES: usize = 64;

/// The exchange currently on the wire.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    /// Command text as given by the caller.
    pub command: String,
    /// Text as written (checksum suffix included).
    pub wire: String,
    /// When the command was written.
    pub sent_at: Instant,
    /// Attempt number, starting at 1.
    pub attempt: u32,
}

/// Sends AT commands and collects their responses.
pub struct AtClient<T> {
    transport: T,
    config: ModemConfig,
    crc: CrcNegotiator,
    pending: Option<PendingCommand>,
    labels: MetricLabels,
}

impl<T: Transport> AtClient<T> {
    /// Create a dispatcher over `transport`.
    pub fn new(transport: T, config: ModemConfig) -> Self {
        let labels = MetricLabels::new(config.name.clone());
        AtClient {
            transport,
            crc: CrcNegotiator::new(config.crc_preset),
            config,
            pending: None,
            labels,
        }
    }

    /// Send a command using the configured timeout and CRC retries.
    pub async fn exchange(&mut self, command: &str) -> ModemResult<ResponseFrame> {
        let timeout = self.config.command_timeout();
        let retries = self.config.crc_retries;
        self.command(command, timeout, retries).await
    }

    /// Send a command and return its response.
    ///
    /// `timeout` bounds each line read. `retries` is the total number of
    /// attempts when the response checksum fails (at least one is made).
    /// An `ERROR` response is returned as `Ok` with
    /// [`ResponseFrame::error`] set.
    pub async fn command(
        &mut self,
        command: &str,
        timeout: Duration,
        retries: u32,
    ) -> ModemResult<ResponseFrame> {
        let mut frame = self.command_unenriched(command, timeout, retries).await?;
        if frame.is_error() {
            let code = self.last_error(timeout, retries).await?;
            debug!("{}: {} returned {}", self.config.name, command, code);
            let labels = self
                .labels
                .clone()
                .with_command(command)
                .with(&[("code", code.code().to_string())]);
            metrics::counter!(metric_defs::AT_COMMAND_ERRORS.name, &labels).increment(1);
            frame.error = Some(code);
        }
        Ok(frame)
    }

    /// Current inferred CRC state of the link.
    pub fn crc_state(&self) -> CrcState {
        self.crc.state()
    }

    /// Responses that looked like they had dropped or merged bytes.
    pub fn lost_bytes(&self) -> u32 {
        self.crc.lost_bytes()
    }

    /// The exchange left unfinished by a cancelled call, if any.
    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    /// Engine configuration.
    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Recover the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    pub(crate) fn negotiator_mut(&mut self) -> &mut CrcNegotiator {
        &mut self.crc
    }

    async fn last_error(&mut self, timeout: Duration, retries: u32) -> ModemResult<AtErrorCode> {
        let query = Command::RegisterGet {
            register: SREG_LAST_ERROR,
        }
        .to_command_string();
        let frame = self.command_unenriched(&query, timeout, retries).await?;
        match (frame.is_ok(), frame.first_line()) {
            (true, Some(line)) => Ok(AtErrorCode::parse(line)?),
            _ => Err(ProtocolError::Malformed(format!(
                "last error register unreadable: {:?}",
                frame.all_lines()
            ))
            .into()),
        }
    }

    async fn command_unenriched(
        &mut self,
        command: &str,
        timeout: Duration,
        retries: u32,
    ) -> ModemResult<ResponseFrame> {
        let attempts = retries.max(1);
        for attempt in 1..=attempts {
            match self.attempt(command, timeout, attempt).await {
                Err(ModemError::CrcMismatch { source, .. }) => {
                    metrics::counter!(
                        metric_defs::AT_CRC_MISMATCHES.name,
                        &self.labels.clone().with_command(command).to_labels()
                    )
                    .increment(1);
                    error!(
                        "{}: {} attempt {}/{}: {}",
                        self.config.name, command, attempt, attempts, source
                    );
                }
                result => return result,
            }
        }
        metrics::counter!(
            metric_defs::AT_CRC_RETRIES_EXHAUSTED.name,
            &self.labels.clone().with_command(command).to_labels()
        )
        .increment(1);
        Err(ModemError::TooManyCrcFailures {
            command: command.to_string(),
            attempts,
        })
    }

    async fn attempt(
        &mut self,
        command: &str,
        timeout: Duration,
        attempt: u32,
    ) -> ModemResult<ResponseFrame> {
        if let Some(abandoned) = self.pending.take() {
            warn!(
                "{}: previous exchange for {} was abandoned",
                self.config.name, abandoned.command
            );
        }
        self.drain().await?;

        let crc_enabled = self.crc.state().is_enabled();
        let wire = LineCodec::frame_text(command, crc_enabled, self.crc.preset());
        let bytes = LineCodec::encode_command(command, crc_enabled, self.crc.preset());

        debug!("{}: sending {}", self.config.name, wire);
        let labels = self.labels.clone().with_command(command).to_labels();
        metrics::counter!(metric_defs::AT_COMMANDS_SENT.name, &labels).increment(1);
        let sent_at = Instant::now();
        self.pending = Some(PendingCommand {
            command: command.to_string(),
            wire: wire.clone(),
            sent_at,
            attempt,
        });
        self.transport.write_all(&bytes).await?;

        let mut collector = ResponseCollector::new(&wire);
        while !collector.has_result() {
            match self.transport.read_line(timeout).await {
                Ok(line) => {
                    collector.push_line(&line);
                }
                Err(TransportError::Timeout) => {
                    self.pending = None;
                    metrics::counter!(metric_defs::AT_TIMEOUTS.name, &labels).increment(1);
                    let elapsed = sent_at.elapsed();
                    warn!(
                        "{}: no response to {} after {:?}",
                        self.config.name, command, elapsed
                    );
                    return Err(ModemError::Timeout {
                        command: command.to_string(),
                        elapsed,
                    });
                }
                Err(e) => {
                    self.pending = None;
                    return Err(e.into());
                }
            }
        }

        match self.transport.read_line(self.config.checksum_timeout()).await {
            Ok(line) => {
                collector.push_line(&line);
            }
            Err(TransportError::Timeout) => collector.checksum_timeout(),
            Err(e) => {
                self.pending = None;
                return Err(e.into());
            }
        }
        self.pending = None;

        let response = collector.finish()?;
        metrics::histogram!(metric_defs::AT_COMMAND_LATENCY.name, &labels)
            .record(sent_at.elapsed().as_secs_f64() * 1000.0);

        let mut frame = response.frame;
        match &response.tail {
            ChecksumTail::Present(checksum) => {
                let lost_before = self.crc.lost_bytes();
                let validated = self.crc.observe_checksum(checksum, &response.source);
                if self.crc.lost_bytes() > lost_before {
                    metrics::counter!(
                        metric_defs::AT_LOST_BYTES.name,
                        &self.labels.to_labels()
                    )
                    .increment(1);
                }
                self.record_crc_state();
                validated.map_err(|source| ModemError::CrcMismatch {
                    command: command.to_string(),
                    source,
                })?;
                frame.crc_verified = true;
            }
            ChecksumTail::Absent => {
                self.crc.observe_timeout();
                self.record_crc_state();
            }
            ChecksumTail::Unsolicited(line) => {
                warn!(
                    "{}: unsolicited after {}: {}",
                    self.config.name,
                    command,
                    printable(line)
                );
                metrics::counter!(
                    metric_defs::AT_UNSOLICITED_LINES.name,
                    &self.labels.to_labels()
                )
                .increment(1);
                // The checksum may still be in flight; the retry drains it.
                if self.crc.state().is_enabled() {
                    return Err(ModemError::CrcMismatch {
                        command: command.to_string(),
                        source: ProtocolError::Malformed(format!(
                            "expected checksum, got {}",
                            printable(line)
                        )),
                    });
                }
            }
        }
        trace!("{}: {} -> {:?}", self.config.name, command, frame.all_lines());
        Ok(frame)
    }

    /// Discard lines the modem sent outside of an exchange.
    async fn drain(&mut self) -> ModemResult<usize> {
        let mut drained = 0;
        while drained < MAX_DRAIN_LINES {
            match self.transport.read_line(self.config.drain_timeout()).await {
                Ok(line) => {
                    drained += 1;
                    let text = String::from_utf8_lossy(&line);
                    if !text.trim().is_empty() {
                        warn!("{}: unsolicited: {}", self.config.name, printable(&text));
                        metrics::counter!(
                            metric_defs::AT_UNSOLICITED_LINES.name,
                            &self.labels.to_labels()
                        )
                        .increment(1);
                    }
                }
                Err(TransportError::Timeout) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(drained)
    }

    fn record_crc_state(&self) {
        let value = if self.crc.state().is_enabled() { 1.0 } else { 0.0 };
        metrics::gauge!(metric_defs::AT_CRC_ENABLED.name, &self.labels.to_labels()).set(value);
    }
}
