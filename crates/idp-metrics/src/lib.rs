//! Metric declarations for the IsatData Pro AT command engine.
//!
//! Every metric the dispatcher records is declared once in [`metric_defs`],
//! with its kind, unit, help text and label scope. Recording goes through the
//! `metrics` facade (re-exported here); with no recorder installed it is a
//! no-op.
//!
//! # Example
//!
//! ```rust,ignore
//! use idp_metrics::{describe_metrics, metric_defs, MetricLabels};
//!
//! describe_metrics();
//!
//! let labels = MetricLabels::new("modem0").with_command("ATS80?");
//! metrics::counter!(metric_defs::AT_COMMANDS_SENT.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// How a metric is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Which labels a metric is recorded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelScope {
    /// `modem`
    Modem,
    /// `modem`, `command`
    Command,
    /// `modem`, `command`, `code`
    CommandError,
}

impl LabelScope {
    /// Label keys, in recording order.
    pub const fn keys(&self) -> &'static [&'static str] {
        match self {
            LabelScope::Modem => &["modem"],
            LabelScope::Command => &["modem", "command"],
            LabelScope::CommandError => &["modem", "command", "code"],
        }
    }
}

/// A declared metric.
///
/// ```rust
/// use idp_metrics::{LabelScope, Metric, MetricKind};
///
/// const DRAINED: Metric = Metric::counter("idp.at.drained", "Lines drained before a command")
///     .scoped(LabelScope::Modem);
///
/// assert_eq!(DRAINED.kind, MetricKind::Counter);
/// assert_eq!(DRAINED.scope.keys(), &["modem"]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub help: &'static str,
    pub unit: Unit,
    pub scope: LabelScope,
}

impl Metric {
    /// A per-command event count.
    pub const fn counter(name: &'static str, help: &'static str) -> Self {
        Metric {
            name,
            kind: MetricKind::Counter,
            help,
            unit: Unit::Count,
            scope: LabelScope::Command,
        }
    }

    /// A per-modem level.
    pub const fn gauge(name: &'static str, help: &'static str) -> Self {
        Metric {
            name,
            kind: MetricKind::Gauge,
            help,
            unit: Unit::Count,
            scope: LabelScope::Modem,
        }
    }

    /// A per-command duration distribution in milliseconds.
    pub const fn histogram(name: &'static str, help: &'static str) -> Self {
        Metric {
            name,
            kind: MetricKind::Histogram,
            help,
            unit: Unit::Milliseconds,
            scope: LabelScope::Command,
        }
    }

    pub const fn in_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub const fn scoped(mut self, scope: LabelScope) -> Self {
        self.scope = scope;
        self
    }

    /// Send the unit and help text to the installed recorder.
    pub fn describe(&self) {
        let (name, unit, help) = (self.name, self.unit, self.help);
        match self.kind {
            MetricKind::Counter => describe_counter!(name, unit, help),
            MetricKind::Gauge => describe_gauge!(name, unit, help),
            MetricKind::Histogram => describe_histogram!(name, unit, help),
        }
    }
}

/// Metrics recorded by the command dispatcher.
pub mod metric_defs {
    use super::{LabelScope, Metric};

    /// Writes, CRC retries included.
    pub const AT_COMMANDS_SENT: Metric =
        Metric::counter("idp.at.commands_sent", "AT commands written to the modem");

    pub const AT_COMMAND_ERRORS: Metric =
        Metric::counter("idp.at.command_errors", "Exchanges that ended with ERROR")
            .scoped(LabelScope::CommandError);

    pub const AT_TIMEOUTS: Metric =
        Metric::counter("idp.at.timeouts", "Exchanges abandoned on a read timeout");

    /// Write to completed response, checksum tail included.
    pub const AT_COMMAND_LATENCY: Metric =
        Metric::histogram("idp.at.command_latency_ms", "Command round trip time");

    pub const AT_CRC_MISMATCHES: Metric =
        Metric::counter("idp.at.crc_mismatches", "Responses with a checksum mismatch");

    pub const AT_CRC_RETRIES_EXHAUSTED: Metric = Metric::counter(
        "idp.at.crc_retries_exhausted",
        "Commands failed after exhausting CRC retries",
    );

    pub const AT_UNSOLICITED_LINES: Metric =
        Metric::counter("idp.at.unsolicited_lines", "Lines received outside of an exchange")
            .scoped(LabelScope::Modem);

    /// Lost-bytes heuristic hits. Diagnostic only.
    pub const AT_LOST_BYTES: Metric =
        Metric::counter("idp.at.lost_bytes", "Responses suspected of dropped bytes")
            .scoped(LabelScope::Modem);

    /// 1 while CRC is inferred on, else 0.
    pub const AT_CRC_ENABLED: Metric =
        Metric::gauge("idp.at.crc_enabled", "Inferred CRC state of the link");

    pub const ALL: [Metric; 9] = [
        AT_COMMANDS_SENT,
        AT_COMMAND_ERRORS,
        AT_TIMEOUTS,
        AT_COMMAND_LATENCY,
        AT_CRC_MISMATCHES,
        AT_CRC_RETRIES_EXHAUSTED,
        AT_UNSOLICITED_LINES,
        AT_LOST_BYTES,
        AT_CRC_ENABLED,
    ];
}

/// Label values for one modem, optionally narrowed to a command.
#[derive(Debug, Clone)]
pub struct MetricLabels {
    /// The configured modem name.
    pub modem: String,
    /// Command verb.
    pub command: Option<String>,
}

impl MetricLabels {
    pub fn new(modem: impl Into<String>) -> Self {
        MetricLabels {
            modem: modem.into(),
            command: None,
        }
    }

    /// Narrow to a command. Only the verb is kept (`AT%MGRT="x",...` is
    /// recorded as `AT%MGRT`).
    pub fn with_command(self, command: &str) -> Self {
        MetricLabels {
            command: Some(command_verb(command).to_string()),
            ..self
        }
    }

    /// Key/value pairs in the form the `metrics` macros take.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        std::iter::once(("modem", self.modem.clone()))
            .chain(self.command.iter().map(|c| ("command", c.clone())))
            .collect()
    }

    /// [`to_labels`](Self::to_labels) plus `extra`.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut pairs = self.to_labels();
        pairs.extend(extra.iter().cloned());
        pairs
    }
}

/// The command text up to its first argument separator.
pub fn command_verb(command: &str) -> &str {
    let end = command
        .find(|c: char| c == '=' || c == ' ' || c == ';' || c == '*')
        .unwrap_or(command.len());
    &command[..end]
}

/// Describe every engine metric. Call once after installing a recorder.
pub fn describe_metrics() {
    metric_defs::ALL.iter().for_each(Metric::describe);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_labels() {
        let labels = MetricLabels::new("modem0");
        assert_eq!(labels.to_labels(), vec![("modem", "modem0".to_string())]);

        let labels = labels.with_command("AT%MGRT=\"abc\",4,128,1,\"hi\"");
        assert_eq!(
            labels.to_labels(),
            vec![
                ("modem", "modem0".to_string()),
                ("command", "AT%MGRT".to_string())
            ]
        );

        let extended = labels.with(&[("code", "101".to_string())]);
        let keys: Vec<&str> = extended.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, LabelScope::CommandError.keys());
    }

    #[test]
    fn test_command_verb() {
        assert_eq!(command_verb("ATS80?"), "ATS80?");
        assert_eq!(command_verb("ATS88=1030"), "ATS88");
        assert_eq!(command_verb("ATZ;E1;V1"), "ATZ");
        assert_eq!(command_verb("ATS90=3 S91=1"), "ATS90");
        assert_eq!(command_verb("AT*1234"), "AT");
        assert_eq!(command_verb(""), "");
    }

    #[test]
    fn test_metric_definitions() {
        use metric_defs::*;

        assert_eq!(AT_COMMANDS_SENT.kind, MetricKind::Counter);
        assert_eq!(AT_COMMANDS_SENT.scope, LabelScope::Command);
        assert_eq!(AT_COMMAND_LATENCY.kind, MetricKind::Histogram);
        assert_eq!(AT_COMMAND_LATENCY.unit, Unit::Milliseconds);
        assert_eq!(AT_CRC_ENABLED.kind, MetricKind::Gauge);
        assert_eq!(AT_CRC_ENABLED.scope, LabelScope::Modem);
        assert_eq!(AT_COMMAND_ERRORS.scope.keys().len(), 3);

        let mut names: Vec<&str> = ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL.len());
        assert!(names.iter().all(|n| n.starts_with("idp.at.")));
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
