//! Trace event monitoring and notification registers.

use idp_at_protocol::{
    constants::{
        LOWPOWER_EVENT, LOWPOWER_NOTIFICATIONS, SREG_NOTIFICATION_CONTROL,
        SREG_NOTIFICATION_STATUS,
    },
    parse_field, strip_prefix, Command, NotificationBitmask, NotificationFlag, ProtocolError,
    ProtocolResult,
};
use tracing::{debug, warn};

use crate::error::ModemResult;
use crate::modem::IdpModem;
use crate::transport::Transport;

/// Notifications that matter to a host sleeping between wakeups.
const LOWPOWER_RELEVANT: [NotificationFlag; 3] = [
    NotificationFlag::EventCached,
    NotificationFlag::MessageMtReceived,
    NotificationFlag::MessageMoComplete,
];

/// A monitored trace event class/subclass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMonitor {
    pub class: u8,
    pub subclass: u8,
    /// A new event is cached and can be retrieved.
    pub cached: bool,
}

impl EventMonitor {
    /// Parse one `<class>.<subclass>[*]` entry.
    pub fn parse(entry: &str) -> ProtocolResult<Self> {
        let entry = entry.trim();
        let (entry, cached) = match entry.strip_suffix('*') {
            Some(entry) => (entry, true),
            None => (entry, false),
        };
        let (class, subclass) = entry
            .split_once('.')
            .ok_or_else(|| ProtocolError::Malformed(format!("bad event monitor {:?}", entry)))?;
        Ok(EventMonitor {
            class: parse_field(Some(class), "event class")?,
            subclass: parse_field(Some(subclass), "event subclass")?,
            cached,
        })
    }
}

/// A cached trace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub data_count: usize,
    /// Bit `i` set means `data[i]` is a signed 32-bit value.
    pub signed_bitmask: u32,
    pub mobile_id: String,
    pub timestamp: i64,
    pub class: u8,
    pub subclass: u8,
    pub priority: u8,
    pub data: Vec<i64>,
    /// The line as received.
    pub raw: String,
}

impl EventRecord {
    /// Parse `%EVNT: <count>,<signed>,<mtid>,<timestamp>,<class>,<subclass>,<priority>,<data0>,...`.
    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let mut fields = strip_prefix(line, "%EVNT:").split(',');
        let data_count = parse_field(fields.next(), "data count")?;
        let signed_bitmask: u32 = parse_field(fields.next(), "signed bitmask")?;
        let mobile_id = fields
            .next()
            .map(|id| id.trim().to_string())
            .ok_or_else(|| ProtocolError::Malformed("missing mobile ID".into()))?;
        let timestamp = parse_field(fields.next(), "timestamp")?;
        let class = parse_field(fields.next(), "event class")?;
        let subclass = parse_field(fields.next(), "event subclass")?;
        let priority = parse_field(fields.next(), "priority")?;

        let data = fields
            .enumerate()
            .map(|(i, field)| {
                let value: i64 = parse_field(Some(field), "event data")?;
                Ok(if i < 32 && signed_bitmask & (1 << i) != 0 {
                    (value as u32 as i32) as i64
                } else {
                    value
                })
            })
            .collect::<ProtocolResult<Vec<i64>>>()?;

        Ok(EventRecord {
            data_count,
            signed_bitmask,
            mobile_id,
            timestamp,
            class,
            subclass,
            priority,
            data,
            raw: line.trim().to_string(),
        })
    }
}

impl<T: Transport> IdpModem<T> {
    /// Monitored events, flagging those with a cached update.
    pub async fn event_monitor_get(&mut self) -> Option<Vec<EventMonitor>> {
        let frame = self.query(Command::EventMonitorGet).await?;
        let list = frame.value("%EVMON:").unwrap_or_default();
        list.split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(EventMonitor::parse)
            .collect::<ProtocolResult<Vec<_>>>()
            .map_err(|e| warn!("{}: bad event monitor list: {}", self.name(), e))
            .ok()
    }

    /// Replace the monitored event list.
    pub async fn event_monitor_set(&mut self, events: &[(u8, u8)]) -> ModemResult<()> {
        debug!("{}: monitoring events {:?}", self.name(), events);
        self.execute(Command::EventMonitorSet {
            events: events.to_vec(),
        })
        .await
        .map(|_| ())
    }

    /// Retrieve the cached event for a class/subclass.
    pub async fn event_get(&mut self, event: (u8, u8)) -> Option<EventRecord> {
        let (class, subclass) = event;
        let frame = self.query(Command::EventGet { class, subclass }).await?;
        let line = frame.first_line()?;
        EventRecord::parse(line)
            .map_err(|e| warn!("{}: bad event {}.{}: {}", self.name(), class, subclass, e))
            .ok()
    }

    /// Notifications enabled to assert the notification output (S88).
    pub async fn notification_control_get(&mut self) -> Option<NotificationBitmask> {
        let value = self.s_register_get(SREG_NOTIFICATION_CONTROL).await?;
        self.notification_bitmask(SREG_NOTIFICATION_CONTROL, value)
    }

    /// Enable or disable individual notifications. Writes S88 only if the
    /// mask changes.
    pub async fn notification_control_set(
        &mut self,
        changes: &[(NotificationFlag, bool)],
    ) -> ModemResult<()> {
        let current = match self.notification_control_get().await {
            Some(current) => current,
            None => {
                return Err(ProtocolError::Malformed(
                    "notification control register unreadable".into(),
                )
                .into())
            }
        };
        let mut updated = current;
        for &(flag, on) in changes {
            updated.set(flag, on);
        }
        if updated == current {
            debug!("{}: notifications unchanged", self.name());
            return Ok(());
        }
        self.s_register_set(SREG_NOTIFICATION_CONTROL, updated.to_register() as i64)
            .await
    }

    /// Notifications asserted since the last check (S89). Reading clears
    /// the register.
    pub async fn notification_check(&mut self) -> Option<NotificationBitmask> {
        let value = self.s_register_get(SREG_NOTIFICATION_STATUS).await?;
        self.notification_bitmask(SREG_NOTIFICATION_STATUS, value)
    }

    fn notification_bitmask(&self, register: u8, value: i64) -> Option<NotificationBitmask> {
        u32::try_from(value)
            .map_err(|_| warn!("{}: bad S{} value {}", self.name(), register, value))
            .ok()
            .map(NotificationBitmask::from_register)
    }

    /// Monitor satellite status changes and assert notifications for
    /// received and completed messages.
    pub async fn lowpower_notifications_enable(&mut self) -> ModemResult<()> {
        debug!("{}: enabling low power notifications", self.name());
        self.execute(Command::LowPowerNotifications {
            event: LOWPOWER_EVENT,
            bitmask: LOWPOWER_NOTIFICATIONS,
        })
        .await
        .map(|_| ())
    }

    /// Asserted notifications relevant to a low power host. Empty if none.
    pub async fn lowpower_notifications_check(&mut self) -> Option<Vec<NotificationFlag>> {
        let asserted = self.notification_check().await?;
        Some(
            LOWPOWER_RELEVANT
                .iter()
                .copied()
                .filter(|flag| asserted.is_set(*flag))
                .collect(),
        )
    }
}
