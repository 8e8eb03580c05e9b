//! Core data types shared between the reconciler, the escalation
//! scheduler, and the collaborator stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Instrument class, as reported by the external status source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Radiometer,
    WindProfiler,
    Sodar,
}

impl InstrumentKind {
    /// Map the source's numeric type id to a kind.
    ///
    /// Returns `None` for ids the source has never defined.
    pub fn from_type_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(InstrumentKind::Radiometer),
            2 => Some(InstrumentKind::WindProfiler),
            3 => Some(InstrumentKind::Sodar),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Radiometer => "radiometer",
            InstrumentKind::WindProfiler => "wind_profiler",
            InstrumentKind::Sodar => "sodar",
        }
    }
}

/// A point-in-time snapshot of one instrument's last-seen timestamps,
/// produced by an [`InstrumentSource`](crate::source::InstrumentSource)
/// each poll cycle.
///
/// Observations are ephemeral: only derived artifacts (mirrored state,
/// time-series entries, campaigns) are persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Site identifier, the lookup key into the entity store together
    /// with `kind`.
    pub site_id: String,
    pub kind: InstrumentKind,
    pub instrument_id: i64,
    /// Last time the instrument was reachable over the network.
    pub last_network: Option<DateTime<Utc>>,
    /// Last time the instrument produced data.
    pub last_data: Option<DateTime<Utc>>,
    /// Last time data arrived via LDM.
    pub last_ldm: Option<DateTime<Utc>>,
}

/// The locally mirrored record for a monitored instrument.
///
/// Owned by the host's entity store; the monitor only reads it and
/// conditionally overwrites the three timestamp fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentState {
    /// Entity id in the host store. Campaigns and time-series entries
    /// key on this.
    pub entry_id: String,
    pub site_id: String,
    pub kind: InstrumentKind,
    pub instrument_id: i64,
    /// Display name used in notification text.
    pub name: String,
    /// Per-instrument monitoring flag, independent of the global kill
    /// switch.
    pub monitoring_enabled: bool,
    pub last_network: Option<DateTime<Utc>>,
    pub last_data: Option<DateTime<Utc>>,
    pub last_ldm: Option<DateTime<Utc>>,
}

impl InstrumentState {
    /// Overwrite all three timestamp fields from an observation.
    pub fn apply(&mut self, obs: &Observation) {
        self.last_network = obs.last_network;
        self.last_data = obs.last_data;
        self.last_ldm = obs.last_ldm;
    }
}

/// One escalation campaign for a failing instrument.
///
/// At most one campaign exists per `entry_id` at any time. There is no
/// explicit status field: the campaign's place in the escalation
/// sequence is derived from the two send counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub entry_id: String,
    /// When the instrument was first observed failing.
    pub start_date: DateTime<Utc>,
    /// When a message last reached at least one recipient.
    pub last_message: Option<DateTime<Utc>>,
    /// Human-readable record of the most recent send attempt, or the
    /// terminal marker once the escalation budget is exhausted.
    pub send_log: String,
    pub emails_sent: u32,
    pub sms_sent: u32,
}

impl Campaign {
    /// A fresh campaign with zeroed counters.
    pub fn new(entry_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            entry_id: entry_id.into(),
            start_date: now,
            last_message: None,
            send_log: String::new(),
            emails_sent: 0,
            sms_sent: 0,
        }
    }
}

/// An immutable time-series snapshot of one instrument's staleness,
/// appended by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub entry_id: String,
    pub date: DateTime<Utc>,
    pub network_minutes: i64,
    pub data_minutes: i64,
    pub ldm_minutes: i64,
}

/// Build a log entry from an instrument's current timestamps.
pub fn status_log_entry(state: &InstrumentState, now: DateTime<Utc>) -> StatusLogEntry {
    use crate::health::elapsed_minutes;

    StatusLogEntry {
        entry_id: state.entry_id.clone(),
        date: now,
        network_minutes: elapsed_minutes(now, state.last_network),
        data_minutes: elapsed_minutes(now, state.last_data),
        ldm_minutes: elapsed_minutes(now, state.last_ldm),
    }
}

/// Format a last-seen timestamp for notification text.
///
/// Absent timestamps render as `--`, matching the status pages of the
/// hosting system.
pub fn format_last_seen(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(t) => t.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => "--".to_string(),
    }
}
