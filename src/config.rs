//! Monitor configuration.
//!
//! All options are externally supplied: a config file (TOML/JSON/YAML,
//! whatever the `config` crate recognizes) layered under
//! `FLEETWATCH_*` environment variables, with serde defaults filling
//! the rest.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::escalate::EscalationPolicy;
use crate::health::Thresholds;
use crate::notify::MessageTemplates;

/// Every option the monitor recognizes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Shared staleness threshold in minutes, used for any channel
    /// without its own override.
    pub threshold_minutes: i64,
    pub network_threshold_minutes: Option<i64>,
    pub data_threshold_minutes: Option<i64>,
    pub ldm_threshold_minutes: Option<i64>,

    /// Emails sent before escalating to SMS.
    pub email_budget: u32,
    pub email_interval_minutes: i64,
    /// SMS sent before the campaign goes inert.
    pub sms_budget: u32,
    /// Gap between the last email and the first SMS.
    pub sms_first_interval_minutes: i64,
    pub sms_interval_minutes: i64,

    /// Instrument poll cadence.
    pub poll_interval_minutes: u64,
    /// Escalation pass cadence.
    pub notification_poll_interval_minutes: u64,

    /// Time-series logging cadence; a changed instrument always logs
    /// regardless of this interval.
    pub log_interval_minutes: i64,
    pub logging_enabled: bool,

    /// Global kill switch, independent of each instrument's own flag.
    pub monitoring_enabled: bool,

    /// Offset from UTC in hours, used for the weekend recipient filter.
    pub utc_offset_hours: i32,

    pub email_template: String,
    pub sms_template: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold_minutes: 30,
            network_threshold_minutes: None,
            data_threshold_minutes: None,
            ldm_threshold_minutes: None,
            email_budget: 4,
            email_interval_minutes: 8 * 60,
            sms_budget: 4,
            sms_first_interval_minutes: 60,
            sms_interval_minutes: 24 * 60,
            poll_interval_minutes: 1,
            notification_poll_interval_minutes: 5,
            log_interval_minutes: 60,
            logging_enabled: true,
            monitoring_enabled: true,
            utc_offset_hours: -7,
            email_template: "Problem with instrument ${id} (${name})\n${extra}".to_string(),
            sms_template: "Problem with instrument: ${id} (${name})".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from an optional file, with `FLEETWATCH_*`
    /// environment variables layered on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("FLEETWATCH").try_parsing(true))
            .build()
            .context("failed to read configuration")?;

        settings
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Per-channel thresholds with the shared default filled in.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            network: self.network_threshold_minutes.unwrap_or(self.threshold_minutes),
            data: self.data_threshold_minutes.unwrap_or(self.threshold_minutes),
            ldm: self.ldm_threshold_minutes.unwrap_or(self.threshold_minutes),
        }
    }

    pub fn escalation(&self) -> EscalationPolicy {
        EscalationPolicy {
            email_budget: self.email_budget,
            email_interval_minutes: self.email_interval_minutes,
            sms_budget: self.sms_budget,
            sms_first_interval_minutes: self.sms_first_interval_minutes,
            sms_interval_minutes: self.sms_interval_minutes,
        }
    }

    pub fn templates(&self) -> MessageTemplates {
        MessageTemplates {
            email: self.email_template.clone(),
            sms: self.sms_template.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes * 60)
    }

    pub fn notification_poll_interval(&self) -> Duration {
        Duration::from_secs(self.notification_poll_interval_minutes * 60)
    }
}
