//! Notification channels, recipients, and the dispatcher seam.
//!
//! The monitor decides *when* to send and on *which* channel; actual
//! transport (SMTP, SMS gateway) lives behind
//! [`NotificationDispatcher`]. The count-as-sent contract is the
//! important part: the dispatcher reports how many recipients were
//! actually reached, and the escalation scheduler only advances its
//! counters when that number is at least one.

mod log;

pub use log::LogDispatcher;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A notification medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyChannel {
    Email,
    Sms,
}

impl NotifyChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyChannel::Email => "email",
            NotifyChannel::Sms => "sms",
        }
    }
}

/// A notification target attached to an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub enabled: bool,
    /// Only notify this recipient on weekends.
    pub weekend_only: bool,
}

impl Recipient {
    /// The recipient's address on the given channel, if present and
    /// non-empty. Phone numbers are normalized by stripping dashes and
    /// spaces.
    pub fn address_for(&self, channel: NotifyChannel) -> Option<String> {
        let raw = match channel {
            NotifyChannel::Email => self.email.clone(),
            NotifyChannel::Sms => self
                .phone
                .as_ref()
                .map(|p| p.replace(['-', ' '], "")),
        };
        raw.filter(|a| !a.is_empty())
    }

    /// Schedule check: weekend-only recipients are skipped on
    /// weekdays.
    pub fn on_schedule(&self, weekend: bool) -> bool {
        !self.weekend_only || weekend
    }
}

/// Whether `now`, shifted into the fleet's local offset, falls on a
/// weekend.
pub fn is_weekend(now: DateTime<Utc>, utc_offset_hours: i32) -> bool {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
    let local = now.with_timezone(&offset);
    matches!(local.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Message templates with `${id}`, `${name}` and `${extra}`
/// placeholders.
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    pub email: String,
    pub sms: String,
}

impl MessageTemplates {
    pub fn for_channel(&self, channel: NotifyChannel) -> &str {
        match channel {
            NotifyChannel::Email => &self.email,
            NotifyChannel::Sms => &self.sms,
        }
    }
}

/// Fill a template's placeholders.
pub fn render_template(template: &str, id: &str, name: &str, extra: &str) -> String {
    template
        .replace("${id}", id)
        .replace("${name}", name)
        .replace("${extra}", extra)
}

/// Transport failure. Distinct from "nobody was reachable", which is a
/// successful dispatch with zero deliveries.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch failed: {0}")]
    Transport(String),
}

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients that actually received the message.
    pub delivered: usize,
    /// Per-recipient record of who was reached or skipped, stored in
    /// the campaign's send log.
    pub detail: String,
}

/// Transport seam for outgoing notifications.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Send `body` to every recipient reachable on `channel`,
    /// reporting how many were reached. Recipient filtering (enabled
    /// flag, schedule, address presence) happens here, not in the
    /// scheduler.
    async fn send(
        &self,
        channel: NotifyChannel,
        recipients: &[Recipient],
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReport, DispatchError>;
}
