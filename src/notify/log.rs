//! Log-only dispatcher.
//!
//! Stands in for real transport: applies the same recipient filtering
//! a production dispatcher would, "delivers" by writing to the log,
//! and remembers what it sent. Used by the simulator and anywhere
//! email/SMS capability is not configured.

use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::{
    is_weekend, DeliveryReport, DispatchError, NotificationDispatcher, NotifyChannel, Recipient,
};

/// A message the log dispatcher accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: NotifyChannel,
    pub address: String,
    pub subject: String,
    pub body: String,
}

/// Dispatcher that records instead of transmitting.
#[derive(Debug)]
pub struct LogDispatcher {
    email_enabled: bool,
    sms_enabled: bool,
    utc_offset_hours: i32,
    sent: Mutex<Vec<SentMessage>>,
}

impl LogDispatcher {
    pub fn new(utc_offset_hours: i32) -> Self {
        Self {
            email_enabled: true,
            sms_enabled: true,
            utc_offset_hours,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Gate a channel off, the way a host without SMTP or an SMS
    /// gateway would.
    pub fn with_capabilities(mut self, email: bool, sms: bool) -> Self {
        self.email_enabled = email;
        self.sms_enabled = sms;
        self
    }

    /// Everything accepted so far.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    fn channel_enabled(&self, channel: NotifyChannel) -> bool {
        match channel {
            NotifyChannel::Email => self.email_enabled,
            NotifyChannel::Sms => self.sms_enabled,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send(
        &self,
        channel: NotifyChannel,
        recipients: &[Recipient],
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReport, DispatchError> {
        if !self.channel_enabled(channel) {
            warn!(channel = channel.as_str(), "channel not enabled");
            return Ok(DeliveryReport {
                delivered: 0,
                detail: format!("{} not enabled\n", channel.as_str()),
            });
        }

        let weekend = is_weekend(Utc::now(), self.utc_offset_hours);
        let mut delivered = 0;
        let mut detail = String::new();

        for recipient in recipients {
            if !recipient.enabled || !recipient.on_schedule(weekend) {
                continue;
            }
            let Some(address) = recipient.address_for(channel) else {
                let _ = writeln!(detail, "no {} address: {}", channel.as_str(), recipient.name);
                continue;
            };

            info!(
                channel = channel.as_str(),
                to = %address,
                subject,
                "delivering notification"
            );
            self.sent.lock().push(SentMessage {
                channel,
                address: address.clone(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
            let _ = writeln!(
                detail,
                "{} to: {} ({})",
                channel.as_str(),
                recipient.name,
                address
            );
            delivered += 1;
        }

        Ok(DeliveryReport { delivered, detail })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipients() -> Vec<Recipient> {
        vec![
            Recipient {
                name: "Pat".into(),
                email: Some("pat@example.com".into()),
                phone: Some("3035550100".into()),
                enabled: true,
                weekend_only: false,
            },
            Recipient {
                name: "Sam".into(),
                email: None,
                phone: None,
                enabled: true,
                weekend_only: false,
            },
            Recipient {
                name: "Riley".into(),
                email: Some("riley@example.com".into()),
                phone: None,
                enabled: false,
                weekend_only: false,
            },
        ]
    }

    #[tokio::test]
    async fn delivers_to_enabled_addressed_recipients() {
        let dispatcher = LogDispatcher::new(0);
        let report = dispatcher
            .send(NotifyChannel::Email, &recipients(), "subj", "body")
            .await
            .unwrap();

        // Pat delivered; Sam has no address; Riley is disabled
        assert_eq!(report.delivered, 1);
        assert!(report.detail.contains("email to: Pat"));
        assert!(report.detail.contains("no email address: Sam"));
        assert!(!report.detail.contains("Riley"));

        let sent = dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address, "pat@example.com");
        assert_eq!(sent[0].subject, "subj");
    }

    #[tokio::test]
    async fn disabled_channel_reports_zero_deliveries() {
        let dispatcher = LogDispatcher::new(0).with_capabilities(true, false);
        let report = dispatcher
            .send(NotifyChannel::Sms, &recipients(), "subj", "body")
            .await
            .unwrap();
        assert_eq!(report.delivered, 0);
        assert!(report.detail.contains("sms not enabled"));
        assert!(dispatcher.sent().is_empty());
    }
}
