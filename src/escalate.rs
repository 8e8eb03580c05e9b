//! The escalation state machine.
//!
//! Each pending campaign walks a fixed sequence driven purely by its
//! two send counters and elapsed time: a first message immediately,
//! emails until the email budget is spent, then SMS until the SMS
//! budget is spent, then inert. A send only counts once at least one
//! recipient was actually reached, so a channel with no valid
//! recipients keeps retrying instead of being silently skipped
//! forever.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::health::elapsed_minutes;
use crate::model::{format_last_seen, Campaign, InstrumentState};
use crate::notify::{MessageTemplates, NotificationDispatcher, NotifyChannel};
use crate::store::{CampaignStore, EntityStore};

/// Send log content once a campaign's budget is exhausted.
pub const EXHAUSTED_MARKER: &str = "escalation budget exhausted; no further messages will be sent";

/// How many campaigns a forced test pass touches before stopping.
/// Keeps the diagnostic output readable; not a correctness matter.
const TEST_PASS_CAMPAIGN_CAP: usize = 3;

/// Budgets and pacing for the email→SMS escalation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    pub email_budget: u32,
    pub email_interval_minutes: i64,
    pub sms_budget: u32,
    /// Gap between the last email and the first SMS.
    pub sms_first_interval_minutes: i64,
    pub sms_interval_minutes: i64,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            email_budget: 4,
            email_interval_minutes: 8 * 60,
            sms_budget: 4,
            sms_first_interval_minutes: 60,
            sms_interval_minutes: 24 * 60,
        }
    }
}

/// Where a campaign stands in the escalation sequence. Derived from
/// the counters; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Emailing,
    Texting,
    Exhausted,
}

fn phase_of(campaign: &Campaign, policy: &EscalationPolicy) -> Phase {
    if campaign.emails_sent < policy.email_budget {
        Phase::Emailing
    } else if campaign.sms_sent < policy.sms_budget {
        Phase::Texting
    } else {
        Phase::Exhausted
    }
}

/// What one campaign evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignOutcome {
    /// Not due, or nothing to do.
    Skipped,
    /// Monitoring was turned off; the campaign is gone.
    Deleted,
    /// First evaluation past the budget; terminal marker written.
    MarkedExhausted,
    /// At least one recipient was reached; counters advanced.
    Sent,
    /// A send was attempted but reached nobody (or the transport
    /// failed); only the send log moved.
    Attempted,
}

/// Tallies for one escalation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EscalationReport {
    pub campaigns: usize,
    pub sent: usize,
    pub attempted: usize,
    pub deleted: usize,
    pub exhausted: usize,
}

/// Evaluates pending campaigns and drives the dispatcher.
pub struct Escalator {
    entities: Arc<dyn EntityStore>,
    campaigns: Arc<dyn CampaignStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    policy: EscalationPolicy,
    templates: MessageTemplates,
}

impl Escalator {
    pub fn new(
        entities: Arc<dyn EntityStore>,
        campaigns: Arc<dyn CampaignStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        policy: EscalationPolicy,
        templates: MessageTemplates,
    ) -> Self {
        Self {
            entities,
            campaigns,
            dispatcher,
            policy,
            templates,
        }
    }

    /// Evaluate every pending campaign once.
    ///
    /// Campaigns are independent: a failure in one is logged and the
    /// pass continues with the next.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<EscalationReport> {
        let pending = self.campaigns.list()?;
        let mut report = EscalationReport {
            campaigns: pending.len(),
            ..Default::default()
        };

        for campaign in pending {
            let entry_id = campaign.entry_id.clone();
            match self.check_campaign(campaign, now, false, None).await {
                Ok(CampaignOutcome::Sent) => report.sent += 1,
                Ok(CampaignOutcome::Attempted) => report.attempted += 1,
                Ok(CampaignOutcome::Deleted) => report.deleted += 1,
                Ok(CampaignOutcome::MarkedExhausted) => report.exhausted += 1,
                Ok(CampaignOutcome::Skipped) => {}
                Err(e) => warn!(entry_id = %entry_id, error = %e, "failed to evaluate campaign"),
            }
        }

        if report.campaigns > 0 {
            info!(
                campaigns = report.campaigns,
                sent = report.sent,
                attempted = report.attempted,
                deleted = report.deleted,
                exhausted = report.exhausted,
                "escalation pass complete"
            );
        }
        Ok(report)
    }

    /// Forced diagnostic pass: bypasses the due-to-send timing check
    /// (budgets and the count-as-sent rule still apply), collects a
    /// transcript of every decision, and stops after a few campaigns.
    pub async fn test_pass(&self, now: DateTime<Utc>) -> Result<String> {
        let pending = self.campaigns.list()?;
        let mut transcript = String::new();

        if pending.is_empty() {
            transcript.push_str("no pending campaigns\n");
            return Ok(transcript);
        }

        for (processed, campaign) in pending.into_iter().enumerate() {
            if processed >= TEST_PASS_CAMPAIGN_CAP {
                let _ = writeln!(transcript, "stopping after {} campaigns", TEST_PASS_CAMPAIGN_CAP);
                break;
            }
            let entry_id = campaign.entry_id.clone();
            let _ = writeln!(transcript, "campaign: {}", entry_id);
            if let Err(e) = self
                .check_campaign(campaign, now, true, Some(&mut transcript))
                .await
            {
                let _ = writeln!(transcript, "error evaluating {}: {}", entry_id, e);
            }
        }

        Ok(transcript)
    }

    async fn check_campaign(
        &self,
        mut campaign: Campaign,
        now: DateTime<Utc>,
        force: bool,
        mut transcript: Option<&mut String>,
    ) -> Result<CampaignOutcome> {
        let note = |t: &mut Option<&mut String>, line: &str| {
            if let Some(t) = t.as_mut() {
                let _ = writeln!(t, "  {}", line);
            }
        };

        let Some(instrument) = self.entities.get(&campaign.entry_id)? else {
            warn!(entry_id = %campaign.entry_id, "campaign has no instrument record");
            note(&mut transcript, "no instrument record; skipping");
            return Ok(CampaignOutcome::Skipped);
        };

        // Monitoring got turned off after the campaign opened.
        if !instrument.monitoring_enabled {
            self.campaigns.delete(&campaign.entry_id)?;
            info!(entry_id = %campaign.entry_id, "campaign removed: monitoring disabled");
            note(&mut transcript, "monitoring disabled; campaign removed");
            return Ok(CampaignOutcome::Deleted);
        }

        let phase = phase_of(&campaign, &self.policy);
        if phase == Phase::Exhausted {
            if campaign.send_log != EXHAUSTED_MARKER {
                campaign.send_log = EXHAUSTED_MARKER.to_string();
                self.campaigns.update(&campaign)?;
                info!(
                    entry_id = %campaign.entry_id,
                    emails = campaign.emails_sent,
                    sms = campaign.sms_sent,
                    "escalation budget exhausted"
                );
                note(&mut transcript, EXHAUSTED_MARKER);
                return Ok(CampaignOutcome::MarkedExhausted);
            }
            return Ok(CampaignOutcome::Skipped);
        }

        let first_message = campaign.emails_sent == 0 && campaign.sms_sent == 0;
        let should_send = if first_message {
            note(&mut transcript, "first message; due immediately");
            true
        } else {
            let last = campaign.last_message.unwrap_or(campaign.start_date);
            let elapsed = elapsed_minutes(now, Some(last));
            let interval = match phase {
                Phase::Emailing => self.policy.email_interval_minutes,
                Phase::Texting if campaign.sms_sent == 0 => self.policy.sms_first_interval_minutes,
                Phase::Texting => self.policy.sms_interval_minutes,
                Phase::Exhausted => unreachable!("exhausted handled above"),
            };
            let due = elapsed >= interval;
            note(
                &mut transcript,
                &format!(
                    "elapsed minutes: {} interval: {} should send: {}",
                    elapsed, interval, due
                ),
            );
            due
        };

        if !(should_send || force) {
            return Ok(CampaignOutcome::Skipped);
        }

        let channel = match phase {
            Phase::Emailing => NotifyChannel::Email,
            Phase::Texting => NotifyChannel::Sms,
            Phase::Exhausted => unreachable!("exhausted handled above"),
        };

        let recipients = self.entities.recipients(&campaign.entry_id)?;
        let (subject, body) = self.compose(channel, &instrument);
        note(
            &mut transcript,
            &format!("sending {} for instrument {}", channel.as_str(), instrument.instrument_id),
        );

        match self
            .dispatcher
            .send(channel, &recipients, &subject, &body)
            .await
        {
            Err(e) => {
                warn!(entry_id = %campaign.entry_id, channel = channel.as_str(), error = %e, "dispatch failed");
                note(&mut transcript, &format!("dispatch failed: {}", e));
                campaign.send_log = format!("dispatch failed on {}: {}", channel.as_str(), e);
                self.campaigns.update(&campaign)?;
                Ok(CampaignOutcome::Attempted)
            }
            Ok(report) if report.delivered == 0 => {
                // Counters only advance on >=1 success; record the
                // attempt so operators can see why nothing went out.
                warn!(entry_id = %campaign.entry_id, name = %instrument.name, "no messages sent");
                note(&mut transcript, "no messages sent");
                campaign.send_log = if report.detail.is_empty() {
                    "no messages sent".to_string()
                } else {
                    format!("no messages sent:\n{}", report.detail)
                };
                self.campaigns.update(&campaign)?;
                Ok(CampaignOutcome::Attempted)
            }
            Ok(report) => {
                match channel {
                    NotifyChannel::Email => campaign.emails_sent += 1,
                    NotifyChannel::Sms => campaign.sms_sent += 1,
                }
                campaign.last_message = Some(now);
                campaign.send_log = report.detail;
                self.campaigns.update(&campaign)?;
                info!(
                    entry_id = %campaign.entry_id,
                    channel = channel.as_str(),
                    delivered = report.delivered,
                    emails = campaign.emails_sent,
                    sms = campaign.sms_sent,
                    "notification sent"
                );
                note(
                    &mut transcript,
                    &format!("delivered to {} recipient(s)", report.delivered),
                );
                Ok(CampaignOutcome::Sent)
            }
        }
    }

    fn compose(&self, channel: NotifyChannel, instrument: &InstrumentState) -> (String, String) {
        let extra = format!(
            "Network: {}\nData: {}\nLDM: {}",
            format_last_seen(instrument.last_network),
            format_last_seen(instrument.last_data),
            format_last_seen(instrument.last_ldm),
        );
        let body = crate::notify::render_template(
            self.templates.for_channel(channel),
            &instrument.instrument_id.to_string(),
            &instrument.name,
            &extra,
        );
        let subject = format!("Instrument status: {}", instrument.instrument_id);
        (subject, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstrumentKind;
    use crate::notify::{DeliveryReport, DispatchError, Recipient};
    use crate::store::memory::{MemoryCampaignStore, MemoryEntityStore};
    use async_trait::async_trait;
    use chrono::Duration;
    use parking_lot::Mutex;

    /// Dispatcher with a programmable outcome that remembers every
    /// call.
    struct MockDispatcher {
        deliveries: Mutex<usize>,
        fail: Mutex<bool>,
        calls: Mutex<Vec<NotifyChannel>>,
    }

    impl MockDispatcher {
        fn delivering(count: usize) -> Self {
            Self {
                deliveries: Mutex::new(count),
                fail: Mutex::new(false),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn set_failing(&self, fail: bool) {
            *self.fail.lock() = fail;
        }

        fn calls(&self) -> Vec<NotifyChannel> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl NotificationDispatcher for MockDispatcher {
        async fn send(
            &self,
            channel: NotifyChannel,
            _recipients: &[Recipient],
            _subject: &str,
            _body: &str,
        ) -> Result<DeliveryReport, DispatchError> {
            if *self.fail.lock() {
                return Err(DispatchError::Transport("gateway down".into()));
            }
            self.calls.lock().push(channel);
            let delivered = *self.deliveries.lock();
            Ok(DeliveryReport {
                delivered,
                detail: format!("{} to: Operator\n", channel.as_str()),
            })
        }
    }

    struct Fixture {
        entities: Arc<MemoryEntityStore>,
        campaigns: Arc<MemoryCampaignStore>,
        dispatcher: Arc<MockDispatcher>,
        escalator: Escalator,
    }

    fn fixture(policy: EscalationPolicy, delivered: usize) -> Fixture {
        let entities = Arc::new(MemoryEntityStore::new());
        entities.add_instrument(InstrumentState {
            entry_id: "e1".into(),
            site_id: "boulder-01".into(),
            kind: InstrumentKind::Radiometer,
            instrument_id: 1,
            name: "Boulder".into(),
            monitoring_enabled: true,
            last_network: Some(Utc::now()),
            last_data: Some(Utc::now()),
            last_ldm: None,
        });
        entities.add_recipient(
            "e1",
            Recipient {
                name: "Operator".into(),
                email: Some("ops@example.com".into()),
                phone: Some("3035550100".into()),
                enabled: true,
                weekend_only: false,
            },
        );
        let campaigns = Arc::new(MemoryCampaignStore::new());
        let dispatcher = Arc::new(MockDispatcher::delivering(delivered));
        let escalator = Escalator::new(
            entities.clone(),
            campaigns.clone(),
            dispatcher.clone(),
            policy,
            MessageTemplates {
                email: "Problem with instrument ${id} (${name})\n${extra}".into(),
                sms: "Problem with instrument: ${id}".into(),
            },
        );
        Fixture {
            entities,
            campaigns,
            dispatcher,
            escalator,
        }
    }

    fn standard_policy() -> EscalationPolicy {
        EscalationPolicy {
            email_budget: 4,
            email_interval_minutes: 480,
            sms_budget: 4,
            sms_first_interval_minutes: 60,
            sms_interval_minutes: 1440,
        }
    }

    #[tokio::test]
    async fn full_escalation_sequence() {
        let f = fixture(standard_policy(), 1);
        let start = Utc::now();
        f.campaigns.insert(&Campaign::new("e1", start)).unwrap();

        // (minutes after start, expected emails, expected sms)
        let walk = [
            (0, 1, 0),    // first message is immediate
            (479, 1, 0),  // not yet due
            (480, 2, 0),  // email cadence
            (960, 3, 0),
            (1440, 4, 0),
            (1499, 4, 0), // first SMS waits its own interval
            (1500, 4, 1), // 60 minutes after the last email
            (2939, 4, 1),
            (2940, 4, 2), // SMS cadence is 1440
            (4380, 4, 3),
            (5820, 4, 4),
        ];

        for (minutes, emails, sms) in walk {
            let now = start + Duration::minutes(minutes);
            f.escalator.run_cycle(now).await.unwrap();
            let c = f.campaigns.get("e1").unwrap().unwrap();
            assert_eq!(
                (c.emails_sent, c.sms_sent),
                (emails, sms),
                "at +{} minutes",
                minutes
            );
        }

        // Budget spent: the next pass marks the campaign terminal and
        // sends nothing more, ever
        let now = start + Duration::minutes(10_000);
        let report = f.escalator.run_cycle(now).await.unwrap();
        assert_eq!(report.exhausted, 1);
        let c = f.campaigns.get("e1").unwrap().unwrap();
        assert_eq!(c.send_log, EXHAUSTED_MARKER);
        assert_eq!((c.emails_sent, c.sms_sent), (4, 4));

        let calls_before = f.dispatcher.calls().len();
        f.escalator
            .run_cycle(now + Duration::minutes(10_000))
            .await
            .unwrap();
        assert_eq!(f.dispatcher.calls().len(), calls_before);

        let expected: Vec<NotifyChannel> = std::iter::repeat(NotifyChannel::Email)
            .take(4)
            .chain(std::iter::repeat(NotifyChannel::Sms).take(4))
            .collect();
        assert_eq!(f.dispatcher.calls(), expected);
    }

    #[tokio::test]
    async fn zero_deliveries_do_not_advance_counters() {
        let f = fixture(standard_policy(), 0);
        let start = Utc::now();
        f.campaigns.insert(&Campaign::new("e1", start)).unwrap();

        let report = f.escalator.run_cycle(start).await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.sent, 0);

        let c = f.campaigns.get("e1").unwrap().unwrap();
        assert_eq!(c.emails_sent, 0);
        assert!(c.last_message.is_none());
        assert!(c.send_log.contains("no messages sent"));

        // Still due on the next pass: the channel is retried rather
        // than silently skipped
        f.escalator
            .run_cycle(start + Duration::minutes(1))
            .await
            .unwrap();
        let c = f.campaigns.get("e1").unwrap().unwrap();
        assert_eq!(c.emails_sent, 0);
    }

    #[tokio::test]
    async fn dispatch_failure_is_recorded_and_recovered() {
        let f = fixture(standard_policy(), 1);
        let start = Utc::now();
        f.campaigns.insert(&Campaign::new("e1", start)).unwrap();
        f.dispatcher.set_failing(true);

        let report = f.escalator.run_cycle(start).await.unwrap();
        assert_eq!(report.attempted, 1);

        let c = f.campaigns.get("e1").unwrap().unwrap();
        assert_eq!(c.emails_sent, 0);
        assert!(c.send_log.contains("dispatch failed on email"));

        // Transport recovers; the first message finally goes out
        f.dispatcher.set_failing(false);
        f.escalator
            .run_cycle(start + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(f.campaigns.get("e1").unwrap().unwrap().emails_sent, 1);
    }

    #[tokio::test]
    async fn monitoring_off_deletes_campaign() {
        let f = fixture(standard_policy(), 1);
        let start = Utc::now();
        f.campaigns.insert(&Campaign::new("e1", start)).unwrap();
        f.entities.set_monitoring("e1", false);

        let report = f.escalator.run_cycle(start).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(f.campaigns.is_empty());
        assert!(f.dispatcher.calls().is_empty());
    }

    #[tokio::test]
    async fn zero_email_budget_starts_with_sms() {
        let mut policy = standard_policy();
        policy.email_budget = 0;
        let f = fixture(policy, 1);
        let start = Utc::now();
        f.campaigns.insert(&Campaign::new("e1", start)).unwrap();

        f.escalator.run_cycle(start).await.unwrap();
        let c = f.campaigns.get("e1").unwrap().unwrap();
        assert_eq!((c.emails_sent, c.sms_sent), (0, 1));
        assert_eq!(f.dispatcher.calls(), vec![NotifyChannel::Sms]);
    }

    #[tokio::test]
    async fn zero_budgets_mean_inert_campaign() {
        let policy = EscalationPolicy {
            email_budget: 0,
            sms_budget: 0,
            ..standard_policy()
        };
        let f = fixture(policy, 1);
        let start = Utc::now();
        f.campaigns.insert(&Campaign::new("e1", start)).unwrap();

        let report = f.escalator.run_cycle(start).await.unwrap();
        assert_eq!(report.exhausted, 1);
        assert!(f.dispatcher.calls().is_empty());
        assert_eq!(
            f.campaigns.get("e1").unwrap().unwrap().send_log,
            EXHAUSTED_MARKER
        );
    }

    #[tokio::test]
    async fn campaign_without_instrument_is_skipped() {
        let f = fixture(standard_policy(), 1);
        let start = Utc::now();
        f.campaigns.insert(&Campaign::new("ghost", start)).unwrap();

        let report = f.escalator.run_cycle(start).await.unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(f.campaigns.len(), 1, "skip does not delete");
    }

    #[tokio::test]
    async fn forced_pass_bypasses_timing_and_caps_campaigns() {
        let f = fixture(standard_policy(), 1);
        let start = Utc::now();
        for i in 1..=5 {
            let entry_id = format!("e{}", i);
            f.entities.add_instrument(InstrumentState {
                entry_id: entry_id.clone(),
                site_id: format!("site-{}", i),
                kind: InstrumentKind::Radiometer,
                instrument_id: i,
                name: format!("Site {}", i),
                monitoring_enabled: true,
                last_network: None,
                last_data: None,
                last_ldm: None,
            });
            // Mid-campaign, sent a message seconds ago: nothing is due
            let mut c = Campaign::new(entry_id.clone(), start);
            c.emails_sent = 1;
            c.last_message = Some(start);
            f.campaigns.insert(&c).unwrap();
        }

        let transcript = f.escalator.test_pass(start).await.unwrap();

        // Timing bypassed, but only three campaigns touched
        assert_eq!(f.dispatcher.calls().len(), 3);
        assert!(transcript.contains("stopping after 3 campaigns"));
        assert!(transcript.contains("should send: false"));
        assert!(transcript.contains("delivered to 1 recipient(s)"));
    }

    #[tokio::test]
    async fn test_pass_with_no_campaigns() {
        let f = fixture(standard_policy(), 1);
        let transcript = f.escalator.test_pass(Utc::now()).await.unwrap();
        assert!(transcript.contains("no pending campaigns"));
    }

    #[tokio::test]
    async fn message_body_carries_last_seen_report() {
        struct Capture {
            bodies: Mutex<Vec<(String, String)>>,
        }
        #[async_trait]
        impl NotificationDispatcher for Capture {
            async fn send(
                &self,
                _channel: NotifyChannel,
                _recipients: &[Recipient],
                subject: &str,
                body: &str,
            ) -> Result<DeliveryReport, DispatchError> {
                self.bodies
                    .lock()
                    .push((subject.to_string(), body.to_string()));
                Ok(DeliveryReport {
                    delivered: 1,
                    detail: String::new(),
                })
            }
        }

        let f = fixture(standard_policy(), 1);
        let capture = Arc::new(Capture {
            bodies: Mutex::new(Vec::new()),
        });
        let escalator = Escalator::new(
            f.entities.clone(),
            f.campaigns.clone(),
            capture.clone(),
            standard_policy(),
            MessageTemplates {
                email: "Problem with instrument ${id} (${name})\n${extra}".into(),
                sms: "Problem with instrument: ${id}".into(),
            },
        );
        let start = Utc::now();
        f.campaigns.insert(&Campaign::new("e1", start)).unwrap();
        escalator.run_cycle(start).await.unwrap();

        let bodies = capture.bodies.lock();
        let (subject, body) = &bodies[0];
        assert_eq!(subject, "Instrument status: 1");
        assert!(body.starts_with("Problem with instrument 1 (Boulder)"));
        assert!(body.contains("LDM: --"));
    }
}
