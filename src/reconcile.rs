//! The poll-cycle engine.
//!
//! Each cycle fetches the fleet snapshot from the instrument source
//! and reconciles it against the mirrored state: detects changed
//! timestamps, appends rate-limited time-series entries, and opens or
//! closes escalation campaigns on health transitions. One bad
//! instrument never halts the cycle; one failed cycle never halts the
//! loop (that is the runner's circuit breaker's call).

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::health::{elapsed_minutes, Health, Thresholds};
use crate::model::{status_log_entry, Campaign, InstrumentState, Observation};
use crate::source::InstrumentSource;
use crate::store::{CampaignStore, EntityStore, TimeSeriesStore};

/// Tallies for one reconciliation cycle, for the logs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Observations returned by the source.
    pub observed: usize,
    /// Observations with no matching instrument record, or whose
    /// processing failed.
    pub skipped: usize,
    /// Instruments whose mirrored timestamps were overwritten.
    pub updated: usize,
    /// Time-series entries written.
    pub logged: usize,
    /// Campaigns created for newly failing instruments.
    pub campaigns_opened: usize,
    /// Campaigns removed (recovery or monitoring turned off).
    pub campaigns_closed: usize,
}

/// Compares fresh observations to mirrored state and drives campaign
/// lifecycle.
pub struct Reconciler {
    source: Box<dyn InstrumentSource>,
    entities: Arc<dyn EntityStore>,
    campaigns: Arc<dyn CampaignStore>,
    series: Arc<dyn TimeSeriesStore>,
    thresholds: Thresholds,
    logging_enabled: bool,
    log_interval_minutes: i64,
    /// Rate-limit clock for time-series writes. Cycle-granular: the
    /// "interval elapsed" decision is made once per cycle so every
    /// instrument in a cycle gets the same answer. `None` until the
    /// first write, which makes the first cycle log unconditionally.
    last_log_write: Option<DateTime<Utc>>,
}

impl Reconciler {
    pub fn new(
        source: Box<dyn InstrumentSource>,
        entities: Arc<dyn EntityStore>,
        campaigns: Arc<dyn CampaignStore>,
        series: Arc<dyn TimeSeriesStore>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            source,
            entities,
            campaigns,
            series,
            thresholds: config.thresholds(),
            logging_enabled: config.logging_enabled,
            log_interval_minutes: config.log_interval_minutes,
            last_log_write: None,
        }
    }

    /// Run one reconciliation pass over the whole fleet.
    ///
    /// Fails only when the source itself is unreachable; everything
    /// downstream is per-instrument and recovered locally.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        let fleet = self
            .source
            .fetch_all()
            .await
            .with_context(|| format!("fetching fleet from {}", self.source.description()))?;

        let log_pass = self.logging_enabled
            && self
                .last_log_write
                .map_or(true, |t| elapsed_minutes(now, Some(t)) >= self.log_interval_minutes);

        let mut report = CycleReport {
            observed: fleet.len(),
            ..Default::default()
        };

        for obs in &fleet {
            if let Err(e) = self.check_instrument(obs, now, log_pass, &mut report) {
                warn!(site_id = %obs.site_id, error = %e, "failed to process instrument");
                report.skipped += 1;
            }
        }

        if log_pass {
            self.last_log_write = Some(now);
        }

        info!(
            observed = report.observed,
            updated = report.updated,
            logged = report.logged,
            opened = report.campaigns_opened,
            closed = report.campaigns_closed,
            skipped = report.skipped,
            "reconcile cycle complete"
        );
        Ok(report)
    }

    fn check_instrument(
        &self,
        obs: &Observation,
        now: DateTime<Utc>,
        log_pass: bool,
        report: &mut CycleReport,
    ) -> Result<()> {
        let Some(mut state) = self.entities.find(&obs.site_id, obs.kind)? else {
            warn!(site_id = %obs.site_id, kind = obs.kind.as_str(), "no instrument record for observation");
            report.skipped += 1;
            return Ok(());
        };

        if !state.monitoring_enabled {
            // Monitoring off means no alerting, even mid-campaign.
            if self.campaigns.get(&state.entry_id)?.is_some() {
                self.campaigns.delete(&state.entry_id)?;
                info!(entry_id = %state.entry_id, "campaign removed: monitoring disabled");
                report.campaigns_closed += 1;
            }
            return Ok(());
        }

        let changed = state.last_network != obs.last_network
            || state.last_data != obs.last_data
            || state.last_ldm != obs.last_ldm;

        note_regressions(&state, obs);

        if log_pass || (self.logging_enabled && changed) {
            // Elapsed minutes are computed from the new timestamps.
            let mut fresh = state.clone();
            fresh.apply(obs);
            match self.series.append(status_log_entry(&fresh, now)) {
                Ok(()) => report.logged += 1,
                // Fire-and-forget: a log-write failure must not block
                // the notification decision.
                Err(e) => warn!(entry_id = %state.entry_id, error = %e, "time-series write failed"),
            }
        }

        if !changed {
            // Fully settled for this cycle.
            return Ok(());
        }

        state.apply(obs);
        self.entities.update(&state)?;
        report.updated += 1;

        let health = Health::measure(now, &state);
        if health.is_ok(&self.thresholds) {
            if self.campaigns.get(&state.entry_id)?.is_some() {
                self.campaigns.delete(&state.entry_id)?;
                info!(entry_id = %state.entry_id, name = %state.name, "instrument recovered; campaign removed");
                report.campaigns_closed += 1;
            }
        } else if self.campaigns.get(&state.entry_id)?.is_none() {
            // Never reset an in-progress campaign's counters.
            self.campaigns
                .insert(&Campaign::new(state.entry_id.clone(), now))?;
            info!(
                entry_id = %state.entry_id,
                name = %state.name,
                network_minutes = health.network_minutes,
                data_minutes = health.data_minutes,
                ldm_minutes = health.ldm_minutes,
                "instrument failing; campaign opened"
            );
            report.campaigns_opened += 1;
        }

        Ok(())
    }
}

/// The external source may reissue earlier timestamps; worth a log
/// line, but not an error.
fn note_regressions(state: &InstrumentState, obs: &Observation) {
    let channels = [
        ("network", state.last_network, obs.last_network),
        ("data", state.last_data, obs.last_data),
        ("ldm", state.last_ldm, obs.last_ldm),
    ];
    for (channel, old, new) in channels {
        if let (Some(old), Some(new)) = (old, new) {
            if new < old {
                debug!(site_id = %obs.site_id, channel, %old, %new, "timestamp regression");
            }
        }
    }
}
