//! Simulated fleet source.
//!
//! Generates a small fleet with randomized last-seen timestamps. The
//! LDM channel is driven hours stale so that escalation campaigns open
//! without waiting for a real outage; network and data wander inside
//! normal bounds. Switching to fresh mode reports every channel
//! recently seen, which exercises the recovery path.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;

use super::{InstrumentSource, SourceError};
use crate::model::{InstrumentKind, InstrumentState, Observation};
use crate::notify::Recipient;
use crate::store::memory::MemoryEntityStore;

/// An instrument source that invents its own fleet.
#[derive(Debug)]
pub struct SimSource {
    count: usize,
    fresh: bool,
    description: String,
}

impl SimSource {
    /// A randomized fleet of `count` instruments.
    pub fn new(count: usize) -> Self {
        Self {
            count,
            fresh: false,
            description: format!("sim: {} instruments", count),
        }
    }

    /// In fresh mode every channel reads five minutes old, so every
    /// instrument is healthy.
    pub fn set_fresh(&mut self, fresh: bool) {
        self.fresh = fresh;
    }

    fn kind_for(index: usize) -> InstrumentKind {
        match index % 3 {
            0 => InstrumentKind::Radiometer,
            1 => InstrumentKind::WindProfiler,
            _ => InstrumentKind::Sodar,
        }
    }
}

#[async_trait]
impl InstrumentSource for SimSource {
    async fn fetch_all(&mut self) -> Result<Vec<Observation>, SourceError> {
        let now = Utc::now();
        let mut rng = rand::thread_rng();
        let mut fleet = Vec::with_capacity(self.count);

        for i in 1..=self.count {
            let (network, data, ldm) = if self.fresh {
                let recent = now - Duration::minutes(5);
                (recent, recent, recent)
            } else {
                (
                    now - minutes(rng.gen_range(0.0..60.0)),
                    now - minutes(rng.gen_range(0.0..120.0)),
                    now - minutes(650.0 + rng.gen_range(0.0..140.0)),
                )
            };

            fleet.push(Observation {
                site_id: sim_site_id(i),
                kind: Self::kind_for(i - 1),
                instrument_id: i as i64,
                last_network: Some(network),
                last_data: Some(data),
                last_ldm: Some(ldm),
            });
        }

        Ok(fleet)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

fn minutes(m: f64) -> Duration {
    Duration::seconds((m * 60.0) as i64)
}

fn sim_site_id(index: usize) -> String {
    format!("sim-{:02}", index)
}

/// Register the simulated fleet in an entity store, monitoring enabled,
/// with one always-on recipient per instrument.
pub fn seed_fleet(entities: &MemoryEntityStore, count: usize) {
    for i in 1..=count {
        let entry_id = format!("entry-{:02}", i);
        entities.add_instrument(InstrumentState {
            entry_id: entry_id.clone(),
            site_id: sim_site_id(i),
            kind: SimSource::kind_for(i - 1),
            instrument_id: i as i64,
            name: format!("Simulated site {}", i),
            monitoring_enabled: true,
            last_network: None,
            last_data: None,
            last_ldm: None,
        });
        entities.add_recipient(
            &entry_id,
            Recipient {
                name: "Operator".into(),
                email: Some(format!("operator+{:02}@example.com", i)),
                phone: Some("3035550100".into()),
                enabled: true,
                weekend_only: false,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{Health, Thresholds};
    use crate::store::EntityStore;

    #[tokio::test]
    async fn randomized_fleet_has_stale_ldm() {
        let mut source = SimSource::new(16);
        let fleet = source.fetch_all().await.unwrap();
        assert_eq!(fleet.len(), 16);

        let now = Utc::now();
        for obs in &fleet {
            let ldm = crate::health::elapsed_minutes(now, obs.last_ldm);
            assert!(ldm >= 650, "ldm should be driven stale, got {}", ldm);
        }
    }

    #[tokio::test]
    async fn fresh_fleet_is_healthy() {
        let mut source = SimSource::new(4);
        source.set_fresh(true);
        let fleet = source.fetch_all().await.unwrap();

        let now = Utc::now();
        let entities = MemoryEntityStore::new();
        seed_fleet(&entities, 4);
        for obs in &fleet {
            let mut state = entities.find(&obs.site_id, obs.kind).unwrap().unwrap();
            state.apply(obs);
            assert!(Health::measure(now, &state).is_ok(&Thresholds::default()));
        }
    }

    #[test]
    fn seeded_fleet_matches_sim_site_ids() {
        let entities = MemoryEntityStore::new();
        seed_fleet(&entities, 3);
        assert!(entities
            .find("sim-01", InstrumentKind::Radiometer)
            .unwrap()
            .is_some());
        assert!(entities
            .find("sim-02", InstrumentKind::WindProfiler)
            .unwrap()
            .is_some());
        assert!(entities
            .find("sim-03", InstrumentKind::Sodar)
            .unwrap()
            .is_some());
    }
}
