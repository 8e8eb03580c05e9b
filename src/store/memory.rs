//! In-memory reference stores.
//!
//! These back the simulator and the test suite, and show the shape a
//! host adapter needs: interior mutability, per-record writes, no
//! cross-record transactions.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::RwLock;

use super::{CampaignStore, EntityStore, StoreError, TimeSeriesStore};
use crate::model::{Campaign, InstrumentKind, InstrumentState, StatusLogEntry};
use crate::notify::Recipient;

/// How many status log entries to retain.
const MAX_LOG_ENTRIES: usize = 500;

/// Entity store holding instruments and their recipients.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    instruments: RwLock<BTreeMap<String, InstrumentState>>,
    recipients: RwLock<HashMap<String, Vec<Recipient>>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instrument, keyed by its entity id.
    pub fn add_instrument(&self, state: InstrumentState) {
        self.instruments
            .write()
            .insert(state.entry_id.clone(), state);
    }

    /// Attach a notification recipient to an instrument.
    pub fn add_recipient(&self, entry_id: &str, recipient: Recipient) {
        self.recipients
            .write()
            .entry(entry_id.to_string())
            .or_default()
            .push(recipient);
    }

    /// Flip an instrument's monitoring flag. Returns false if the
    /// entity id is unknown.
    pub fn set_monitoring(&self, entry_id: &str, enabled: bool) -> bool {
        match self.instruments.write().get_mut(entry_id) {
            Some(state) => {
                state.monitoring_enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }
}

impl EntityStore for MemoryEntityStore {
    fn find(
        &self,
        site_id: &str,
        kind: InstrumentKind,
    ) -> Result<Option<InstrumentState>, StoreError> {
        Ok(self
            .instruments
            .read()
            .values()
            .find(|s| s.site_id == site_id && s.kind == kind)
            .cloned())
    }

    fn get(&self, entry_id: &str) -> Result<Option<InstrumentState>, StoreError> {
        Ok(self.instruments.read().get(entry_id).cloned())
    }

    fn update(&self, state: &InstrumentState) -> Result<(), StoreError> {
        let mut instruments = self.instruments.write();
        if !instruments.contains_key(&state.entry_id) {
            return Err(StoreError::NotFound(state.entry_id.clone()));
        }
        instruments.insert(state.entry_id.clone(), state.clone());
        Ok(())
    }

    fn recipients(&self, entry_id: &str) -> Result<Vec<Recipient>, StoreError> {
        Ok(self
            .recipients
            .read()
            .get(entry_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Campaign store keyed by entity id, enforcing one campaign per
/// instrument by construction.
#[derive(Debug, Default)]
pub struct MemoryCampaignStore {
    campaigns: RwLock<BTreeMap<String, Campaign>>,
}

impl MemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.campaigns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.read().is_empty()
    }
}

impl CampaignStore for MemoryCampaignStore {
    fn list(&self) -> Result<Vec<Campaign>, StoreError> {
        Ok(self.campaigns.read().values().cloned().collect())
    }

    fn get(&self, entry_id: &str) -> Result<Option<Campaign>, StoreError> {
        Ok(self.campaigns.read().get(entry_id).cloned())
    }

    fn insert(&self, campaign: &Campaign) -> Result<(), StoreError> {
        self.campaigns
            .write()
            .insert(campaign.entry_id.clone(), campaign.clone());
        Ok(())
    }

    fn update(&self, campaign: &Campaign) -> Result<(), StoreError> {
        let mut campaigns = self.campaigns.write();
        if !campaigns.contains_key(&campaign.entry_id) {
            return Err(StoreError::NotFound(campaign.entry_id.clone()));
        }
        campaigns.insert(campaign.entry_id.clone(), campaign.clone());
        Ok(())
    }

    fn delete(&self, entry_id: &str) -> Result<(), StoreError> {
        self.campaigns.write().remove(entry_id);
        Ok(())
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        self.campaigns.write().clear();
        Ok(())
    }
}

/// Ring-buffered time-series store.
#[derive(Debug, Default)]
pub struct MemoryTimeSeriesStore {
    entries: RwLock<VecDeque<StatusLogEntry>>,
}

impl MemoryTimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StatusLogEntry> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl TimeSeriesStore for MemoryTimeSeriesStore {
    fn append(&self, entry: StatusLogEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        entries.push_back(entry);
        if entries.len() > MAX_LOG_ENTRIES {
            entries.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn instrument(entry_id: &str, site_id: &str) -> InstrumentState {
        InstrumentState {
            entry_id: entry_id.into(),
            site_id: site_id.into(),
            kind: InstrumentKind::Radiometer,
            instrument_id: 1,
            name: site_id.into(),
            monitoring_enabled: true,
            last_network: None,
            last_data: None,
            last_ldm: None,
        }
    }

    #[test]
    fn test_entity_store_find_and_get() {
        let store = MemoryEntityStore::new();
        store.add_instrument(instrument("e1", "boulder-01"));

        let by_site = store
            .find("boulder-01", InstrumentKind::Radiometer)
            .unwrap();
        assert!(by_site.is_some());

        // Same site, wrong kind
        assert!(store
            .find("boulder-01", InstrumentKind::Sodar)
            .unwrap()
            .is_none());

        assert!(store.get("e1").unwrap().is_some());
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_entity_store_update_unknown_fails() {
        let store = MemoryEntityStore::new();
        let err = store.update(&instrument("ghost", "x")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_set_monitoring() {
        let store = MemoryEntityStore::new();
        store.add_instrument(instrument("e1", "boulder-01"));

        assert!(store.set_monitoring("e1", false));
        assert!(!store.get("e1").unwrap().unwrap().monitoring_enabled);
        assert!(!store.set_monitoring("missing", false));
    }

    #[test]
    fn test_campaign_store_lifecycle() {
        let store = MemoryCampaignStore::new();
        let now = Utc::now();

        store.insert(&Campaign::new("e1", now)).unwrap();
        store.insert(&Campaign::new("e2", now)).unwrap();
        assert_eq!(store.len(), 2);

        let mut c = store.get("e1").unwrap().unwrap();
        c.emails_sent = 3;
        store.update(&c).unwrap();
        assert_eq!(store.get("e1").unwrap().unwrap().emails_sent, 3);

        store.delete("e1").unwrap();
        assert!(store.get("e1").unwrap().is_none());
        // Deleting again is fine
        store.delete("e1").unwrap();

        store.delete_all().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn time_series_store_caps_retention() {
        let store = MemoryTimeSeriesStore::new();
        let now = Utc::now();
        for i in 0..(MAX_LOG_ENTRIES + 10) {
            store
                .append(StatusLogEntry {
                    entry_id: format!("e{}", i),
                    date: now,
                    network_minutes: 0,
                    data_minutes: 0,
                    ldm_minutes: 0,
                })
                .unwrap();
        }
        assert_eq!(store.len(), MAX_LOG_ENTRIES);
        // Oldest entries were dropped
        assert_eq!(store.entries()[0].entry_id, "e10");
    }
}
