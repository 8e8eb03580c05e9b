//! Collaborator store seams.
//!
//! The monitor owns no persistence. Mirrored instrument state,
//! campaigns, and the status time-series live in host-provided stores
//! behind these traits; the in-memory implementations in [`memory`]
//! are the reference collaborators (and what the simulator and tests
//! run against). Conflicting writes are serialized by the store; the
//! monitor only ever does read-then-conditionally-write per record.

pub mod memory;

use thiserror::Error;

use crate::model::{Campaign, InstrumentKind, InstrumentState, StatusLogEntry};
use crate::notify::Recipient;

/// Errors surfaced by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record that must exist did not.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The backend failed; the message carries whatever it said.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// The host's entity store, holding mirrored instrument records and
/// per-instrument notification recipients.
pub trait EntityStore: Send + Sync {
    /// Look up an instrument by its source identity.
    fn find(
        &self,
        site_id: &str,
        kind: InstrumentKind,
    ) -> Result<Option<InstrumentState>, StoreError>;

    /// Look up an instrument by entity id.
    fn get(&self, entry_id: &str) -> Result<Option<InstrumentState>, StoreError>;

    /// Overwrite the stored record.
    fn update(&self, state: &InstrumentState) -> Result<(), StoreError>;

    /// Notification targets for an instrument. Filtering (enabled
    /// flag, schedule, address presence) happens at dispatch time.
    fn recipients(&self, entry_id: &str) -> Result<Vec<Recipient>, StoreError>;
}

/// Storage for escalation campaigns, one row per failing instrument.
pub trait CampaignStore: Send + Sync {
    fn list(&self) -> Result<Vec<Campaign>, StoreError>;

    fn get(&self, entry_id: &str) -> Result<Option<Campaign>, StoreError>;

    fn insert(&self, campaign: &Campaign) -> Result<(), StoreError>;

    fn update(&self, campaign: &Campaign) -> Result<(), StoreError>;

    /// Remove the campaign for one instrument. Removing a campaign
    /// that does not exist is not an error.
    fn delete(&self, entry_id: &str) -> Result<(), StoreError>;

    fn delete_all(&self) -> Result<(), StoreError>;
}

/// Append-only storage for status log entries.
pub trait TimeSeriesStore: Send + Sync {
    fn append(&self, entry: StatusLogEntry) -> Result<(), StoreError>;
}
