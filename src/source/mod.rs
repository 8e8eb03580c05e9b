//! Instrument status source abstraction.
//!
//! The monitor reconciles against whatever backend currently knows the
//! fleet's last-seen timestamps: an operations database, a pushed
//! feed, a JSON file, or the built-in simulator. Implementations own
//! their schema and connection management; the monitor only consumes
//! the observation rows.

mod channel;
mod file;
mod sim;

pub use channel::ChannelSource;
pub use file::FileSource;
pub use sim::{seed_fleet, SimSource};

use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::Observation;

/// Errors raised while fetching the fleet snapshot.
///
/// Any error means "skip this poll cycle", distinct from an `Ok`
/// empty vector, which means the fleet is genuinely empty.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backing system could not be reached.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The backing system answered with something unreadable.
    #[error("failed to parse observations: {0}")]
    Parse(String),

    /// The feed producer went away and will not come back.
    #[error("source closed")]
    Closed,
}

/// A source of per-instrument observation rows.
///
/// # Example
///
/// ```
/// use fleetwatch::source::{InstrumentSource, SimSource};
///
/// # tokio_test::block_on(async {
/// let mut source = SimSource::new(4);
/// let fleet = source.fetch_all().await.unwrap();
/// assert_eq!(fleet.len(), 4);
/// # });
/// ```
#[async_trait]
pub trait InstrumentSource: Send + Debug {
    /// Fetch the current snapshot: one row per monitored instrument,
    /// with nullable per-channel timestamps.
    async fn fetch_all(&mut self) -> Result<Vec<Observation>, SourceError>;

    /// Human-readable description of the source, for logs.
    fn description(&self) -> &str;
}
