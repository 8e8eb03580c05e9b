//! # fleetwatch
//!
//! A health monitor and escalating notifier for fleets of remote
//! instruments.
//!
//! Fleetwatch polls an external status source for each instrument's
//! last-seen timestamps on three channels (network, data, LDM),
//! mirrors that state locally, and, when an instrument goes silent,
//! drives an email-then-SMS notification campaign until the
//! instrument recovers or the escalation budget runs out.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Monitor                             │
//! │                                                              │
//! │  ┌────────┐   ┌───────────┐   ┌────────┐    ┌────────────┐  │
//! │  │ source │──▶│ reconcile │──▶│ health │    │  stores    │  │
//! │  │ (fetch)│   │ (compare) │   │ (is ok)│    │ (mirror,   │  │
//! │  └────────┘   └─────┬─────┘   └────────┘    │  campaigns,│  │
//! │                     │ open/close campaigns  │  series)   │  │
//! │                     ▼                       └────────────┘  │
//! │               ┌──────────┐   ┌────────┐                     │
//! │               │ escalate │──▶│ notify │──▶ email / SMS      │
//! │               │ (is due) │   │ (send) │                     │
//! │               └──────────┘   └────────┘                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: the instrument status feed ([`source::InstrumentSource`])
//!   with file, channel, and simulator implementations
//! - **[`health`]**: elapsed-minute staleness evaluation against thresholds
//! - **[`reconcile`]**: the poll-cycle engine comparing fresh observations to
//!   mirrored state, logging time-series entries, opening and closing
//!   campaigns
//! - **[`escalate`]**: the notification state machine deciding when each
//!   campaign is due and on which channel
//! - **[`notify`]**: channels, recipients, and the transport seam
//! - **[`store`]**: collaborator stores for mirrored state, campaigns, and
//!   the status time-series
//! - **[`runner`]**: the two periodic loops with circuit breaking and the
//!   [`runner::Monitor`] wiring
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fleetwatch::config::MonitorConfig;
//! use fleetwatch::notify::LogDispatcher;
//! use fleetwatch::runner::Monitor;
//! use fleetwatch::source::{seed_fleet, SimSource};
//! use fleetwatch::store::memory::{
//!     MemoryCampaignStore, MemoryEntityStore, MemoryTimeSeriesStore,
//! };
//!
//! # tokio_test::block_on(async {
//! let config = MonitorConfig::default();
//! let entities = Arc::new(MemoryEntityStore::new());
//! seed_fleet(&entities, 16);
//!
//! let monitor = Monitor::new(
//!     config,
//!     Box::new(SimSource::new(16)),
//!     entities,
//!     Arc::new(MemoryCampaignStore::new()),
//!     Arc::new(MemoryTimeSeriesStore::new()),
//!     Arc::new(LogDispatcher::new(-7)),
//! );
//!
//! let handle = monitor.start();
//! // ... later
//! handle.stop();
//! handle.wait().await;
//! # });
//! ```

pub mod config;
pub mod escalate;
pub mod health;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod runner;
pub mod source;
pub mod store;

// Re-export the main types for convenience
pub use config::MonitorConfig;
pub use escalate::{EscalationPolicy, Escalator};
pub use health::{Health, Thresholds};
pub use model::{Campaign, InstrumentKind, InstrumentState, Observation, StatusLogEntry};
pub use notify::{NotificationDispatcher, NotifyChannel, Recipient};
pub use reconcile::Reconciler;
pub use runner::{Monitor, MonitorHandle};
pub use source::{ChannelSource, FileSource, InstrumentSource, SimSource};
