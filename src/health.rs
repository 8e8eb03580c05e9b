//! Staleness evaluation against configurable thresholds.
//!
//! An instrument is OK only while all three channels (network, data,
//! LDM) have been seen more recently than their thresholds. Any one
//! stale channel marks the instrument NOT-OK; there is no weighting or
//! partial-failure notion.

use chrono::{DateTime, Utc};

use crate::model::InstrumentState;

/// Per-channel staleness thresholds, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub network: i64,
    pub data: i64,
    pub ldm: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            network: 30,
            data: 30,
            ldm: 30,
        }
    }
}

impl Thresholds {
    /// One shared threshold for all three channels.
    pub fn uniform(minutes: i64) -> Self {
        Self {
            network: minutes,
            data: minutes,
            ldm: minutes,
        }
    }
}

/// Whole minutes elapsed between `now` and a last-seen timestamp.
///
/// An absent timestamp reads as `0`: never-seen is treated as "just
/// seen" rather than "always stale", so instruments without a baseline
/// do not alarm. Timestamps in the future yield negative minutes and
/// are deliberately not clamped; they simply read as healthy.
pub fn elapsed_minutes(now: DateTime<Utc>, ts: Option<DateTime<Utc>>) -> i64 {
    match ts {
        Some(t) => (now - t).num_minutes(),
        None => 0,
    }
}

/// Elapsed minutes for each channel of an instrument, measured at one
/// instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub network_minutes: i64,
    pub data_minutes: i64,
    pub ldm_minutes: i64,
}

impl Health {
    /// Measure all three channels of `state` at `now`.
    pub fn measure(now: DateTime<Utc>, state: &InstrumentState) -> Self {
        Self {
            network_minutes: elapsed_minutes(now, state.last_network),
            data_minutes: elapsed_minutes(now, state.last_data),
            ldm_minutes: elapsed_minutes(now, state.last_ldm),
        }
    }

    /// True while every channel is strictly under its threshold.
    pub fn is_ok(&self, thresholds: &Thresholds) -> bool {
        self.network_minutes < thresholds.network
            && self.data_minutes < thresholds.data
            && self.ldm_minutes < thresholds.ldm
    }
}
