//! Periodic loops and monitor wiring.
//!
//! Two independent tickers drive the reconciler and the escalator.
//! Each runs its cycle inside a caught-error boundary with a
//! consecutive-error circuit breaker: transient failures are logged
//! and retried next tick, but a loop that keeps failing shuts down
//! permanently and publishes its terminal status for operators.
//! Monitoring does not limp along half-broken.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::escalate::Escalator;
use crate::notify::NotificationDispatcher;
use crate::reconcile::Reconciler;
use crate::source::InstrumentSource;
use crate::store::{CampaignStore, EntityStore, TimeSeriesStore};

/// Consecutive cycle failures tolerated before a loop gives up.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// A unit of periodic work driven by a [`Runner`].
#[async_trait]
pub trait Cycle: Send {
    /// Loop name, for logs and status.
    fn name(&self) -> &'static str;

    async fn run(&mut self) -> Result<()>;
}

#[async_trait]
impl Cycle for Reconciler {
    fn name(&self) -> &'static str {
        "instrument-poll"
    }

    async fn run(&mut self) -> Result<()> {
        self.run_cycle(Utc::now()).await.map(|_| ())
    }
}

#[async_trait]
impl Cycle for Escalator {
    fn name(&self) -> &'static str {
        "notification-poll"
    }

    async fn run(&mut self) -> Result<()> {
        self.run_cycle(Utc::now()).await.map(|_| ())
    }
}

/// Where a loop currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerStatus {
    Running,
    /// Cleanly shut down via [`RunnerHandle::stop`].
    Stopped,
    /// Tripped the circuit breaker; requires operator intervention.
    Failed(String),
}

/// Handle to one running loop.
pub struct RunnerHandle {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    status_rx: watch::Receiver<RunnerStatus>,
    task: JoinHandle<()>,
}

impl RunnerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the loop to stop after its current tick.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn status(&self) -> RunnerStatus {
        self.status_rx.borrow().clone()
    }

    /// Wait for the loop task to finish.
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

/// Spawn a ticked loop around a cycle.
///
/// The first tick fires immediately. While `enabled` is false the
/// loop ticks idly without invoking the cycle (the global kill
/// switch, independent of any per-instrument flag).
pub fn spawn(
    interval: Duration,
    enabled: Arc<AtomicBool>,
    mut cycle: impl Cycle + 'static,
) -> RunnerHandle {
    let name = cycle.name();
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let (status_tx, status_rx) = watch::channel(RunnerStatus::Running);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut consecutive_errors = 0u32;

        info!(task = name, interval_secs = interval.as_secs(), "loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !enabled.load(Ordering::Relaxed) {
                        debug!(task = name, "monitoring disabled; idle tick");
                        continue;
                    }
                    match cycle.run().await {
                        Ok(()) => consecutive_errors = 0,
                        Err(e) => {
                            consecutive_errors += 1;
                            warn!(
                                task = name,
                                error = %e,
                                consecutive_errors,
                                "cycle failed"
                            );
                            if consecutive_errors > MAX_CONSECUTIVE_ERRORS {
                                let status = format!(
                                    "stopped after {} consecutive failures; last error: {}",
                                    consecutive_errors, e
                                );
                                error!(task = name, "{}", status);
                                let _ = status_tx.send(RunnerStatus::Failed(status));
                                return;
                            }
                        }
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        info!(task = name, "loop stopped");
                        let _ = status_tx.send(RunnerStatus::Stopped);
                        return;
                    }
                }
            }
        }
    });

    RunnerHandle {
        name,
        stop_tx,
        status_rx,
        task,
    }
}

/// The assembled monitor: reconciler and escalator wired to their
/// collaborators, ready to start both loops.
pub struct Monitor {
    config: MonitorConfig,
    reconciler: Reconciler,
    escalator: Escalator,
    enabled: Arc<AtomicBool>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        source: Box<dyn InstrumentSource>,
        entities: Arc<dyn EntityStore>,
        campaigns: Arc<dyn CampaignStore>,
        series: Arc<dyn TimeSeriesStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        let reconciler = Reconciler::new(
            source,
            entities.clone(),
            campaigns.clone(),
            series,
            &config,
        );
        let escalator = Escalator::new(
            entities,
            campaigns,
            dispatcher,
            config.escalation(),
            config.templates(),
        );
        let enabled = Arc::new(AtomicBool::new(config.monitoring_enabled));
        Self {
            config,
            reconciler,
            escalator,
            enabled,
        }
    }

    /// Borrow the escalator, e.g. for a forced diagnostic pass before
    /// the loops start.
    pub fn escalator(&self) -> &Escalator {
        &self.escalator
    }

    /// Run one reconciliation pass inline, outside the loops.
    pub async fn poll_once(&mut self) -> Result<crate::reconcile::CycleReport> {
        self.reconciler.run_cycle(Utc::now()).await
    }

    /// Start both loops and hand back their controls.
    pub fn start(self) -> MonitorHandle {
        let instruments = spawn(
            self.config.poll_interval(),
            self.enabled.clone(),
            self.reconciler,
        );
        let notifications = spawn(
            self.config.notification_poll_interval(),
            self.enabled.clone(),
            self.escalator,
        );
        MonitorHandle {
            instruments,
            notifications,
            enabled: self.enabled,
        }
    }
}

/// Controls for a started monitor.
pub struct MonitorHandle {
    pub instruments: RunnerHandle,
    pub notifications: RunnerHandle,
    enabled: Arc<AtomicBool>,
}

impl MonitorHandle {
    /// Flip the global kill switch. Both loops keep ticking but run
    /// no cycles while disabled.
    pub fn set_monitoring_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        info!(enabled, "global monitoring switch changed");
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Stop both loops.
    pub fn stop(&self) {
        self.instruments.stop();
        self.notifications.stop();
    }

    /// Wait for both loops to finish.
    pub async fn wait(self) {
        self.instruments.wait().await;
        self.notifications.wait().await;
    }
}
