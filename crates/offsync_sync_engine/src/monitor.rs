//! Connectivity tracking and the background probe loop.

use crate::engine::SyncEngine;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Change in reachability observed by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Offline before, online now.
    CameOnline,
    /// Online before, offline now.
    WentOffline,
    /// No change.
    Unchanged,
}

impl Transition {
    fn between(was_online: bool, is_online: bool) -> Self {
        match (was_online, is_online) {
            (false, true) => Transition::CameOnline,
            (true, false) => Transition::WentOffline,
            _ => Transition::Unchanged,
        }
    }
}

/// The engine's view of remote reachability.
///
/// Starts offline. Written only by probes; read by everyone else.
#[derive(Debug, Default)]
pub struct Connectivity {
    online: AtomicBool,
    last_probe_at: Mutex<Option<DateTime<Utc>>>,
}

impl Connectivity {
    /// Creates a tracker in the offline state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the last probe reached the remote.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Returns when the last probe finished.
    pub fn last_probe_at(&self) -> Option<DateTime<Utc>> {
        *self.last_probe_at.lock()
    }

    /// Records a probe result and reports the transition.
    pub fn record(&self, reachable: bool) -> Transition {
        *self.last_probe_at.lock() = Some(Utc::now());
        let was_online = self.online.swap(reachable, Ordering::AcqRel);
        Transition::between(was_online, reachable)
    }
}

/// Handle to a running connectivity monitor.
///
/// Dropping the handle stops the monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Returns true while the probe loop is running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the monitor and waits for the loop to exit.
    ///
    /// Syncs already triggered by the monitor keep running.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "connectivity monitor ended abnormally");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spawns the probe loop for `engine`.
///
/// Probes immediately, then every `interval`. An offline to online
/// transition spawns a full sync pass without waiting for it.
pub(crate) fn spawn(engine: SyncEngine, interval: Duration) -> MonitorHandle {
    let token = CancellationToken::new();
    let cancelled = token.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = interval.as_millis() as u64, "connectivity monitor started");

        loop {
            tokio::select! {
                _ = cancelled.cancelled() => break,
                _ = ticker.tick() => {
                    let transition = tokio::select! {
                        _ = cancelled.cancelled() => break,
                        transition = engine.check_connectivity() => transition,
                    };
                    if transition == Transition::CameOnline {
                        trigger_sync(&engine);
                    }
                }
            }
        }

        debug!("connectivity monitor stopped");
    });

    MonitorHandle {
        token,
        task: Some(task),
    }
}

fn trigger_sync(engine: &SyncEngine) {
    let engine = engine.clone();
    tokio::spawn(async move {
        match engine.sync_all().await {
            Ok(report) => debug!(synced = report.synced, failed = report.failed, "reconnect sync finished"),
            Err(err) => error!(error = %err, "reconnect sync failed"),
        }
    });
}
