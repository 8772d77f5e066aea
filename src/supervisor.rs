use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use error_stack::{Report, ResultExt};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::error::SupervisorError;
use crate::model::{Observation, Target, TargetId, TrackerStatus};
use crate::tracker::{Tracker, TrackerDeps, TrackerSettings};

const SHUTDOWN_GRACE_SECS: u64 = 5;

/// Owns the set of running trackers, one per target id.
///
/// Every method takes `&self`, so a single `Arc<Supervisor>` can be shared
/// between the control path and presentation layers. Locks are held only for
/// map operations, never across an await.
pub struct Supervisor {
    deps: TrackerDeps,
    settings: TrackerSettings,
    runtime: Handle,
    trackers: RwLock<HashMap<TargetId, Tracker>>,
}

impl Supervisor {
    /// Must be called from within a tokio runtime; trackers are spawned on it.
    pub fn new(deps: TrackerDeps, settings: TrackerSettings) -> Self {
        Self {
            deps,
            settings,
            runtime: Handle::current(),
            trackers: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TargetId, Tracker>> {
        self.trackers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TargetId, Tracker>> {
        self.trackers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start monitoring `target`. Safe to call from any thread.
    pub fn start_tracking(&self, target: Target) -> Result<(), Report<SupervisorError>> {
        let id = target.id.clone();
        let interval = target.interval.unwrap_or(self.settings.interval);

        let mut trackers = self.write();
        if trackers.get(&id).is_some_and(|t| t.state().is_active()) {
            return Err(Report::new(SupervisorError::AlreadyTracking {
                target_id: id.to_string(),
            }));
        }

        let mut tracker = Tracker::new(target, self.settings.clone(), self.deps.clone());
        tracker
            .start(interval, &self.runtime)
            .change_context(SupervisorError::Start)?;
        // Any leftover idle/stopped tracker under this id is dropped here.
        trackers.insert(id, tracker);
        Ok(())
    }

    /// Stop and forget a target. Returns whether it was being tracked.
    pub fn stop_tracking(&self, target_id: &TargetId) -> bool {
        let removed = self.write().remove(target_id);
        match removed {
            Some(tracker) => {
                tracker.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every target owned by `owner`, e.g. when their session ends.
    pub fn stop_owner(&self, owner: &str) -> usize {
        let removed: Vec<Tracker> = {
            let mut trackers = self.write();
            let ids: Vec<TargetId> = trackers
                .iter()
                .filter(|(_, t)| t.target().owner == owner)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| trackers.remove(id)).collect()
        };

        for tracker in &removed {
            tracker.stop();
        }
        if !removed.is_empty() {
            info!(owner, stopped = removed.len(), "stopped trackers for owner");
        }
        removed.len()
    }

    pub fn get_status(&self, target_id: &TargetId) -> Result<TrackerStatus, Report<SupervisorError>> {
        self.read()
            .get(target_id)
            .map(Tracker::status)
            .ok_or_else(|| {
                Report::new(SupervisorError::NotFound {
                    target_id: target_id.to_string(),
                })
            })
    }

    /// Snapshots of every tracker, ordered by target id.
    pub fn statuses(&self) -> Vec<TrackerStatus> {
        let mut statuses: Vec<TrackerStatus> = self.read().values().map(Tracker::status).collect();
        statuses.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        statuses
    }

    /// Stored history for a target, oldest first. Works for targets that are
    /// no longer tracked as long as the store still has them.
    pub async fn history(
        &self,
        target_id: &TargetId,
        limit: usize,
    ) -> Result<Vec<Observation>, Report<SupervisorError>> {
        self.deps
            .storage
            .recent(target_id, limit)
            .await
            .change_context(SupervisorError::History)
            .attach_with(|| format!("target: {target_id}"))
    }

    /// Stop every tracker and wait briefly for their tasks to wind down.
    pub async fn shutdown(&self) {
        let drained: Vec<Tracker> = self.write().drain().map(|(_, t)| t).collect();
        let mut handles = Vec::with_capacity(drained.len());
        for mut tracker in drained {
            tracker.stop();
            if let Some(handle) = tracker.take_handle() {
                handles.push((tracker.target().id.clone(), handle));
            }
        }

        for (id, handle) in handles {
            match tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(target_id = %id, error = %e, "tracker task ended abnormally"),
                Err(_) => warn!(target_id = %id, "tracker task did not exit in time"),
            }
        }
    }
}
