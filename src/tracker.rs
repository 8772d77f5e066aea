use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use error_stack::Report;
use futures::FutureExt;
use rust_decimal::Decimal;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{FetchError, TrackerError};
use crate::fetcher::PageFetcher;
use crate::model::{Observation, Target, TrackerState, TrackerStatus};
use crate::notifier::Notifier;
use crate::policy::{AlertDecision, compose_message, decide};
use crate::storage::Storage;

/// Knobs shared by every tracker a supervisor creates.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub interval: Duration,
    pub fetch_timeout: Duration,
    /// How many recent observations a tracker keeps in memory for display.
    pub recent_window: usize,
    pub currency: String,
    pub notify_unchanged: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(15),
            recent_window: 10,
            currency: "INR".into(),
            notify_unchanged: true,
        }
    }
}

/// External collaborators a tracker drives.
#[derive(Clone)]
pub struct TrackerDeps {
    pub fetcher: Arc<dyn PageFetcher>,
    pub storage: Arc<dyn Storage>,
    pub notifier: Arc<dyn Notifier>,
}

/// What a single poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The sample was stored and applied.
    Recorded(AlertDecision),
    FetchFailed(FetchError),
    StoreFailed,
    /// The tracker was stopped while the cycle was in flight.
    Discarded,
}

#[derive(Debug)]
struct TrackerShared {
    state: TrackerState,
    title: Option<String>,
    last_price: Option<Decimal>,
    last_error: Option<String>,
    last_alert: Option<AlertDecision>,
    last_checked: Option<DateTime<Utc>>,
    recent: VecDeque<Observation>,
}

impl TrackerShared {
    fn new() -> Self {
        Self {
            state: TrackerState::Idle,
            title: None,
            last_price: None,
            last_error: None,
            last_alert: None,
            last_checked: None,
            recent: VecDeque::new(),
        }
    }

    /// `Stopped` is terminal; late cycle results never revive a tracker.
    fn transition(&mut self, next: TrackerState) {
        if self.state != TrackerState::Stopped {
            self.state = next;
        }
    }
}

/// The poll/decide/persist/notify cycle for one target.
///
/// Owned by an `Arc` so the scheduled task and the `Tracker` handle can both
/// reach it; all mutable state sits behind `shared`.
struct PollCycle {
    target: Target,
    settings: TrackerSettings,
    deps: TrackerDeps,
    shared: RwLock<TrackerShared>,
    cancel: CancellationToken,
}

impl PollCycle {
    fn read(&self) -> RwLockReadGuard<'_, TrackerShared> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TrackerShared> {
        self.shared.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let cycle = AssertUnwindSafe(self.poll_once()).catch_unwind().await;
            if let Err(panic) = cycle {
                let reason = panic_message(panic.as_ref());
                error!(target_id = %self.target.id, reason = %reason, "poll cycle panicked");
                let mut shared = self.write();
                shared.transition(TrackerState::Degraded);
                shared.last_error = Some(format!("poll cycle panicked: {reason}"));
                shared.last_checked = Some(Utc::now());
            }
        }

        debug!(target_id = %self.target.id, "tracker loop exited");
    }

    async fn poll_once(&self) -> CycleOutcome {
        let timeout = self.settings.fetch_timeout;
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return CycleOutcome::Discarded,
            result = tokio::time::timeout(timeout, self.deps.fetcher.fetch(&self.target.url, timeout)) => result,
        };

        let page = match fetched {
            Ok(Ok(page)) => page,
            Ok(Err(report)) => return self.fetch_failed(report),
            Err(_) => {
                let report = Report::new(FetchError::Timeout)
                    .attach(format!("no response within {}s", timeout.as_secs_f64()));
                return self.fetch_failed(report);
            }
        };

        if self.cancel.is_cancelled() {
            debug!(target_id = %self.target.id, "tracker stopped mid-fetch, discarding result");
            return CycleOutcome::Discarded;
        }

        let (previous, timestamp) = {
            let shared = self.read();
            // Keep history timestamps non-decreasing even if the wall clock steps back.
            let floor = shared.recent.back().map(|o| o.timestamp);
            let now = Utc::now();
            (shared.last_price, floor.map_or(now, |f| f.max(now)))
        };

        let decision = decide(previous, page.price, self.target.threshold);
        let observation = Observation::from_page(page, timestamp);

        if let Err(report) = self.deps.storage.append(&self.target.id, &observation).await {
            error!(target_id = %self.target.id, error = ?report, "failed to persist observation");
            let mut shared = self.write();
            shared.transition(TrackerState::Degraded);
            shared.last_error = Some(report.current_context().to_string());
            shared.last_checked = Some(Utc::now());
            return CycleOutcome::StoreFailed;
        }

        {
            let mut shared = self.write();
            shared.last_price = Some(observation.price);
            shared.title = Some(observation.title.clone());
            shared.last_alert = Some(decision);
            shared.last_error = None;
            shared.last_checked = Some(observation.timestamp);
            shared.recent.push_back(observation.clone());
            while shared.recent.len() > self.settings.recent_window {
                shared.recent.pop_front();
            }
            shared.transition(TrackerState::Polling);
        }

        info!(
            target_id = %self.target.id,
            price = %observation.price,
            decision = %decision,
            "price recorded"
        );

        let wants_notification = match decision {
            AlertDecision::None => false,
            AlertDecision::Unchanged => self.settings.notify_unchanged,
            _ => true,
        };
        if wants_notification {
            self.send_alert(previous, &observation, &decision).await;
        }

        CycleOutcome::Recorded(decision)
    }

    fn fetch_failed(&self, report: Report<FetchError>) -> CycleOutcome {
        let kind = *report.current_context();
        warn!(target_id = %self.target.id, error = ?report, "fetch failed, will retry next cycle");

        let mut shared = self.write();
        shared.transition(TrackerState::Degraded);
        shared.last_error = Some(kind.to_string());
        shared.last_checked = Some(Utc::now());
        CycleOutcome::FetchFailed(kind)
    }

    async fn send_alert(
        &self,
        previous: Option<Decimal>,
        observation: &Observation,
        decision: &AlertDecision,
    ) {
        let Some(message) = compose_message(
            &observation.title,
            previous,
            observation.price,
            decision,
            &self.settings.currency,
        ) else {
            return;
        };

        match self.deps.notifier.notify(&message).await {
            Ok(_) => debug!(target_id = %self.target.id, "notification delivered"),
            Err(report) => {
                warn!(target_id = %self.target.id, error = ?report, "notification failed")
            }
        }
    }

    fn status(&self) -> TrackerStatus {
        let shared = self.read();
        TrackerStatus {
            target_id: self.target.id.clone(),
            url: self.target.url.clone(),
            owner: self.target.owner.clone(),
            threshold: self.target.threshold,
            title: shared.title.clone(),
            last_price: shared.last_price,
            state: shared.state,
            last_error: shared.last_error.clone(),
            last_alert: shared.last_alert,
            last_checked: shared.last_checked,
            recent_history: shared.recent.iter().cloned().collect(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Handle to one target's monitoring task.
pub struct Tracker {
    cycle: Arc<PollCycle>,
    handle: Option<JoinHandle<()>>,
}

impl Tracker {
    pub fn new(target: Target, settings: TrackerSettings, deps: TrackerDeps) -> Self {
        Self {
            cycle: Arc::new(PollCycle {
                target,
                settings,
                deps,
                shared: RwLock::new(TrackerShared::new()),
                cancel: CancellationToken::new(),
            }),
            handle: None,
        }
    }

    pub fn target(&self) -> &Target {
        &self.cycle.target
    }

    /// Begin polling every `interval` on `runtime`, with the first poll right
    /// away. Callable from threads outside the runtime.
    pub fn start(
        &mut self,
        interval: Duration,
        runtime: &Handle,
    ) -> Result<(), Report<TrackerError>> {
        {
            let mut shared = self.cycle.write();
            if shared.state != TrackerState::Idle {
                return Err(Report::new(TrackerError::AlreadyStarted {
                    target_id: self.cycle.target.id.to_string(),
                    state: shared.state.to_string(),
                }));
            }
            shared.state = TrackerState::Polling;
        }

        info!(
            target_id = %self.cycle.target.id,
            url = %self.cycle.target.url,
            interval_secs = interval.as_secs_f64(),
            "tracker started"
        );
        self.handle = Some(runtime.spawn(Arc::clone(&self.cycle).run(interval)));
        Ok(())
    }

    /// Stop polling. Returns immediately; an in-flight fetch is abandoned.
    pub fn stop(&self) {
        let previous = {
            let mut shared = self.cycle.write();
            std::mem::replace(&mut shared.state, TrackerState::Stopped)
        };
        self.cycle.cancel.cancel();
        if previous != TrackerState::Stopped {
            info!(target_id = %self.cycle.target.id, "tracker stopped");
        }
    }

    pub fn status(&self) -> TrackerStatus {
        self.cycle.status()
    }

    pub fn state(&self) -> TrackerState {
        self.cycle.read().state
    }

    /// Run one cycle inline, bypassing the scheduler.
    #[cfg(test)]
    pub async fn poll_once(&self) -> CycleOutcome {
        self.cycle.poll_once().await
    }

    pub(crate) fn take_handle(&mut self) -> Option<JoinHandle<()>> {
        self.handle.take()
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.cycle.cancel.cancel();
    }
}
