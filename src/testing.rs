//! Fakes for the tracker's collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use error_stack::Report;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use rust_decimal::Decimal;

use crate::error::{FetchError, NotifyError, StorageError};
use crate::fetcher::PageFetcher;
use crate::model::{FetchedPage, Observation, TargetId};
use crate::notifier::{Ack, Notifier};
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub enum Step {
    Page(Decimal),
    Fail(FetchError),
    Panic,
    /// Never resolves.
    Hang,
}

/// Plays back a list of steps, then repeats `fallback` forever.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Step>>,
    fallback: Mutex<Step>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            fallback: Mutex::new(Step::Fail(FetchError::Unreachable)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn repeating(step: Step) -> Self {
        let fetcher = Self::new(Vec::new());
        fetcher.set_fallback(step);
        fetcher
    }

    pub fn set_fallback(&self, step: Step) {
        *self.fallback.lock().unwrap() = step;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PageFetcher for ScriptedFetcher {
    fn fetch(
        &self,
        _url: &str,
        _timeout: Duration,
    ) -> BoxFuture<'_, Result<FetchedPage, Report<FetchError>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());

        match step {
            Step::Page(price) => future::ok(FetchedPage {
                title: "Echo Dot".into(),
                price,
            })
            .boxed(),
            Step::Fail(kind) => future::err(Report::new(kind)).boxed(),
            Step::Panic => panic!("scripted fetcher fault"),
            Step::Hang => future::pending().boxed(),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successfully delivered messages.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) -> BoxFuture<'_, Result<Ack, Report<NotifyError>>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Box::pin(async { Err(Report::new(NotifyError::Unreachable)) });
        }
        self.messages.lock().unwrap().push(message.to_owned());
        Box::pin(async { Ok(Ack) })
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<TargetId, Vec<Observation>>>,
    failing: AtomicBool,
}

impl MemoryStorage {
    pub fn fail_appends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stored(&self, target_id: &TargetId) -> usize {
        self.records
            .lock()
            .unwrap()
            .get(target_id)
            .map_or(0, Vec::len)
    }
}

impl Storage for MemoryStorage {
    fn append(
        &self,
        target_id: &TargetId,
        observation: &Observation,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Box::pin(async { Err(Report::new(StorageError::Insert)) });
        }
        self.records
            .lock()
            .unwrap()
            .entry(target_id.clone())
            .or_default()
            .push(observation.clone());
        Box::pin(async { Ok(()) })
    }

    fn recent(
        &self,
        target_id: &TargetId,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Observation>, Report<StorageError>>> {
        let records = self
            .records
            .lock()
            .unwrap()
            .get(target_id)
            .cloned()
            .unwrap_or_default();
        let skip = records.len().saturating_sub(limit);
        Box::pin(async move { Ok(records.into_iter().skip(skip).collect()) })
    }

    fn count(&self, target_id: &TargetId) -> BoxFuture<'_, Result<usize, Report<StorageError>>> {
        let len = self.stored(target_id);
        Box::pin(async move { Ok(len) })
    }
}
