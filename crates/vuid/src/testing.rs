//! Test doubles for the launcher and speech seams.
//!
//! Both record what the supervisor asked of them so tests can assert on
//! lifecycle event order and synthesis calls without a real runtime host.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use vui_core::{AppId, LifecycleEvent};

use crate::app::{AppLauncher, LaunchError};
use crate::registry::AppExecutor;
use crate::speech::{SpeechError, SpeechJob, SpeechSynthesizer};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Launcher that keeps every instance's event receiver.
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    receivers: Mutex<HashMap<AppId, Vec<mpsc::UnboundedReceiver<LifecycleEvent>>>>,
    launches: Mutex<Vec<AppId>>,
    failing: Mutex<HashSet<AppId>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later launch of `app_id` fail.
    pub fn fail_launch(&self, app_id: &AppId) {
        lock(&self.failing).insert(app_id.clone());
    }

    pub fn launch_count(&self) -> usize {
        lock(&self.launches).len()
    }

    /// Identifiers in launch order.
    pub fn launches(&self) -> Vec<AppId> {
        lock(&self.launches).clone()
    }

    /// Drain the events delivered so far to every instance launched under
    /// `app_id`, oldest instance first.
    pub fn events(&self, app_id: &AppId) -> Vec<LifecycleEvent> {
        let mut receivers = lock(&self.receivers);
        let mut events = Vec::new();
        for rx in receivers.get_mut(app_id).into_iter().flatten() {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        events
    }
}

impl AppLauncher for RecordingLauncher {
    fn launch(
        &self,
        app_id: &AppId,
        _executor: &AppExecutor,
        events: mpsc::UnboundedReceiver<LifecycleEvent>,
    ) -> Result<(), LaunchError> {
        if lock(&self.failing).contains(app_id) {
            return Err(LaunchError::Failed(app_id.clone(), "launch refused".to_string()));
        }
        lock(&self.launches).push(app_id.clone());
        lock(&self.receivers)
            .entry(app_id.clone())
            .or_default()
            .push(events);
        Ok(())
    }
}

/// Synthesizer that records calls and completes each job immediately.
#[derive(Debug, Default)]
pub struct RecordingSynthesizer {
    spoken: Mutex<Vec<(AppId, String)>>,
    next_failure: Mutex<Option<SpeechError>>,
}

impl RecordingSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete the next job with `error` instead of success.
    pub fn fail_next(&self, error: SpeechError) {
        *lock(&self.next_failure) = Some(error);
    }

    pub fn calls(&self) -> usize {
        lock(&self.spoken).len()
    }

    pub fn spoken(&self) -> Vec<(AppId, String)> {
        lock(&self.spoken).clone()
    }
}

impl SpeechSynthesizer for RecordingSynthesizer {
    fn speak(&self, app_id: &AppId, text: &str) -> Result<SpeechJob, SpeechError> {
        lock(&self.spoken).push((app_id.clone(), text.to_string()));
        let (job, done) = SpeechJob::pending();
        let result = match lock(&self.next_failure).take() {
            Some(error) => Err(error),
            None => Ok(()),
        };
        let _ = done.send(result);
        Ok(job)
    }
}
