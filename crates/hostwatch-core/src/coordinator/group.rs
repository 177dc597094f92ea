// ── Coordinator group ──
//
// Every coordinator of one device shares a group. `halt` is the single
// stop-all entry point for fatal (authentication) failures, whichever
// coordinator or operation observed them.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use super::task::PeriodicTask;
use crate::error::CoreError;
use crate::session::RemoteSession;

/// Published when a group halts on an authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthFailure {
    pub device: String,
    /// Name of the coordinator or operation that observed the failure.
    pub source: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

pub struct CoordinatorGroup {
    session: Arc<RemoteSession>,
    tasks: Mutex<Vec<Arc<PeriodicTask>>>,
    failure: watch::Sender<Option<AuthFailure>>,
}

impl CoordinatorGroup {
    pub fn new(session: Arc<RemoteSession>) -> Self {
        let (failure, _) = watch::channel(None);
        Self {
            session,
            tasks: Mutex::new(Vec::new()),
            failure,
        }
    }

    pub fn attach(&self, task: Arc<PeriodicTask>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }

    pub fn tasks(&self) -> Vec<Arc<PeriodicTask>> {
        self.tasks
            .lock()
            .map(|tasks| tasks.clone())
            .unwrap_or_default()
    }

    // ── Fatal path ───────────────────────────────────────────────────

    /// Stop every attached task, invalidate the session and publish the
    /// failure. Synchronous, so no sibling starts a new tick before the
    /// caller yields.
    pub fn halt(&self, source: &str, err: &CoreError) {
        for task in self.tasks() {
            task.stop();
        }
        self.session.record_error(err);
        self.session.invalidate();

        error!(
            device = %self.session.device(),
            source,
            error = %err,
            "authentication failed; all coordinators stopped"
        );
        self.failure.send_replace(Some(AuthFailure {
            device: self.session.device().to_owned(),
            source: source.to_owned(),
            message: err.to_string(),
            at: Utc::now(),
        }));
    }

    /// Record `err` against the session and halt if it is fatal.
    /// Returns `true` if the group halted.
    pub fn observe(&self, source: &str, err: &CoreError) -> bool {
        if err.kind().is_fatal() {
            self.halt(source, err);
            true
        } else {
            self.session.record_error(err);
            false
        }
    }

    pub fn failure(&self) -> Option<AuthFailure> {
        self.failure.borrow().clone()
    }

    pub fn is_halted(&self) -> bool {
        self.failure.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AuthFailure>> {
        self.failure.subscribe()
    }

    // ── Bulk control ─────────────────────────────────────────────────

    /// Start every task and clear a previous auth failure.
    pub fn start_all(&self) {
        if self.failure.send_if_modified(|f| f.take().is_some()) {
            info!(device = %self.session.device(), "resuming after authentication failure");
        }
        for task in self.tasks() {
            task.start();
        }
    }

    pub fn stop_all(&self) {
        for task in self.tasks() {
            task.stop();
        }
    }

    /// Shut every task down and wait for their loops to exit.
    pub async fn shutdown_all(&self) {
        let tasks = self.tasks();
        for task in &tasks {
            task.shutdown();
        }
        for task in &tasks {
            task.join().await;
        }
    }
}
