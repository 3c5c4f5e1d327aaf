//! Session and job registries — the shared state between concurrent
//! engine instances and their observers.
//!
//! Both registries are cheaply cloneable handles over a locked map.
//! Every record mutation happens inside one critical section, so a
//! concurrent reader sees either the pre- or post-update record, never
//! a torn combination of fields.

use crate::error::RegistryError;
use crate::progress::ProgressEvent;
use crate::task::{ResearchTask, TaskStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

// ---------------------------------------------------------------------
// Sessions (interactive mode)
// ---------------------------------------------------------------------

/// Live state of an interactive session.
///
/// Holds at most one attached subscriber; attaching a new one
/// supersedes the old. The terminal event is retained so a subscriber
/// that re-attaches after a disconnect still observes the outcome.
struct SessionRecord {
    query: String,
    status: TaskStatus,
    subscriber: Option<mpsc::UnboundedSender<ProgressEvent>>,
    terminal_event: Option<ProgressEvent>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Read-only snapshot of a session for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub query: String,
    pub status: TaskStatus,
    pub subscribed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registry of interactive sessions, keyed by session id.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, SessionRecord>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a session for a freshly created task. The session id is
    /// the task id.
    pub fn insert(&self, task: &ResearchTask) -> Uuid {
        let record = SessionRecord {
            query: task.query.clone(),
            status: task.status,
            subscriber: None,
            terminal_event: None,
            created_at: task.created_at,
            updated_at: task.created_at,
        };
        self.inner.write().unwrap().insert(task.id, record);
        task.id
    }

    /// Attach a subscriber, superseding any previous one. If the
    /// session already reached a terminal state, the terminal event is
    /// replayed immediately so late subscribers still see the outcome.
    pub fn attach(
        &self,
        session_id: Uuid,
    ) -> Result<mpsc::UnboundedReceiver<ProgressEvent>, RegistryError> {
        let mut map = self.inner.write().unwrap();
        let record = map
            .get_mut(&session_id)
            .ok_or(RegistryError::SessionNotFound { id: session_id })?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(event) = &record.terminal_event {
            let _ = tx.send(event.clone());
        }
        record.subscriber = Some(tx);
        record.updated_at = Utc::now();
        Ok(rx)
    }

    /// Deliver an event to the session's subscriber, if any. Also
    /// records status transitions and retains terminal events.
    /// Events to an unknown or unsubscribed session are dropped.
    pub fn deliver(&self, session_id: Uuid, event: ProgressEvent) {
        let mut map = self.inner.write().unwrap();
        let Some(record) = map.get_mut(&session_id) else {
            return;
        };

        if !record.status.is_terminal() {
            match &event {
                ProgressEvent::Status { .. } | ProgressEvent::PartialResult { .. } => {
                    record.status = TaskStatus::Running;
                }
                ProgressEvent::Completed { .. } => record.status = TaskStatus::Completed,
                ProgressEvent::Failed { .. } => record.status = TaskStatus::Failed,
            }
        }
        if event.is_terminal() {
            record.terminal_event = Some(event.clone());
        }
        record.updated_at = Utc::now();

        if let Some(tx) = &record.subscriber {
            // A closed receiver means the subscriber went away; the
            // event is unobserved by design.
            if tx.send(event).is_err() {
                record.subscriber = None;
            }
        }
    }

    /// Snapshot of one session.
    pub fn get(&self, session_id: Uuid) -> Result<SessionSummary, RegistryError> {
        let map = self.inner.read().unwrap();
        map.get(&session_id)
            .map(|r| summarize(session_id, r))
            .ok_or(RegistryError::SessionNotFound { id: session_id })
    }

    /// Snapshots of all sessions, newest first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let map = self.inner.read().unwrap();
        let mut sessions: Vec<SessionSummary> =
            map.iter().map(|(id, r)| summarize(*id, r)).collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// Number of sessions still running.
    pub fn active_count(&self) -> usize {
        let map = self.inner.read().unwrap();
        map.values().filter(|r| !r.status.is_terminal()).count()
    }

    pub fn total_count(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    /// Drop terminal sessions whose last activity is older than the
    /// idle timeout.
    pub fn evict_idle(&self, idle_timeout: Duration) -> usize {
        let cutoff = Utc::now() - idle_timeout;
        let mut map = self.inner.write().unwrap();
        let before = map.len();
        map.retain(|_, r| !(r.status.is_terminal() && r.updated_at < cutoff));
        before - map.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn summarize(session_id: Uuid, record: &SessionRecord) -> SessionSummary {
    SessionSummary {
        session_id,
        query: record.query.clone(),
        status: record.status,
        subscribed: record.subscriber.is_some(),
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

// ---------------------------------------------------------------------
// Jobs (background mode)
// ---------------------------------------------------------------------

/// A background job record, visible to pollers from submission until
/// the retention policy purges it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub query: String,
    pub status: TaskStatus,
    /// Progress percentage in [0, 100].
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Aggregate job counts per status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Registry of background jobs, keyed by job id.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a job for a freshly created task. The job id is the
    /// task id.
    pub fn insert(&self, task: &ResearchTask) -> Uuid {
        let record = JobRecord {
            job_id: task.id,
            query: task.query.clone(),
            status: TaskStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: task.created_at,
            started_at: None,
            completed_at: None,
        };
        self.inner.write().unwrap().insert(task.id, record);
        task.id
    }

    /// Fold a progress event into the record under the write lock.
    /// Status, progress, result, and error move together; a poller
    /// never sees a completed status with partial progress.
    pub fn apply_event(&self, job_id: Uuid, event: &ProgressEvent, progress_hint: Option<u8>) {
        let mut map = self.inner.write().unwrap();
        let Some(record) = map.get_mut(&job_id) else {
            return;
        };
        if record.status.is_terminal() {
            return;
        }

        if record.status == TaskStatus::Pending {
            record.status = TaskStatus::Running;
            record.started_at = Some(Utc::now());
        }
        if let Some(progress) = progress_hint {
            record.progress = progress.min(100).max(record.progress);
        }

        match event {
            ProgressEvent::Status { .. } | ProgressEvent::PartialResult { .. } => {}
            ProgressEvent::Completed { report, .. } => {
                record.status = TaskStatus::Completed;
                record.progress = 100;
                record.result = Some(report.clone());
                record.completed_at = Some(Utc::now());
            }
            ProgressEvent::Failed { reason } => {
                record.status = TaskStatus::Failed;
                record.error = Some(reason.clone());
                record.completed_at = Some(Utc::now());
            }
        }
    }

    /// Snapshot of one job.
    pub fn get(&self, job_id: Uuid) -> Result<JobRecord, RegistryError> {
        let map = self.inner.read().unwrap();
        map.get(&job_id)
            .cloned()
            .ok_or(RegistryError::JobNotFound { id: job_id })
    }

    /// Snapshots of all jobs, optionally filtered by status, newest
    /// first.
    pub fn list(&self, status: Option<TaskStatus>) -> Vec<JobRecord> {
        let map = self.inner.read().unwrap();
        let mut jobs: Vec<JobRecord> = map
            .values()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Aggregate counts per status.
    pub fn stats(&self) -> JobStats {
        let map = self.inner.read().unwrap();
        let mut stats = JobStats {
            total: map.len(),
            ..JobStats::default()
        };
        for job in map.values() {
            match job.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Purge terminal jobs older than the retention window. This is
    /// the only way a job record ever disappears.
    pub fn cleanup(&self, retention: Duration) -> usize {
        let cutoff = Utc::now() - retention;
        let mut map = self.inner.write().unwrap();
        let before = map.len();
        map.retain(|_, job| {
            !(job.status.is_terminal() && job.completed_at.is_some_and(|t| t < cutoff))
        });
        before - map.len()
    }

    pub fn total_count(&self) -> usize {
        self.inner.read().unwrap().len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
