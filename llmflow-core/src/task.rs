//! Research task state — the unit the research loop engine operates on.
//!
//! A task is created by the dispatcher, mutated by exactly one engine
//! instance until it reaches a terminal status, then referenced
//! read-only by whichever registry entry owns it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Consumption model for a research task. Selects how progress is
/// observed, not how the loop runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// Observed live over a streaming connection.
    Interactive,
    /// Observed by polling the job registry.
    Background,
}

/// Status of a research task. Transitions are monotonic:
/// pending -> running -> {completed, failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl TaskStatus {
    /// Whether this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A piece of extracted information attributed to a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// The extracted text.
    pub text: String,
    /// URL of the source this finding came from.
    pub url: String,
    /// The search engine that produced it.
    pub engine: String,
}

/// A deduplicated (url, title) source reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    pub title: String,
}

/// The unit of work processed by one research loop engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchTask {
    /// Unique task ID.
    pub id: Uuid,
    /// The user-supplied query. Immutable and non-empty.
    pub query: String,
    /// Consumption model.
    pub mode: TaskMode,
    /// Hard iteration ceiling for the refinement loop.
    pub max_iterations: u32,
    /// Refinement passes executed so far.
    pub iteration_count: u32,
    /// Extracted facts, append-only during the loop.
    pub findings: Vec<Finding>,
    /// Sources deduplicated by url, insertion order preserved.
    pub sources: Vec<SourceRef>,
    /// Current status.
    pub status: TaskStatus,
    /// Final report text, populated on completion.
    pub report: Option<String>,
    /// Last error, populated on failure.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResearchTask {
    /// Create a new pending task.
    pub fn new(query: impl Into<String>, mode: TaskMode, max_iterations: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            mode,
            max_iterations,
            iteration_count: 0,
            findings: Vec::new(),
            sources: Vec::new(),
            status: TaskStatus::Pending,
            report: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the task as running. No-op once terminal.
    pub fn start(&mut self) {
        if !self.status.is_terminal() {
            self.status = TaskStatus::Running;
            self.updated_at = Utc::now();
        }
    }

    /// Mark the task as completed with the final report. No-op once terminal.
    pub fn complete(&mut self, report: impl Into<String>) {
        if !self.status.is_terminal() {
            self.status = TaskStatus::Completed;
            self.report = Some(report.into());
            self.updated_at = Utc::now();
        }
    }

    /// Mark the task as failed with a reason. No-op once terminal.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.status.is_terminal() {
            self.status = TaskStatus::Failed;
            self.error = Some(reason.into());
            self.updated_at = Utc::now();
        }
    }

    /// Whether the task has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Add a source, deduplicating by url. Returns true if it was new.
    pub fn add_source(&mut self, url: impl Into<String>, title: impl Into<String>) -> bool {
        let url = url.into();
        if self.sources.iter().any(|s| s.url == url) {
            return false;
        }
        self.sources.push(SourceRef {
            url,
            title: title.into(),
        });
        self.updated_at = Utc::now();
        true
    }

    /// Append an extracted finding.
    pub fn add_finding(&mut self, finding: Finding) {
        self.findings.push(finding);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn make_task() -> ResearchTask {
        ResearchTask::new("capital of France", TaskMode::Interactive, 10)
    }

    #[test]
    fn test_task_creation() {
        let task = make_task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.iteration_count, 0);
        assert!(task.findings.is_empty());
        assert!(task.sources.is_empty());
        assert!(!task.is_terminal());
    }

    #[test]
    fn test_task_lifecycle() {
        let mut task = make_task();
        task.start();
        assert_eq!(task.status, TaskStatus::Running);

        task.complete("Paris is the capital of France.");
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.is_terminal());
        assert!(task.report.is_some());
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut task = make_task();
        task.start();
        task.fail("verification failed");
        assert_eq!(task.status, TaskStatus::Failed);

        // No transition out of a terminal state
        task.start();
        assert_eq!(task.status, TaskStatus::Failed);
        task.complete("late report");
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.report.is_none());
    }

    #[test]
    fn test_add_source_dedup() {
        let mut task = make_task();
        assert!(task.add_source("https://a.example", "A"));
        assert!(task.add_source("https://b.example", "B"));
        assert!(!task.add_source("https://a.example", "A again"));

        assert_eq!(task.sources.len(), 2);
        // Insertion order preserved, first title wins
        assert_eq!(task.sources[0].title, "A");
        assert_eq!(task.sources[1].url, "https://b.example");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Pending.to_string(), "pending");
        assert_eq!(TaskStatus::Running.to_string(), "running");
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&TaskStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        let status: TaskStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, TaskStatus::Failed);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn sources_never_contain_duplicate_urls(urls in proptest::collection::vec("[a-z]{1,8}", 0..40)) {
                let mut task = ResearchTask::new("q", TaskMode::Background, 30);
                for url in &urls {
                    task.add_source(url.clone(), "t");
                }
                let mut seen = std::collections::HashSet::new();
                for source in &task.sources {
                    prop_assert!(seen.insert(source.url.clone()));
                }
            }
        }
    }
}
