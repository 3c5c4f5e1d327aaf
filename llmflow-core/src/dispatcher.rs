//! Dispatcher — the single entry point for submitting research tasks.
//!
//! Validates the request, allocates the task, registers it in the
//! session or job registry, and spawns exactly one engine instance per
//! task id. `submit` returns the identifier immediately, before the
//! loop has made any progress.

use crate::config::EngineConfig;
use crate::engine::{Collaborators, ResearchEngine};
use crate::error::{LlmFlowError, Result};
use crate::metrics::Metrics;
use crate::progress::ProgressBroadcaster;
use crate::registry::{JobRegistry, SessionRegistry};
use crate::task::{ResearchTask, TaskMode};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Result of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Interactive { session_id: Uuid },
    Background { job_id: Uuid },
}

impl Submission {
    /// The allocated task identifier, regardless of mode.
    pub fn id(&self) -> Uuid {
        match self {
            Submission::Interactive { session_id } => *session_id,
            Submission::Background { job_id } => *job_id,
        }
    }
}

/// Accepts queries and starts research loop engines as spawned tasks.
#[derive(Clone)]
pub struct Dispatcher {
    collaborators: Collaborators,
    sessions: SessionRegistry,
    jobs: JobRegistry,
    metrics: Arc<Metrics>,
    engine_config: EngineConfig,
}

impl Dispatcher {
    pub fn new(
        collaborators: Collaborators,
        sessions: SessionRegistry,
        jobs: JobRegistry,
        metrics: Arc<Metrics>,
        engine_config: EngineConfig,
    ) -> Self {
        Self {
            collaborators,
            sessions,
            jobs,
            metrics,
            engine_config,
        }
    }

    /// Submit a query for research. Returns the session or job id
    /// immediately; the engine runs as an independently scheduled task.
    ///
    /// `max_iterations = None` selects the mode's configured default.
    pub fn submit(
        &self,
        query: &str,
        mode: TaskMode,
        max_iterations: Option<u32>,
    ) -> Result<Submission> {
        let query = query.trim();
        if query.is_empty() {
            return Err(LlmFlowError::Validation {
                reason: "query must not be empty".into(),
            });
        }

        let max_iterations =
            max_iterations.unwrap_or_else(|| self.engine_config.default_iterations(mode));
        if max_iterations == 0 || max_iterations > self.engine_config.max_iterations_cap {
            return Err(LlmFlowError::Validation {
                reason: format!(
                    "max_iterations must be in 1..={}, got {max_iterations}",
                    self.engine_config.max_iterations_cap
                ),
            });
        }

        let task = ResearchTask::new(query, mode, max_iterations);
        let task_id = task.id;

        // Registration before spawn: the id is observable as soon as
        // submit returns. One engine per task id, never a second.
        let (submission, broadcaster) = match mode {
            TaskMode::Interactive => {
                let session_id = self.sessions.insert(&task);
                (
                    Submission::Interactive { session_id },
                    ProgressBroadcaster::interactive(task_id, self.sessions.clone()),
                )
            }
            TaskMode::Background => {
                let job_id = self.jobs.insert(&task);
                (
                    Submission::Background { job_id },
                    ProgressBroadcaster::background(task_id, self.jobs.clone(), max_iterations),
                )
            }
        };

        let engine = ResearchEngine::new(self.collaborators.clone(), self.metrics.clone())
            .with_parse_top_results(self.engine_config.parse_top_results);
        tokio::spawn(async move {
            engine.run(task, &broadcaster).await;
        });

        info!(%task_id, ?mode, max_iterations, "task submitted");
        Ok(submission)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        InMemoryStore, MockLlm, MockPlanner, MockSearchTool, MockSynthesizer,
    };
    use crate::task::TaskStatus;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn make_dispatcher() -> Dispatcher {
        let collaborators = Collaborators {
            planner: Arc::new(MockPlanner::new()),
            search: Arc::new(MockSearchTool::single(
                "https://en.wikipedia.org/wiki/Paris",
                "Paris",
                "Paris is the capital of France.",
            )),
            llm: Arc::new(MockLlm::with_response("SUFFICIENT")),
            synthesizer: Arc::new(MockSynthesizer::new()),
            memory: Arc::new(InMemoryStore::new()),
        };
        Dispatcher::new(
            collaborators,
            SessionRegistry::new(),
            JobRegistry::new(),
            Arc::new(Metrics::new()),
            EngineConfig::default(),
        )
    }

    async fn wait_for_terminal_job(dispatcher: &Dispatcher, id: Uuid) -> TaskStatus {
        for _ in 0..200 {
            let job = dispatcher.jobs().get(id).unwrap();
            if job.status.is_terminal() {
                return job.status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_query() {
        let dispatcher = make_dispatcher();
        let err = dispatcher
            .submit("   ", TaskMode::Interactive, None)
            .unwrap_err();
        assert!(matches!(err, LlmFlowError::Validation { .. }));
        // Rejected before any task was created.
        assert_eq!(dispatcher.sessions().total_count(), 0);
        assert_eq!(dispatcher.jobs().total_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_rejects_out_of_range_iterations() {
        let dispatcher = make_dispatcher();
        assert!(
            dispatcher
                .submit("q", TaskMode::Background, Some(0))
                .is_err()
        );
        assert!(
            dispatcher
                .submit("q", TaskMode::Background, Some(51))
                .is_err()
        );
        assert!(
            dispatcher
                .submit("q", TaskMode::Background, Some(50))
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_submit_interactive_registers_session() {
        let dispatcher = make_dispatcher();
        let submission = dispatcher
            .submit("capital of France", TaskMode::Interactive, Some(3))
            .unwrap();
        let Submission::Interactive { session_id } = submission else {
            panic!("expected interactive submission");
        };
        assert!(dispatcher.sessions().get(session_id).is_ok());
    }

    #[tokio::test]
    async fn test_submit_background_runs_to_completion() {
        let dispatcher = make_dispatcher();
        let submission = dispatcher
            .submit("capital of France", TaskMode::Background, None)
            .unwrap();
        let Submission::Background { job_id } = submission else {
            panic!("expected background submission");
        };

        // Visible immediately, before any progress.
        let job = dispatcher.jobs().get(job_id).unwrap();
        assert!(job.progress <= 100);

        let status = wait_for_terminal_job(&dispatcher, job_id).await;
        assert_eq!(status, TaskStatus::Completed);
        let job = dispatcher.jobs().get(job_id).unwrap();
        assert_eq!(job.progress, 100);
        assert!(job.result.is_some());
    }

    #[tokio::test]
    async fn test_same_query_twice_yields_independent_ids() {
        let dispatcher = make_dispatcher();
        let first = dispatcher
            .submit("same query", TaskMode::Background, Some(2))
            .unwrap();
        let second = dispatcher
            .submit("same query", TaskMode::Background, Some(2))
            .unwrap();
        assert_ne!(first.id(), second.id());

        wait_for_terminal_job(&dispatcher, first.id()).await;
        wait_for_terminal_job(&dispatcher, second.id()).await;
        assert_eq!(dispatcher.jobs().stats().completed, 2);
    }

    #[tokio::test]
    async fn test_dropping_subscriber_does_not_change_outcome() {
        let dispatcher = make_dispatcher();
        let submission = dispatcher
            .submit("capital of France", TaskMode::Interactive, Some(3))
            .unwrap();
        let session_id = submission.id();

        // Attach and immediately drop the receiver mid-run.
        let rx = dispatcher.sessions().attach(session_id).unwrap();
        drop(rx);

        for _ in 0..200 {
            if dispatcher
                .sessions()
                .get(session_id)
                .unwrap()
                .status
                .is_terminal()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            dispatcher.sessions().get(session_id).unwrap().status,
            TaskStatus::Completed
        );

        // A late re-attach still observes the terminal outcome.
        let mut rx = dispatcher.sessions().attach(session_id).unwrap();
        let event = rx.recv().await.unwrap();
        assert!(event.is_terminal());
    }

    #[tokio::test]
    async fn test_mid_run_poll_is_never_torn() {
        let dispatcher = make_dispatcher();
        let submission = dispatcher
            .submit("slow topic", TaskMode::Background, Some(5))
            .unwrap();
        let job_id = submission.id();

        loop {
            let job = dispatcher.jobs().get(job_id).unwrap();
            assert!(job.progress <= 100);
            if job.status.is_terminal() {
                assert_eq!(job.status, TaskStatus::Completed);
                assert_eq!(job.progress, 100);
                break;
            }
            tokio::task::yield_now().await;
        }
    }
}
