//! Progress delivery — events from a running engine to whoever is
//! watching.
//!
//! Interactive sessions get events forwarded to a single-slot
//! subscriber (the latest attached receiver; nobody attached means the
//! event is simply unobserved). Background jobs get every event folded
//! into the job record in place, so a poller always sees the latest
//! known state.

use crate::registry::{JobRegistry, SessionRegistry};
use crate::task::SourceRef;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An incremental event emitted by the research loop engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Human-readable step progress message.
    Status { message: String },
    /// An iteration finished merging new results.
    PartialResult { iteration: u32, new_sources: usize },
    /// Terminal success: the synthesized report plus all sources.
    Completed {
        report: String,
        sources: Vec<SourceRef>,
    },
    /// Terminal failure with a human-readable reason.
    Failed { reason: String },
}

impl ProgressEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. }
        )
    }
}

/// Per-task event publisher, wired by the dispatcher to the consumption
/// model the task was submitted under.
pub enum ProgressBroadcaster {
    /// Forward to the session's currently attached subscriber.
    Interactive {
        task_id: Uuid,
        sessions: SessionRegistry,
    },
    /// Fold into the job record; progress percent is derived from the
    /// iteration checkpoints, scaled across the iteration cap.
    Background {
        task_id: Uuid,
        jobs: JobRegistry,
        max_iterations: u32,
    },
}

impl ProgressBroadcaster {
    pub fn interactive(task_id: Uuid, sessions: SessionRegistry) -> Self {
        Self::Interactive { task_id, sessions }
    }

    pub fn background(task_id: Uuid, jobs: JobRegistry, max_iterations: u32) -> Self {
        Self::Background {
            task_id,
            jobs,
            max_iterations,
        }
    }

    /// Publish one event. Never fails: a missing subscriber or an
    /// already-evicted record makes the event unobserved, not an error.
    pub fn publish(&self, event: ProgressEvent) {
        match self {
            Self::Interactive { task_id, sessions } => {
                sessions.deliver(*task_id, event);
            }
            Self::Background {
                task_id,
                jobs,
                max_iterations,
            } => {
                let progress_hint = match &event {
                    ProgressEvent::Status { .. } => None,
                    ProgressEvent::PartialResult { iteration, .. } => {
                        Some(iteration_progress(*iteration, *max_iterations))
                    }
                    ProgressEvent::Completed { .. } => Some(100),
                    ProgressEvent::Failed { .. } => None,
                };
                jobs.apply_event(*task_id, &event, progress_hint);
            }
        }
    }
}

/// Map a completed iteration onto the 5..=85 progress band, reserving
/// the tail for synthesis and completion.
fn iteration_progress(iteration: u32, max_iterations: u32) -> u8 {
    let max = max_iterations.max(1);
    let scaled = 5 + (80 * iteration.min(max)) / max;
    scaled.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_terminality() {
        assert!(!ProgressEvent::Status {
            message: "planning".into()
        }
        .is_terminal());
        assert!(!ProgressEvent::PartialResult {
            iteration: 1,
            new_sources: 2
        }
        .is_terminal());
        assert!(ProgressEvent::Completed {
            report: "r".into(),
            sources: vec![]
        }
        .is_terminal());
        assert!(ProgressEvent::Failed { reason: "e".into() }.is_terminal());
    }

    #[test]
    fn test_event_serde_tagging() {
        let event = ProgressEvent::Status {
            message: "Searching...".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["message"], "Searching...");

        let event = ProgressEvent::Failed {
            reason: "boom".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
    }

    #[test]
    fn test_iteration_progress_band() {
        assert_eq!(iteration_progress(0, 10), 5);
        assert_eq!(iteration_progress(5, 10), 45);
        assert_eq!(iteration_progress(10, 10), 85);
        // Clamped past the cap
        assert_eq!(iteration_progress(20, 10), 85);
        // Degenerate cap
        assert_eq!(iteration_progress(1, 0), 85);
    }
}
