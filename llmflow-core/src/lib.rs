//! # LLMFlow Core
//!
//! Core orchestration for the LLMFlow research agent: the iterative
//! refine-search-verify loop, the dispatcher for interactive sessions
//! and background jobs, the shared registries and metrics, and the
//! HTTP/WebSocket boundary.
//!
//! Intent analysis, search tools, LLM completion, and report synthesis
//! are external collaborators consumed through the traits in
//! [`collaborators`].

pub mod api;
pub mod collaborators;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod progress;
pub mod registry;
pub mod task;
pub mod verify;

// Re-export commonly used types at the crate root.
pub use collaborators::{
    EngineQuery, LlmService, MemoryStore, QueryPlanner, ReportSynthesizer, SearchHit, SearchTool,
};
pub use config::{AppConfig, EngineConfig, load_config};
pub use dispatcher::{Dispatcher, Submission};
pub use engine::{Collaborators, ResearchEngine};
pub use error::{CollaboratorError, LlmFlowError, RegistryError, Result};
pub use metrics::{Metrics, MetricsSnapshot};
pub use progress::{ProgressBroadcaster, ProgressEvent};
pub use registry::{JobRecord, JobRegistry, JobStats, SessionRegistry, SessionSummary};
pub use task::{Finding, ResearchTask, SourceRef, TaskMode, TaskStatus};
pub use verify::Verdict;
