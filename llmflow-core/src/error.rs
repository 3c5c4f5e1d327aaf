//! Error types for the LLMFlow core.
//!
//! Uses `thiserror` for public API error types. The taxonomy separates
//! absorbable collaborator failures (a single search or LLM call that
//! exhausted its own retries) from fatal loop-level failures
//! (verification, synthesis) and caller-facing conditions (validation,
//! unknown identifiers).

use uuid::Uuid;

/// Top-level error type for the LLMFlow core library.
#[derive(Debug, thiserror::Error)]
pub enum LlmFlowError {
    /// Bad submit input, rejected before any task is created.
    #[error("Validation error: {reason}")]
    Validation { reason: String },

    /// A single collaborator call failed after its own retries.
    ///
    /// These are absorbed by the engine as empty results and never
    /// fail a task on their own.
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// The verification step failed. Fatal for the task.
    #[error("Verification error: {reason}")]
    Verification { reason: String },

    /// The synthesis step failed. Fatal for the task.
    #[error("Synthesis error: {reason}")]
    Synthesis { reason: String },

    /// Lookup of an unknown session or job identifier.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the external collaborators (search tools, LLM service,
/// planner, memory). Each collaborator owns its own timeout and retry
/// policy; by the time one of these surfaces here, retries are spent.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Search engine '{engine}' failed: {message}")]
    Search { engine: String, message: String },

    #[error("LLM call failed: {message}")]
    Llm { message: String },

    #[error("Query planning failed: {message}")]
    Planning { message: String },

    #[error("Memory store failed: {message}")]
    Memory { message: String },
}

/// Errors from the session and job registries.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Session not found: {id}")]
    SessionNotFound { id: Uuid },

    #[error("Job not found: {id}")]
    JobNotFound { id: Uuid },
}

/// A type alias for results using the top-level `LlmFlowError`.
pub type Result<T> = std::result::Result<T, LlmFlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = LlmFlowError::Validation {
            reason: "query must not be empty".into(),
        };
        assert_eq!(err.to_string(), "Validation error: query must not be empty");
    }

    #[test]
    fn test_error_display_collaborator() {
        let err = LlmFlowError::Collaborator(CollaboratorError::Search {
            engine: "duckduckgo".into(),
            message: "connection reset".into(),
        });
        assert_eq!(
            err.to_string(),
            "Collaborator error: Search engine 'duckduckgo' failed: connection reset"
        );
    }

    #[test]
    fn test_error_display_verification() {
        let err = LlmFlowError::Verification {
            reason: "LLM call failed: timeout".into(),
        };
        assert_eq!(
            err.to_string(),
            "Verification error: LLM call failed: timeout"
        );
    }

    #[test]
    fn test_error_display_registry() {
        let id = Uuid::nil();
        let err = LlmFlowError::Registry(RegistryError::JobNotFound { id });
        assert_eq!(
            err.to_string(),
            format!("Registry error: Job not found: {id}")
        );
    }

    #[test]
    fn test_error_from_collaborator() {
        let err: LlmFlowError = CollaboratorError::Llm {
            message: "rate limited".into(),
        }
        .into();
        assert!(matches!(err, LlmFlowError::Collaborator(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LlmFlowError = io_err.into();
        assert!(matches!(err, LlmFlowError::Io(_)));
    }
}
