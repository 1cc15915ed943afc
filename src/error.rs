//! Error types for the prdflow CLI.
//!
//! Uses thiserror for derive macros and provides user-actionable error
//! messages. Each variant maps to exactly one process exit code; the
//! mapping is the contract automation scripts depend on.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for prdflow operations.
#[derive(Error, Debug)]
pub enum PrdflowError {
    /// PRD conversion or work-item initialization failed.
    #[error("Initialization failed: {0}")]
    Init(String),

    /// The agent process failed to launch, or exited nonzero with no
    /// usable structured output.
    #[error("Agent transport error: {0}")]
    Transport(String),

    /// Agent output was present but no valid JSON object could be located.
    #[error("Failed to parse agent output: {0}")]
    Parse(String),

    /// A parsed object is missing required fields or violates the declared
    /// shape.
    #[error("Schema violation: {0}")]
    Schema(String),

    /// An explicit safety flag in the agent result reported failure.
    #[error("Security policy violation: {0}")]
    SecurityPolicy(String),

    /// No eligible subtask exists while some subtasks remain non-terminal.
    #[error("Dependencies unsatisfiable: {0}")]
    DependencyUnsatisfiable(String),

    /// A subtask reported an explicit block.
    #[error("Task blocked: {0}")]
    TaskBlocked(String),

    /// A subtask execution failed.
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// The template-set configuration document is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A resume request conflicts with the pinned configuration of the
    /// persisted run.
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// The agent process reported a network failure.
    #[error("Network error: {0}")]
    Network(String),

    /// A PRD file or state document could not be found.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Invalid command-line arguments or invocation state.
    #[error("{0}")]
    InvalidArgs(String),

    /// Unclassified failure (typically an unexpected I/O error).
    #[error("{0}")]
    Unknown(String),
}

impl PrdflowError {
    /// Returns the process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            PrdflowError::Init(_) => exit_codes::INIT_FAILED,
            PrdflowError::Transport(_) => exit_codes::AGENT_ERROR,
            PrdflowError::Parse(_) => exit_codes::AGENT_ERROR,
            PrdflowError::Schema(_) => exit_codes::SCHEMA_INVALID,
            PrdflowError::SecurityPolicy(_) => exit_codes::TASK_FAILED,
            PrdflowError::DependencyUnsatisfiable(_) => exit_codes::TASK_BLOCKED,
            PrdflowError::TaskBlocked(_) => exit_codes::TASK_BLOCKED,
            PrdflowError::TaskFailed(_) => exit_codes::TASK_FAILED,
            PrdflowError::Configuration(_) => exit_codes::SCHEMA_INVALID,
            PrdflowError::Consistency(_) => exit_codes::INVALID_ARGS,
            PrdflowError::Network(_) => exit_codes::NETWORK_ERROR,
            PrdflowError::FileNotFound(_) => exit_codes::FILE_NOT_FOUND,
            PrdflowError::InvalidArgs(_) => exit_codes::INVALID_ARGS,
            PrdflowError::Unknown(_) => exit_codes::UNKNOWN,
        }
    }
}

/// Result type alias for prdflow operations.
pub type Result<T> = std::result::Result<T, PrdflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_error_has_correct_exit_code() {
        let err = PrdflowError::Init("conversion produced no output".to_string());
        assert_eq!(err.exit_code(), exit_codes::INIT_FAILED);
    }

    #[test]
    fn transport_and_parse_map_to_agent_error() {
        let err = PrdflowError::Transport("exit code 2".to_string());
        assert_eq!(err.exit_code(), exit_codes::AGENT_ERROR);

        let err = PrdflowError::Parse("no JSON object found".to_string());
        assert_eq!(err.exit_code(), exit_codes::AGENT_ERROR);
    }

    #[test]
    fn schema_and_configuration_map_to_schema_invalid() {
        let err = PrdflowError::Schema("missing field 'userStories'".to_string());
        assert_eq!(err.exit_code(), exit_codes::SCHEMA_INVALID);

        let err = PrdflowError::Configuration("unknown tool 'codegen'".to_string());
        assert_eq!(err.exit_code(), exit_codes::SCHEMA_INVALID);
    }

    #[test]
    fn blocked_variants_map_to_task_blocked() {
        let err = PrdflowError::DependencyUnsatisfiable("US-2 waits on US-9".to_string());
        assert_eq!(err.exit_code(), exit_codes::TASK_BLOCKED);

        let err = PrdflowError::TaskBlocked("US-2 reported blocked".to_string());
        assert_eq!(err.exit_code(), exit_codes::TASK_BLOCKED);
    }

    #[test]
    fn consistency_maps_to_invalid_args() {
        let err = PrdflowError::Consistency("template set mismatch".to_string());
        assert_eq!(err.exit_code(), exit_codes::INVALID_ARGS);
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = PrdflowError::Network("getaddrinfo ENOTFOUND api.example.com".to_string());
        assert_eq!(
            err.to_string(),
            "Network error: getaddrinfo ENOTFOUND api.example.com"
        );

        let err = PrdflowError::SecurityPolicy("security check reported failure".to_string());
        assert_eq!(
            err.to_string(),
            "Security policy violation: security check reported failure"
        );
    }
}
