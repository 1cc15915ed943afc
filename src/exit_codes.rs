//! Exit code constants for the prdflow CLI.
//!
//! These codes are part of the public contract so that wrapping automation
//! (CI jobs, shell loops over PRDs) can branch on the failure class:
//! - 0: Success
//! - 1: PRD conversion/initialization failed
//! - 2: Configuration or output-schema invalid
//! - 3: A subtask execution failed
//! - 4: A subtask reported blocked, or dependencies are unsatisfiable
//! - 5: Network failure reported by the agent process
//! - 6: Agent process error (launch failure, unusable output)
//! - 7: PRD file or state document not found
//! - 8: Invalid arguments or inconsistent resume request
//! - 99: Unclassified failure

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// PRD conversion or work-item initialization failed.
pub const INIT_FAILED: i32 = 1;

/// Template-set configuration or output schema is invalid.
pub const SCHEMA_INVALID: i32 = 2;

/// A subtask execution failed.
pub const TASK_FAILED: i32 = 3;

/// A subtask reported blocked or no eligible subtask remains.
pub const TASK_BLOCKED: i32 = 4;

/// The agent process reported a network failure.
pub const NETWORK_ERROR: i32 = 5;

/// The agent process failed to launch or produced no usable output.
pub const AGENT_ERROR: i32 = 6;

/// The PRD file or a required state document was not found.
pub const FILE_NOT_FOUND: i32 = 7;

/// Invalid command-line arguments or an inconsistent resume request.
pub const INVALID_ARGS: i32 = 8;

/// Unclassified failure.
pub const UNKNOWN: i32 = 99;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            INIT_FAILED,
            SCHEMA_INVALID,
            TASK_FAILED,
            TASK_BLOCKED,
            NETWORK_ERROR,
            AGENT_ERROR,
            FILE_NOT_FOUND,
            INVALID_ARGS,
            UNKNOWN,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(SUCCESS, 0);
        assert_eq!(INIT_FAILED, 1);
        assert_eq!(SCHEMA_INVALID, 2);
        assert_eq!(TASK_FAILED, 3);
        assert_eq!(TASK_BLOCKED, 4);
        assert_eq!(NETWORK_ERROR, 5);
        assert_eq!(AGENT_ERROR, 6);
        assert_eq!(FILE_NOT_FOUND, 7);
        assert_eq!(INVALID_ARGS, 8);
        assert_eq!(UNKNOWN, 99);
    }
}
