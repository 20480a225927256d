//! Terminal-status classification.
//!
//! Unrecognised statuses are never terminal: polling keeps going rather than
//! stopping on a status word this build does not know.

use opus_client::JobStatus;

/// Whether a job in this status will never change again.
pub fn is_terminal(status: &JobStatus) -> bool {
    status.is_terminal()
}

/// Classify a raw backend status string.
pub fn is_terminal_str(raw: &str) -> bool {
    JobStatus::from(raw).is_terminal()
}

/// Whether a job in this status still needs polling.
pub fn should_poll(status: &JobStatus) -> bool {
    !is_terminal(status)
}
