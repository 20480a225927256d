//! Typed errors for the console engine.
//!
//! A job that finishes as FAILED is not an error here; it is a normal
//! terminal outcome surfaced as a [`JobFailure`](crate::workflow::JobFailure).

use std::path::PathBuf;

use opus_client::{JobId, OpusError};
use thiserror::Error;

/// Errors returned by poller and orchestrator operations.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// A required input was missing. No request was made.
    #[error("{0}")]
    Validation(String),

    /// The backend accepted a submission but the response broke the contract
    /// (e.g. no job id).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The request never produced a usable response.
    #[error(transparent)]
    Transport(#[from] OpusError),

    /// Another workflow job already targets this paragraph.
    #[error("a job is already in flight for paragraph {paragraph_id}")]
    JobInFlight {
        paragraph_id: String,
        job_id: Option<JobId>,
    },

    /// A status check failed while tracking a job; polling stopped.
    #[error("status check for job {job_id} failed: {message}")]
    PollFailed { job_id: JobId, message: String },

    /// Polling moved on (new target, stop, reset) before the job finished.
    #[error("stopped tracking job {0} before it finished")]
    Abandoned(JobId),

    /// Retry was requested but no failed job is on record.
    #[error("no failed job to retry")]
    NothingToRetry,

    /// The console was torn down.
    #[error("console has shut down")]
    ShutDown,

    /// Session file could not be read or written.
    #[error("session file {}: {source}", path.display())]
    SessionIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Session file exists but does not parse.
    #[error("session file is corrupt: {0}")]
    SessionFormat(#[from] serde_json::Error),
}

impl ConsoleError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Errors raised before anything was sent to the backend.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::JobInFlight { .. })
    }
}

/// Result type alias for console operations.
pub type Result<T> = std::result::Result<T, ConsoleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_shown_verbatim() {
        let err = ConsoleError::validation("Paragraph ID is required.");
        assert_eq!(err.to_string(), "Paragraph ID is required.");
        assert!(err.is_validation());
    }

    #[test]
    fn transport_error_is_transparent() {
        let err = ConsoleError::from(OpusError::Api {
            status: 404,
            message: "Job not found".into(),
        });
        assert_eq!(err.to_string(), "Job not found");
        assert!(!err.is_validation());
    }
}
