//! Job tracking and paragraph workflow engine for the Opus Blocks console.
//!
//! The backend runs fact extraction, paragraph generation, verification and
//! sentence regeneration as asynchronous jobs. This crate submits those jobs,
//! polls them to completion, and reloads whatever the finished job changed.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use opus_client::OpusClient;
//! use opus_console::{PollerConfig, Session, WorkflowOrchestrator};
//!
//! let backend = Arc::new(OpusClient::new("http://localhost:8000/api/v1"));
//! let console = WorkflowOrchestrator::start(backend, Session::default(), PollerConfig::default());
//!
//! console.open_paragraph("P123").await?;
//! let job_id = console.generate_paragraph().await?;
//! let job = console.wait_for_job(&job_id).await?;
//! println!("{} {}", job.job_type, job.status);
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod poller;
pub mod projection;
pub mod session;
pub mod terminal;
pub mod testing;
pub mod workflow;

pub use backend::{ConsoleBackend, JobStatusSource, Submission};
pub use config::ConsoleConfig;
pub use error::{ConsoleError, Result};
pub use poller::{JobPoller, PollEvent, PollState, PollerConfig, DEFAULT_POLL_INTERVAL};
pub use projection::{linked_facts, project, ParagraphProjection, StatusBand};
pub use session::{Session, SessionStore};
pub use terminal::{is_terminal, is_terminal_str, should_poll};
pub use workflow::{plan_refresh, JobFailure, LastJobIds, Refresh, WorkflowOrchestrator, Workspace};
