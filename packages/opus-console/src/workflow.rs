//! Workflow orchestrator.
//!
//! Submits pipeline steps, hands the returned job to the [`JobPoller`], and
//! when the job finishes decides what to reload based on the job's type,
//! its target, and what the session currently displays.
//!
//! # Architecture
//!
//! ```text
//! generate_paragraph() ──► backend.submit ──► poller.start_polling(job)
//!                                                   │
//!                         PollEvent::Terminal(job) ◄┘
//!                                   │
//!                     plan_refresh(job, session)
//!                       ├─► Facts      ──► reload facts
//!                       ├─► Paragraph  ──► reload view + runs
//!                       └─► Nothing
//! ```

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use opus_client::{Fact, Job, JobId, JobStatus, JobType, OpusError, ParagraphView, Run};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{ConsoleBackend, Submission};
use crate::error::{ConsoleError, Result};
use crate::poller::{JobPoller, PollEvent, PollerConfig};
use crate::projection::{project, ParagraphProjection};
use crate::session::Session;

/// Shown when a job fails without saying why.
pub const FAILED_WITHOUT_DETAIL: &str = "Job failed without error detail.";

/// Most recent job id seen for each kind of step, tracked independently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastJobIds {
    pub extract: Option<JobId>,
    pub generate: Option<JobId>,
    pub verify: Option<JobId>,
    pub regenerate: Option<JobId>,
}

impl LastJobIds {
    pub fn record(&mut self, job_type: &JobType, job_id: JobId) {
        let slot = match job_type {
            JobType::ExtractFacts => &mut self.extract,
            JobType::GenerateParagraph => &mut self.generate,
            JobType::VerifyParagraph => &mut self.verify,
            JobType::RegenerateSentences => &mut self.regenerate,
            JobType::Unknown(_) => return,
        };
        *slot = Some(job_id);
    }

    pub fn get(&self, job_type: &JobType) -> Option<&JobId> {
        match job_type {
            JobType::ExtractFacts => self.extract.as_ref(),
            JobType::GenerateParagraph => self.generate.as_ref(),
            JobType::VerifyParagraph => self.verify.as_ref(),
            JobType::RegenerateSentences => self.regenerate.as_ref(),
            JobType::Unknown(_) => None,
        }
    }
}

/// A job that finished as FAILED, with what it would take to try again.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub job: Job,
    pub message: String,
    pub retry: Option<Submission>,
}

/// Everything the console displays, published through a watch channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub paragraph_view: Option<ParagraphView>,
    pub runs: Vec<Run>,
    pub facts: Vec<Fact>,
    pub last_jobs: LastJobIds,
    /// Status line.
    pub status: String,
    /// Error line.
    pub error: Option<String>,
    pub failure: Option<JobFailure>,
    /// Last terminal job whose follow-up work has completed.
    pub last_settled: Option<Job>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            paragraph_view: None,
            runs: Vec::new(),
            facts: Vec::new(),
            last_jobs: LastJobIds::default(),
            status: "Idle".to_string(),
            error: None,
            failure: None,
            last_settled: None,
            updated_at: Utc::now(),
        }
    }
}

/// What to reload after a job finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    Facts { document_id: String },
    Paragraph { paragraph_id: String },
    Nothing,
}

/// Decide the follow-up for a finished job.
///
/// Only successful jobs whose target is still on screen cause a reload.
pub fn plan_refresh(job: &Job, session: &Session) -> Refresh {
    if job.status != JobStatus::Succeeded {
        return Refresh::Nothing;
    }
    match &job.job_type {
        JobType::ExtractFacts if session.is_current_document(&job.target_id) => Refresh::Facts {
            document_id: job.target_id.clone(),
        },
        job_type
            if job_type.targets_paragraph() && session.is_current_paragraph(&job.target_id) =>
        {
            Refresh::Paragraph {
                paragraph_id: job.target_id.clone(),
            }
        }
        _ => Refresh::Nothing,
    }
}

/// Holds a paragraph while its submission request is in flight.
struct Reservation<'a> {
    held: &'a DashSet<String>,
    paragraph_id: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.held.remove(&self.paragraph_id);
    }
}

/// Drives the extract / generate / verify / edit workflow.
pub struct WorkflowOrchestrator<B: ConsoleBackend + ?Sized + 'static> {
    backend: Arc<B>,
    poller: JobPoller<B>,
    session: watch::Sender<Session>,
    workspace: watch::Sender<Workspace>,
    /// Submissions made by this process, by job id, for retry.
    submissions: DashMap<JobId, Submission>,
    /// Paragraphs with a submission request in flight.
    submitting: DashSet<String>,
    /// Terminal jobs whose follow-up work is done, until the next reset.
    settled: DashMap<JobId, Job>,
    shutdown: CancellationToken,
}

impl<B: ConsoleBackend + ?Sized + 'static> WorkflowOrchestrator<B> {
    /// Create the orchestrator and spawn its event loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(backend: Arc<B>, session: Session, config: PollerConfig) -> Arc<Self> {
        let (poller, events) = JobPoller::channel(Arc::clone(&backend), config);
        let (session, _) = watch::channel(session);
        let (workspace, _) = watch::channel(Workspace::default());

        let orchestrator = Arc::new(Self {
            backend,
            poller,
            session,
            workspace,
            submissions: DashMap::new(),
            submitting: DashSet::new(),
            settled: DashMap::new(),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(run_events(
            Arc::downgrade(&orchestrator),
            events,
            orchestrator.shutdown.clone(),
        ));
        orchestrator
    }

    // ------------------------------------------------------------------
    // Submissions
    // ------------------------------------------------------------------

    /// Queue fact extraction for the current document.
    pub async fn extract_facts(&self) -> Result<JobId> {
        let document_id = self.require_document()?;
        self.submit(Submission::ExtractFacts { document_id }).await
    }

    /// Queue generation of the current paragraph.
    pub async fn generate_paragraph(&self) -> Result<JobId> {
        let paragraph_id = self.require_paragraph()?;
        self.submit(Submission::GenerateParagraph { paragraph_id }).await
    }

    /// Queue verification of the current paragraph.
    pub async fn verify_paragraph(&self) -> Result<JobId> {
        let paragraph_id = self.require_paragraph()?;
        self.submit(Submission::VerifyParagraph { paragraph_id }).await
    }

    /// Replace a sentence's text in the current paragraph and track the
    /// job that re-checks it.
    pub async fn update_sentence(&self, sentence_id: &str, text: &str) -> Result<JobId> {
        let sentence_id = sentence_id.trim();
        if sentence_id.is_empty() {
            return Err(self.invalid("Sentence ID is required."));
        }
        if text.trim().is_empty() {
            return Err(self.invalid("Sentence text is required."));
        }
        let paragraph_id = self.require_paragraph()?;

        let job_id = self
            .submit(Submission::EditSentence {
                paragraph_id: paragraph_id.clone(),
                sentence_id: sentence_id.to_string(),
                text: text.to_string(),
            })
            .await?;

        // Show the edited text right away; the job refreshes it again later.
        let _ = self.reload_paragraph(&paragraph_id).await;
        Ok(job_id)
    }

    /// Resubmit the step behind the most recent failed job.
    pub async fn retry(&self) -> Result<JobId> {
        let submission = self
            .workspace
            .borrow()
            .failure
            .as_ref()
            .and_then(|failure| failure.retry.clone());
        let Some(submission) = submission else {
            return Err(self.invalid_with(ConsoleError::NothingToRetry));
        };
        info!(step = submission.label(), "retrying failed step");
        self.submit(submission).await
    }

    async fn submit(&self, submission: Submission) -> Result<JobId> {
        self.ensure_running()?;
        let label = submission.label();

        let _reservation = match submission.paragraph_id() {
            Some(paragraph_id) => Some(self.reserve(paragraph_id)?),
            None => None,
        };

        self.begin(format!("{label}: submitting..."));
        if matches!(submission, Submission::ExtractFacts { .. }) {
            self.update(|w| w.facts.clear());
        }
        let receipt = self
            .backend
            .submit(&submission)
            .await
            .map_err(|e| self.transport_failed(e))?;

        let Some(job_id) = receipt.id else {
            let err = ConsoleError::Protocol(format!("{label} response missing id"));
            warn!(step = label, "submission response carried no job id");
            return Err(self.invalid_with(err));
        };

        self.submissions.insert(job_id.clone(), submission.clone());
        self.update(|w| {
            w.last_jobs.record(&submission.job_type(), job_id.clone());
            w.failure = None;
            w.status = format!("{label}: job {job_id} queued.");
        });
        info!(
            job_id = %job_id,
            job_type = %submission.job_type(),
            paragraph_id = submission.paragraph_id().unwrap_or_default(),
            "job submitted"
        );

        self.poller.start_polling(&job_id);
        Ok(job_id)
    }

    fn reserve(&self, paragraph_id: &str) -> Result<Reservation<'_>> {
        if let Some(job_id) = self.active_job_targeting(paragraph_id) {
            debug!(paragraph_id, job_id = %job_id, "paragraph busy");
            return Err(self.invalid_with(ConsoleError::JobInFlight {
                paragraph_id: paragraph_id.to_string(),
                job_id: Some(job_id),
            }));
        }
        if !self.submitting.insert(paragraph_id.to_string()) {
            return Err(self.invalid_with(ConsoleError::JobInFlight {
                paragraph_id: paragraph_id.to_string(),
                job_id: None,
            }));
        }
        Ok(Reservation {
            held: &self.submitting,
            paragraph_id: paragraph_id.to_string(),
        })
    }

    /// The actively polled job, if it works on this paragraph.
    fn active_job_targeting(&self, paragraph_id: &str) -> Option<JobId> {
        let active = self.poller.active_job_id()?;
        let targets = match self.submissions.get(&active) {
            Some(submission) => submission.paragraph_id() == Some(paragraph_id),
            None => self.poller.last_status().is_some_and(|job| {
                job.id == active
                    && job.job_type.targets_paragraph()
                    && job.target_id == paragraph_id
            }),
        };
        targets.then_some(active)
    }

    // ------------------------------------------------------------------
    // Terminal handling
    // ------------------------------------------------------------------

    /// React to a poller notification.
    pub async fn handle_event(&self, event: PollEvent) {
        match event {
            PollEvent::Terminal(job) => self.settle(job).await,
            PollEvent::FetchFailed { job_id, message } => {
                warn!(job_id = %job_id, error = %message, "stopped tracking job");
                self.update(|w| {
                    w.status = format!("Lost track of job {job_id}.");
                    w.error = Some(message);
                });
            }
        }
    }

    async fn settle(&self, job: Job) {
        let submitted = self.submissions.remove(&job.id).map(|(_, s)| s);
        let label = submitted
            .as_ref()
            .map(|s| s.label().to_string())
            .unwrap_or_else(|| job.job_type.to_string());
        self.update(|w| w.last_jobs.record(&job.job_type, job.id.clone()));

        match &job.status {
            JobStatus::Failed => {
                let message = job
                    .error
                    .clone()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| FAILED_WITHOUT_DETAIL.to_string());
                let retry = submitted.or_else(|| Submission::for_job(&job));
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    target_id = %job.target_id,
                    error = %message,
                    retryable = retry.is_some(),
                    "job failed"
                );
                self.update(|w| {
                    w.status = format!("{label} failed.");
                    w.error = Some(message.clone());
                    w.failure = Some(JobFailure {
                        job: job.clone(),
                        message,
                        retry,
                    });
                });
            }
            JobStatus::Cancelled => {
                self.update(|w| w.status = format!("{label} was cancelled."));
            }
            _ => {
                let session = self.session.borrow().clone();
                match plan_refresh(&job, &session) {
                    Refresh::Facts { document_id } => {
                        let _ = self.reload_facts(&document_id).await;
                    }
                    Refresh::Paragraph { paragraph_id } => {
                        let _ = self.reload_paragraph(&paragraph_id).await;
                        let _ = self.reload_runs(&paragraph_id).await;
                    }
                    Refresh::Nothing => {
                        debug!(
                            job_id = %job.id,
                            target_id = %job.target_id,
                            "finished job is not on screen"
                        );
                    }
                }
                self.update(|w| w.status = format!("{label} finished."));
            }
        }

        self.settled.insert(job.id.clone(), job.clone());
        self.update(|w| w.last_settled = Some(job));
    }

    /// Wait until `job_id` has finished and its follow-up work is done.
    ///
    /// Returns at once for a job that already settled since the last reset.
    pub async fn wait_for_job(&self, job_id: &JobId) -> Result<Job> {
        let mut workspace = self.workspace.subscribe();
        let mut poll = self.poller.subscribe();

        loop {
            drop(workspace.borrow_and_update());
            if let Some(job) = self.settled.get(job_id) {
                return Ok(job.value().clone());
            }

            let lost = {
                let state = poll.borrow_and_update();
                let reached_terminal = state
                    .last_status
                    .as_ref()
                    .is_some_and(|job| &job.id == job_id && job.is_terminal());
                if state.active_job_id.as_ref() != Some(job_id) && !reached_terminal {
                    Some(match &state.error {
                        Some(message) => ConsoleError::PollFailed {
                            job_id: job_id.clone(),
                            message: message.clone(),
                        },
                        None => ConsoleError::Abandoned(job_id.clone()),
                    })
                } else {
                    None
                }
            };
            if let Some(err) = lost {
                return Err(err);
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(ConsoleError::ShutDown),
                changed = workspace.changed() => changed.map_err(|_| ConsoleError::ShutDown)?,
                changed = poll.changed() => changed.map_err(|_| ConsoleError::ShutDown)?,
            }
        }
    }

    // ------------------------------------------------------------------
    // Navigation and manual refreshes
    // ------------------------------------------------------------------

    /// Display a paragraph and load its view and run history.
    pub async fn open_paragraph(&self, paragraph_id: &str) -> Result<ParagraphView> {
        let paragraph_id = paragraph_id.trim();
        if paragraph_id.is_empty() {
            return Err(self.invalid("Paragraph ID is required."));
        }
        self.ensure_running()?;

        let changed = !self.session.borrow().is_current_paragraph(paragraph_id);
        if changed {
            self.session
                .send_modify(|s| s.paragraph_id = Some(paragraph_id.to_string()));
            self.update(|w| {
                w.paragraph_view = None;
                w.runs.clear();
            });
        }

        self.begin(format!("Loading paragraph {paragraph_id}..."));
        let view = self.reload_paragraph(paragraph_id).await?;
        self.reload_runs(paragraph_id).await?;
        self.update(|w| w.status = format!("Paragraph {paragraph_id} loaded."));
        Ok(view)
    }

    /// Display a document. Its fact library starts empty until loaded.
    pub fn select_document(&self, document_id: &str) -> Result<()> {
        let document_id = document_id.trim();
        if document_id.is_empty() {
            return Err(self.invalid("Document ID is required."));
        }
        self.ensure_running()?;

        self.session
            .send_modify(|s| s.document_id = Some(document_id.to_string()));
        self.update(|w| {
            w.facts.clear();
            w.error = None;
            w.status = format!("Document {document_id} selected.");
        });
        Ok(())
    }

    /// Set the manuscript the session belongs to.
    pub fn select_manuscript(&self, manuscript_id: &str) -> Result<()> {
        let manuscript_id = manuscript_id.trim();
        if manuscript_id.is_empty() {
            return Err(self.invalid("Manuscript ID is required."));
        }
        self.session
            .send_modify(|s| s.manuscript_id = Some(manuscript_id.to_string()));
        Ok(())
    }

    pub async fn load_facts(&self) -> Result<Vec<Fact>> {
        let document_id = self.require_document()?;
        self.begin("Loading facts...");
        let facts = self.reload_facts(&document_id).await?;
        self.update(|w| w.status = format!("Loaded {} facts.", facts.len()));
        Ok(facts)
    }

    pub async fn refresh_paragraph(&self) -> Result<ParagraphView> {
        let paragraph_id = self.require_paragraph()?;
        self.begin("Loading paragraph...");
        let view = self.reload_paragraph(&paragraph_id).await?;
        self.update(|w| w.status = "Paragraph loaded.".to_string());
        Ok(view)
    }

    pub async fn refresh_runs(&self) -> Result<Vec<Run>> {
        let paragraph_id = self.require_paragraph()?;
        self.begin("Loading runs...");
        let runs = self.reload_runs(&paragraph_id).await?;
        self.update(|w| w.status = format!("Loaded {} runs.", runs.len()));
        Ok(runs)
    }

    /// Look up a job once. A terminal result is handled like a polled one.
    pub async fn check_job(&self, job_id: &str) -> Result<Job> {
        self.ensure_running()?;
        self.begin("Checking job...");
        let job = self.poller.fetch_once(job_id).await.map_err(|e| self.invalid_with(e))?;
        self.update(|w| w.status = format!("Job {} is {}.", job.id, job.status));
        Ok(job)
    }

    /// Forget everything on screen and stop tracking jobs.
    pub fn reset(&self) {
        self.poller.stop_polling();
        self.poller.clear_status();
        self.submissions.clear();
        self.settled.clear();
        self.session.send_replace(Session::default());
        self.update(|w| {
            *w = Workspace {
                status: "Reset.".to_string(),
                ..Workspace::default()
            }
        });
        info!("console reset");
    }

    /// Stop the event loop and the poller. Returns the session to persist.
    pub fn shutdown(&self) -> Session {
        self.shutdown.cancel();
        self.poller.shutdown();
        self.session.borrow().clone()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }

    pub fn workspace(&self) -> Workspace {
        self.workspace.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Workspace> {
        self.workspace.subscribe()
    }

    pub fn poller(&self) -> &JobPoller<B> {
        &self.poller
    }

    /// Projection of the displayed paragraph against the latest job status.
    pub fn projection(&self) -> Option<ParagraphProjection> {
        let latest = self.poller.last_status();
        let workspace = self.workspace.borrow();
        let view = workspace.paragraph_view.as_ref()?;
        Some(project(view, latest.as_ref()))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn reload_facts(&self, document_id: &str) -> Result<Vec<Fact>> {
        let facts = self
            .backend
            .fetch_facts(document_id)
            .await
            .map_err(|e| self.transport_failed(e))?;
        if self.session.borrow().is_current_document(document_id) {
            self.update(|w| w.facts = facts.clone());
        } else {
            debug!(document_id, "document changed while loading facts");
        }
        Ok(facts)
    }

    async fn reload_paragraph(&self, paragraph_id: &str) -> Result<ParagraphView> {
        let view = self
            .backend
            .fetch_paragraph_view(paragraph_id)
            .await
            .map_err(|e| self.transport_failed(e))?;
        if self.session.borrow().is_current_paragraph(paragraph_id) {
            self.update(|w| w.paragraph_view = Some(view.clone()));
        } else {
            debug!(paragraph_id, "paragraph changed while loading view");
        }
        Ok(view)
    }

    async fn reload_runs(&self, paragraph_id: &str) -> Result<Vec<Run>> {
        let runs = self
            .backend
            .fetch_runs(paragraph_id)
            .await
            .map_err(|e| self.transport_failed(e))?;
        if self.session.borrow().is_current_paragraph(paragraph_id) {
            self.update(|w| w.runs = runs.clone());
        }
        Ok(runs)
    }

    fn require_document(&self) -> Result<String> {
        let document_id = self.session.borrow().document_id.clone();
        match document_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => Ok(id),
            None => Err(self.invalid("Document ID is required.")),
        }
    }

    fn require_paragraph(&self) -> Result<String> {
        let paragraph_id = self.session.borrow().paragraph_id.clone();
        match paragraph_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => Ok(id),
            None => Err(self.invalid("Paragraph ID is required.")),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            Err(ConsoleError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Start an operation: set the status line, clear the error line.
    fn begin(&self, status: impl Into<String>) {
        let status = status.into();
        self.update(|w| {
            w.status = status;
            w.error = None;
        });
    }

    fn invalid(&self, message: &str) -> ConsoleError {
        self.invalid_with(ConsoleError::validation(message))
    }

    /// Surface an error on the error line and hand it back.
    fn invalid_with(&self, err: ConsoleError) -> ConsoleError {
        let message = err.to_string();
        self.update(|w| {
            w.status = "Error".to_string();
            w.error = Some(message);
        });
        err
    }

    fn transport_failed(&self, err: OpusError) -> ConsoleError {
        warn!(error = %err, status = ?err.status(), "backend request failed");
        self.invalid_with(ConsoleError::Transport(err))
    }

    fn update(&self, apply: impl FnOnce(&mut Workspace)) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.workspace.send_modify(|w| {
            apply(w);
            w.updated_at = Utc::now();
        });
    }
}

async fn run_events<B: ConsoleBackend + ?Sized + 'static>(
    orchestrator: Weak<WorkflowOrchestrator<B>>,
    mut events: mpsc::UnboundedReceiver<PollEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(this) = orchestrator.upgrade() else {
            break;
        };
        this.handle_event(event).await;
    }
    debug!("workflow event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_job;

    fn session(document: Option<&str>, paragraph: Option<&str>) -> Session {
        Session {
            document_id: document.map(str::to_string),
            manuscript_id: None,
            paragraph_id: paragraph.map(str::to_string),
        }
    }

    #[test]
    fn extract_success_for_current_document_reloads_facts() {
        let job = sample_job("j", JobType::ExtractFacts, "D7", JobStatus::Succeeded, None);
        assert_eq!(
            plan_refresh(&job, &session(Some("D7"), Some("P1"))),
            Refresh::Facts {
                document_id: "D7".into()
            }
        );
    }

    #[test]
    fn paragraph_jobs_reload_current_paragraph() {
        for job_type in [
            JobType::GenerateParagraph,
            JobType::VerifyParagraph,
            JobType::RegenerateSentences,
        ] {
            let job = sample_job("j", job_type, "P1", JobStatus::Succeeded, None);
            assert_eq!(
                plan_refresh(&job, &session(None, Some("P1"))),
                Refresh::Paragraph {
                    paragraph_id: "P1".into()
                }
            );
        }
    }

    #[test]
    fn target_off_screen_reloads_nothing() {
        let job = sample_job("j", JobType::GenerateParagraph, "P1", JobStatus::Succeeded, None);
        assert_eq!(plan_refresh(&job, &session(None, Some("P2"))), Refresh::Nothing);

        let job = sample_job("j", JobType::ExtractFacts, "D1", JobStatus::Succeeded, None);
        assert_eq!(plan_refresh(&job, &session(Some("D2"), None)), Refresh::Nothing);
    }

    #[test]
    fn extract_job_never_reloads_a_paragraph_with_the_same_id() {
        let job = sample_job("j", JobType::ExtractFacts, "X", JobStatus::Succeeded, None);
        assert_eq!(plan_refresh(&job, &session(None, Some("X"))), Refresh::Nothing);
    }

    #[test]
    fn failed_and_cancelled_jobs_reload_nothing() {
        for status in [JobStatus::Failed, JobStatus::Cancelled] {
            let job = sample_job("j", JobType::VerifyParagraph, "P1", status, None);
            assert_eq!(plan_refresh(&job, &session(None, Some("P1"))), Refresh::Nothing);
        }
    }

    #[test]
    fn unknown_job_type_reloads_nothing() {
        let job = sample_job(
            "j",
            JobType::Unknown("REINDEX".into()),
            "P1",
            JobStatus::Succeeded,
            None,
        );
        assert_eq!(plan_refresh(&job, &session(Some("P1"), Some("P1"))), Refresh::Nothing);
    }

    #[test]
    fn last_job_ids_are_tracked_per_kind() {
        let mut last = LastJobIds::default();
        last.record(&JobType::GenerateParagraph, JobId::from("g1"));
        last.record(&JobType::VerifyParagraph, JobId::from("v1"));
        last.record(&JobType::GenerateParagraph, JobId::from("g2"));
        last.record(&JobType::Unknown("X".into()), JobId::from("x"));

        assert_eq!(last.get(&JobType::GenerateParagraph), Some(&JobId::from("g2")));
        assert_eq!(last.get(&JobType::VerifyParagraph), Some(&JobId::from("v1")));
        assert!(last.extract.is_none());
        assert!(last.regenerate.is_none());
    }
}
