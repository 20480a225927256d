//! Testing utilities including an in-memory backend.
//!
//! [`MockBackend`] plays scripted job lifecycles without any network, so the
//! poller and orchestrator can be driven deterministically under
//! `#[tokio::test(start_paused = true)]`.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use opus_client::{
    Fact, Job, JobId, JobStatus, JobType, OpusError, Paragraph, ParagraphStatus, ParagraphView,
    Result, Run, Sentence, SentenceFactLink, SubmitReceipt,
};
use uuid::Uuid;

use crate::backend::{ConsoleBackend, JobStatusSource, Submission};

/// One scripted answer to a job status request.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Report the job in this status.
    Status(JobStatus),
    /// Report the job as FAILED with an optional error message.
    Failed(Option<String>),
    /// Fail the request itself.
    TransportError(String),
}

impl MockStep {
    pub fn status(status: JobStatus) -> Self {
        MockStep::Status(status)
    }

    pub fn failed(error: impl Into<String>) -> Self {
        MockStep::Failed(Some(error.into()))
    }

    pub fn failed_without_detail() -> Self {
        MockStep::Failed(None)
    }

    pub fn transport_error(message: impl Into<String>) -> Self {
        MockStep::TransportError(message.into())
    }
}

/// How the next submission should go wrong.
#[derive(Debug, Clone)]
pub enum MockSubmitFailure {
    /// The request fails at the transport level.
    Transport(String),
    /// The request succeeds but the receipt carries no job id.
    MissingId,
}

/// Record of a call made to the mock backend.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Submit(Submission),
    FetchJob(JobId),
    FetchParagraphView(String),
    FetchFacts(String),
    FetchRuns(String),
}

struct ScriptedJob {
    job_type: JobType,
    target_id: String,
    /// Popped one per fetch; the last step repeats.
    steps: VecDeque<MockStep>,
    latency: Duration,
}

/// A mock backend for testing.
#[derive(Default)]
pub struct MockBackend {
    jobs: Arc<RwLock<HashMap<JobId, ScriptedJob>>>,

    /// Scripts for jobs not yet submitted, keyed by job type and target.
    queued_scripts: Arc<RwLock<HashMap<(JobType, String), VecDeque<Vec<MockStep>>>>>,

    submit_failures: Arc<RwLock<VecDeque<MockSubmitFailure>>>,

    views: Arc<RwLock<HashMap<String, ParagraphView>>>,
    facts: Arc<RwLock<HashMap<String, Vec<Fact>>>>,
    runs: Arc<RwLock<HashMap<String, Vec<Run>>>>,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing job with a scripted status sequence.
    pub fn with_job(
        self,
        job_id: impl Into<String>,
        job_type: JobType,
        target_id: impl Into<String>,
        steps: Vec<MockStep>,
    ) -> Self {
        self.jobs.write().unwrap().insert(
            JobId::from(job_id.into()),
            ScriptedJob {
                job_type,
                target_id: target_id.into(),
                steps: steps.into(),
                latency: Duration::ZERO,
            },
        );
        self
    }

    /// Delay every status response for a registered job.
    pub fn with_latency(self, job_id: impl Into<String>, latency: Duration) -> Self {
        self.set_latency(job_id, latency);
        self
    }

    /// Script the lifecycle of the next job submitted for this type and
    /// target. Unscripted submissions succeed on the first check.
    pub fn with_script(
        self,
        job_type: JobType,
        target_id: impl Into<String>,
        steps: Vec<MockStep>,
    ) -> Self {
        self.queue_script(job_type, target_id, steps);
        self
    }

    pub fn with_submit_failure(self, failure: MockSubmitFailure) -> Self {
        self.submit_failures.write().unwrap().push_back(failure);
        self
    }

    pub fn with_paragraph_view(self, view: ParagraphView) -> Self {
        self.set_paragraph_view(view);
        self
    }

    pub fn with_facts(self, document_id: impl Into<String>, facts: Vec<Fact>) -> Self {
        self.set_facts(document_id, facts);
        self
    }

    pub fn with_runs(self, paragraph_id: impl Into<String>, runs: Vec<Run>) -> Self {
        self.runs.write().unwrap().insert(paragraph_id.into(), runs);
        self
    }

    pub fn queue_script(
        &self,
        job_type: JobType,
        target_id: impl Into<String>,
        steps: Vec<MockStep>,
    ) {
        self.queued_scripts
            .write()
            .unwrap()
            .entry((job_type, target_id.into()))
            .or_default()
            .push_back(steps);
    }

    pub fn set_latency(&self, job_id: impl Into<String>, latency: Duration) {
        if let Some(job) = self.jobs.write().unwrap().get_mut(&JobId::from(job_id.into())) {
            job.latency = latency;
        }
    }

    /// Replace the view returned for a paragraph.
    pub fn set_paragraph_view(&self, view: ParagraphView) {
        self.views
            .write()
            .unwrap()
            .insert(view.paragraph.id.clone(), view);
    }

    pub fn set_facts(&self, document_id: impl Into<String>, facts: Vec<Fact>) {
        self.facts.write().unwrap().insert(document_id.into(), facts);
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Submit(submission) => Some(submission),
                _ => None,
            })
            .collect()
    }

    pub fn fetch_count(&self, job_id: &str) -> usize {
        self.count(|call| matches!(call, MockCall::FetchJob(id) if id.as_str() == job_id))
    }

    pub fn view_fetch_count(&self, paragraph_id: &str) -> usize {
        self.count(|call| matches!(call, MockCall::FetchParagraphView(id) if id == paragraph_id))
    }

    pub fn facts_fetch_count(&self, document_id: &str) -> usize {
        self.count(|call| matches!(call, MockCall::FetchFacts(id) if id == document_id))
    }

    pub fn runs_fetch_count(&self, paragraph_id: &str) -> usize {
        self.count(|call| matches!(call, MockCall::FetchRuns(id) if id == paragraph_id))
    }

    /// Highest number of job status requests observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.read().unwrap().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: MockCall) {
        self.calls.write().unwrap().push(call);
    }

    /// Advance a job's script by one step.
    fn next_step(&self, job_id: &JobId) -> Option<(MockStep, JobType, String, Duration)> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(job_id)?;
        let step = if job.steps.len() > 1 {
            job.steps.pop_front()
        } else {
            job.steps.front().cloned()
        }
        .unwrap_or(MockStep::Status(JobStatus::Succeeded));
        Some((step, job.job_type.clone(), job.target_id.clone(), job.latency))
    }
}

#[async_trait]
impl JobStatusSource for MockBackend {
    async fn fetch_job(&self, job_id: &JobId) -> Result<Job> {
        self.record(MockCall::FetchJob(job_id.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let next = self.next_step(job_id);
        if let Some((_, _, _, latency)) = &next {
            if !latency.is_zero() {
                tokio::time::sleep(*latency).await;
            }
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let Some((step, job_type, target_id, _)) = next else {
            return Err(OpusError::Api {
                status: 404,
                message: "Job not found".into(),
            });
        };

        let (status, error) = match step {
            MockStep::Status(status) => (status, None),
            MockStep::Failed(error) => (JobStatus::Failed, error),
            MockStep::TransportError(message) => return Err(OpusError::Network(message)),
        };
        Ok(sample_job(job_id.as_str(), job_type, &target_id, status, error))
    }
}

#[async_trait]
impl ConsoleBackend for MockBackend {
    async fn submit(&self, submission: &Submission) -> Result<SubmitReceipt> {
        self.record(MockCall::Submit(submission.clone()));

        let failure = self.submit_failures.write().unwrap().pop_front();
        match failure {
            Some(MockSubmitFailure::Transport(message)) => return Err(OpusError::Network(message)),
            Some(MockSubmitFailure::MissingId) => {
                return Ok(SubmitReceipt {
                    status: Some(JobStatus::Pending),
                    ..Default::default()
                })
            }
            None => {}
        }

        let job_type = submission.job_type();
        let target_id = match submission {
            Submission::ExtractFacts { document_id } => document_id.clone(),
            other => other.paragraph_id().unwrap_or_default().to_string(),
        };
        let steps = self
            .queued_scripts
            .write()
            .unwrap()
            .get_mut(&(job_type.clone(), target_id.clone()))
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| vec![MockStep::Status(JobStatus::Succeeded)]);

        let job_id = JobId::from(Uuid::new_v4().to_string());
        self.jobs.write().unwrap().insert(
            job_id.clone(),
            ScriptedJob {
                job_type: job_type.clone(),
                target_id: target_id.clone(),
                steps: steps.into(),
                latency: Duration::ZERO,
            },
        );

        Ok(SubmitReceipt {
            id: Some(job_id),
            job_type: Some(job_type),
            target_id: Some(target_id),
            status: Some(JobStatus::Pending),
        })
    }

    async fn fetch_paragraph_view(&self, paragraph_id: &str) -> Result<ParagraphView> {
        self.record(MockCall::FetchParagraphView(paragraph_id.to_string()));
        self.views
            .read()
            .unwrap()
            .get(paragraph_id)
            .cloned()
            .ok_or_else(|| OpusError::Api {
                status: 404,
                message: "Paragraph not found".into(),
            })
    }

    async fn fetch_facts(&self, document_id: &str) -> Result<Vec<Fact>> {
        self.record(MockCall::FetchFacts(document_id.to_string()));
        Ok(self
            .facts
            .read()
            .unwrap()
            .get(document_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_runs(&self, paragraph_id: &str) -> Result<Vec<Run>> {
        self.record(MockCall::FetchRuns(paragraph_id.to_string()));
        Ok(self
            .runs
            .read()
            .unwrap()
            .get(paragraph_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Sample records
// ============================================================================

pub fn sample_job(
    job_id: &str,
    job_type: JobType,
    target_id: &str,
    status: JobStatus,
    error: Option<String>,
) -> Job {
    Job {
        id: JobId::from(job_id),
        owner_id: None,
        job_type,
        target_id: target_id.to_string(),
        status,
        progress: serde_json::Value::Null,
        error,
        trace_id: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn sample_sentence(id: &str, paragraph_id: &str, order: i32, text: &str) -> Sentence {
    Sentence {
        id: id.to_string(),
        paragraph_id: paragraph_id.to_string(),
        order,
        sentence_type: "claim".to_string(),
        text: text.to_string(),
        is_user_edited: false,
        supported: true,
        verifier_failure_modes: Vec::new(),
        verifier_explanation: None,
    }
}

pub fn sample_fact(id: &str, content: &str) -> Fact {
    Fact {
        id: id.to_string(),
        owner_id: None,
        document_id: None,
        span_id: None,
        source_type: "DOCUMENT".to_string(),
        content: content.to_string(),
        qualifiers: serde_json::Value::Null,
        confidence: 0.9,
        is_uncertain: false,
        created_by: "EXTRACTOR".to_string(),
        created_at: None,
    }
}

pub fn sample_run(id: &str, paragraph_id: &str, run_type: &str) -> Run {
    Run {
        id: id.to_string(),
        paragraph_id: Some(paragraph_id.to_string()),
        document_id: None,
        run_type: run_type.to_string(),
        provider: "openai".to_string(),
        model: "gpt-4o-mini".to_string(),
        prompt_version: "v1".to_string(),
        token_prompt: None,
        token_completion: None,
        cost_usd: None,
        latency_ms: None,
        trace_id: None,
        created_at: None,
    }
}

/// A paragraph view with the given sentences and no citation links.
pub fn sample_view(
    paragraph_id: &str,
    status: ParagraphStatus,
    sentences: Vec<Sentence>,
) -> ParagraphView {
    ParagraphView {
        paragraph: Paragraph {
            id: paragraph_id.to_string(),
            manuscript_id: None,
            section: "Introduction".to_string(),
            intent: "Background".to_string(),
            spec_json: serde_json::Value::Null,
            allowed_fact_ids: Vec::new(),
            status,
            latest_run_id: None,
            created_at: None,
            updated_at: None,
        },
        sentences,
        links: Vec::new(),
        facts: Vec::new(),
    }
}

/// Attach a citation from a sentence to a fact, adding the fact to the view.
pub fn cite(mut view: ParagraphView, sentence_id: &str, fact: Fact) -> ParagraphView {
    view.links.push(SentenceFactLink {
        sentence_id: sentence_id.to_string(),
        fact_id: fact.id.clone(),
        score: Some(1.0),
    });
    if !view.facts.iter().any(|f| f.id == fact.id) {
        view.facts.push(fact);
    }
    view
}
