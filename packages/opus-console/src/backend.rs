//! The seam between the console engine and the Opus Blocks backend.
//!
//! The poller only needs [`JobStatusSource`]; the orchestrator needs the full
//! [`ConsoleBackend`]. [`OpusClient`] implements both over HTTP and
//! [`MockBackend`](crate::testing::MockBackend) implements both in memory.

use async_trait::async_trait;
use opus_client::{
    Fact, Job, JobId, JobType, OpusClient, ParagraphView, Result, Run, SubmitReceipt,
};
use serde::{Deserialize, Serialize};

/// Anything that can report the current status of a job.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn fetch_job(&self, job_id: &JobId) -> Result<Job>;
}

/// Everything the workflow orchestrator asks of the backend.
#[async_trait]
pub trait ConsoleBackend: JobStatusSource {
    /// Submit a workflow step. The receipt may lack an id; callers check.
    async fn submit(&self, submission: &Submission) -> Result<SubmitReceipt>;

    async fn fetch_paragraph_view(&self, paragraph_id: &str) -> Result<ParagraphView>;

    async fn fetch_facts(&self, document_id: &str) -> Result<Vec<Fact>>;

    async fn fetch_runs(&self, paragraph_id: &str) -> Result<Vec<Run>>;
}

/// A workflow step as submitted, kept so a failed job can be resubmitted
/// with exactly the same inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submission {
    ExtractFacts {
        document_id: String,
    },
    GenerateParagraph {
        paragraph_id: String,
    },
    VerifyParagraph {
        paragraph_id: String,
    },
    EditSentence {
        paragraph_id: String,
        sentence_id: String,
        text: String,
    },
}

impl Submission {
    /// Job type this step is expected to produce.
    pub fn job_type(&self) -> JobType {
        match self {
            Submission::ExtractFacts { .. } => JobType::ExtractFacts,
            Submission::GenerateParagraph { .. } => JobType::GenerateParagraph,
            Submission::VerifyParagraph { .. } => JobType::VerifyParagraph,
            Submission::EditSentence { .. } => JobType::RegenerateSentences,
        }
    }

    /// Paragraph the step works on, if any.
    pub fn paragraph_id(&self) -> Option<&str> {
        match self {
            Submission::ExtractFacts { .. } => None,
            Submission::GenerateParagraph { paragraph_id }
            | Submission::VerifyParagraph { paragraph_id }
            | Submission::EditSentence { paragraph_id, .. } => Some(paragraph_id),
        }
    }

    /// Human label used in status lines and protocol errors.
    pub fn label(&self) -> &'static str {
        match self {
            Submission::ExtractFacts { .. } => "Extract facts",
            Submission::GenerateParagraph { .. } => "Generate paragraph",
            Submission::VerifyParagraph { .. } => "Verify paragraph",
            Submission::EditSentence { .. } => "Edit sentence",
        }
    }

    /// Rebuild a submission from a job record alone.
    ///
    /// Sentence regeneration is not recoverable this way: the job targets the
    /// paragraph and carries neither the sentence nor its text.
    pub fn for_job(job: &Job) -> Option<Self> {
        let target = job.target_id.trim();
        if target.is_empty() {
            return None;
        }
        let target = target.to_string();
        match job.job_type {
            JobType::ExtractFacts => Some(Submission::ExtractFacts {
                document_id: target,
            }),
            JobType::GenerateParagraph => Some(Submission::GenerateParagraph {
                paragraph_id: target,
            }),
            JobType::VerifyParagraph => Some(Submission::VerifyParagraph {
                paragraph_id: target,
            }),
            JobType::RegenerateSentences | JobType::Unknown(_) => None,
        }
    }
}

#[async_trait]
impl JobStatusSource for OpusClient {
    async fn fetch_job(&self, job_id: &JobId) -> Result<Job> {
        self.get_job(job_id).await
    }
}

#[async_trait]
impl ConsoleBackend for OpusClient {
    async fn submit(&self, submission: &Submission) -> Result<SubmitReceipt> {
        match submission {
            Submission::ExtractFacts { document_id } => self.extract_facts(document_id).await,
            Submission::GenerateParagraph { paragraph_id } => {
                self.generate_paragraph(paragraph_id).await
            }
            Submission::VerifyParagraph { paragraph_id } => {
                self.verify_paragraph(paragraph_id).await
            }
            Submission::EditSentence {
                sentence_id, text, ..
            } => self.update_sentence(sentence_id, text).await,
        }
    }

    async fn fetch_paragraph_view(&self, paragraph_id: &str) -> Result<ParagraphView> {
        self.get_paragraph_view(paragraph_id).await
    }

    async fn fetch_facts(&self, document_id: &str) -> Result<Vec<Fact>> {
        self.list_document_facts(document_id).await
    }

    async fn fetch_runs(&self, paragraph_id: &str) -> Result<Vec<Run>> {
        self.list_paragraph_runs(paragraph_id).await
    }
}
