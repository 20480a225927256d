use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque job identifier assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap a raw id, trimming surrounding whitespace. Blank ids yield `None`.
    pub fn parse(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Kind of backend work a job performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    ExtractFacts,
    GenerateParagraph,
    VerifyParagraph,
    RegenerateSentences,
    /// A job type this client does not know about.
    Unknown(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::ExtractFacts => "EXTRACT_FACTS",
            JobType::GenerateParagraph => "GENERATE_PARAGRAPH",
            JobType::VerifyParagraph => "VERIFY_PARAGRAPH",
            JobType::RegenerateSentences => "REGENERATE_SENTENCES",
            JobType::Unknown(raw) => raw,
        }
    }

    /// Whether jobs of this type operate on a paragraph.
    pub fn targets_paragraph(&self) -> bool {
        matches!(
            self,
            JobType::GenerateParagraph | JobType::VerifyParagraph | JobType::RegenerateSentences
        )
    }
}

impl From<String> for JobType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "EXTRACT_FACTS" => JobType::ExtractFacts,
            "GENERATE_PARAGRAPH" => JobType::GenerateParagraph,
            "VERIFY_PARAGRAPH" => JobType::VerifyParagraph,
            "REGENERATE_SENTENCES" => JobType::RegenerateSentences,
            _ => JobType::Unknown(raw),
        }
    }
}

impl From<JobType> for String {
    fn from(value: JobType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    /// Accepted but not started. The backend spells this `QUEUED`.
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// A status string outside the known vocabulary.
    Unknown(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Unknown(raw) => raw,
        }
    }

    /// Terminal statuses never change on later queries.
    ///
    /// Unknown statuses are treated as non-terminal so that polling keeps
    /// going instead of stopping early on a vocabulary change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "PENDING" | "QUEUED" => JobStatus::Pending,
            "RUNNING" => JobStatus::Running,
            "SUCCEEDED" => JobStatus::Succeeded,
            "FAILED" => JobStatus::Failed,
            "CANCELLED" => JobStatus::Cancelled,
            _ => JobStatus::Unknown(raw),
        }
    }
}

impl From<&str> for JobStatus {
    fn from(raw: &str) -> Self {
        JobStatus::from(raw.to_string())
    }
}

impl From<JobStatus> for String {
    fn from(value: JobStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paragraph lifecycle state. Only job completion moves it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParagraphStatus {
    /// Freshly created. The backend spells this `CREATED`.
    Draft,
    Generating,
    PendingVerify,
    Verified,
    NeedsRevision,
    /// Generation or verification failed. Also `FAILED_GENERATION`.
    Failed,
    Unknown(String),
}

impl ParagraphStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ParagraphStatus::Draft => "DRAFT",
            ParagraphStatus::Generating => "GENERATING",
            ParagraphStatus::PendingVerify => "PENDING_VERIFY",
            ParagraphStatus::Verified => "VERIFIED",
            ParagraphStatus::NeedsRevision => "NEEDS_REVISION",
            ParagraphStatus::Failed => "FAILED",
            ParagraphStatus::Unknown(raw) => raw,
        }
    }
}

impl From<String> for ParagraphStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "DRAFT" | "CREATED" => ParagraphStatus::Draft,
            "GENERATING" => ParagraphStatus::Generating,
            "PENDING_VERIFY" => ParagraphStatus::PendingVerify,
            "VERIFIED" => ParagraphStatus::Verified,
            "NEEDS_REVISION" => ParagraphStatus::NeedsRevision,
            "FAILED" | "FAILED_GENERATION" => ParagraphStatus::Failed,
            _ => ParagraphStatus::Unknown(raw),
        }
    }
}

impl From<ParagraphStatus> for String {
    fn from(value: ParagraphStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ParagraphStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// One asynchronous unit of backend work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub job_type: JobType,
    pub target_id: String,
    pub status: JobStatus,
    /// Advisory progress payload. Never used for control flow.
    #[serde(default)]
    pub progress: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Response of a job submission endpoint.
///
/// The id is optional on purpose: a response without one is a protocol
/// violation that callers must detect, not a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubmitReceipt {
    #[serde(default)]
    pub id: Option<JobId>,
    #[serde(default)]
    pub job_type: Option<JobType>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: String,
    #[serde(default)]
    pub manuscript_id: Option<String>,
    pub section: String,
    pub intent: String,
    #[serde(default)]
    pub spec_json: serde_json::Value,
    #[serde(default)]
    pub allowed_fact_ids: Vec<String>,
    pub status: ParagraphStatus,
    #[serde(default)]
    pub latest_run_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Verifier tag for a factual assertion with no supporting citation.
pub const UNCITED_CLAIM: &str = "UNCITED_CLAIM";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub id: String,
    pub paragraph_id: String,
    pub order: i32,
    pub sentence_type: String,
    pub text: String,
    #[serde(default)]
    pub is_user_edited: bool,
    #[serde(default)]
    pub supported: bool,
    #[serde(default)]
    pub verifier_failure_modes: Vec<String>,
    #[serde(default)]
    pub verifier_explanation: Option<String>,
}

impl Sentence {
    pub fn has_failure_mode(&self, mode: &str) -> bool {
        self.verifier_failure_modes.iter().any(|m| m == mode)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceFactLink {
    pub sentence_id: String,
    pub fact_id: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    pub source_type: String,
    pub content: String,
    #[serde(default)]
    pub qualifiers: serde_json::Value,
    pub confidence: f64,
    #[serde(default)]
    pub is_uncertain: bool,
    pub created_by: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Paragraph with its sentences, citation links and the facts they cite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphView {
    pub paragraph: Paragraph,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
    #[serde(default)]
    pub links: Vec<SentenceFactLink>,
    #[serde(default)]
    pub facts: Vec<Fact>,
}

/// One recorded LLM run (writer, verifier, extractor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub paragraph_id: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    pub run_type: String,
    pub provider: String,
    pub model: String,
    pub prompt_version: String,
    #[serde(default)]
    pub token_prompt: Option<i64>,
    #[serde(default)]
    pub token_completion: Option<i64>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub latency_ms: Option<i64>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Request body for a sentence text update.
#[derive(Debug, Clone, Serialize)]
pub struct SentenceUpdate {
    pub text: String,
}
