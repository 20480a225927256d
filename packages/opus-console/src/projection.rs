//! Read-only projection of a paragraph for display.
//!
//! Everything here is pure and recomputed on every read.

use std::collections::HashSet;

use opus_client::{Fact, Job, JobStatus, ParagraphStatus, ParagraphView, Sentence, UNCITED_CLAIM};
use serde::Serialize;

/// Coarse visual grouping of paragraph statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusBand {
    Good,
    InProgress,
    Attention,
}

impl StatusBand {
    pub fn label(&self) -> &'static str {
        match self {
            StatusBand::Good => "good",
            StatusBand::InProgress => "in-progress",
            StatusBand::Attention => "attention",
        }
    }
}

/// What the console shows about a paragraph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParagraphProjection {
    pub band: StatusBand,
    pub missing_evidence: bool,
    /// Latest job, kept only when it targets this paragraph.
    pub job: Option<Job>,
    /// The shown job failed and can be resubmitted.
    pub retryable: bool,
}

pub fn band_for(status: &ParagraphStatus) -> StatusBand {
    match status {
        ParagraphStatus::Verified => StatusBand::Good,
        ParagraphStatus::Generating | ParagraphStatus::PendingVerify => StatusBand::InProgress,
        _ => StatusBand::Attention,
    }
}

/// Any sentence the verifier flagged as an uncited claim.
pub fn missing_evidence(sentences: &[Sentence]) -> bool {
    sentences.iter().any(|s| s.has_failure_mode(UNCITED_CLAIM))
}

pub fn project(view: &ParagraphView, latest_job: Option<&Job>) -> ParagraphProjection {
    let job = latest_job
        .filter(|job| job.job_type.targets_paragraph() && job.target_id == view.paragraph.id)
        .cloned();
    let retryable = job
        .as_ref()
        .is_some_and(|job| job.status == JobStatus::Failed);

    ParagraphProjection {
        band: band_for(&view.paragraph.status),
        missing_evidence: missing_evidence(&view.sentences),
        job,
        retryable,
    }
}

/// Facts cited by at least one sentence, in view order.
pub fn linked_facts(view: &ParagraphView) -> Vec<&Fact> {
    let cited: HashSet<&str> = view.links.iter().map(|l| l.fact_id.as_str()).collect();
    view.facts
        .iter()
        .filter(|fact| cited.contains(fact.id.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{cite, sample_fact, sample_job, sample_sentence, sample_view};
    use opus_client::JobType;

    fn flagged(id: &str) -> Sentence {
        let mut sentence = sample_sentence(id, "P1", 1, "Rates doubled.");
        sentence.supported = false;
        sentence.verifier_failure_modes = vec![UNCITED_CLAIM.to_string()];
        sentence
    }

    #[test]
    fn bands() {
        assert_eq!(band_for(&ParagraphStatus::Verified), StatusBand::Good);
        assert_eq!(band_for(&ParagraphStatus::Generating), StatusBand::InProgress);
        assert_eq!(band_for(&ParagraphStatus::PendingVerify), StatusBand::InProgress);
        assert_eq!(band_for(&ParagraphStatus::Draft), StatusBand::Attention);
        assert_eq!(band_for(&ParagraphStatus::NeedsRevision), StatusBand::Attention);
        assert_eq!(band_for(&ParagraphStatus::Failed), StatusBand::Attention);
        assert_eq!(band_for(&ParagraphStatus::Unknown("ARCHIVED".into())), StatusBand::Attention);
    }

    #[test]
    fn one_uncited_sentence_is_missing_evidence() {
        let view = sample_view(
            "P1",
            ParagraphStatus::NeedsRevision,
            vec![sample_sentence("S1", "P1", 0, "Fine."), flagged("S2")],
        );
        assert!(project(&view, None).missing_evidence);
    }

    #[test]
    fn no_uncited_sentence_is_not_missing_evidence() {
        let mut other = sample_sentence("S2", "P1", 1, "Hedged.");
        other.verifier_failure_modes = vec!["OVERSTATED_CERTAINTY".into()];
        let view = sample_view(
            "P1",
            ParagraphStatus::Verified,
            vec![sample_sentence("S1", "P1", 0, "Fine."), other],
        );
        let projection = project(&view, None);
        assert!(!projection.missing_evidence);
        assert_eq!(projection.band, StatusBand::Good);
    }

    #[test]
    fn job_for_other_paragraph_is_hidden() {
        let view = sample_view("P1", ParagraphStatus::Draft, vec![]);
        let job = sample_job("j", JobType::GenerateParagraph, "P2", JobStatus::Failed, None);

        let projection = project(&view, Some(&job));
        assert!(projection.job.is_none());
        assert!(!projection.retryable);
    }

    #[test]
    fn extract_job_never_attaches_to_paragraph() {
        let view = sample_view("P1", ParagraphStatus::Draft, vec![]);
        let job = sample_job("j", JobType::ExtractFacts, "P1", JobStatus::Failed, None);
        assert!(project(&view, Some(&job)).job.is_none());
    }

    #[test]
    fn failed_job_for_paragraph_is_retryable() {
        let view = sample_view("P1", ParagraphStatus::Failed, vec![]);
        let job = sample_job(
            "j",
            JobType::VerifyParagraph,
            "P1",
            JobStatus::Failed,
            Some("timeout".into()),
        );

        let projection = project(&view, Some(&job));
        assert_eq!(projection.job.as_ref().map(|j| j.id.as_str()), Some("j"));
        assert!(projection.retryable);
    }

    #[test]
    fn linked_facts_keeps_view_order() {
        let view = sample_view("P1", ParagraphStatus::Verified, vec![]);
        let view = cite(view, "S1", sample_fact("F2", "second"));
        let mut view = cite(view, "S1", sample_fact("F1", "first"));
        view.facts.push(sample_fact("F3", "uncited"));

        let ids: Vec<&str> = linked_facts(&view).iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["F2", "F1"]);
    }
}
