//! End-to-end workflow scenarios against the scripted backend.

use std::sync::Arc;
use std::time::Duration;

use opus_client::{JobId, JobStatus, JobType, ParagraphStatus, UNCITED_CLAIM};
use opus_console::testing::{
    sample_fact, sample_run, sample_sentence, sample_view, MockBackend, MockCall, MockStep,
    MockSubmitFailure,
};
use opus_console::workflow::FAILED_WITHOUT_DETAIL;
use opus_console::{
    ConsoleError, PollerConfig, Session, StatusBand, Submission, WorkflowOrchestrator,
};

fn session(document: Option<&str>, paragraph: Option<&str>) -> Session {
    Session {
        document_id: document.map(str::to_string),
        manuscript_id: None,
        paragraph_id: paragraph.map(str::to_string),
    }
}

fn start(backend: &Arc<MockBackend>, session: Session) -> Arc<WorkflowOrchestrator<MockBackend>> {
    WorkflowOrchestrator::start(Arc::clone(backend), session, PollerConfig::default())
}

fn facts_fetches(backend: &MockBackend) -> usize {
    backend
        .calls()
        .iter()
        .filter(|call| matches!(call, MockCall::FetchFacts(_)))
        .count()
}

#[tokio::test(start_paused = true)]
async fn generate_success_reloads_view_and_runs_once() {
    let backend = Arc::new(
        MockBackend::new()
            .with_paragraph_view(sample_view("P123", ParagraphStatus::Draft, vec![]))
            .with_script(
                JobType::GenerateParagraph,
                "P123",
                vec![
                    MockStep::status(JobStatus::Running),
                    MockStep::status(JobStatus::Running),
                    MockStep::status(JobStatus::Succeeded),
                ],
            ),
    );
    let console = start(&backend, session(Some("D1"), Some("P123")));

    let job_id = console.generate_paragraph().await.unwrap();
    backend.set_paragraph_view(sample_view(
        "P123",
        ParagraphStatus::PendingVerify,
        vec![sample_sentence("S1", "P123", 0, "Generated.")],
    ));
    let job = console.wait_for_job(&job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(backend.fetch_count(job_id.as_str()), 3);
    assert_eq!(backend.view_fetch_count("P123"), 1);
    assert_eq!(backend.runs_fetch_count("P123"), 1);
    assert_eq!(facts_fetches(&backend), 0);

    let workspace = console.workspace();
    assert_eq!(
        workspace.paragraph_view.unwrap().paragraph.status,
        ParagraphStatus::PendingVerify
    );
    assert_eq!(workspace.last_jobs.generate, Some(job_id));
    assert!(workspace.error.is_none());
    assert!(!console.poller().is_polling());
}

#[tokio::test(start_paused = true)]
async fn extract_failure_surfaces_error_without_reload() {
    let backend = Arc::new(MockBackend::new().with_script(
        JobType::ExtractFacts,
        "D7",
        vec![
            MockStep::status(JobStatus::Pending),
            MockStep::failed("parse error"),
        ],
    ));
    let console = start(&backend, session(Some("D7"), None));

    let job_id = console.extract_facts().await.unwrap();
    let job = console.wait_for_job(&job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(!console.poller().is_polling());
    assert_eq!(backend.fetch_count(job_id.as_str()), 2);
    assert_eq!(facts_fetches(&backend), 0);

    let workspace = console.workspace();
    assert_eq!(workspace.error.as_deref(), Some("parse error"));
    let failure = workspace.failure.unwrap();
    assert_eq!(failure.message, "parse error");
    assert_eq!(
        failure.retry,
        Some(Submission::ExtractFacts {
            document_id: "D7".into()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn extract_success_reloads_facts_for_current_document() {
    let backend = Arc::new(
        MockBackend::new().with_facts("D7", vec![sample_fact("F1", "Rates doubled in 2020.")]),
    );
    let console = start(&backend, session(Some("D7"), Some("P1")));

    let job_id = console.extract_facts().await.unwrap();
    console.wait_for_job(&job_id).await.unwrap();

    assert_eq!(backend.facts_fetch_count("D7"), 1);
    assert_eq!(backend.view_fetch_count("P1"), 0);
    assert_eq!(console.workspace().facts.len(), 1);
    assert_eq!(console.workspace().last_jobs.extract, Some(job_id));
}

#[tokio::test(start_paused = true)]
async fn second_generate_is_rejected_while_polling() {
    let backend = Arc::new(MockBackend::new().with_script(
        JobType::GenerateParagraph,
        "P1",
        vec![MockStep::status(JobStatus::Running)],
    ));
    let console = start(&backend, session(None, Some("P1")));

    let first = console.generate_paragraph().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let err = console.generate_paragraph().await.unwrap_err();
    assert!(matches!(
        &err,
        ConsoleError::JobInFlight { paragraph_id, job_id: Some(job_id) }
            if paragraph_id == "P1" && job_id == &first
    ));
    assert!(matches!(
        console.verify_paragraph().await,
        Err(ConsoleError::JobInFlight { .. })
    ));
    assert!(matches!(
        console.update_sentence("S1", "Other text.").await,
        Err(ConsoleError::JobInFlight { .. })
    ));

    assert_eq!(backend.submissions().len(), 1);
    assert_eq!(console.poller().active_job_id(), Some(first));
    assert!(console.workspace().error.is_some());
}

#[tokio::test(start_paused = true)]
async fn other_paragraph_is_not_blocked() {
    let backend = Arc::new(
        MockBackend::new()
            .with_paragraph_view(sample_view("P2", ParagraphStatus::Draft, vec![]))
            .with_script(
                JobType::GenerateParagraph,
                "P1",
                vec![MockStep::status(JobStatus::Running)],
            ),
    );
    let console = start(&backend, session(None, Some("P1")));

    console.generate_paragraph().await.unwrap();
    console.open_paragraph("P2").await.unwrap();

    assert!(console.generate_paragraph().await.is_ok());
    assert_eq!(backend.submissions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn missing_inputs_are_rejected_without_network() {
    let backend = Arc::new(MockBackend::new());
    let console = start(&backend, Session::default());

    let err = console.generate_paragraph().await.unwrap_err();
    assert_eq!(err.to_string(), "Paragraph ID is required.");
    let err = console.extract_facts().await.unwrap_err();
    assert_eq!(err.to_string(), "Document ID is required.");
    assert!(console.verify_paragraph().await.unwrap_err().is_validation());
    assert!(console.open_paragraph("  ").await.unwrap_err().is_validation());
    assert!(console.select_document("").unwrap_err().is_validation());

    assert!(backend.calls().is_empty());
    assert_eq!(
        console.workspace().error.as_deref(),
        Some("Document ID is required.")
    );
}

#[tokio::test(start_paused = true)]
async fn sentence_edit_validates_inputs() {
    let backend = Arc::new(MockBackend::new());
    let console = start(&backend, session(None, Some("P1")));

    assert!(console.update_sentence(" ", "Text.").await.unwrap_err().is_validation());
    assert!(console.update_sentence("S1", "  ").await.unwrap_err().is_validation());
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn receipt_without_id_is_a_protocol_error() {
    let backend = Arc::new(MockBackend::new().with_submit_failure(MockSubmitFailure::MissingId));
    let console = start(&backend, session(None, Some("P1")));

    let err = console.generate_paragraph().await.unwrap_err();

    assert!(matches!(
        &err,
        ConsoleError::Protocol(message) if message == "Generate paragraph response missing id"
    ));
    assert!(!console.poller().is_polling());
    assert!(console.workspace().last_jobs.generate.is_none());
    assert_eq!(
        console.workspace().error.as_deref(),
        Some("protocol error: Generate paragraph response missing id")
    );
}

#[tokio::test(start_paused = true)]
async fn submit_transport_error_is_surfaced() {
    let backend = Arc::new(
        MockBackend::new()
            .with_submit_failure(MockSubmitFailure::Transport("connection refused".into())),
    );
    let console = start(&backend, session(None, Some("P1")));

    let err = console.verify_paragraph().await.unwrap_err();

    assert!(matches!(err, ConsoleError::Transport(_)));
    assert!(!console.poller().is_polling());
    assert!(console
        .workspace()
        .error
        .unwrap()
        .contains("connection refused"));

    // The paragraph is free again once the request has failed.
    assert!(console.verify_paragraph().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn poll_transport_error_stops_tracking() {
    let backend = Arc::new(MockBackend::new().with_script(
        JobType::VerifyParagraph,
        "P1",
        vec![
            MockStep::status(JobStatus::Running),
            MockStep::transport_error("connection reset"),
        ],
    ));
    let console = start(&backend, session(None, Some("P1")));

    let job_id = console.verify_paragraph().await.unwrap();
    let err = console.wait_for_job(&job_id).await.unwrap_err();

    assert!(matches!(err, ConsoleError::PollFailed { .. }));
    let workspace = console
        .subscribe()
        .wait_for(|w| w.error.is_some())
        .await
        .unwrap()
        .clone();
    assert!(workspace.error.unwrap().contains("connection reset"));
    assert!(!console.poller().is_polling());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(backend.fetch_count(job_id.as_str()), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_job_without_detail_uses_fallback_message() {
    let backend = Arc::new(MockBackend::new().with_script(
        JobType::GenerateParagraph,
        "P1",
        vec![MockStep::failed_without_detail()],
    ));
    let console = start(&backend, session(None, Some("P1")));

    let job_id = console.generate_paragraph().await.unwrap();
    console.wait_for_job(&job_id).await.unwrap();

    assert_eq!(console.workspace().error.as_deref(), Some(FAILED_WITHOUT_DETAIL));
    assert_eq!(backend.view_fetch_count("P1"), 0);
}

#[tokio::test(start_paused = true)]
async fn retry_resubmits_the_failed_step() {
    let backend = Arc::new(
        MockBackend::new()
            .with_paragraph_view(sample_view("P1", ParagraphStatus::Verified, vec![]))
            .with_script(
                JobType::VerifyParagraph,
                "P1",
                vec![MockStep::failed("verifier timeout")],
            )
            .with_script(
                JobType::VerifyParagraph,
                "P1",
                vec![MockStep::status(JobStatus::Succeeded)],
            ),
    );
    let console = start(&backend, session(None, Some("P1")));

    let first = console.verify_paragraph().await.unwrap();
    console.wait_for_job(&first).await.unwrap();
    assert!(console.workspace().failure.is_some());

    let second = console.retry().await.unwrap();
    assert_ne!(first, second);
    let job = console.wait_for_job(&second).await.unwrap();

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(
        backend.submissions(),
        vec![
            Submission::VerifyParagraph {
                paragraph_id: "P1".into()
            };
            2
        ]
    );
    let workspace = console.workspace();
    assert!(workspace.failure.is_none());
    assert!(workspace.error.is_none());
    assert_eq!(workspace.last_jobs.verify, Some(second));
}

#[tokio::test(start_paused = true)]
async fn retry_without_failure_is_rejected() {
    let backend = Arc::new(MockBackend::new());
    let console = start(&backend, session(None, Some("P1")));

    assert!(matches!(console.retry().await, Err(ConsoleError::NothingToRetry)));
    assert!(backend.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn looked_up_failure_derives_retry_from_job() {
    let backend = Arc::new(
        MockBackend::new()
            .with_job(
                "G1",
                JobType::GenerateParagraph,
                "P9",
                vec![MockStep::failed("no allowed facts")],
            )
            .with_job(
                "R1",
                JobType::RegenerateSentences,
                "P9",
                vec![MockStep::failed("bad edit")],
            ),
    );
    let console = start(&backend, session(None, Some("P1")));

    let job = console.check_job("G1").await.unwrap();
    console.wait_for_job(&job.id).await.unwrap();
    assert_eq!(
        console.workspace().failure.unwrap().retry,
        Some(Submission::GenerateParagraph {
            paragraph_id: "P9".into()
        })
    );

    let job = console.check_job(" R1 ").await.unwrap();
    console.wait_for_job(&job.id).await.unwrap();
    assert!(console.workspace().failure.unwrap().retry.is_none());
    assert!(matches!(console.retry().await, Err(ConsoleError::NothingToRetry)));
}

#[tokio::test(start_paused = true)]
async fn rechecked_settled_job_resolves_without_new_report() {
    let backend = Arc::new(MockBackend::new().with_job(
        "G1",
        JobType::GenerateParagraph,
        "P9",
        vec![MockStep::failed("no allowed facts")],
    ));
    let console = start(&backend, session(Some("D7"), None));

    console.check_job("G1").await.unwrap();
    console.wait_for_job(&JobId::from("G1")).await.unwrap();

    let extract = console.extract_facts().await.unwrap();
    console.wait_for_job(&extract).await.unwrap();
    assert_eq!(console.workspace().last_settled.unwrap().id, extract);

    let job = console.check_job("G1").await.unwrap();
    let waited = tokio::time::timeout(Duration::from_secs(60), console.wait_for_job(&job.id))
        .await
        .expect("settled job resolves at once")
        .unwrap();
    assert_eq!(waited.status, JobStatus::Failed);
    assert_eq!(console.workspace().last_settled.unwrap().id, extract);
}

#[tokio::test(start_paused = true)]
async fn job_checked_after_reset_is_handled_again() {
    let backend = Arc::new(MockBackend::new().with_job(
        "G1",
        JobType::GenerateParagraph,
        "P9",
        vec![MockStep::failed("no allowed facts")],
    ));
    let console = start(&backend, session(None, Some("P9")));

    console.check_job("G1").await.unwrap();
    console.wait_for_job(&JobId::from("G1")).await.unwrap();
    assert!(console.workspace().failure.is_some());

    console.reset();
    assert!(console.workspace().failure.is_none());

    let job = console.check_job("G1").await.unwrap();
    console.wait_for_job(&job.id).await.unwrap();
    let failure = console.workspace().failure.unwrap();
    assert_eq!(failure.job.id, job.id);
    assert_eq!(failure.message, "no allowed facts");
}

#[tokio::test(start_paused = true)]
async fn extract_submission_empties_fact_library() {
    let backend = Arc::new(
        MockBackend::new()
            .with_facts("D7", vec![sample_fact("F1", "Rates doubled in 2020.")])
            .with_script(
                JobType::ExtractFacts,
                "D7",
                vec![MockStep::status(JobStatus::Running)],
            ),
    );
    let console = start(&backend, session(Some("D7"), None));

    console.load_facts().await.unwrap();
    assert_eq!(console.workspace().facts.len(), 1);

    console.extract_facts().await.unwrap();
    assert!(console.workspace().facts.is_empty());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(console.workspace().facts.is_empty());
    assert_eq!(backend.facts_fetch_count("D7"), 1);
}

#[tokio::test(start_paused = true)]
async fn finished_job_for_closed_paragraph_is_not_reloaded() {
    let backend = Arc::new(
        MockBackend::new()
            .with_paragraph_view(sample_view("P1", ParagraphStatus::Draft, vec![]))
            .with_paragraph_view(sample_view("P2", ParagraphStatus::Verified, vec![]))
            .with_script(
                JobType::GenerateParagraph,
                "P1",
                vec![
                    MockStep::status(JobStatus::Running),
                    MockStep::status(JobStatus::Succeeded),
                ],
            ),
    );
    let console = start(&backend, session(None, Some("P1")));

    let job_id = console.generate_paragraph().await.unwrap();
    console.open_paragraph("P2").await.unwrap();
    console.wait_for_job(&job_id).await.unwrap();

    assert_eq!(backend.view_fetch_count("P1"), 0);
    assert_eq!(backend.runs_fetch_count("P1"), 0);
    let workspace = console.workspace();
    assert_eq!(workspace.paragraph_view.unwrap().paragraph.id, "P2");
    assert_eq!(workspace.last_jobs.generate, Some(job_id));
}

#[tokio::test(start_paused = true)]
async fn sentence_edit_shows_text_then_tracks_recheck() {
    let backend = Arc::new(
        MockBackend::new()
            .with_paragraph_view(sample_view(
                "P1",
                ParagraphStatus::Verified,
                vec![sample_sentence("S1", "P1", 0, "Old text.")],
            ))
            .with_runs("P1", vec![sample_run("R1", "P1", "VERIFIER")])
            .with_script(
                JobType::RegenerateSentences,
                "P1",
                vec![
                    MockStep::status(JobStatus::Running),
                    MockStep::status(JobStatus::Succeeded),
                ],
            ),
    );
    let console = start(&backend, session(None, Some("P1")));

    let job_id = console.update_sentence("S1", "New text.").await.unwrap();

    assert_eq!(
        backend.submissions(),
        vec![Submission::EditSentence {
            paragraph_id: "P1".into(),
            sentence_id: "S1".into(),
            text: "New text.".into(),
        }]
    );
    assert_eq!(backend.view_fetch_count("P1"), 1);

    console.wait_for_job(&job_id).await.unwrap();

    assert_eq!(backend.view_fetch_count("P1"), 2);
    assert_eq!(backend.runs_fetch_count("P1"), 1);
    let workspace = console.workspace();
    assert_eq!(workspace.last_jobs.regenerate, Some(job_id));
    assert_eq!(workspace.runs.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn projection_reflects_failed_job_and_uncited_claims() {
    let mut flagged = sample_sentence("S2", "P1", 1, "Rates doubled.");
    flagged.supported = false;
    flagged.verifier_failure_modes = vec![UNCITED_CLAIM.to_string()];
    let backend = Arc::new(
        MockBackend::new()
            .with_paragraph_view(sample_view(
                "P1",
                ParagraphStatus::NeedsRevision,
                vec![sample_sentence("S1", "P1", 0, "Fine."), flagged],
            ))
            .with_script(
                JobType::VerifyParagraph,
                "P1",
                vec![MockStep::failed("verifier timeout")],
            ),
    );
    let console = start(&backend, Session::default());

    console.open_paragraph("P1").await.unwrap();
    let job_id = console.verify_paragraph().await.unwrap();
    console.wait_for_job(&job_id).await.unwrap();

    let projection = console.projection().unwrap();
    assert_eq!(projection.band, StatusBand::Attention);
    assert!(projection.missing_evidence);
    assert!(projection.retryable);
    assert_eq!(projection.job.map(|j| j.id), Some(job_id));
}

#[tokio::test(start_paused = true)]
async fn unknown_paragraph_surfaces_backend_message() {
    let backend = Arc::new(MockBackend::new());
    let console = start(&backend, Session::default());

    let err = console.open_paragraph("P404").await.unwrap_err();

    assert_eq!(err.to_string(), "Paragraph not found");
    assert_eq!(console.workspace().error.as_deref(), Some("Paragraph not found"));
    assert_eq!(console.session().paragraph_id.as_deref(), Some("P404"));
}

#[tokio::test(start_paused = true)]
async fn reset_forgets_everything() {
    let backend = Arc::new(MockBackend::new().with_script(
        JobType::GenerateParagraph,
        "P1",
        vec![MockStep::status(JobStatus::Running)],
    ));
    let console = start(&backend, session(Some("D1"), Some("P1")));

    console.generate_paragraph().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    console.reset();

    assert_eq!(console.session(), Session::default());
    assert!(!console.poller().is_polling());
    assert!(console.poller().last_status().is_none());
    let workspace = console.workspace();
    assert_eq!(workspace.status, "Reset.");
    assert!(workspace.last_jobs.generate.is_none());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_everything() {
    let backend = Arc::new(MockBackend::new().with_script(
        JobType::GenerateParagraph,
        "P1",
        vec![
            MockStep::status(JobStatus::Running),
            MockStep::status(JobStatus::Succeeded),
        ],
    ));
    let console = start(&backend, session(None, Some("P1")));

    let job_id = console.generate_paragraph().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let saved = console.shutdown();
    let before = console.workspace();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(saved, session(None, Some("P1")));
    assert_eq!(backend.fetch_count(job_id.as_str()), 1);
    assert_eq!(console.workspace(), before);
    assert!(matches!(
        console.generate_paragraph().await,
        Err(ConsoleError::ShutDown)
    ));
    assert!(matches!(
        console.wait_for_job(&JobId::from("any")).await,
        Err(ConsoleError::ShutDown) | Err(ConsoleError::Abandoned(_))
    ));
}
