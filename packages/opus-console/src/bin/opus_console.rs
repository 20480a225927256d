// Command-line entry point for the Opus Blocks console

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use opus_client::{Job, JobId, JobStatus, OpusClient};
use opus_console::{linked_facts, ConsoleConfig, SessionStore, StatusBand, WorkflowOrchestrator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Console = WorkflowOrchestrator<OpusClient>;

#[derive(Parser)]
#[command(name = "opus-console", about = "Drive the Opus Blocks research pipeline")]
struct Cli {
    /// API root, e.g. http://localhost:8000/api/v1
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Where the displayed document and paragraph are remembered
    #[arg(long, global = true)]
    session: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look up a job once
    Status { job_id: String },
    /// Poll a job until it finishes
    Watch { job_id: String },
    /// Extract facts from a document
    Extract {
        #[arg(long)]
        document: Option<String>,
        #[arg(long)]
        no_wait: bool,
    },
    /// Generate a paragraph from its allowed facts
    Generate {
        #[arg(long)]
        paragraph: Option<String>,
        #[arg(long)]
        no_wait: bool,
    },
    /// Verify a generated paragraph
    Verify {
        #[arg(long)]
        paragraph: Option<String>,
        #[arg(long)]
        no_wait: bool,
    },
    /// Replace a sentence's text in the displayed paragraph
    EditSentence {
        sentence_id: String,
        text: String,
        #[arg(long)]
        no_wait: bool,
    },
    /// Retry the step behind a failed job
    Retry { job_id: String },
    /// Display a paragraph
    Open { paragraph_id: String },
    /// Forget the displayed document and paragraph
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,opus_console=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ConsoleConfig::from_env().context("Failed to load configuration")?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    if let Some(path) = cli.session {
        config.session_path = path;
    }

    let store = SessionStore::new(&config.session_path);
    let session = store.load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable session file");
        Default::default()
    });

    let mut client = OpusClient::new(&config.api_url);
    if let Some(token) = &config.api_token {
        client = client.with_token(token);
    }
    tracing::debug!(api_url = client.base_url(), "Opus API configured");

    let console = WorkflowOrchestrator::start(Arc::new(client), session, config.poller_config());
    let outcome = run(&console, cli.command).await;

    let session = console.shutdown();
    store
        .save(&session)
        .with_context(|| format!("Failed to save session to {}", store.path().display()))?;

    outcome
}

async fn run(console: &Console, command: Command) -> Result<()> {
    match command {
        Command::Status { job_id } => {
            let job = console.check_job(&job_id).await?;
            print_job(&job);
        }
        Command::Watch { job_id } => {
            let Some(job_id) = console.poller().start_polling(&job_id) else {
                bail!("Job ID is required.");
            };
            println!("Watching job {}...", job_id.to_string().bold());
            finish(console, &job_id).await?;
        }
        Command::Extract { document, no_wait } => {
            if let Some(document) = document {
                console.select_document(&document)?;
            }
            let job_id = console.extract_facts().await?;
            println!("Fact extraction queued as job {}", job_id.to_string().bold());
            if !no_wait {
                let job = finish(console, &job_id).await?;
                if job.status == JobStatus::Succeeded {
                    println!("{} facts in library", console.workspace().facts.len());
                }
            }
        }
        Command::Generate { paragraph, no_wait } => {
            open(console, paragraph).await?;
            let job_id = console.generate_paragraph().await?;
            println!("Generation queued as job {}", job_id.to_string().bold());
            if !no_wait {
                finish(console, &job_id).await?;
                print_paragraph(console);
            }
        }
        Command::Verify { paragraph, no_wait } => {
            open(console, paragraph).await?;
            let job_id = console.verify_paragraph().await?;
            println!("Verification queued as job {}", job_id.to_string().bold());
            if !no_wait {
                finish(console, &job_id).await?;
                print_paragraph(console);
            }
        }
        Command::EditSentence {
            sentence_id,
            text,
            no_wait,
        } => {
            open(console, None).await?;
            let job_id = console.update_sentence(&sentence_id, &text).await?;
            println!("Sentence updated, re-check queued as job {}", job_id.to_string().bold());
            if !no_wait {
                finish(console, &job_id).await?;
                print_paragraph(console);
            }
        }
        Command::Retry { job_id } => {
            let job = console.check_job(&job_id).await?;
            if job.status != JobStatus::Failed {
                bail!("Job {} is {}, nothing to retry", job.id, job.status);
            }
            // The terminal lookup records the failure; wait for it to land.
            console.wait_for_job(&job.id).await?;
            let job_id = console.retry().await?;
            println!("Resubmitted as job {}", job_id.to_string().bold());
            finish(console, &job_id).await?;
            print_paragraph(console);
        }
        Command::Open { paragraph_id } => {
            console.open_paragraph(&paragraph_id).await?;
            print_paragraph(console);
        }
        Command::Reset => {
            console.reset();
            println!("Session cleared");
        }
    }
    Ok(())
}

/// Make sure a paragraph is displayed, switching to `paragraph` if given.
async fn open(console: &Console, paragraph: Option<String>) -> Result<()> {
    let paragraph_id = paragraph
        .or_else(|| console.session().paragraph_id)
        .context("No paragraph selected; pass --paragraph or run `open` first")?;
    console.open_paragraph(&paragraph_id).await?;
    Ok(())
}

async fn finish(console: &Console, job_id: &JobId) -> Result<Job> {
    let job = console.wait_for_job(job_id).await?;
    print_job(&job);
    if let Some(failure) = console.workspace().failure.filter(|f| f.job.id == job.id) {
        println!("  {} {}", "error:".red().bold(), failure.message);
        if failure.retry.is_some() {
            println!("  retry with: opus-console retry {}", job.id);
        }
    }
    Ok(job)
}

fn print_job(job: &Job) {
    let status = match job.status {
        JobStatus::Succeeded => job.status.to_string().green(),
        JobStatus::Failed | JobStatus::Cancelled => job.status.to_string().red(),
        _ => job.status.to_string().yellow(),
    };
    let updated = job
        .updated_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{} {} {} on {} (updated {})",
        job.id.to_string().bold(),
        job.job_type,
        status,
        job.target_id,
        updated
    );
}

fn print_paragraph(console: &Console) {
    let workspace = console.workspace();
    let (Some(view), Some(projection)) = (&workspace.paragraph_view, console.projection()) else {
        return;
    };

    let band = match projection.band {
        StatusBand::Good => projection.band.label().green(),
        StatusBand::InProgress => projection.band.label().yellow(),
        StatusBand::Attention => projection.band.label().red(),
    };
    println!();
    println!(
        "{} {} [{}] {}",
        "Paragraph".bold(),
        view.paragraph.id,
        view.paragraph.status,
        band
    );
    println!("  {} / {}", view.paragraph.section, view.paragraph.intent);
    if projection.missing_evidence {
        println!("  {}", "Missing evidence: uncited claims present".red());
    }

    let mut sentences: Vec<_> = view.sentences.iter().collect();
    sentences.sort_by_key(|s| s.order);
    for sentence in sentences {
        let marker = if sentence.supported { "✓".green() } else { "✗".red() };
        println!("  {} {} {}", marker, sentence.id.dimmed(), sentence.text);
        if !sentence.verifier_failure_modes.is_empty() {
            println!("      {}", sentence.verifier_failure_modes.join(", ").yellow());
        }
    }

    let facts = linked_facts(view);
    if !facts.is_empty() {
        println!("  {}", "Linked facts:".bold());
        for fact in facts {
            println!("    {} {}", fact.id.dimmed(), fact.content);
        }
    }

    if !workspace.runs.is_empty() {
        println!("  {} {}", "Runs:".bold(), workspace.runs.len());
        for run in &workspace.runs {
            println!("    {} {} {}/{}", run.id.dimmed(), run.run_type, run.provider, run.model);
        }
    }

    if let Some(job) = &projection.job {
        println!("  Latest job: {} {}", job.job_type, job.status);
        if projection.retryable {
            println!("  retry with: opus-console retry {}", job.id);
        }
    }
}
