use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tutor::answerer::{AnswerRequest, NoteAnswerer, NoteAnswererBuilder, turns_from_log};
use tutor::blob::{BlobStore, FsBlobStore};
use tutor::llm::LlmClientBuilder;
use tutor::models::{FileKind, GroundedAnswer, NoteFileId, SubjectId, UserId};
use tutor::ratelimit::{RateLimitConfig, SlidingWindowLimiter};
use tutor::service::{NoteService, split_passages};
use tutor::study::StudySynthesizerBuilder;
use tutor::voice::{ConsoleSpeech, VoiceSession};
use tutor::{Database, Subject};

/// Advisory per-user limit on generation requests.
const RATE_LIMIT: RateLimitConfig = RateLimitConfig {
    max_requests: 20,
    window_ms: 60_000,
};

/// tutor - subject-scoped study assistant over your own notes
#[derive(Parser)]
#[command(name = "tutor")]
#[command(about = "Ask questions and generate quizzes from your own notes")]
#[command(version)]
struct Cli {
    /// User id owning the data (defaults to $TUTOR_USER, then "local")
    #[arg(long, global = true, value_name = "USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage subjects
    Subject {
        #[command(subcommand)]
        action: SubjectAction,
    },
    /// Manage note files within a subject
    File {
        #[command(subcommand)]
        action: FileAction,
    },
    /// Ask one question against a subject's notes
    Ask {
        subject: i64,
        question: String,
    },
    /// Interactive chat over a subject's notes
    Chat { subject: i64 },
    /// Voice-style conversation driven from the terminal
    Voice { subject: i64 },
    /// Manage a subject's chat history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Generate and review study questions
    Study {
        #[command(subcommand)]
        action: StudyAction,
    },
}

#[derive(Subcommand)]
enum SubjectAction {
    /// Create a subject
    Add { name: String },
    /// List subjects
    List,
    /// Delete a subject and everything in it
    Rm { subject: i64 },
}

#[derive(Subcommand)]
enum FileAction {
    /// Upload a note file (txt files are split into passages)
    Add { subject: i64, path: PathBuf },
    /// List a subject's files
    List { subject: i64 },
    /// Delete a file and its passages
    Rm { file: i64 },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Delete a subject's chat history
    Clear { subject: i64 },
}

#[derive(Subcommand)]
enum StudyAction {
    /// Generate study questions from a subject's notes
    Gen {
        subject: i64,
        /// Total questions to generate
        #[arg(short, long)]
        count: Option<usize>,
    },
    /// List a subject's study questions
    List { subject: i64 },
}

fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let user = resolve_user(cli.user);

    let result = match cli.command {
        Commands::Subject { action } => handle_subject(&user, action),
        Commands::File { action } => handle_file(&user, action),
        Commands::Ask { subject, question } => handle_ask(&user, subject, &question),
        Commands::Chat { subject } => handle_chat(&user, subject),
        Commands::Voice { subject } => handle_voice(&user, subject),
        Commands::History { action } => handle_history(&user, action),
        Commands::Study { action } => handle_study(&user, action),
    };

    if let Err(e) = result {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Determines if an error is a user error (vs internal error).
fn is_user_error(error: &anyhow::Error) -> bool {
    let message = error.to_string();
    message.contains("cannot be empty")
        || message.contains("not found")
        || message.contains("Subject limit")
        || message.contains("Rate limit")
        || message.contains("Unsupported file")
        || message.contains("No notes")
        || message.contains("No model configured")
}

fn resolve_user(flag: Option<String>) -> UserId {
    let id = flag
        .or_else(|| std::env::var("TUTOR_USER").ok())
        .unwrap_or_else(|| "local".to_string());
    UserId::new(id)
}

/// Gets the cross-platform data directory for the assistant.
fn data_root() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?;
    Ok(data_dir.join("tutor"))
}

fn open_service() -> Result<NoteService> {
    let root = data_root()?;
    std::fs::create_dir_all(&root)
        .with_context(|| format!("Failed to create data directory: {}", root.display()))?;
    let db = Database::open(root.join("notes.db")).context("Failed to open database")?;
    Ok(NoteService::new(db))
}

fn open_blobs() -> Result<FsBlobStore> {
    Ok(FsBlobStore::new(data_root()?.join("blobs")))
}

fn require_subject(service: &NoteService, user: &UserId, id: i64) -> Result<Subject> {
    service
        .get_subject(user, SubjectId::new(id))?
        .ok_or_else(|| anyhow::anyhow!("Subject {id} not found"))
}

/// Builds the answer pipeline from the configured backend.
fn build_answerer() -> Result<NoteAnswerer> {
    let client = LlmClientBuilder::new().build()?;
    let model = client.model().to_string();
    if model.is_empty() {
        anyhow::bail!("No model configured - set TUTOR_LLM_MODEL");
    }
    Ok(NoteAnswererBuilder::new()
        .client(Arc::new(client))
        .model(model)
        .build())
}

fn check_rate_limit(limiter: &SlidingWindowLimiter, user: &UserId) -> Result<()> {
    let decision = limiter.check(user.as_str(), &RATE_LIMIT);
    if !decision.allowed {
        anyhow::bail!(
            "Rate limit exceeded - try again in {}s",
            (decision.reset_ms as u64).div_ceil(1000)
        );
    }
    Ok(())
}

fn handle_subject(user: &UserId, action: SubjectAction) -> Result<()> {
    let service = open_service()?;
    match action {
        SubjectAction::Add { name } => {
            let subject = service.create_subject(user, &name)?;
            println!("Subject created (id: {})", subject.id);
        }
        SubjectAction::List => {
            let subjects = service.list_subjects(user)?;
            if subjects.is_empty() {
                println!("No subjects yet");
            }
            for subject in subjects {
                let chunks = service.count_chunks(user, subject.id)?;
                println!("{}  {} ({} passages)", subject.id, subject.name, chunks);
            }
        }
        SubjectAction::Rm { subject } => {
            let subject = require_subject(&service, user, subject)?;
            service.delete_subject(user, subject.id, &open_blobs()?)?;
            println!("Deleted subject {}", subject.name);
        }
    }
    Ok(())
}

fn handle_file(user: &UserId, action: FileAction) -> Result<()> {
    let service = open_service()?;
    match action {
        FileAction::Add { subject, path } => {
            let subject = require_subject(&service, user, subject)?;
            ingest_file(&service, user, &subject, &path)?;
        }
        FileAction::List { subject } => {
            let subject = require_subject(&service, user, subject)?;
            for file in service.list_files(user, subject.id)? {
                println!("{}  {} ({})", file.id, file.name, file.kind);
            }
        }
        FileAction::Rm { file } => {
            service.delete_file(user, NoteFileId::new(file), &open_blobs()?)?;
            println!("Deleted file {file}");
        }
    }
    Ok(())
}

/// Registers a file and, for txt uploads, indexes its passages.
///
/// Pdf files are registered with their blob only; passage extraction for
/// pdf happens in the upstream ingestion tooling, not here.
fn ingest_file(
    service: &NoteService,
    user: &UserId,
    subject: &Subject,
    path: &Path,
) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Unsupported file path: {}", path.display()))?;
    let kind = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("txt") => FileKind::Txt,
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => FileKind::Pdf,
        _ => anyhow::bail!("Unsupported file type (expected .txt or .pdf): {}", path.display()),
    };

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let blob_ref = format!("{}/{}/{}", user, subject.id, name);
    open_blobs()?.put(&blob_ref, &bytes)?;

    let file = service.create_file(user, subject.id, name, kind, &blob_ref)?;

    let mut indexed = 0;
    if kind == FileKind::Txt {
        let text = String::from_utf8_lossy(&bytes);
        for (passage, reference) in split_passages(&text) {
            service.add_chunk(user, subject.id, file.id, &passage, &reference, None)?;
            indexed += 1;
        }
    }

    println!("File added (id: {}), {} passages indexed", file.id, indexed);
    Ok(())
}

fn print_answer(answer: &GroundedAnswer) {
    println!("{}", answer.answer);
    println!("  confidence: {}", answer.confidence);
    for citation in &answer.citations {
        println!("  [{} - {}] \"{}\"", citation.file_name, citation.reference, citation.snippet);
    }
}

fn handle_ask(user: &UserId, subject: i64, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("Question cannot be empty");
    }

    let service = open_service()?;
    let subject = require_subject(&service, user, subject)?;
    let limiter = SlidingWindowLimiter::with_system_clock();
    check_rate_limit(&limiter, user)?;

    let answerer = build_answerer()?;
    let history = turns_from_log(&service.recent_messages(user, subject.id, 10)?);

    let message = service.append_question(user, subject.id, question)?;
    let answer = answerer.answer(
        &service,
        &AnswerRequest {
            user: user.clone(),
            subject: subject.id,
            subject_name: subject.name.clone(),
            question: question.to_string(),
            history: history.windowed().to_vec(),
        },
    )?;
    service.record_answer(message, &answer)?;

    print_answer(&answer);
    Ok(())
}

fn handle_chat(user: &UserId, subject: i64) -> Result<()> {
    let service = open_service()?;
    let subject = require_subject(&service, user, subject)?;
    let limiter = SlidingWindowLimiter::with_system_clock();
    let answerer = build_answerer()?;

    // Resume the conversation from the persisted log
    let mut window = turns_from_log(&service.recent_messages(user, subject.id, 10)?);
    println!("Chatting about {} - type 'exit' to leave, '/clear' to forget history", subject.name);

    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            return Ok(());
        }
        if line == "/clear" {
            let removed = service.clear_chat(user, subject.id)?;
            window.reset();
            println!("Forgot {removed} messages");
            continue;
        }

        if let Err(e) = check_rate_limit(&limiter, user) {
            println!("{e}");
            continue;
        }

        let message = service.append_question(user, subject.id, line)?;
        let request = AnswerRequest {
            user: user.clone(),
            subject: subject.id,
            subject_name: subject.name.clone(),
            question: line.to_string(),
            history: window.windowed().to_vec(),
        };

        match answerer.answer(&service, &request) {
            Ok(answer) => {
                service.record_answer(message, &answer)?;
                window.push_user(line);
                window.push_assistant(answer.answer.clone());
                print_answer(&answer);
            }
            Err(e) => {
                // The question stays logged unanswered; the user can re-ask
                println!("Sorry, that didn't work: {e}");
            }
        }
    }
}

fn handle_voice(user: &UserId, subject: i64) -> Result<()> {
    let service = open_service()?;
    let subject = require_subject(&service, user, subject)?;
    let limiter = SlidingWindowLimiter::with_system_clock();
    check_rate_limit(&limiter, user)?;

    let answerer = build_answerer()?;
    println!("Voice session for {} - type instead of speaking, 'exit' ends", subject.name);

    let mut session = VoiceSession::new(ConsoleSpeech::new(), ConsoleSpeech::new());
    session.run(&answerer, &service, user, subject.id, &subject.name)?;
    Ok(())
}

fn handle_history(user: &UserId, action: HistoryAction) -> Result<()> {
    let service = open_service()?;
    match action {
        HistoryAction::Clear { subject } => {
            let subject = require_subject(&service, user, subject)?;
            let removed = service.clear_chat(user, subject.id)?;
            println!("Deleted {removed} messages from {}", subject.name);
        }
    }
    Ok(())
}

fn handle_study(user: &UserId, action: StudyAction) -> Result<()> {
    let service = open_service()?;
    match action {
        StudyAction::Gen { subject, count } => {
            let subject = require_subject(&service, user, subject)?;
            let limiter = SlidingWindowLimiter::with_system_clock();
            check_rate_limit(&limiter, user)?;

            let client = LlmClientBuilder::new().build()?;
            let model = client.model().to_string();
            if model.is_empty() {
                anyhow::bail!("No model configured - set TUTOR_LLM_MODEL");
            }
            let synthesizer = StudySynthesizerBuilder::new()
                .client(Arc::new(client))
                .model(model)
                .build();

            let outcome =
                synthesizer.generate(&service, &service, user, subject.id, &subject.name, count)?;
            println!("Created {} of {} study questions", outcome.created, outcome.requested);
            if outcome.persist_failures > 0 {
                println!("  ({} items failed to save)", outcome.persist_failures);
            }
        }
        StudyAction::List { subject } => {
            let subject = require_subject(&service, user, subject)?;
            for item in service.list_study_items(user, subject.id)? {
                println!("{}  [{}] {}", item.id, item.content.kind(), item.content.question());
            }
        }
    }
    Ok(())
}
