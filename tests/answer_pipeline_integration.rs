/// Integration tests for the grounded-answer pipeline over a real store.
///
/// The generation backend is mocked; everything else (store, retrieval,
/// context assembly, grounding, chat log) runs for real against an
/// in-memory database.
use std::sync::{Arc, Mutex};

use tutor::answerer::{AnswerRequest, NoteAnswerer, turns_from_log};
use tutor::llm::{ChatCompletionRequest, GenerateClient, GenerationError};
use tutor::models::{Confidence, FileKind, UserId};
use tutor::service::NoteService;
use tutor::{Database, Subject};

/// Backend double that replays canned responses and records requests.
///
/// Once the scripted responses run out, the fallback is repeated.
struct ScriptedBackend {
    responses: Mutex<Vec<Result<String, GenerationError>>>,
    fallback: String,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl ScriptedBackend {
    fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            fallback: "{}".to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn replying(response: &str) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fallback: response.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl GenerateClient for ScriptedBackend {
    fn chat(&self, request: &ChatCompletionRequest) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(self.fallback.clone());
        }
        responses.remove(0)
    }
}

fn thermodynamics_subject(service: &NoteService, user: &UserId) -> Subject {
    let subject = service.create_subject(user, "Thermodynamics").unwrap();
    let file = service
        .create_file(user, subject.id, "notes.pdf", FileKind::Pdf, "blobs/notes.pdf")
        .unwrap();
    service
        .add_chunk(
            user,
            subject.id,
            file.id,
            "Entropy always increases in an isolated system.",
            "Page 3",
            None,
        )
        .unwrap();
    service
        .add_chunk(
            user,
            subject.id,
            file.id,
            "Heat flows from hot to cold.",
            "Page 5",
            None,
        )
        .unwrap();
    subject
}

fn request(subject: &Subject, user: &UserId, question: &str) -> AnswerRequest {
    AnswerRequest {
        user: user.clone(),
        subject: subject.id,
        subject_name: subject.name.clone(),
        question: question.to_string(),
        history: Vec::new(),
    }
}

#[test]
fn grounded_question_is_answered_with_citations() {
    let service = NoteService::new(Database::in_memory().unwrap());
    let user = UserId::new("u1");
    let subject = thermodynamics_subject(&service, &user);

    let backend = Arc::new(ScriptedBackend::replying(
        r#"{"answer": "Entropy is a measure of disorder; in an isolated system it always increases.",
            "confidence": "High",
            "citations": [{"fileName": "notes.pdf", "reference": "Page 3", "snippet": "Entropy always increases in an isolated system."}]}"#,
    ));
    let answerer = NoteAnswerer::new(
        Arc::clone(&backend) as Arc<dyn GenerateClient>,
        "test-model",
    );

    let answer = answerer
        .answer(&service, &request(&subject, &user, "What is entropy?"))
        .unwrap();

    assert!(answer.answer.contains("Entropy"));
    assert!(matches!(answer.confidence, Confidence::High | Confidence::Medium));
    assert_eq!(answer.citations[0].file_name, "notes.pdf");
    assert_eq!(answer.citations[0].reference, "Page 3");

    // Both passages made it into the prompt context
    let requests = backend.requests.lock().unwrap();
    let system = &requests[0].system;
    assert!(system.contains("[Passage 1] (Source: notes.pdf, Page 3)"));
    assert!(system.contains("[Passage 2] (Source: notes.pdf, Page 5)"));
}

#[test]
fn off_subject_question_returns_the_exact_sentinel() {
    let service = NoteService::new(Database::in_memory().unwrap());
    let user = UserId::new("u1");
    let subject = thermodynamics_subject(&service, &user);

    // An obedient model refuses exactly as instructed
    let backend = Arc::new(ScriptedBackend::replying(
        r#"{"answer": "Not found in your notes for Thermodynamics.", "confidence": "Medium", "citations": []}"#,
    ));
    let answerer = NoteAnswerer::new(backend, "test-model");

    let answer = answerer
        .answer(&service, &request(&subject, &user, "What is the capital of France?"))
        .unwrap();

    assert_eq!(answer.answer, "Not found in your notes for Thermodynamics.");
    assert_eq!(answer.confidence, Confidence::Low);
    assert!(answer.citations.is_empty());
}

#[test]
fn subject_without_notes_refuses_regardless_of_model_output() {
    let service = NoteService::new(Database::in_memory().unwrap());
    let user = UserId::new("u1");
    let subject = service.create_subject(&user, "Philosophy").unwrap();

    let backend = Arc::new(ScriptedBackend::replying(
        r#"{"answer": "Descartes said cogito ergo sum.", "confidence": "High", "citations": []}"#,
    ));
    let answerer = NoteAnswerer::new(Arc::clone(&backend) as Arc<dyn GenerateClient>, "m");

    let answer = answerer
        .answer(
            &service,
            &AnswerRequest {
                user: user.clone(),
                subject: subject.id,
                subject_name: subject.name.clone(),
                question: "What did Descartes say?".to_string(),
                history: Vec::new(),
            },
        )
        .unwrap();

    assert_eq!(answer.answer, "Not found in your notes for Philosophy.");
    assert_eq!(answer.confidence, Confidence::Low);
    assert!(answer.citations.is_empty());

    // The backend was still called, with the no-notes notice in place of context
    let requests = backend.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0]
        .system
        .contains("No notes have been uploaded for Philosophy yet."));
}

#[test]
fn chat_history_reloads_from_the_persisted_log() {
    let service = NoteService::new(Database::in_memory().unwrap());
    let user = UserId::new("u1");
    let subject = thermodynamics_subject(&service, &user);

    let backend = Arc::new(ScriptedBackend::replying(
        r#"{"answer": "Entropy increases.", "confidence": "High", "citations": []}"#,
    ));
    let answerer = NoteAnswerer::new(Arc::clone(&backend) as Arc<dyn GenerateClient>, "m");

    // First exchange, persisted the way the chat surface does it
    let history = turns_from_log(&service.recent_messages(&user, subject.id, 10).unwrap());
    assert!(history.is_empty());

    let message = service
        .append_question(&user, subject.id, "What is entropy?")
        .unwrap();
    let answer = answerer
        .answer(&service, &request(&subject, &user, "What is entropy?"))
        .unwrap();
    service.record_answer(message, &answer).unwrap();

    // A later session resumes with both turns of the first exchange
    let reloaded = turns_from_log(&service.recent_messages(&user, subject.id, 10).unwrap());
    assert_eq!(reloaded.len(), 2);

    let follow_up = AnswerRequest {
        user: user.clone(),
        subject: subject.id,
        subject_name: subject.name.clone(),
        question: "Give an example.".to_string(),
        history: reloaded.windowed().to_vec(),
    };
    answerer.answer(&service, &follow_up).unwrap();

    let requests = backend.requests.lock().unwrap();
    let last = requests.last().unwrap();
    assert_eq!(last.history.len(), 2);
    assert_eq!(last.history[0].content, "What is entropy?");
    assert_eq!(last.history[1].content, "Entropy increases.");
}

#[test]
fn malformed_backend_output_still_yields_a_displayable_answer() {
    let service = NoteService::new(Database::in_memory().unwrap());
    let user = UserId::new("u1");
    let subject = thermodynamics_subject(&service, &user);

    let backend = Arc::new(ScriptedBackend::replying(
        "entropy is, uh, the disorder thing from page 3",
    ));
    let answerer = NoteAnswerer::new(backend, "m");

    let answer = answerer
        .answer(&service, &request(&subject, &user, "What is entropy?"))
        .unwrap();

    assert_eq!(answer.answer, "entropy is, uh, the disorder thing from page 3");
    assert_eq!(answer.confidence, Confidence::Low);
    assert!(answer.citations.is_empty());
}

#[test]
fn backend_failure_leaves_the_question_logged_unanswered() {
    let service = NoteService::new(Database::in_memory().unwrap());
    let user = UserId::new("u1");
    let subject = thermodynamics_subject(&service, &user);

    let backend = Arc::new(ScriptedBackend::new(vec![Err(GenerationError::Http {
        status: 502,
    })]));
    let answerer = NoteAnswerer::new(backend, "m");

    service
        .append_question(&user, subject.id, "What is entropy?")
        .unwrap();
    let result = answerer.answer(&service, &request(&subject, &user, "What is entropy?"));
    assert!(result.is_err());

    // No answer recorded; the exchange shows up unanswered, not corrupted
    let messages = service.recent_messages(&user, subject.id, 10).unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].answer.is_none());
    assert!(messages[0].confidence.is_none());
}
