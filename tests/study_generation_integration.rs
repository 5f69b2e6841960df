/// Integration tests for study-question generation over a real store.
///
/// The generation backend is mocked; retrieval and persistence run against
/// an in-memory database, with the service acting as both chunk source and
/// study-item sink exactly as the CLI wires it.
use std::sync::{Arc, Mutex};

use tutor::llm::{ChatCompletionRequest, GenerateClient, GenerationError};
use tutor::models::{FileKind, StudyItemKind, UserId};
use tutor::service::NoteService;
use tutor::study::{StudySynthesizer, SynthesisError};
use tutor::{Database, Subject};

struct FixedBackend {
    response: String,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl FixedBackend {
    fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl GenerateClient for FixedBackend {
    fn chat(&self, request: &ChatCompletionRequest) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.response.clone())
    }
}

fn seeded_subject(service: &NoteService, user: &UserId) -> Subject {
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

fn batch_response() -> String {
    serde_json::json!({
        "items": [
            {
                "type": "mcq",
                "question": "What happens to entropy in an isolated system?",
                "options": ["It increases", "It decreases", "It stays constant", "It oscillates"],
                "correctAnswer": "It increases",
                "explanation": "Second law of thermodynamics.",
                "citations": [{"fileName": "notes.pdf", "reference": "Page 3", "snippet": "Entropy always increases in an isolated system."}]
            },
            {
                "type": "mcq",
                "question": "Which direction does heat flow spontaneously?",
                "options": ["Hot to cold", "Cold to hot", "Both ways", "Neither"],
                "correctAnswer": "Hot to cold",
                "explanation": "Stated on page 5.",
                "citations": [{"fileName": "notes.pdf", "reference": "Page 5", "snippet": "Heat flows from hot to cold."}]
            },
            {
                "type": "short",
                "question": "State the second law of thermodynamics in terms of entropy.",
                "answer": "The entropy of an isolated system always increases.",
                "explanation": "Direct restatement of the notes.",
                "citations": [{"fileName": "notes.pdf", "reference": "Page 3", "snippet": "Entropy always increases in an isolated system."}]
            }
        ]
    })
    .to_string()
}

#[test]
fn generated_batch_is_persisted_with_citations() {
    let service = NoteService::new(Database::in_memory().unwrap());
    let user = UserId::new("u1");
    let subject = seeded_subject(&service, &user);

    let backend = Arc::new(FixedBackend::new(&batch_response()));
    let synthesizer = StudySynthesizer::new(backend, "test-model");

    let outcome = synthesizer
        .generate(&service, &service, &user, subject.id, &subject.name, Some(3))
        .unwrap();

    assert_eq!(outcome.requested, 3);
    assert_eq!(outcome.created, 3);
    assert_eq!(outcome.persist_failures, 0);

    let items = service.list_study_items(&user, subject.id).unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].content.kind(), StudyItemKind::Mcq);
    assert_eq!(items[2].content.kind(), StudyItemKind::Short);
    for item in &items {
        assert!(!item.citations.is_empty());
        assert_eq!(item.citations[0].file_name, "notes.pdf");
    }
}

#[test]
fn prompt_carries_the_count_split_and_passages() {
    let service = NoteService::new(Database::in_memory().unwrap());
    let user = UserId::new("u1");
    let subject = seeded_subject(&service, &user);

    let backend = Arc::new(FixedBackend::new(&batch_response()));
    let synthesizer = StudySynthesizer::new(
        Arc::clone(&backend) as Arc<dyn GenerateClient>,
        "test-model",
    );

    synthesizer
        .generate(&service, &service, &user, subject.id, &subject.name, Some(5))
        .unwrap();

    let requests = backend.requests.lock().unwrap();
    let system = &requests[0].system;
    assert!(system.contains("exactly 3 multiple-choice questions"));
    assert!(system.contains("2 short-answer questions"));
    assert!(system.contains("[Passage 1] (Source: notes.pdf, Page 3)"));
    assert!(system.contains("Heat flows from hot to cold."));
}

#[test]
fn default_count_is_three() {
    let service = NoteService::new(Database::in_memory().unwrap());
    let user = UserId::new("u1");
    let subject = seeded_subject(&service, &user);

    let backend = Arc::new(FixedBackend::new(&batch_response()));
    let synthesizer = StudySynthesizer::new(
        Arc::clone(&backend) as Arc<dyn GenerateClient>,
        "test-model",
    );

    let outcome = synthesizer
        .generate(&service, &service, &user, subject.id, &subject.name, None)
        .unwrap();
    assert_eq!(outcome.requested, 3);

    let requests = backend.requests.lock().unwrap();
    assert!(requests[0].system.contains("exactly 2 multiple-choice questions"));
}

#[test]
fn subject_without_notes_cannot_generate() {
    let service = NoteService::new(Database::in_memory().unwrap());
    let user = UserId::new("u1");
    let subject = service.create_subject(&user, "Empty").unwrap();

    let backend = Arc::new(FixedBackend::new(&batch_response()));
    let synthesizer = StudySynthesizer::new(backend, "test-model");

    let result = synthesizer.generate(&service, &service, &user, subject.id, "Empty", Some(3));
    assert!(matches!(result, Err(SynthesisError::NoNotes)));
    assert!(service.list_study_items(&user, subject.id).unwrap().is_empty());
}

#[test]
fn prose_response_fails_without_persisting_anything() {
    let service = NoteService::new(Database::in_memory().unwrap());
    let user = UserId::new("u1");
    let subject = seeded_subject(&service, &user);

    let backend = Arc::new(FixedBackend::new(
        "Here are some questions: 1) What is entropy?",
    ));
    let synthesizer = StudySynthesizer::new(backend, "test-model");

    let result = synthesizer.generate(&service, &service, &user, subject.id, &subject.name, Some(3));
    assert!(matches!(result, Err(SynthesisError::Parse { .. })));
    assert!(service.list_study_items(&user, subject.id).unwrap().is_empty());
}
