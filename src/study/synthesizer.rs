//! Quiz synthesis: a sibling of the answer pipeline that turns a subject's
//! passages into a persisted batch of study questions.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::answerer::{assemble_context, citations_from_value};
use crate::llm::{ChatCompletionRequest, GenerateClient, GenerationError};
use crate::models::{Citation, StudyContent, StudyItemId, SubjectId, UserId};
use crate::service::{ChunkSource, NoteService, RetrievalError};

/// Retrieval cap for study generation; tighter than chat since the whole
/// batch is built from one prompt.
pub const STUDY_CHUNK_CAP: usize = 50;

/// Questions generated when the caller does not specify a count.
pub const DEFAULT_QUESTION_COUNT: usize = 3;

/// Sampling temperature for synthesis; a little looser than Q&A so
/// question phrasing varies.
const STUDY_TEMPERATURE: f32 = 0.5;

/// Output-length ceiling for one batch.
const MAX_STUDY_TOKENS: u32 = 2048;

/// Prompt template for batch question generation.
const PROMPT_TEMPLATE: &str = r#"You are a quiz writer for the subject "{subject}". Write study questions drawn ONLY from the note passages provided below.

RULES:
1. Write exactly {mcq} multiple-choice questions and {short} short-answer questions
2. Base every question on the provided passages - no outside knowledge
3. Every question must carry at least one citation giving the source file name, its location reference, and a verbatim snippet
4. Multiple-choice questions need exactly four options, one of which is the correct answer
5. Every question needs a brief explanation of its answer

NOTE PASSAGES:
{context}

Respond with a JSON object of the form {"items": [...]} where each item is either
{"type": "mcq", "question": ..., "options": [...], "correctAnswer": ..., "explanation": ..., "citations": [{"fileName": ..., "reference": ..., "snippet": ...}]}
or
{"type": "short", "question": ..., "answer": ..., "explanation": ..., "citations": [...]}"#;

/// Errors study generation can surface.
///
/// Unlike the chat path there is no degraded fallback: a response that
/// cannot be parsed fails the whole invocation, because study items are
/// persisted rather than displayed once.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The backend responded but the batch could not be parsed.
    #[error("Could not parse generated questions: {message}")]
    Parse { message: String },

    /// The subject has no indexed passages to draw questions from.
    #[error("No notes have been uploaded for this subject yet")]
    NoNotes,
}

/// What one generation run produced.
///
/// Persistence is per item with no rollback: `created` can trail the number
/// of parsed questions when individual inserts fail, and callers should
/// report such partial success rather than hide it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudyBatchOutcome {
    /// Questions asked of the backend.
    pub requested: usize,
    /// Items successfully persisted.
    pub created: usize,
    /// Items that parsed but failed to persist.
    pub persist_failures: usize,
}

/// Persistence seam for generated items; implemented by `NoteService`,
/// mocked in tests to exercise partial-failure behavior.
pub trait StudySink {
    fn persist_study_item(
        &self,
        user: &UserId,
        subject: SubjectId,
        content: &StudyContent,
        citations: &[Citation],
    ) -> anyhow::Result<StudyItemId>;
}

impl StudySink for NoteService {
    fn persist_study_item(
        &self,
        user: &UserId,
        subject: SubjectId,
        content: &StudyContent,
        citations: &[Citation],
    ) -> anyhow::Result<StudyItemId> {
        Ok(self.create_study_item(user, subject, content, citations)?.id)
    }
}

/// Splits a total question count into (mcq, short) per the fixed ratio:
/// multiple choice gets the larger half.
pub fn split_counts(total: usize) -> (usize, usize) {
    let mcq = total.div_ceil(2);
    (mcq, total - mcq)
}

/// Builder for constructing `StudySynthesizer` instances.
#[derive(Default)]
pub struct StudySynthesizerBuilder {
    client: Option<Arc<dyn GenerateClient>>,
    model: Option<String>,
}

impl StudySynthesizerBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the generation client to use.
    pub fn client(mut self, client: Arc<dyn GenerateClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the model used for synthesis.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builds the `StudySynthesizer`.
    ///
    /// # Panics
    ///
    /// Panics if `client()` or `model()` was not called.
    #[must_use]
    pub fn build(self) -> StudySynthesizer {
        StudySynthesizer {
            client: self.client.expect("client must be set via client() method"),
            model: self.model.expect("model must be set via model() method"),
        }
    }
}

/// Generates and persists a batch of study questions for a subject.
pub struct StudySynthesizer {
    client: Arc<dyn GenerateClient>,
    model: String,
}

impl StudySynthesizer {
    /// Creates a new `StudySynthesizer` with the specified client and model.
    #[must_use]
    pub fn new(client: Arc<dyn GenerateClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Generates `count` questions (default 3) and persists each one.
    ///
    /// Each parsed item is persisted independently; an insert failure is
    /// logged and counted but does not roll back earlier items.
    pub fn generate(
        &self,
        source: &dyn ChunkSource,
        sink: &dyn StudySink,
        user: &UserId,
        subject: SubjectId,
        subject_name: &str,
        count: Option<usize>,
    ) -> Result<StudyBatchOutcome, SynthesisError> {
        let requested = count.unwrap_or(DEFAULT_QUESTION_COUNT);
        if requested == 0 {
            return Ok(StudyBatchOutcome {
                requested: 0,
                created: 0,
                persist_failures: 0,
            });
        }

        let context = source.subject_context(user, subject, STUDY_CHUNK_CAP)?;
        let Some(assembled) = assemble_context(&context.chunks, &context.file_names) else {
            return Err(SynthesisError::NoNotes);
        };

        let (mcq, short) = split_counts(requested);
        let completion = ChatCompletionRequest {
            model: self.model.clone(),
            system: build_prompt(subject_name, &assembled, mcq, short),
            history: Vec::new(),
            question: format!(
                "Generate {mcq} multiple-choice and {short} short-answer questions now."
            ),
            format: Some(batch_schema()),
            temperature: STUDY_TEMPERATURE,
            max_tokens: MAX_STUDY_TOKENS,
        };

        let raw = self.client.chat(&completion)?;
        let items = parse_batch(&raw)?;

        let mut created = 0;
        let mut persist_failures = 0;
        for (content, citations) in &items {
            match sink.persist_study_item(user, subject, content, citations) {
                Ok(_) => created += 1,
                Err(e) => {
                    persist_failures += 1;
                    tracing::warn!(error = %e, question = content.question(), "study item insert failed");
                }
            }
        }

        tracing::debug!(subject = %subject_name, requested, created, "study batch generated");
        Ok(StudyBatchOutcome {
            requested,
            created,
            persist_failures,
        })
    }
}

/// Builds the combined batch prompt.
fn build_prompt(subject_name: &str, context: &str, mcq: usize, short: usize) -> String {
    PROMPT_TEMPLATE
        .replace("{subject}", subject_name)
        .replace("{mcq}", &mcq.to_string())
        .replace("{short}", &short.to_string())
        .replace("{context}", context)
}

/// JSON schema for the batch envelope, passed as the backend output format.
fn batch_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string", "enum": ["mcq", "short"] },
                        "question": { "type": "string" },
                        "options": { "type": "array", "items": { "type": "string" } },
                        "correctAnswer": { "type": "string" },
                        "answer": { "type": "string" },
                        "explanation": { "type": "string" },
                        "citations": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "fileName": { "type": "string" },
                                    "reference": { "type": "string" },
                                    "snippet": { "type": "string" }
                                },
                                "required": ["fileName", "reference", "snippet"]
                            }
                        }
                    },
                    "required": ["type", "question", "citations"]
                }
            }
        },
        "required": ["items"]
    })
}

/// Parses a generated batch, accepting a bare array or an object wrapping
/// the array under `items` or `questions`.
///
/// A response that is not valid JSON fails the whole operation; individual
/// items that are malformed or uncited are dropped with a warning, and a
/// batch with no usable items is treated as a parse failure too.
fn parse_batch(raw: &str) -> Result<Vec<(StudyContent, Vec<Citation>)>, SynthesisError> {
    let value: serde_json::Value =
        serde_json::from_str(raw.trim()).map_err(|e| SynthesisError::Parse {
            message: e.to_string(),
        })?;

    let entries = match &value {
        serde_json::Value::Array(entries) => entries.as_slice(),
        serde_json::Value::Object(obj) => obj
            .get("items")
            .or_else(|| obj.get("questions"))
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .ok_or_else(|| SynthesisError::Parse {
                message: "expected an array or an object with 'items' or 'questions'".to_string(),
            })?,
        _ => {
            return Err(SynthesisError::Parse {
                message: "expected an array or an object envelope".to_string(),
            });
        }
    };

    let mut items = Vec::new();
    for entry in entries {
        match parse_item(entry) {
            Some(item) => items.push(item),
            None => tracing::warn!("dropping malformed study item from batch"),
        }
    }

    if items.is_empty() {
        return Err(SynthesisError::Parse {
            message: "batch contained no usable items".to_string(),
        });
    }
    Ok(items)
}

/// Parses one batch entry into content plus citations.
///
/// Returns `None` for entries missing their type tag, required fields, or
/// any citation at all.
fn parse_item(entry: &serde_json::Value) -> Option<(StudyContent, Vec<Citation>)> {
    let kind = entry.get("type").and_then(|v| v.as_str())?;
    let question = entry.get("question").and_then(|v| v.as_str())?.to_string();
    let explanation = entry
        .get("explanation")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let citations = citations_from_value(entry.get("citations")).unwrap_or_default();
    if citations.is_empty() {
        return None;
    }

    let content = match kind {
        "mcq" => {
            let options: Vec<String> = entry
                .get("options")?
                .as_array()?
                .iter()
                .filter_map(|o| o.as_str().map(str::to_string))
                .collect();
            let correct_answer = entry
                .get("correctAnswer")
                .and_then(|v| v.as_str())?
                .to_string();
            if options.is_empty() {
                return None;
            }
            StudyContent::Mcq {
                question,
                options,
                correct_answer,
                explanation,
            }
        }
        "short" => {
            let answer = entry.get("answer").and_then(|v| v.as_str())?.to_string();
            StudyContent::Short {
                question,
                answer,
                explanation,
            }
        }
        _ => return None,
    };

    Some((content, citations))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::models::{NoteChunk, NoteChunkId, NoteFileId, StudyItemKind};
    use crate::service::SubjectContext;

    fn source() -> FixedSource {
        FixedSource::with_chunks(&[
            ("Entropy always increases in an isolated system.", "Page 3"),
            ("Heat flows from hot to cold.", "Page 5"),
        ])
    }

    struct FixedSource {
        context: SubjectContext,
    }

    impl FixedSource {
        fn with_chunks(passages: &[(&str, &str)]) -> Self {
            let file_id = NoteFileId::new(1);
            let chunks = passages
                .iter()
                .enumerate()
                .map(|(i, (text, reference))| NoteChunk {
                    id: NoteChunkId::new(i as i64 + 1),
                    subject_id: SubjectId::new(1),
                    file_id,
                    user_id: UserId::new("u1"),
                    text: text.to_string(),
                    reference: reference.to_string(),
                    embedding: None,
                })
                .collect();
            Self {
                context: SubjectContext {
                    chunks,
                    file_names: HashMap::from([(file_id, "notes.pdf".to_string())]),
                },
            }
        }

        fn empty() -> Self {
            Self {
                context: SubjectContext::default(),
            }
        }
    }

    impl ChunkSource for FixedSource {
        fn subject_context(
            &self,
            _user: &UserId,
            _subject: SubjectId,
            _cap: usize,
        ) -> Result<SubjectContext, RetrievalError> {
            Ok(self.context.clone())
        }
    }

    /// Sink collecting persisted items, optionally failing from index N on.
    struct CollectingSink {
        items: Mutex<Vec<StudyContent>>,
        fail_from: Option<usize>,
    }

    impl CollectingSink {
        fn new() -> Self {
            Self {
                items: Mutex::new(Vec::new()),
                fail_from: None,
            }
        }

        fn failing_from(index: usize) -> Self {
            Self {
                items: Mutex::new(Vec::new()),
                fail_from: Some(index),
            }
        }
    }

    impl StudySink for CollectingSink {
        fn persist_study_item(
            &self,
            _user: &UserId,
            _subject: SubjectId,
            content: &StudyContent,
            _citations: &[Citation],
        ) -> anyhow::Result<StudyItemId> {
            let mut items = self.items.lock().unwrap();
            if let Some(fail_from) = self.fail_from
                && items.len() >= fail_from
            {
                anyhow::bail!("store rejected insert");
            }
            items.push(content.clone());
            Ok(StudyItemId::new(items.len() as i64))
        }
    }

    struct RecordingClient {
        response: String,
        last_request: Mutex<Option<ChatCompletionRequest>>,
    }

    impl RecordingClient {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                last_request: Mutex::new(None),
            }
        }
    }

    impl GenerateClient for RecordingClient {
        fn chat(&self, request: &ChatCompletionRequest) -> Result<String, GenerationError> {
            *self.last_request.lock().unwrap() = Some(request.clone());
            Ok(self.response.clone())
        }
    }

    fn batch_json() -> String {
        serde_json::json!({
            "items": [
                {
                    "type": "mcq",
                    "question": "What happens to entropy in an isolated system?",
                    "options": ["Increases", "Decreases", "Stays constant", "Oscillates"],
                    "correctAnswer": "Increases",
                    "explanation": "Second law.",
                    "citations": [{"fileName": "notes.pdf", "reference": "Page 3", "snippet": "Entropy always increases."}]
                },
                {
                    "type": "short",
                    "question": "Which way does heat flow?",
                    "answer": "From hot to cold.",
                    "explanation": "Stated directly.",
                    "citations": [{"fileName": "notes.pdf", "reference": "Page 5", "snippet": "Heat flows from hot to cold."}]
                }
            ]
        })
        .to_string()
    }

    fn user() -> UserId {
        UserId::new("u1")
    }

    #[test]
    fn split_counts_gives_mcq_the_larger_half() {
        assert_eq!(split_counts(5), (3, 2));
        assert_eq!(split_counts(4), (2, 2));
        assert_eq!(split_counts(3), (2, 1));
        assert_eq!(split_counts(1), (1, 0));
    }

    #[test]
    fn generate_persists_each_parsed_item() {
        let client = Arc::new(RecordingClient::new(&batch_json()));
        let synthesizer = StudySynthesizerBuilder::new()
            .client(client)
            .model("test-model")
            .build();
        let sink = CollectingSink::new();

        let outcome = synthesizer
            .generate(&source(), &sink, &user(), SubjectId::new(1), "Thermodynamics", Some(2))
            .unwrap();

        assert_eq!(outcome.requested, 2);
        assert_eq!(outcome.created, 2);
        assert_eq!(outcome.persist_failures, 0);

        let items = sink.items.lock().unwrap();
        assert_eq!(items[0].kind(), StudyItemKind::Mcq);
        assert_eq!(items[1].kind(), StudyItemKind::Short);
    }

    #[test]
    fn count_five_requests_three_mcq_and_two_short() {
        let client = Arc::new(RecordingClient::new(&batch_json()));
        let synthesizer =
            StudySynthesizer::new(Arc::clone(&client) as Arc<dyn GenerateClient>, "m");
        let sink = CollectingSink::new();

        synthesizer
            .generate(&source(), &sink, &user(), SubjectId::new(1), "Thermodynamics", Some(5))
            .unwrap();

        let seen = client.last_request.lock().unwrap();
        let seen = seen.as_ref().unwrap();
        assert!(seen.system.contains("exactly 3 multiple-choice questions"));
        assert!(seen.system.contains("2 short-answer questions"));
        assert!((seen.temperature - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn bare_array_envelope_is_accepted() {
        let json = serde_json::json!([
            {
                "type": "short",
                "question": "Which way does heat flow?",
                "answer": "From hot to cold.",
                "explanation": "",
                "citations": [{"fileName": "notes.pdf", "reference": "Page 5", "snippet": "Heat flows."}]
            }
        ])
        .to_string();
        assert_eq!(parse_batch(&json).unwrap().len(), 1);
    }

    #[test]
    fn questions_envelope_is_accepted() {
        let json = serde_json::json!({
            "questions": [
                {
                    "type": "short",
                    "question": "Which way does heat flow?",
                    "answer": "From hot to cold.",
                    "citations": [{"fileName": "notes.pdf", "reference": "Page 5", "snippet": "Heat flows."}]
                }
            ]
        })
        .to_string();
        assert_eq!(parse_batch(&json).unwrap().len(), 1);
    }

    #[test]
    fn unparseable_response_is_fatal() {
        let client = Arc::new(RecordingClient::new("I would rather write prose."));
        let synthesizer = StudySynthesizer::new(client, "m");
        let sink = CollectingSink::new();

        let result = synthesizer.generate(
            &source(),
            &sink,
            &user(),
            SubjectId::new(1),
            "Thermodynamics",
            None,
        );

        assert!(matches!(result, Err(SynthesisError::Parse { .. })));
        assert!(sink.items.lock().unwrap().is_empty());
    }

    #[test]
    fn uncited_items_are_dropped() {
        let json = serde_json::json!({
            "items": [
                {
                    "type": "short",
                    "question": "Cited question?",
                    "answer": "Yes.",
                    "citations": [{"fileName": "notes.pdf", "reference": "Page 1", "snippet": "s"}]
                },
                {
                    "type": "short",
                    "question": "Uncited question?",
                    "answer": "Dropped.",
                    "citations": []
                }
            ]
        })
        .to_string();

        let items = parse_batch(&json).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0.question(), "Cited question?");
    }

    #[test]
    fn partial_persistence_is_reported_not_rolled_back() {
        let client = Arc::new(RecordingClient::new(&batch_json()));
        let synthesizer = StudySynthesizer::new(client, "m");
        let sink = CollectingSink::failing_from(1);

        let outcome = synthesizer
            .generate(&source(), &sink, &user(), SubjectId::new(1), "Thermodynamics", Some(2))
            .unwrap();

        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.persist_failures, 1);
        // The first item stays persisted
        assert_eq!(sink.items.lock().unwrap().len(), 1);
    }

    #[test]
    fn empty_subject_cannot_generate() {
        let client = Arc::new(RecordingClient::new(&batch_json()));
        let synthesizer = StudySynthesizer::new(client, "m");
        let sink = CollectingSink::new();

        let result = synthesizer.generate(
            &FixedSource::empty(),
            &sink,
            &user(),
            SubjectId::new(1),
            "Thermodynamics",
            None,
        );

        assert!(matches!(result, Err(SynthesisError::NoNotes)));
    }

    #[test]
    fn zero_count_short_circuits() {
        let client = Arc::new(RecordingClient::new("never called"));
        let synthesizer = StudySynthesizer::new(client, "m");
        let sink = CollectingSink::new();

        let outcome = synthesizer
            .generate(&source(), &sink, &user(), SubjectId::new(1), "Thermodynamics", Some(0))
            .unwrap();
        assert_eq!(outcome.created, 0);
    }
}
