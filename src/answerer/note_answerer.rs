//! The grounded-answer pipeline shared by the chat and voice surfaces.

use std::sync::Arc;

use thiserror::Error;

use crate::llm::{ChatCompletionRequest, GenerateClient, GenerationError};
use crate::models::{ConversationTurn, GroundedAnswer, SubjectId, UserId};
use crate::service::{ChunkSource, RetrievalError};

use super::context::assemble_context;
use super::grounding::{ground, parse_model_output};
use super::history::MAX_TURNS;
use super::prompt::{answer_schema, system_instruction};

/// Retrieval cap for chat and voice answering.
pub const CHAT_CHUNK_CAP: usize = 100;

/// Sampling temperature for grounded Q&A; low to favor determinism.
const ANSWER_TEMPERATURE: f32 = 0.3;

/// Output-length ceiling for one answer.
const MAX_ANSWER_TOKENS: u32 = 1024;

/// Errors a grounded-answer request can surface to its caller.
///
/// Malformed backend output is NOT an error: it is recovered into a
/// degraded answer by the grounding policy. Only an unreachable store or a
/// failed backend call bubbles up, and neither is retried here.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// One grounded-answer request.
///
/// `history` is the caller's conversation window; anything beyond the
/// most recent [`MAX_TURNS`] turns is cut before the backend sees it.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub user: UserId,
    pub subject: SubjectId,
    pub subject_name: String,
    pub question: String,
    pub history: Vec<ConversationTurn>,
}

/// Builder for constructing `NoteAnswerer` instances.
#[derive(Default)]
pub struct NoteAnswererBuilder {
    client: Option<Arc<dyn GenerateClient>>,
    model: Option<String>,
}

impl NoteAnswererBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the generation client to use.
    pub fn client(mut self, client: Arc<dyn GenerateClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the model used for answering.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builds the `NoteAnswerer`.
    ///
    /// # Panics
    ///
    /// Panics if `client()` or `model()` was not called.
    #[must_use]
    pub fn build(self) -> NoteAnswerer {
        NoteAnswerer {
            client: self.client.expect("client must be set via client() method"),
            model: self.model.expect("model must be set via model() method"),
        }
    }
}

/// Answers subject-scoped questions from indexed note passages.
///
/// Owns nothing but the backend client and model name; the chunk source and
/// conversation history are borrowed per request, so one answerer serves
/// any number of independent conversations.
pub struct NoteAnswerer {
    client: Arc<dyn GenerateClient>,
    model: String,
}

impl NoteAnswerer {
    /// Creates a new `NoteAnswerer` with the specified client and model.
    #[must_use]
    pub fn new(client: Arc<dyn GenerateClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Runs the full pipeline for one question.
    ///
    /// Retrieval happens even when it will find nothing, and the backend is
    /// called even with an empty subject - the grounding policy then pins
    /// the result to the exact refusal sentinel. This keeps the no-notes
    /// path on the same code path as every other request.
    pub fn answer(
        &self,
        source: &dyn ChunkSource,
        request: &AnswerRequest,
    ) -> Result<GroundedAnswer, AnswerError> {
        let context = source.subject_context(&request.user, request.subject, CHAT_CHUNK_CAP)?;
        let assembled = assemble_context(&context.chunks, &context.file_names);
        let had_context = assembled.is_some();

        let start = request.history.len().saturating_sub(MAX_TURNS);
        let windowed = &request.history[start..];

        let completion = ChatCompletionRequest {
            model: self.model.clone(),
            system: system_instruction(&request.subject_name, assembled.as_deref()),
            history: windowed.to_vec(),
            question: request.question.clone(),
            format: Some(answer_schema()),
            temperature: ANSWER_TEMPERATURE,
            max_tokens: MAX_ANSWER_TOKENS,
        };

        let raw = self.client.chat(&completion)?;
        let output = parse_model_output(&raw);

        tracing::debug!(
            subject = %request.subject_name,
            passages = context.chunks.len(),
            degraded = matches!(output, super::grounding::ModelOutput::Degraded(_)),
            "grounded answer produced"
        );

        Ok(ground(output, &request.subject_name, had_context))
    }
}
