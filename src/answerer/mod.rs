//! Grounded question answering over a subject's notes.
//!
//! The pipeline: fetch the subject's passages, assemble a bounded context
//! block, build the instruction and output schema, invoke the generation
//! backend with the conversation window, then apply the grounding policy to
//! whatever comes back. Chat and voice both drive this module; study-mode
//! generation reuses the retrieval and context pieces.

mod context;
mod grounding;
mod history;
mod note_answerer;
mod prompt;

pub use context::assemble_context;
pub use grounding::{ModelOutput, StructuredAnswer, ground, parse_model_output};
pub(crate) use grounding::citations_from_value;
pub use history::{ConversationWindow, MAX_TURNS, turns_from_log};
pub use note_answerer::{
    AnswerError, AnswerRequest, CHAT_CHUNK_CAP, NoteAnswerer, NoteAnswererBuilder,
};
pub use prompt::{
    GENERIC_FAILURE_NOTICE, answer_schema, no_notes_notice, refusal_sentinel, system_instruction,
};
