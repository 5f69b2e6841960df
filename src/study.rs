//! Study-mode quiz generation from indexed note passages.

mod synthesizer;

pub use synthesizer::{
    DEFAULT_QUESTION_COUNT, STUDY_CHUNK_CAP, StudyBatchOutcome, StudySink, StudySynthesizer,
    StudySynthesizerBuilder, SynthesisError, split_counts,
};
