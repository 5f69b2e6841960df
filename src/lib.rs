pub mod answerer;
pub mod blob;
pub mod db;
pub mod llm;
pub mod models;
pub mod ratelimit;
pub mod service;
pub mod study;
pub mod voice;

pub use answerer::{AnswerRequest, NoteAnswerer, NoteAnswererBuilder};
pub use db::Database;
pub use models::{
    ChatMessage, Citation, Confidence, ConversationTurn, GroundedAnswer, NoteChunk, NoteFile,
    StudyModeItem, Subject, SubjectId, UserId,
};
pub use service::{ChunkSource, NoteService};
pub use study::{StudySynthesizer, StudySynthesizerBuilder};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_accessible_from_crate_root() {
        let db = Database::in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn types_accessible_from_crate_root() {
        let user = UserId::new("u1");
        assert_eq!(user.as_str(), "u1");

        let turn = ConversationTurn::user("What is entropy?");
        assert_eq!(turn.content, "What is entropy?");

        assert_eq!(
            answerer::refusal_sentinel("Thermodynamics"),
            "Not found in your notes for Thermodynamics."
        );
    }
}
