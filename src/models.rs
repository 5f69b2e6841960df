mod chat;
mod chunk;
mod ids;
mod note_file;
mod study;
mod subject;
mod turn;

pub use chat::{ChatMessage, Citation, Confidence, GroundedAnswer};
pub use chunk::NoteChunk;
pub use ids::{ChatMessageId, NoteChunkId, NoteFileId, StudyItemId, SubjectId, UserId};
pub use note_file::{FileKind, NoteFile};
pub use study::{StudyContent, StudyItemKind, StudyModeItem};
pub use subject::Subject;
pub use turn::{ConversationTurn, Role};
