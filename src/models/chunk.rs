use serde::{Deserialize, Serialize};

use super::{NoteChunkId, NoteFileId, SubjectId, UserId};

/// An indexed passage of note text, the unit of retrieval.
///
/// Chunks are immutable once created. The optional embedding is stored as
/// serialized text for a future similarity-search path; current retrieval
/// is exhaustive per subject up to a fixed cap and never reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteChunk {
    /// Unique identifier from the store.
    pub id: NoteChunkId,
    /// Subject this passage belongs to.
    pub subject_id: SubjectId,
    /// Source file this passage was extracted from.
    pub file_id: NoteFileId,
    /// The owning user.
    pub user_id: UserId,
    /// The passage text.
    pub text: String,
    /// Human-readable location within the source, e.g. "Page 14, Section 3.4".
    pub reference: String,
    /// Serialized embedding vector, if one was computed at index time.
    pub embedding: Option<String>,
}
