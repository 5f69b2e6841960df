use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

use super::{NoteFileId, SubjectId, UserId};

/// Supported note file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Txt,
}

impl FileKind {
    /// Parse from the stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Txt => write!(f, "txt"),
        }
    }
}

/// Metadata for an uploaded note file.
///
/// The binary contents live in the blob store under `blob_ref`; this record
/// only carries the metadata the retrieval pipeline needs. Deleting a file
/// removes the record and best-effort deletes the blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFile {
    /// Unique identifier from the store.
    pub id: NoteFileId,
    /// Subject this file belongs to.
    pub subject_id: SubjectId,
    /// The owning user.
    pub user_id: UserId,
    /// Display name shown in citations, e.g. "notes.pdf".
    pub name: String,
    /// File format.
    pub kind: FileKind,
    /// Reference into the blob store.
    pub blob_ref: String,
    /// When this file was uploaded.
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
}
