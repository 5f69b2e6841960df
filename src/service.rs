use std::collections::HashMap;

use anyhow::Result;
use rusqlite::OptionalExtension;
use thiserror::Error;
use time::OffsetDateTime;

use crate::blob::BlobStore;
use crate::db::Database;
use crate::models::{
    ChatMessage, ChatMessageId, Citation, Confidence, FileKind, GroundedAnswer, NoteChunk,
    NoteChunkId, NoteFile, NoteFileId, StudyContent, StudyItemId, StudyModeItem, Subject,
    SubjectId, UserId,
};

/// A user owns at most this many subjects, enforced at creation.
pub const MAX_SUBJECTS_PER_USER: usize = 3;

/// Error raised when the note store cannot serve a retrieval request.
///
/// Zero chunks is NOT an error - callers must treat an empty context as the
/// valid "no notes yet" state. This error only signals an unreachable or
/// failing store.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("note store unavailable: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Read-only view of a subject's indexed passages for one request.
///
/// `file_names` maps each referenced file id to its display name so the
/// context assembler can render citation sources without further lookups.
#[derive(Debug, Clone, Default)]
pub struct SubjectContext {
    pub chunks: Vec<NoteChunk>,
    pub file_names: HashMap<NoteFileId, String>,
}

impl SubjectContext {
    /// True when the subject has no indexed passages.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Source of indexed passages for the generation pipelines.
///
/// Implemented by `NoteService`; mocked in pipeline tests. No ordering is
/// guaranteed beyond being stable for an unchanged store.
pub trait ChunkSource {
    /// Fetches up to `cap` passages for `(user, subject)` plus the display
    /// names of the files they came from.
    fn subject_context(
        &self,
        user: &UserId,
        subject: SubjectId,
        cap: usize,
    ) -> Result<SubjectContext, RetrievalError>;
}

/// Service layer providing subject, file, chunk, chat and study-item
/// management on top of the database.
///
/// NoteService owns a Database instance and provides high-level business
/// logic for the study assistant. It is UI-independent and shared by the
/// CLI, chat and voice surfaces.
pub struct NoteService {
    db: Database,
}

impl NoteService {
    /// Creates a new NoteService with the given database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns a reference to the underlying database.
    ///
    /// Useful for testing or advanced operations that need direct access.
    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- subjects ---

    /// Creates a new subject for the user.
    ///
    /// Fails when the user already owns `MAX_SUBJECTS_PER_USER` subjects.
    pub fn create_subject(&self, user: &UserId, name: &str) -> Result<Subject> {
        if name.trim().is_empty() {
            anyhow::bail!("Subject name cannot be empty");
        }

        let conn = self.db.connection();
        let owned: i64 = conn.query_row(
            "SELECT COUNT(*) FROM subjects WHERE user_id = ?1",
            [user.as_str()],
            |row| row.get(0),
        )?;
        if owned as usize >= MAX_SUBJECTS_PER_USER {
            anyhow::bail!(
                "Subject limit reached: at most {} subjects per user",
                MAX_SUBJECTS_PER_USER
            );
        }

        let now = OffsetDateTime::now_utc().unix_timestamp();
        conn.execute(
            "INSERT INTO subjects (user_id, name, created_at) VALUES (?1, ?2, ?3)",
            (user.as_str(), name, now),
        )?;

        Ok(Subject {
            id: SubjectId::new(conn.last_insert_rowid()),
            user_id: user.clone(),
            name: name.to_string(),
            created_at: OffsetDateTime::from_unix_timestamp(now)?,
        })
    }

    /// Lists the user's subjects, oldest first.
    pub fn list_subjects(&self, user: &UserId) -> Result<Vec<Subject>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT id, name, created_at FROM subjects WHERE user_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map([user.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut subjects = Vec::new();
        for row in rows {
            let (id, name, created_at) = row?;
            subjects.push(Subject {
                id: SubjectId::new(id),
                user_id: user.clone(),
                name,
                created_at: OffsetDateTime::from_unix_timestamp(created_at)?,
            });
        }
        Ok(subjects)
    }

    /// Retrieves one of the user's subjects by id.
    ///
    /// Returns `None` when the subject does not exist or belongs to another
    /// user; ownership mismatches are indistinguishable from absence.
    pub fn get_subject(&self, user: &UserId, id: SubjectId) -> Result<Option<Subject>> {
        let conn = self.db.connection();
        let row = conn
            .query_row(
                "SELECT name, created_at FROM subjects WHERE id = ?1 AND user_id = ?2",
                (id.get(), user.as_str()),
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        match row {
            Some((name, created_at)) => Ok(Some(Subject {
                id,
                user_id: user.clone(),
                name,
                created_at: OffsetDateTime::from_unix_timestamp(created_at)?,
            })),
            None => Ok(None),
        }
    }

    /// Deletes a subject and everything scoped to it.
    ///
    /// The store does not cascade subject deletion, so files, chunks, the
    /// chat log and study items are removed explicitly here in one
    /// transaction. Blob deletion is best-effort: a failed blob removal is
    /// logged and does not abort the cleanup.
    pub fn delete_subject(
        &self,
        user: &UserId,
        id: SubjectId,
        blobs: &dyn BlobStore,
    ) -> Result<()> {
        // Collect blob refs before the rows disappear
        let blob_refs: Vec<String> = {
            let conn = self.db.connection();
            let mut stmt = conn.prepare(
                "SELECT blob_ref FROM note_files WHERE subject_id = ?1 AND user_id = ?2",
            )?;
            let refs = stmt.query_map((id.get(), user.as_str()), |row| row.get(0))?;
            refs.collect::<std::result::Result<_, _>>()?
        };

        let conn = self.db.connection();
        conn.execute("BEGIN TRANSACTION", [])?;

        let result: Result<()> = (|| {
            conn.execute(
                "DELETE FROM note_chunks WHERE subject_id = ?1 AND user_id = ?2",
                (id.get(), user.as_str()),
            )?;
            conn.execute(
                "DELETE FROM note_files WHERE subject_id = ?1 AND user_id = ?2",
                (id.get(), user.as_str()),
            )?;
            conn.execute(
                "DELETE FROM chat_messages WHERE subject_id = ?1 AND user_id = ?2",
                (id.get(), user.as_str()),
            )?;
            conn.execute(
                "DELETE FROM study_items WHERE subject_id = ?1 AND user_id = ?2",
                (id.get(), user.as_str()),
            )?;
            conn.execute(
                "DELETE FROM subjects WHERE id = ?1 AND user_id = ?2",
                (id.get(), user.as_str()),
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => conn.execute("COMMIT", [])?,
            Err(e) => {
                conn.execute("ROLLBACK", []).ok();
                return Err(e);
            }
        };

        for blob_ref in blob_refs {
            if let Err(e) = blobs.delete(&blob_ref) {
                tracing::warn!(blob_ref = %blob_ref, error = %e, "blob cleanup failed during subject delete");
            }
        }

        Ok(())
    }

    // --- files and chunks ---

    /// Registers an uploaded file's metadata.
    pub fn create_file(
        &self,
        user: &UserId,
        subject: SubjectId,
        name: &str,
        kind: FileKind,
        blob_ref: &str,
    ) -> Result<NoteFile> {
        let conn = self.db.connection();
        let now = OffsetDateTime::now_utc().unix_timestamp();

        conn.execute(
            "INSERT INTO note_files (subject_id, user_id, name, kind, blob_ref, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                subject.get(),
                user.as_str(),
                name,
                kind.to_string(),
                blob_ref,
                now,
            ),
        )?;

        Ok(NoteFile {
            id: NoteFileId::new(conn.last_insert_rowid()),
            subject_id: subject,
            user_id: user.clone(),
            name: name.to_string(),
            kind,
            blob_ref: blob_ref.to_string(),
            uploaded_at: OffsetDateTime::from_unix_timestamp(now)?,
        })
    }

    /// Lists a subject's files, oldest first.
    pub fn list_files(&self, user: &UserId, subject: SubjectId) -> Result<Vec<NoteFile>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT id, name, kind, blob_ref, uploaded_at
             FROM note_files WHERE subject_id = ?1 AND user_id = ?2 ORDER BY id",
        )?;

        let rows = stmt.query_map((subject.get(), user.as_str()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut files = Vec::new();
        for row in rows {
            let (id, name, kind, blob_ref, uploaded_at) = row?;
            let kind = FileKind::parse(&kind)
                .ok_or_else(|| anyhow::anyhow!("Unknown file kind in store: {kind}"))?;
            files.push(NoteFile {
                id: NoteFileId::new(id),
                subject_id: subject,
                user_id: user.clone(),
                name,
                kind,
                blob_ref,
                uploaded_at: OffsetDateTime::from_unix_timestamp(uploaded_at)?,
            });
        }
        Ok(files)
    }

    /// Deletes a file, its indexed chunks (store cascade) and its blob.
    ///
    /// Blob deletion is best-effort: failure is logged and swallowed so the
    /// metadata removal always wins.
    pub fn delete_file(
        &self,
        user: &UserId,
        file_id: NoteFileId,
        blobs: &dyn BlobStore,
    ) -> Result<()> {
        let conn = self.db.connection();

        let blob_ref: Option<String> = conn
            .query_row(
                "SELECT blob_ref FROM note_files WHERE id = ?1 AND user_id = ?2",
                (file_id.get(), user.as_str()),
                |row| row.get(0),
            )
            .optional()?;

        conn.execute(
            "DELETE FROM note_files WHERE id = ?1 AND user_id = ?2",
            (file_id.get(), user.as_str()),
        )?;

        if let Some(blob_ref) = blob_ref {
            if let Err(e) = blobs.delete(&blob_ref) {
                tracing::warn!(blob_ref = %blob_ref, error = %e, "blob cleanup failed during file delete");
            }
        }

        Ok(())
    }

    /// Indexes one passage of a file.
    ///
    /// Chunks are immutable once created; there is no update path.
    pub fn add_chunk(
        &self,
        user: &UserId,
        subject: SubjectId,
        file: NoteFileId,
        text: &str,
        reference: &str,
        embedding: Option<&str>,
    ) -> Result<NoteChunk> {
        let conn = self.db.connection();
        conn.execute(
            "INSERT INTO note_chunks (subject_id, file_id, user_id, text, reference, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                subject.get(),
                file.get(),
                user.as_str(),
                text,
                reference,
                embedding,
            ),
        )?;

        Ok(NoteChunk {
            id: NoteChunkId::new(conn.last_insert_rowid()),
            subject_id: subject,
            file_id: file,
            user_id: user.clone(),
            text: text.to_string(),
            reference: reference.to_string(),
            embedding: embedding.map(String::from),
        })
    }

    /// Counts a subject's indexed passages.
    pub fn count_chunks(&self, user: &UserId, subject: SubjectId) -> Result<usize> {
        let conn = self.db.connection();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM note_chunks WHERE subject_id = ?1 AND user_id = ?2",
            (subject.get(), user.as_str()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // --- chat log ---

    /// Appends a question to the subject's chat log.
    ///
    /// The answer fields stay empty until `record_answer` fills them in, so
    /// a crash mid-generation leaves a question with no answer rather than
    /// partial answer data.
    pub fn append_question(
        &self,
        user: &UserId,
        subject: SubjectId,
        question: &str,
    ) -> Result<ChatMessageId> {
        let conn = self.db.connection();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        conn.execute(
            "INSERT INTO chat_messages (subject_id, user_id, question, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            (subject.get(), user.as_str(), question, now),
        )?;
        Ok(ChatMessageId::new(conn.last_insert_rowid()))
    }

    /// Records the grounded answer for a previously appended question.
    pub fn record_answer(&self, message: ChatMessageId, answer: &GroundedAnswer) -> Result<()> {
        let conn = self.db.connection();
        let citations = serde_json::to_string(&answer.citations)?;
        conn.execute(
            "UPDATE chat_messages SET answer = ?1, confidence = ?2, citations = ?3 WHERE id = ?4",
            (
                &answer.answer,
                answer.confidence.to_string(),
                citations,
                message.get(),
            ),
        )?;
        Ok(())
    }

    /// Returns the most recent `limit` chat messages in chronological order.
    pub fn recent_messages(
        &self,
        user: &UserId,
        subject: SubjectId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT id, question, answer, confidence, citations, created_at
             FROM chat_messages WHERE subject_id = ?1 AND user_id = ?2
             ORDER BY id DESC LIMIT ?3",
        )?;

        let rows = stmt.query_map((subject.get(), user.as_str(), limit as i64), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, question, answer, confidence, citations, created_at) = row?;
            let citations: Option<Vec<Citation>> = match citations {
                Some(json) => Some(serde_json::from_str(&json)?),
                None => None,
            };
            messages.push(ChatMessage {
                id: ChatMessageId::new(id),
                subject_id: subject,
                user_id: user.clone(),
                question,
                answer,
                confidence: confidence.as_deref().and_then(Confidence::parse),
                citations,
                created_at: OffsetDateTime::from_unix_timestamp(created_at)?,
            });
        }

        // Query returned newest-first; callers want chronological order
        messages.reverse();
        Ok(messages)
    }

    /// Deletes the subject's entire chat log. Returns the number removed.
    pub fn clear_chat(&self, user: &UserId, subject: SubjectId) -> Result<usize> {
        let conn = self.db.connection();
        let removed = conn.execute(
            "DELETE FROM chat_messages WHERE subject_id = ?1 AND user_id = ?2",
            (subject.get(), user.as_str()),
        )?;
        Ok(removed)
    }

    // --- study items ---

    /// Persists one generated study item.
    pub fn create_study_item(
        &self,
        user: &UserId,
        subject: SubjectId,
        content: &StudyContent,
        citations: &[Citation],
    ) -> Result<StudyModeItem> {
        let conn = self.db.connection();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let content_json = serde_json::to_string(content)?;
        let citations_json = serde_json::to_string(citations)?;

        conn.execute(
            "INSERT INTO study_items (subject_id, user_id, kind, content, citations, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                subject.get(),
                user.as_str(),
                content.kind().to_string(),
                content_json,
                citations_json,
                now,
            ),
        )?;

        Ok(StudyModeItem {
            id: StudyItemId::new(conn.last_insert_rowid()),
            subject_id: subject,
            user_id: user.clone(),
            content: content.clone(),
            citations: citations.to_vec(),
            created_at: OffsetDateTime::from_unix_timestamp(now)?,
        })
    }

    /// Lists a subject's study items, oldest first.
    pub fn list_study_items(
        &self,
        user: &UserId,
        subject: SubjectId,
    ) -> Result<Vec<StudyModeItem>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT id, content, citations, created_at
             FROM study_items WHERE subject_id = ?1 AND user_id = ?2 ORDER BY id",
        )?;

        let rows = stmt.query_map((subject.get(), user.as_str()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, content, citations, created_at) = row?;
            items.push(StudyModeItem {
                id: StudyItemId::new(id),
                subject_id: subject,
                user_id: user.clone(),
                content: serde_json::from_str(&content)?,
                citations: serde_json::from_str(&citations)?,
                created_at: OffsetDateTime::from_unix_timestamp(created_at)?,
            });
        }
        Ok(items)
    }
}

impl ChunkSource for NoteService {
    fn subject_context(
        &self,
        user: &UserId,
        subject: SubjectId,
        cap: usize,
    ) -> Result<SubjectContext, RetrievalError> {
        let conn = self.db.connection();

        let mut stmt = conn.prepare(
            "SELECT c.id, c.file_id, c.text, c.reference, c.embedding, f.name
             FROM note_chunks c
             JOIN note_files f ON c.file_id = f.id
             WHERE c.subject_id = ?1 AND c.user_id = ?2
             ORDER BY c.id
             LIMIT ?3",
        )?;

        let rows = stmt.query_map((subject.get(), user.as_str(), cap as i64), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut context = SubjectContext::default();
        for row in rows {
            let (id, file_id, text, reference, embedding, file_name) = row?;
            let file_id = NoteFileId::new(file_id);
            context.file_names.entry(file_id).or_insert(file_name);
            context.chunks.push(NoteChunk {
                id: NoteChunkId::new(id),
                subject_id: subject,
                file_id,
                user_id: user.clone(),
                text,
                reference,
                embedding,
            });
        }

        tracing::debug!(
            subject = subject.get(),
            chunks = context.chunks.len(),
            files = context.file_names.len(),
            "retrieved subject context"
        );
        Ok(context)
    }
}

/// Splits plain text into indexable passages.
///
/// Paragraph-based: blank lines delimit passages, and each passage gets a
/// "Paragraph N" location reference. Used by the CLI txt ingestion path;
/// richer extraction (pages, sections) happens upstream of this crate.
pub fn split_passages(text: &str) -> Vec<(String, String)> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(i, p)| (p.to_string(), format!("Paragraph {}", i + 1)))
        .collect()
}
