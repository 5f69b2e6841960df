/// Complete database schema for the study assistant.
///
/// Uses CREATE TABLE/INDEX IF NOT EXISTS for idempotent execution.
/// All statements are designed to be run in a single transaction.
///
/// Subject deletion is NOT cascaded here: the service layer removes a
/// subject's files, chunks, chat log and study items explicitly. The only
/// store-level cascade is file -> chunks.
pub const INITIAL_SCHEMA: &str = r#"
-- Subjects: the top-level scope for everything else
CREATE TABLE IF NOT EXISTS subjects (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at INTEGER
);

-- Uploaded note files; binary contents live in the blob store
CREATE TABLE IF NOT EXISTS note_files (
    id INTEGER PRIMARY KEY,
    subject_id INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    blob_ref TEXT NOT NULL,
    uploaded_at INTEGER
);

-- Indexed passages; the unit of retrieval
CREATE TABLE IF NOT EXISTS note_chunks (
    id INTEGER PRIMARY KEY,
    subject_id INTEGER NOT NULL,
    file_id INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    text TEXT NOT NULL,
    reference TEXT NOT NULL,
    embedding TEXT,
    FOREIGN KEY (file_id) REFERENCES note_files(id) ON DELETE CASCADE
);

-- Append-only chat log per subject
CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY,
    subject_id INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    question TEXT NOT NULL,
    answer TEXT,
    confidence TEXT,
    citations TEXT,
    created_at INTEGER
);

-- Generated quiz questions
CREATE TABLE IF NOT EXISTS study_items (
    id INTEGER PRIMARY KEY,
    subject_id INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    content TEXT NOT NULL,
    citations TEXT NOT NULL,
    created_at INTEGER
);

-- Ownership lookups all filter by (user_id, subject_id)
CREATE INDEX IF NOT EXISTS idx_subjects_user ON subjects(user_id);
CREATE INDEX IF NOT EXISTS idx_files_user_subject ON note_files(user_id, subject_id);
CREATE INDEX IF NOT EXISTS idx_chunks_user_subject ON note_chunks(user_id, subject_id);
CREATE INDEX IF NOT EXISTS idx_chunks_file ON note_chunks(file_id);
CREATE INDEX IF NOT EXISTS idx_messages_user_subject ON chat_messages(user_id, subject_id);
CREATE INDEX IF NOT EXISTS idx_study_user_subject ON study_items(user_id, subject_id);
"#;
