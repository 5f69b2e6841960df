//! Context assembly: turning retrieved passages into one prompt block.

use std::collections::HashMap;

use crate::models::{NoteChunk, NoteFileId};

/// Separator between rendered passages.
const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Joins passages into a single bounded context block.
///
/// Each passage renders as
///
/// ```text
/// [Passage <i>] (Source: <fileName>, <reference>)
/// <chunkText>
/// ```
///
/// with `i` 1-based in iteration order of the input list, so assembly is
/// deterministic for a given input. Returns `None` for an empty chunk list;
/// the prompt layer renders a "no notes" notice instead of an empty block.
pub fn assemble_context(
    chunks: &[NoteChunk],
    file_names: &HashMap<NoteFileId, String>,
) -> Option<String> {
    if chunks.is_empty() {
        return None;
    }

    let block = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let file_name = file_names
                .get(&chunk.file_id)
                .map(String::as_str)
                .unwrap_or("unknown file");
            format!(
                "[Passage {}] (Source: {}, {})\n{}",
                i + 1,
                file_name,
                chunk.reference,
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR);

    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NoteChunkId, SubjectId, UserId};

    fn chunk(id: i64, file_id: i64, text: &str, reference: &str) -> NoteChunk {
        NoteChunk {
            id: NoteChunkId::new(id),
            subject_id: SubjectId::new(1),
            file_id: NoteFileId::new(file_id),
            user_id: UserId::new("u1"),
            text: text.to_string(),
            reference: reference.to_string(),
            embedding: None,
        }
    }

    fn names(entries: &[(i64, &str)]) -> HashMap<NoteFileId, String> {
        entries
            .iter()
            .map(|(id, name)| (NoteFileId::new(*id), name.to_string()))
            .collect()
    }

    #[test]
    fn empty_chunk_list_yields_no_context() {
        assert_eq!(assemble_context(&[], &HashMap::new()), None);
    }

    #[test]
    fn passages_are_numbered_and_sourced() {
        let chunks = vec![
            chunk(1, 10, "Entropy always increases.", "Page 3"),
            chunk(2, 10, "Heat flows from hot to cold.", "Page 5"),
        ];
        let context = assemble_context(&chunks, &names(&[(10, "notes.pdf")])).unwrap();

        assert_eq!(
            context,
            "[Passage 1] (Source: notes.pdf, Page 3)\nEntropy always increases.\n\n---\n\n[Passage 2] (Source: notes.pdf, Page 5)\nHeat flows from hot to cold."
        );
    }

    #[test]
    fn assembly_is_deterministic_for_identical_input() {
        let chunks = vec![
            chunk(1, 10, "First passage.", "Page 1"),
            chunk(2, 11, "Second passage.", "Page 2"),
        ];
        let file_names = names(&[(10, "a.pdf"), (11, "b.txt")]);

        let first = assemble_context(&chunks, &file_names).unwrap();
        let second = assemble_context(&chunks, &file_names).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_file_id_falls_back_without_panicking() {
        let chunks = vec![chunk(1, 99, "Orphaned passage.", "Page 1")];
        let context = assemble_context(&chunks, &HashMap::new()).unwrap();
        assert!(context.contains("(Source: unknown file, Page 1)"));
    }
}
