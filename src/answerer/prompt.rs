//! Instruction and output-schema construction for grounded answering.

use serde_json::json;

/// Answer substituted when the backend returns nothing usable.
pub const GENERIC_FAILURE_NOTICE: &str = "I couldn't generate a response.";

/// System instruction template for grounded question answering.
///
/// The refusal sentinel is machine-checked downstream, so rule 2 spells it
/// out verbatim rather than describing it.
const INSTRUCTION_TEMPLATE: &str = r#"You are a study assistant for the subject "{subject}". Answer the student's question using ONLY the note passages provided below.

CRITICAL RULES:
1. ONLY use information from the provided passages - do not add outside knowledge
2. If the question falls outside "{subject}" or the passages do not cover it, the "answer" field must be exactly: {sentinel}
3. Every claim drawn from a passage must carry a citation giving the source file name, its location reference, and a verbatim snippet from the passage
4. Set "confidence" to "High" when the passages directly address the question, "Medium" when coverage is partial or inferred, "Low" when the topic is barely mentioned or you are extrapolating
5. Use the conversation history to resolve follow-ups like "give an example" or "compare that with the previous answer"

NOTE PASSAGES:
{context}

Respond with a single JSON object with fields "answer" (string), "confidence" ("High", "Medium" or "Low") and "citations" (array of objects with "fileName", "reference" and "snippet")."#;

/// The exact refusal string for out-of-scope or uncovered questions.
///
/// Machine-matched, not advisory: the grounding policy compares answers
/// against this exact text, so casing and punctuation matter.
pub fn refusal_sentinel(subject_name: &str) -> String {
    format!("Not found in your notes for {subject_name}.")
}

/// Notice rendered in place of the context block when no passages exist.
pub fn no_notes_notice(subject_name: &str) -> String {
    format!("No notes have been uploaded for {subject_name} yet.")
}

/// Builds the system instruction for one request.
///
/// `context` is the assembled passage block, or `None` when the subject has
/// no indexed passages; the request is still issued in that case, with the
/// no-notes notice biasing the model toward the refusal sentinel.
pub fn system_instruction(subject_name: &str, context: Option<&str>) -> String {
    let context = match context {
        Some(block) => block.to_string(),
        None => no_notes_notice(subject_name),
    };

    INSTRUCTION_TEMPLATE
        .replace("{subject}", subject_name)
        .replace("{sentinel}", &refusal_sentinel(subject_name))
        .replace("{context}", &context)
}

/// JSON schema for the structured answer, passed to the backend as the
/// output format rather than merely requested in prose.
pub fn answer_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "answer": { "type": "string" },
            "confidence": { "type": "string", "enum": ["High", "Medium", "Low"] },
            "citations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "fileName": { "type": "string" },
                        "reference": { "type": "string" },
                        "snippet": { "type": "string" }
                    },
                    "required": ["fileName", "reference", "snippet"]
                }
            }
        },
        "required": ["answer", "confidence", "citations"]
    })
}
