use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

use super::{ChatMessageId, SubjectId, UserId};

/// Self-assessed coverage rating attached to a generated answer.
///
/// The rubric given to the model: `High` means the notes directly address
/// the question, `Medium` means partial coverage or inference, `Low` means
/// the topic is barely mentioned or the answer is extrapolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Parse from the wire/stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "High"),
            Self::Medium => write!(f, "Medium"),
            Self::Low => write!(f, "Low"),
        }
    }
}

/// A pointer justifying part of a generated answer.
///
/// Field names serialize in camelCase to match the wire contract the
/// generation backend is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// Display name of the source file, e.g. "notes.pdf".
    pub file_name: String,
    /// Location within the source, e.g. "Page 3".
    pub reference: String,
    /// Verbatim excerpt supporting the claim.
    pub snippet: String,
}

/// The final, policy-checked answer returned to a caller.
///
/// Produced by the grounding layer; every field is always present. A
/// refusal carries the exact sentinel text with `Low` confidence and no
/// citations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundedAnswer {
    pub answer: String,
    pub confidence: Confidence,
    pub citations: Vec<Citation>,
}

/// One entry in a subject's append-only chat log.
///
/// The question is written first; answer, confidence and citations are
/// filled in once generation succeeds. Logs are bulk-deletable per subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique identifier from the store.
    pub id: ChatMessageId,
    /// Subject this exchange belongs to.
    pub subject_id: SubjectId,
    /// The owning user.
    pub user_id: UserId,
    /// The question as asked.
    pub question: String,
    /// The generated answer, if generation completed.
    pub answer: Option<String>,
    /// Confidence attached to the answer.
    pub confidence: Option<Confidence>,
    /// Citations attached to the answer.
    pub citations: Option<Vec<Citation>>,
    /// When the question was asked.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
