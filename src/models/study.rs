use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

use super::{Citation, StudyItemId, SubjectId, UserId};

/// The two kinds of generated study questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyItemKind {
    /// Multiple choice with options and one correct answer.
    Mcq,
    /// Short free-text answer.
    Short,
}

impl StudyItemKind {
    /// Parse from the wire/stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mcq" => Some(Self::Mcq),
            "short" => Some(Self::Short),
            _ => None,
        }
    }
}

impl fmt::Display for StudyItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mcq => write!(f, "mcq"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Kind-specific fields of a study item.
///
/// Serialized as JSON in the store's content column. The variants have
/// disjoint field sets, so untagged deserialization is unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StudyContent {
    #[serde(rename_all = "camelCase")]
    Mcq {
        question: String,
        options: Vec<String>,
        correct_answer: String,
        explanation: String,
    },
    #[serde(rename_all = "camelCase")]
    Short {
        question: String,
        answer: String,
        explanation: String,
    },
}

impl StudyContent {
    /// Returns the kind tag matching this content.
    pub fn kind(&self) -> StudyItemKind {
        match self {
            Self::Mcq { .. } => StudyItemKind::Mcq,
            Self::Short { .. } => StudyItemKind::Short,
        }
    }

    /// Returns the question text.
    pub fn question(&self) -> &str {
        match self {
            Self::Mcq { question, .. } | Self::Short { question, .. } => question,
        }
    }
}

/// A generated quiz question persisted for later review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyModeItem {
    /// Unique identifier from the store.
    pub id: StudyItemId,
    /// Subject this item was generated for.
    pub subject_id: SubjectId,
    /// The owning user.
    pub user_id: UserId,
    /// Kind-specific question content.
    pub content: StudyContent,
    /// Citations pointing at the passages the item was drawn from.
    pub citations: Vec<Citation>,
    /// When this item was generated.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
