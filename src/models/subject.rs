use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{SubjectId, UserId};

/// A subject of study owned by a single user.
///
/// Subjects scope everything else in the system: files, passages, chat
/// history and study items all belong to exactly one subject. A user may
/// own at most a small fixed number of subjects, enforced at creation by
/// the service layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Unique identifier from the store.
    pub id: SubjectId,
    /// The owning user.
    pub user_id: UserId,
    /// Display name, e.g. "Thermodynamics".
    pub name: String,
    /// When this subject was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
