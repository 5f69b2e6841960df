use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the user owning an entity.
///
/// The identity provider issues opaque string uids; this newtype keeps them
/// from being confused with subject names or other plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user id from the provider-issued uid.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the uid as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! row_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates the id from a store-assigned row id.
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the underlying id value.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id! {
    /// Unique identifier for a subject.
    ///
    /// Wraps a store row id to prevent accidental mixing with other id types.
    SubjectId
}

row_id! {
    /// Unique identifier for an uploaded note file.
    NoteFileId
}

row_id! {
    /// Unique identifier for an indexed note passage.
    NoteChunkId
}

row_id! {
    /// Unique identifier for a chat log entry.
    ChatMessageId
}

row_id! {
    /// Unique identifier for a generated study item.
    StudyItemId
}
