//! Bounded conversation state for multi-turn coherence.

use crate::models::{ChatMessage, ConversationTurn};

/// Maximum turns (either role) sent with a request.
pub const MAX_TURNS: usize = 10;

/// Rolling window of prior conversation turns.
///
/// One window per active conversation, owned by the caller's session: the
/// chat surface rebuilds it from the persisted message log, the voice
/// surface keeps one in memory for the session's lifetime. Windows are
/// never shared across subjects or users; switching subject or clearing
/// history resets the window.
#[derive(Debug, Default)]
pub struct ConversationWindow {
    turns: Vec<ConversationTurn>,
}

impl ConversationWindow {
    /// Creates an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user turn.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::user(content));
    }

    /// Appends an assistant turn. Called only after a successful answer.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::assistant(content));
    }

    /// The most recent `MAX_TURNS` turns, oldest first.
    ///
    /// This is the view sent to the backend; older turns stay stored but
    /// never travel.
    pub fn windowed(&self) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(MAX_TURNS);
        &self.turns[start..]
    }

    /// Drops all but the most recent `n` turns.
    pub fn truncate_to(&mut self, n: usize) {
        let excess = self.turns.len().saturating_sub(n);
        self.turns.drain(..excess);
    }

    /// Clears the window entirely.
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    /// Number of stored turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when no turns are stored.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Materializes a window from persisted chat messages.
///
/// Each message contributes its question as a user turn and, when an answer
/// was recorded, that answer as an assistant turn. Messages must be in
/// chronological order (as `recent_messages` returns them).
pub fn turns_from_log(messages: &[ChatMessage]) -> ConversationWindow {
    let mut window = ConversationWindow::new();
    for message in messages {
        window.push_user(message.question.clone());
        if let Some(answer) = &message.answer {
            window.push_assistant(answer.clone());
        }
    }
    window
}
