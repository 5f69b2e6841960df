//! The voice conversation loop.

use thiserror::Error;

use crate::answerer::{AnswerRequest, ConversationWindow, NoteAnswerer};
use crate::models::{SubjectId, UserId};
use crate::service::ChunkSource;

/// Spoken when an answer could not be produced. The session keeps
/// listening afterwards; conversational continuity beats error detail.
const SPOKEN_ERROR_NOTICE: &str =
    "Sorry, I couldn't answer that. Please try asking again.";

/// Errors from the speech devices themselves.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Speech device error: {0}")]
    Device(String),
}

/// Source of transcribed user utterances.
///
/// `listen` blocks until the user finishes an utterance and returns its
/// transcript, or `None` when the user ends the session.
pub trait SpeechCapture {
    fn listen(&mut self) -> Result<Option<String>, SpeechError>;

    /// Stops an in-progress capture. Called when speaking starts, so the
    /// two never overlap.
    fn stop(&mut self);
}

/// Renders assistant answers as speech.
pub trait SpeechSynthesizer {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError>;

    /// Cancels in-progress speech. Called when listening starts; pending
    /// speech is dropped, never queued.
    fn cancel(&mut self);
}

/// What the session is doing right now. Listening and speaking are
/// mutually exclusive; entering one state cancels the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    #[default]
    Idle,
    Listening,
    Speaking,
}

/// One voice conversation over a single subject.
///
/// Owns its in-memory conversation window for the lifetime of the session;
/// the answer pipeline and chunk source are borrowed per call. A new
/// session (or a subject switch) starts with an empty window.
pub struct VoiceSession<C, S> {
    capture: C,
    synthesizer: S,
    window: ConversationWindow,
    state: VoiceState,
}

impl<C: SpeechCapture, S: SpeechSynthesizer> VoiceSession<C, S> {
    /// Creates an idle session around the given speech devices.
    pub fn new(capture: C, synthesizer: S) -> Self {
        Self {
            capture,
            synthesizer,
            window: ConversationWindow::new(),
            state: VoiceState::Idle,
        }
    }

    /// Current session state.
    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// Number of turns accumulated this session.
    pub fn turn_count(&self) -> usize {
        self.window.len()
    }

    /// Clears the conversation window and returns to idle.
    pub fn reset(&mut self) {
        self.window.reset();
        self.state = VoiceState::Idle;
    }

    fn start_listening(&mut self) {
        if self.state == VoiceState::Speaking {
            self.synthesizer.cancel();
        }
        self.state = VoiceState::Listening;
    }

    fn start_speaking(&mut self) {
        if self.state == VoiceState::Listening {
            self.capture.stop();
        }
        self.state = VoiceState::Speaking;
    }

    /// Runs the conversation loop until the user ends the session.
    ///
    /// Each utterance goes through the shared grounded-answer pipeline with
    /// this session's window as history. A failed answer is surfaced as a
    /// spoken notice and the loop resumes listening - generation failures
    /// never end the session. Only a speech-device failure does.
    pub fn run(
        &mut self,
        answerer: &NoteAnswerer,
        source: &dyn ChunkSource,
        user: &UserId,
        subject: SubjectId,
        subject_name: &str,
    ) -> Result<(), SpeechError> {
        loop {
            self.start_listening();
            let Some(transcript) = self.capture.listen()? else {
                self.state = VoiceState::Idle;
                return Ok(());
            };
            let transcript = transcript.trim().to_string();
            if transcript.is_empty() {
                continue;
            }

            let request = AnswerRequest {
                user: user.clone(),
                subject,
                subject_name: subject_name.to_string(),
                question: transcript.clone(),
                history: self.window.windowed().to_vec(),
            };

            match answerer.answer(source, &request) {
                Ok(answer) => {
                    self.window.push_user(transcript);
                    self.window.push_assistant(answer.answer.clone());
                    self.start_speaking();
                    self.synthesizer.speak(&answer.answer)?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "voice answer failed; resuming listening");
                    self.start_speaking();
                    self.synthesizer.speak(SPOKEN_ERROR_NOTICE)?;
                }
            }
        }
    }
}
