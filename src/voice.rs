//! Voice interaction surface.
//!
//! Speech capture and synthesis are external capabilities (the hosting
//! environment's speech stack) behind small traits; this module owns the
//! conversational loop that connects them to the answer pipeline.

mod console;
mod session;

pub use console::ConsoleSpeech;
pub use session::{SpeechCapture, SpeechError, SpeechSynthesizer, VoiceSession, VoiceState};
