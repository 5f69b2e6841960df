//! Console stand-in for the speech devices.
//!
//! Real capture and synthesis live in the hosting environment's speech
//! stack; this implementation types and reads instead of speaking and
//! listening so the session loop can be driven end to end from a terminal.

use std::io::{BufRead, Write};

use super::session::{SpeechCapture, SpeechError, SpeechSynthesizer};

/// Reads utterances from stdin and "speaks" answers to stdout.
///
/// An empty prompt ended with EOF, or the words `quit` / `exit`, end the
/// session.
#[derive(Debug, Default)]
pub struct ConsoleSpeech;

impl ConsoleSpeech {
    /// Creates a console speech device.
    pub fn new() -> Self {
        Self
    }
}

impl SpeechCapture for ConsoleSpeech {
    fn listen(&mut self) -> Result<Option<String>, SpeechError> {
        print!("you> ");
        std::io::stdout()
            .flush()
            .map_err(|e| SpeechError::Device(e.to_string()))?;

        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| SpeechError::Device(e.to_string()))?;

        if read == 0 {
            return Ok(None);
        }
        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            return Ok(None);
        }
        Ok(Some(line.to_string()))
    }

    fn stop(&mut self) {
        // Nothing to interrupt: reads are strictly turn-based here.
    }
}

impl SpeechSynthesizer for ConsoleSpeech {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        println!("assistant> {text}");
        Ok(())
    }

    fn cancel(&mut self) {
        // Printed output cannot be recalled.
    }
}
