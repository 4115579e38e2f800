//! Transcript event types flowing out of a transcription session.

/// One recognition result after ordering enforcement.
///
/// Events for a given `index` arrive in non-decreasing revision order:
/// zero or more partials, then exactly one final. A final closes the
/// index permanently.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub index: u64,
    pub text: String,
    pub is_final: bool,
}

impl TranscriptEvent {
    pub fn partial(index: u64, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_result(index: u64, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            is_final: true,
        }
    }
}

/// Item delivered on a transcription session's event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptUpdate {
    Event(TranscriptEvent),
    /// The backend flushed and closed the stream after end-of-audio.
    Finished,
    /// The exchange failed twice in succession; the session is dead.
    Unavailable { message: String },
}
