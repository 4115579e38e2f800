//! Per-session transcription pipeline.
//!
//! [`relay::AudioRelay`] moves client audio into the session's bounded
//! forwarding channel; [`session::TranscriptionSession`] drives one
//! streaming exchange with the recognition backend and emits ordered
//! [`event::TranscriptEvent`]s.

pub mod event;
pub mod relay;
pub mod session;

pub use event::{TranscriptEvent, TranscriptUpdate};
pub use relay::AudioRelay;
pub use session::{TranscriptionHandle, TranscriptionSession};
