//! Streaming speech-recognition backend client.
//!
//! The backend is an external service reached over a duplex connection:
//! PCM audio goes in, partial and final transcripts come out. The
//! [`RecognitionClient`] trait is the seam the rest of the crate depends
//! on; [`ws::WsRecognitionClient`] is the production implementation and
//! [`backend::MockRecognitionClient`] the test double.

pub mod backend;
pub mod ws;

pub use backend::{
    MockExchangeHandle, MockRecognitionClient, RawTranscript, RecognitionClient, RecognitionEvent,
    RecognitionStream,
};
pub use ws::WsRecognitionClient;
