//! Recognition backend traits and test doubles.

use crate::error::{Result, StockhandError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One recognition result as emitted by the backend, before ordering
/// enforcement.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTranscript {
    /// Monotonically increasing result index assigned by the backend.
    pub index: u64,
    pub text: String,
    /// True once this index is settled; no further revisions follow.
    pub is_final: bool,
}

/// Event delivered by an open exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Transcript(RawTranscript),
    /// Transport or backend failure; the exchange is dead after this.
    Error { message: String },
}

/// One streaming exchange with the recognition backend.
///
/// Audio flows in through a bounded channel (dropping the sender signals
/// end-of-audio and triggers the backend's final flush); events flow out
/// until the backend closes the stream.
pub struct RecognitionStream {
    audio: Option<mpsc::Sender<Vec<u8>>>,
    events: mpsc::Receiver<RecognitionEvent>,
}

impl RecognitionStream {
    /// Assemble an exchange from its channel halves.
    pub fn from_parts(
        audio: mpsc::Sender<Vec<u8>>,
        events: mpsc::Receiver<RecognitionEvent>,
    ) -> Self {
        Self {
            audio: Some(audio),
            events,
        }
    }

    /// Forward one PCM frame to the backend, awaiting channel capacity.
    pub async fn send_audio(&mut self, pcm: Vec<u8>) -> Result<()> {
        let Some(audio) = self.audio.as_ref() else {
            return Err(StockhandError::Recognition {
                message: "audio already ended on this exchange".to_string(),
            });
        };
        audio
            .send(pcm)
            .await
            .map_err(|_| StockhandError::Recognition {
                message: "backend audio channel closed".to_string(),
            })
    }

    /// Signal end-of-audio. Idempotent; the backend flushes remaining
    /// results and then closes the event stream.
    pub fn end_audio(&mut self) {
        self.audio = None;
    }

    /// True once end-of-audio has been signalled.
    pub fn audio_ended(&self) -> bool {
        self.audio.is_none()
    }

    /// Next event from the backend; `None` when the backend closed the
    /// stream.
    pub async fn next_event(&mut self) -> Option<RecognitionEvent> {
        self.events.recv().await
    }
}

/// Opens streaming exchanges with the recognition backend.
///
/// Shared by all sessions; each session opens its own exchange.
#[async_trait]
pub trait RecognitionClient: Send + Sync {
    async fn open(&self) -> Result<RecognitionStream>;
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

enum ScriptedOpen {
    Fail(String),
    Exchange {
        audio_tx: mpsc::Sender<Vec<u8>>,
        events_rx: mpsc::Receiver<RecognitionEvent>,
    },
}

/// Scriptable recognition client for tests.
///
/// Each call to [`MockRecognitionClient::push_exchange`] queues one
/// exchange and returns a handle the test uses to feed events and
/// observe forwarded audio; `push_open_failure` queues a failed open.
#[derive(Default)]
pub struct MockRecognitionClient {
    script: Mutex<VecDeque<ScriptedOpen>>,
    opens: AtomicUsize,
}

/// Test-side handle to one scripted exchange.
pub struct MockExchangeHandle {
    events: Option<mpsc::Sender<RecognitionEvent>>,
    audio: mpsc::Receiver<Vec<u8>>,
}

impl MockRecognitionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful open and return its handle.
    pub fn push_exchange(&self) -> MockExchangeHandle {
        let (audio_tx, audio_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(64);
        self.script
            .lock()
            .expect("mock script lock poisoned")
            .push_back(ScriptedOpen::Exchange { audio_tx, events_rx });
        MockExchangeHandle {
            events: Some(events_tx),
            audio: audio_rx,
        }
    }

    /// Queue a failed open.
    pub fn push_open_failure(&self, message: &str) {
        self.script
            .lock()
            .expect("mock script lock poisoned")
            .push_back(ScriptedOpen::Fail(message.to_string()));
    }

    /// Number of times `open` was called.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognitionClient for MockRecognitionClient {
    async fn open(&self) -> Result<RecognitionStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .expect("mock script lock poisoned")
            .pop_front();
        match next {
            Some(ScriptedOpen::Exchange { audio_tx, events_rx }) => {
                Ok(RecognitionStream::from_parts(audio_tx, events_rx))
            }
            Some(ScriptedOpen::Fail(message)) => Err(StockhandError::Recognition { message }),
            None => Err(StockhandError::Recognition {
                message: "no scripted exchange left".to_string(),
            }),
        }
    }
}

impl MockExchangeHandle {
    /// Emit a transcript event into the exchange.
    pub async fn send_transcript(&self, index: u64, text: &str, is_final: bool) {
        if let Some(events) = self.events.as_ref() {
            let _ = events
                .send(RecognitionEvent::Transcript(RawTranscript {
                    index,
                    text: text.to_string(),
                    is_final,
                }))
                .await;
        }
    }

    /// Emit a transport error; the exchange is dead afterwards.
    pub async fn send_error(&self, message: &str) {
        if let Some(events) = self.events.as_ref() {
            let _ = events
                .send(RecognitionEvent::Error {
                    message: message.to_string(),
                })
                .await;
        }
    }

    /// Close the event stream, as the backend does after its final flush.
    pub fn close(&mut self) {
        self.events = None;
    }

    /// Receive the next audio frame forwarded to the backend.
    ///
    /// Returns `None` once end-of-audio was signalled and the channel is
    /// drained.
    pub async fn recv_audio(&mut self) -> Option<Vec<u8>> {
        self.audio.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_forwards_audio_in_order() {
        let client = MockRecognitionClient::new();
        let mut handle = client.push_exchange();
        let mut stream = client.open().await.unwrap();

        stream.send_audio(vec![1]).await.unwrap();
        stream.send_audio(vec![2]).await.unwrap();
        stream.send_audio(vec![3]).await.unwrap();

        assert_eq!(handle.recv_audio().await, Some(vec![1]));
        assert_eq!(handle.recv_audio().await, Some(vec![2]));
        assert_eq!(handle.recv_audio().await, Some(vec![3]));
    }

    #[tokio::test]
    async fn test_end_audio_closes_backend_channel() {
        let client = MockRecognitionClient::new();
        let mut handle = client.push_exchange();
        let mut stream = client.open().await.unwrap();

        stream.send_audio(vec![7]).await.unwrap();
        stream.end_audio();
        assert!(stream.audio_ended());

        assert_eq!(handle.recv_audio().await, Some(vec![7]));
        assert_eq!(handle.recv_audio().await, None);
    }

    #[tokio::test]
    async fn test_send_audio_after_end_fails() {
        let client = MockRecognitionClient::new();
        let _handle = client.push_exchange();
        let mut stream = client.open().await.unwrap();

        stream.end_audio();
        let result = stream.send_audio(vec![1]).await;
        assert!(matches!(result, Err(StockhandError::Recognition { .. })));
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let client = MockRecognitionClient::new();
        let handle = client.push_exchange();
        let mut stream = client.open().await.unwrap();

        handle.send_transcript(0, "add", false).await;
        handle.send_transcript(0, "add ten", true).await;

        let first = stream.next_event().await.unwrap();
        assert_eq!(
            first,
            RecognitionEvent::Transcript(RawTranscript {
                index: 0,
                text: "add".to_string(),
                is_final: false,
            })
        );
        let second = stream.next_event().await.unwrap();
        assert!(matches!(
            second,
            RecognitionEvent::Transcript(RawTranscript { is_final: true, .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_exchange_yields_none() {
        let client = MockRecognitionClient::new();
        let mut handle = client.push_exchange();
        let mut stream = client.open().await.unwrap();

        handle.close();
        assert_eq!(stream.next_event().await, None);
    }

    #[tokio::test]
    async fn test_scripted_open_failure() {
        let client = MockRecognitionClient::new();
        client.push_open_failure("connection refused");

        let result = client.open().await;
        assert!(matches!(
            result,
            Err(StockhandError::Recognition { message }) if message == "connection refused"
        ));
        assert_eq!(client.open_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_script_fails_open() {
        let client = MockRecognitionClient::new();
        assert!(client.open().await.is_err());
    }
}
