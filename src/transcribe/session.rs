//! Transcription session: one streaming exchange with the recognition
//! backend, with ordering enforcement and a single-reconnect policy.

use crate::asr::{RawTranscript, RecognitionClient, RecognitionEvent, RecognitionStream};
use crate::defaults;
use crate::error::{Result, StockhandError};
use crate::transcribe::event::{TranscriptEvent, TranscriptUpdate};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Enforces the per-index ordering invariant at the backend boundary:
/// partial* → final, exactly one final, nothing after it.
#[derive(Default)]
struct IndexTracker {
    finalized: HashSet<u64>,
    open: HashSet<u64>,
}

impl IndexTracker {
    fn admit(&mut self, raw: RawTranscript) -> Option<TranscriptEvent> {
        if self.finalized.contains(&raw.index) {
            warn!("discarding backend event for finalized index {}", raw.index);
            return None;
        }
        if raw.is_final {
            self.finalized.insert(raw.index);
            self.open.remove(&raw.index);
        } else {
            self.open.insert(raw.index);
        }
        Some(TranscriptEvent {
            index: raw.index,
            text: raw.text,
            is_final: raw.is_final,
        })
    }

    fn open_indices(&self) -> Vec<u64> {
        let mut open: Vec<u64> = self.open.iter().copied().collect();
        open.sort_unstable();
        open
    }
}

/// Wraps one streaming recognition exchange.
///
/// `start` consumes the session's audio channel and returns the ordered
/// event channel plus a handle for teardown. End-of-audio is signalled by
/// closing the audio channel (the relay's `close`); the pump then waits a
/// bounded time for the backend's final flush.
pub struct TranscriptionSession {
    client: Arc<dyn RecognitionClient>,
    flush_timeout: Duration,
}

impl TranscriptionSession {
    pub fn new(client: Arc<dyn RecognitionClient>, flush_timeout: Duration) -> Self {
        Self {
            client,
            flush_timeout,
        }
    }

    /// Open the exchange and spawn the pump task.
    ///
    /// The initial open gets the session's single automatic retry; if
    /// both attempts fail the session never starts and the error is
    /// `TranscriptionUnavailable`.
    pub async fn start(
        self,
        audio: mpsc::Receiver<Vec<u8>>,
    ) -> Result<(mpsc::Receiver<TranscriptUpdate>, TranscriptionHandle)> {
        let mut reconnected = false;
        let exchange = match self.client.open().await {
            Ok(exchange) => exchange,
            Err(first) => {
                debug!("initial exchange open failed ({}), retrying once", first);
                reconnected = true;
                self.client.open().await.map_err(|e| {
                    StockhandError::TranscriptionUnavailable {
                        message: e.to_string(),
                    }
                })?
            }
        };

        let (events_tx, events_rx) = mpsc::channel(defaults::EVENT_CHANNEL_CAPACITY);
        let task = tokio::spawn(pump(
            self.client,
            self.flush_timeout,
            audio,
            exchange,
            events_tx,
            reconnected,
        ));
        Ok((events_rx, TranscriptionHandle { task }))
    }
}

/// Handle to a running transcription pump.
pub struct TranscriptionHandle {
    task: JoinHandle<()>,
}

impl TranscriptionHandle {
    /// Wait up to `wait` for the pump to finish its final flush, then
    /// hard-close it.
    pub async fn shutdown(mut self, wait: Duration) {
        if tokio::time::timeout(wait, &mut self.task).await.is_err() {
            warn!("transcription pump did not finish within {:?}, aborting", wait);
            self.task.abort();
        }
    }

    /// Hard-close without waiting.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn pump(
    client: Arc<dyn RecognitionClient>,
    flush_timeout: Duration,
    mut audio: mpsc::Receiver<Vec<u8>>,
    mut exchange: RecognitionStream,
    events: mpsc::Sender<TranscriptUpdate>,
    mut reconnected: bool,
) {
    let mut tracker = IndexTracker::default();
    let mut audio_open = true;
    let mut flush_deadline: Option<Instant> = None;

    loop {
        // The flush branch is disabled until end-of-audio; the placeholder
        // deadline is never awaited while disabled.
        let deadline = flush_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(60));

        tokio::select! {
            frame = audio.recv(), if audio_open => match frame {
                Some(pcm) => {
                    if let Err(e) = exchange.send_audio(pcm).await {
                        match reopen(&client, &events, &mut reconnected, audio_open, &e.to_string()).await {
                            Some(fresh) => exchange = fresh,
                            None => return,
                        }
                    }
                }
                None => {
                    audio_open = false;
                    exchange.end_audio();
                    flush_deadline = Some(Instant::now() + flush_timeout);
                }
            },
            event = exchange.next_event() => match event {
                Some(RecognitionEvent::Transcript(raw)) => {
                    // A delivered result clears the consecutive-failure state.
                    reconnected = false;
                    if let Some(event) = tracker.admit(raw)
                        && events.send(TranscriptUpdate::Event(event)).await.is_err()
                    {
                        // Session gone; nothing left to deliver to.
                        return;
                    }
                }
                Some(RecognitionEvent::Error { message }) => {
                    match reopen(&client, &events, &mut reconnected, audio_open, &message).await {
                        Some(fresh) => exchange = fresh,
                        None => return,
                    }
                }
                None => {
                    if audio_open {
                        // Backend ended the stream while audio was still flowing.
                        match reopen(&client, &events, &mut reconnected, audio_open, "backend closed the stream").await {
                            Some(fresh) => exchange = fresh,
                            None => return,
                        }
                    } else {
                        finish(&tracker, &events).await;
                        return;
                    }
                }
            },
            _ = sleep_until(deadline), if flush_deadline.is_some() => {
                warn!("backend flush timed out after {:?}", flush_timeout);
                finish(&tracker, &events).await;
                return;
            }
        }
    }
}

/// One automatic reconnect, no audio replay. Returns the fresh exchange,
/// or `None` after surfacing `Unavailable` (second consecutive failure or
/// failed reopen).
async fn reopen(
    client: &Arc<dyn RecognitionClient>,
    events: &mpsc::Sender<TranscriptUpdate>,
    reconnected: &mut bool,
    audio_open: bool,
    reason: &str,
) -> Option<RecognitionStream> {
    if *reconnected {
        warn!("recognition exchange failed twice in succession: {}", reason);
        let _ = events
            .send(TranscriptUpdate::Unavailable {
                message: reason.to_string(),
            })
            .await;
        return None;
    }

    info!("recognition exchange failed ({}), reconnecting once", reason);
    match client.open().await {
        Ok(mut fresh) => {
            if !audio_open {
                fresh.end_audio();
            }
            *reconnected = true;
            Some(fresh)
        }
        Err(e) => {
            warn!("reconnect attempt failed: {}", e);
            let _ = events
                .send(TranscriptUpdate::Unavailable {
                    message: e.to_string(),
                })
                .await;
            None
        }
    }
}

async fn finish(tracker: &IndexTracker, events: &mpsc::Sender<TranscriptUpdate>) {
    for index in tracker.open_indices() {
        debug!("discarding result index {} without a final event", index);
    }
    let _ = events.send(TranscriptUpdate::Finished).await;
}
