//! Per-connection session: wires Audio Relay → Transcription Session →
//! Command Interpreter → Confirmation Gate → Action Dispatcher, and
//! tears all of them down together on disconnect.
//!
//! The session runs one select loop over control frames, transcript
//! events, pipeline results, and the confirmation deadline. Audio is
//! forwarded by its own task so backpressure from the recognition
//! backend lands on the socket reader, never on the control loop;
//! interpretation and dispatch run in spawned subtasks reporting back
//! through an internal channel, so the loop never waits on the
//! generation service either.

use crate::asr::RecognitionClient;
use crate::defaults;
use crate::dispatch::{ActionDispatcher, ActionResult};
use crate::error::{Result, StockhandError};
use crate::gate::{ConfirmationGate, Resolution};
use crate::interpret::{Interpreter, ParsedCommand};
use crate::protocol::{ClientMessage, ResultStatus, ServerMessage};
use crate::transcribe::{AudioRelay, TranscriptUpdate, TranscriptionSession};
use log::{debug, info, warn};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use uuid::Uuid;

/// Shared collaborators handed to every session.
pub struct SessionDeps {
    pub recognition: Arc<dyn RecognitionClient>,
    pub interpreter: Arc<dyn Interpreter>,
    pub dispatcher: Arc<ActionDispatcher>,
    pub confirmation_window: Duration,
    pub flush_timeout: Duration,
}

/// Results reported back by interpret/dispatch subtasks.
enum PipelineMsg {
    Interpreted {
        index: u64,
        result: Result<ParsedCommand>,
    },
    Dispatched {
        result: ActionResult,
    },
}

/// Run one session until the client disconnects or a fatal transcription
/// error ends it.
///
/// `audio` carries raw PCM frames, `control` the client's JSON text
/// frames; both close when the client is gone (the control channel
/// closing is the disconnect signal). Everything the session owns is
/// torn down before returning. The returned error is the fatal session
/// error, if any; per-stage failures are reported to the client and do
/// not end the session.
pub async fn run(
    deps: Arc<SessionDeps>,
    audio: mpsc::Receiver<Vec<u8>>,
    mut control: mpsc::Receiver<String>,
    outbound: mpsc::Sender<ServerMessage>,
) -> Result<()> {
    let session_id = Uuid::new_v4();
    info!("session {} connected", session_id);

    let (relay, relay_rx) = AudioRelay::channel(defaults::AUDIO_CHANNEL_CAPACITY);
    let relay = Arc::new(relay);
    let transcription = TranscriptionSession::new(deps.recognition.clone(), deps.flush_timeout);
    let (mut updates, transcription) = match transcription.start(relay_rx).await {
        Ok(parts) => parts,
        Err(e) => {
            warn!("session {}: {}", session_id, e);
            let _ = outbound
                .send(ServerMessage::Error {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                })
                .await;
            return Err(e);
        }
    };

    let forwarder = spawn_forwarder(session_id, relay.clone(), audio);

    let mut gate = ConfirmationGate::new(deps.confirmation_window);
    let (pipe_tx, mut pipe_rx) = mpsc::channel::<PipelineMsg>(8);
    let mut interpret_inflight = false;
    let mut updates_open = true;
    let mut fatal: Option<StockhandError> = None;

    loop {
        // Placeholder deadlines are never awaited: each timed branch is
        // guarded on the state that sets a real deadline.
        let gate_deadline = gate
            .deadline()
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(60));

        tokio::select! {
            frame = control.recv() => match frame {
                Some(text) => {
                    if handle_control(
                        &session_id,
                        &text,
                        &mut gate,
                        &deps,
                        &pipe_tx,
                        &outbound,
                    )
                    .await
                    .is_err()
                    {
                        break;
                    }
                }
                None => {
                    debug!("session {} disconnected", session_id);
                    break;
                }
            },
            update = updates.recv(), if updates_open => match update {
                Some(TranscriptUpdate::Event(event)) => {
                    let frame = if event.is_final {
                        ServerMessage::Final {
                            index: event.index,
                            text: event.text.clone(),
                        }
                    } else {
                        ServerMessage::Partial {
                            index: event.index,
                            text: event.text.clone(),
                        }
                    };
                    if outbound.send(frame).await.is_err() {
                        break;
                    }
                    if event.is_final {
                        if gate.pending().is_some() || interpret_inflight {
                            debug!(
                                "session {}: final index {} skipped, a command is already in flight",
                                session_id, event.index
                            );
                        } else {
                            interpret_inflight = true;
                            spawn_interpret(
                                deps.interpreter.clone(),
                                event.index,
                                event.text,
                                pipe_tx.clone(),
                            );
                        }
                    }
                }
                Some(TranscriptUpdate::Finished) => {
                    debug!("session {}: transcription stream finished", session_id);
                }
                Some(TranscriptUpdate::Unavailable { message }) => {
                    let error = StockhandError::TranscriptionUnavailable { message };
                    warn!("session {}: {}", session_id, error);
                    let _ = outbound
                        .send(ServerMessage::Error {
                            kind: error.kind().to_string(),
                            message: error.to_string(),
                        })
                        .await;
                    fatal = Some(error);
                    break;
                }
                None => {
                    updates_open = false;
                }
            },
            msg = pipe_rx.recv() => match msg {
                Some(PipelineMsg::Interpreted { index, result }) => {
                    interpret_inflight = false;
                    match result {
                        Ok(command) if command.needs_confirmation => {
                            match gate.propose(command) {
                                Ok(pending) => {
                                    let frame = ServerMessage::Proposal {
                                        command_id: pending.id.to_string(),
                                        command: pending.command.clone(),
                                        summary: pending.summary.clone(),
                                    };
                                    if outbound.send(frame).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    debug!("session {}: dropping proposal: {}", session_id, e);
                                }
                            }
                        }
                        Ok(command) => {
                            spawn_dispatch(deps.dispatcher.clone(), command, pipe_tx.clone());
                        }
                        Err(e) => {
                            debug!(
                                "session {}: interpretation of index {} failed: {}",
                                session_id, index, e
                            );
                            let frame = ServerMessage::Error {
                                kind: e.kind().to_string(),
                                message: "Sorry, I couldn't make sense of that request."
                                    .to_string(),
                            };
                            if outbound.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(PipelineMsg::Dispatched { result }) => {
                    let frame = match result {
                        ActionResult::Success { message, payload } => ServerMessage::Result {
                            status: ResultStatus::Success,
                            message,
                            payload,
                        },
                        ActionResult::Failure { kind, message } => ServerMessage::Result {
                            status: ResultStatus::Failure,
                            message,
                            payload: Some(json!({ "kind": kind })),
                        },
                    };
                    if outbound.send(frame).await.is_err() {
                        break;
                    }
                }
                // The session holds a sender; the channel never closes here.
                None => break,
            },
            _ = sleep_until(gate_deadline), if gate.pending().is_some() => {
                if let Some(expired) = gate.expire_due() {
                    let frame = ServerMessage::Result {
                        status: ResultStatus::Expired,
                        message: format!("No confirmation received for: {}", expired.summary),
                        payload: None,
                    };
                    if outbound.send(frame).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    // Teardown: close the relay, give the backend its bounded flush, drop
    // the pending proposal. In-flight dispatch results die with pipe_rx.
    relay.close();
    forwarder.abort();
    transcription.shutdown(deps.flush_timeout).await;
    if let Some(discarded) = gate.discard() {
        debug!(
            "session {}: discarding unconfirmed command {}",
            session_id, discarded.id
        );
    }
    info!("session {} closed", session_id);

    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Move client audio into the relay. Runs until the client side closes or
/// the relay is torn down; backpressure from the relay propagates to the
/// sender of `audio`, not to the session loop.
fn spawn_forwarder(
    session_id: Uuid,
    relay: Arc<AudioRelay>,
    mut audio: mpsc::Receiver<Vec<u8>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = audio.recv().await {
            if let Err(e) = relay.submit(frame).await {
                // Frame arrived after relay teardown; an ordering error,
                // logged and ignored.
                debug!("session {}: {}", session_id, e);
                break;
            }
        }
        relay.close();
    })
}

/// Handle one client control frame. Returns `Err` only when the outbound
/// channel is gone.
async fn handle_control(
    session_id: &Uuid,
    text: &str,
    gate: &mut ConfirmationGate,
    deps: &Arc<SessionDeps>,
    pipe_tx: &mpsc::Sender<PipelineMsg>,
    outbound: &mpsc::Sender<ServerMessage>,
) -> std::result::Result<(), ()> {
    let message = match ClientMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("session {}: unparseable control frame: {}", session_id, e);
            return Ok(());
        }
    };

    let (command_id, resolution) = match message {
        ClientMessage::Confirm { command_id } => (command_id, Resolution::Confirm),
        ClientMessage::Reject { command_id } => (command_id, Resolution::Reject),
    };

    match gate.resolve(&command_id, resolution) {
        Ok(Some(command)) => {
            spawn_dispatch(deps.dispatcher.clone(), command, pipe_tx.clone());
            Ok(())
        }
        Ok(None) => {
            let frame = ServerMessage::Result {
                status: ResultStatus::Rejected,
                message: "Command discarded.".to_string(),
                payload: None,
            };
            outbound.send(frame).await.map_err(|_| ())
        }
        Err(e) => {
            debug!("session {}: {}", session_id, e);
            let frame = ServerMessage::Error {
                kind: e.kind().to_string(),
                message: "That command is no longer awaiting confirmation.".to_string(),
            };
            outbound.send(frame).await.map_err(|_| ())
        }
    }
}

fn spawn_interpret(
    interpreter: Arc<dyn Interpreter>,
    index: u64,
    text: String,
    pipe: mpsc::Sender<PipelineMsg>,
) {
    tokio::spawn(async move {
        let result = interpreter.interpret(&text).await;
        let _ = pipe.send(PipelineMsg::Interpreted { index, result }).await;
    });
}

fn spawn_dispatch(
    dispatcher: Arc<ActionDispatcher>,
    command: ParsedCommand,
    pipe: mpsc::Sender<PipelineMsg>,
) {
    tokio::spawn(async move {
        let result = dispatcher.dispatch(&command).await;
        // If the session ended meanwhile, the result is dropped here; the
        // external call may still have completed server-side.
        let _ = pipe.send(PipelineMsg::Dispatched { result }).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::MockRecognitionClient;
    use crate::dispatch::{MockEmailSender, MockSheetClient};
    use crate::interpret::MockInterpreter;

    fn deps(
        recognition: Arc<MockRecognitionClient>,
        interpreter: MockInterpreter,
    ) -> Arc<SessionDeps> {
        let dispatcher = ActionDispatcher::new(
            Arc::new(MockEmailSender::new()),
            Arc::new(MockSheetClient::new()),
            "owner@example.com",
            "Inventory!A:E",
        );
        Arc::new(SessionDeps {
            recognition,
            interpreter: Arc::new(interpreter),
            dispatcher: Arc::new(dispatcher),
            confirmation_window: Duration::from_secs(30),
            flush_timeout: Duration::from_millis(100),
        })
    }

    #[tokio::test]
    async fn test_failed_session_start_sends_error_frame() {
        let recognition = Arc::new(MockRecognitionClient::new());
        recognition.push_open_failure("down");
        recognition.push_open_failure("still down");

        let (_audio_tx, audio_rx) = mpsc::channel(8);
        let (_ctl_tx, ctl_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let result = run(
            deps(recognition, MockInterpreter::new()),
            audio_rx,
            ctl_rx,
            out_tx,
        )
        .await;
        assert!(matches!(
            result,
            Err(StockhandError::TranscriptionUnavailable { .. })
        ));

        let frame = out_rx.recv().await.unwrap();
        assert!(matches!(
            frame,
            ServerMessage::Error { kind, .. } if kind == "transcription_unavailable"
        ));
    }

    #[tokio::test]
    async fn test_invalid_control_frame_is_ignored() {
        let recognition = Arc::new(MockRecognitionClient::new());
        let mut exchange = recognition.push_exchange();

        let (_audio_tx, audio_rx) = mpsc::channel(8);
        let (ctl_tx, ctl_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let session = tokio::spawn(run(
            deps(recognition, MockInterpreter::new()),
            audio_rx,
            ctl_rx,
            out_tx,
        ));

        ctl_tx.send("not json".to_string()).await.unwrap();
        drop(ctl_tx);

        session.await.unwrap().unwrap();
        exchange.close();

        // No frames were produced for the garbage control message.
        let mut frames = Vec::new();
        while let Some(frame) = out_rx.recv().await {
            frames.push(frame);
        }
        assert!(frames.is_empty(), "unexpected frames: {:?}", frames);
    }

    #[tokio::test]
    async fn test_audio_after_teardown_is_ignored() {
        let recognition = Arc::new(MockRecognitionClient::new());
        let mut exchange = recognition.push_exchange();

        let (audio_tx, audio_rx) = mpsc::channel(8);
        let (ctl_tx, ctl_rx) = mpsc::channel(8);
        let (out_tx, _out_rx) = mpsc::channel(8);

        let session = tokio::spawn(run(
            deps(recognition, MockInterpreter::new()),
            audio_rx,
            ctl_rx,
            out_tx,
        ));

        audio_tx.send(vec![1]).await.unwrap();
        assert_eq!(exchange.recv_audio().await, Some(vec![1]));

        drop(ctl_tx);
        session.await.unwrap().unwrap();

        // A frame sent after teardown is dropped without panicking the
        // sender; the channel may simply be gone.
        let _ = audio_tx.send(vec![2]).await;
        assert_eq!(exchange.recv_audio().await, None);
    }
}
