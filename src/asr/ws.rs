//! WebSocket implementation of the recognition backend client.
//!
//! The wire format is JSON text frames: a `start` setup message, one
//! `audio` message per PCM chunk (base64 payload), and an `end` marker
//! once the caller signals end-of-audio. The backend answers with
//! `transcript` messages carrying a result index and a `final` flag, and
//! closes the socket after its final flush.

use crate::asr::backend::{
    RawTranscript, RecognitionClient, RecognitionEvent, RecognitionStream,
};
use crate::defaults;
use crate::error::{Result, StockhandError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BackendRequest {
    Start { sample_rate: u32 },
    Audio { data: String },
    End,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BackendResponse {
    Transcript {
        index: u64,
        text: String,
        #[serde(rename = "final")]
        is_final: bool,
    },
    Error {
        message: String,
    },
}

/// Recognition client speaking the streaming WebSocket protocol.
pub struct WsRecognitionClient {
    endpoint: Url,
    sample_rate: u32,
}

impl WsRecognitionClient {
    pub fn new(endpoint: &str, sample_rate: u32) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| StockhandError::ConfigInvalidValue {
            key: "recognition.url".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            endpoint,
            sample_rate,
        })
    }
}

fn recognition_error(message: impl std::fmt::Display) -> StockhandError {
    StockhandError::Recognition {
        message: message.to_string(),
    }
}

#[async_trait]
impl RecognitionClient for WsRecognitionClient {
    async fn open(&self) -> Result<RecognitionStream> {
        let (ws, _response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(recognition_error)?;
        let (mut sink, mut stream) = ws.split();

        let setup = serde_json::to_string(&BackendRequest::Start {
            sample_rate: self.sample_rate,
        })
        .map_err(recognition_error)?;
        sink.send(Message::Text(setup.into()))
            .await
            .map_err(recognition_error)?;

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(defaults::AUDIO_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(defaults::EVENT_CHANNEL_CAPACITY);

        // Writer half: forward PCM frames until the audio channel closes,
        // then tell the backend to flush.
        tokio::spawn(async move {
            while let Some(pcm) = audio_rx.recv().await {
                let frame = BackendRequest::Audio {
                    data: BASE64.encode(&pcm),
                };
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("failed to encode audio frame: {}", e);
                        break;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    // Socket gone; the reader half reports the error.
                    break;
                }
            }
            if let Ok(json) = serde_json::to_string(&BackendRequest::End) {
                let _ = sink.send(Message::Text(json.into())).await;
            }
        });

        // Reader half: decode transcript events until the backend closes.
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<BackendResponse>(text.as_str()) {
                            Ok(BackendResponse::Transcript {
                                index,
                                text,
                                is_final,
                            }) => {
                                let event = RecognitionEvent::Transcript(RawTranscript {
                                    index,
                                    text,
                                    is_final,
                                });
                                if event_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Ok(BackendResponse::Error { message }) => {
                                let _ = event_tx.send(RecognitionEvent::Error { message }).await;
                                break;
                            }
                            Err(e) => {
                                debug!("unrecognized backend frame: {}", e);
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx
                            .send(RecognitionEvent::Error {
                                message: e.to_string(),
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(RecognitionStream::from_parts(audio_tx, event_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn test_rejects_invalid_endpoint() {
        let result = WsRecognitionClient::new("not a url", 16000);
        assert!(matches!(
            result,
            Err(StockhandError::ConfigInvalidValue { key, .. }) if key == "recognition.url"
        ));
    }

    #[test]
    fn test_backend_request_wire_format() {
        let start = serde_json::to_string(&BackendRequest::Start { sample_rate: 16000 }).unwrap();
        assert_eq!(start, r#"{"type":"start","sample_rate":16000}"#);

        let audio = serde_json::to_string(&BackendRequest::Audio {
            data: BASE64.encode([1u8, 2, 3]),
        })
        .unwrap();
        assert_eq!(audio, r#"{"type":"audio","data":"AQID"}"#);

        let end = serde_json::to_string(&BackendRequest::End).unwrap();
        assert_eq!(end, r#"{"type":"end"}"#);
    }

    #[test]
    fn test_backend_response_parses_final_flag() {
        let response: BackendResponse =
            serde_json::from_str(r#"{"type":"transcript","index":2,"text":"cups","final":true}"#)
                .unwrap();
        match response {
            BackendResponse::Transcript {
                index,
                text,
                is_final,
            } => {
                assert_eq!(index, 2);
                assert_eq!(text, "cups");
                assert!(is_final);
            }
            _ => panic!("Expected Transcript response"),
        }
    }

    #[tokio::test]
    async fn test_full_exchange_against_loopback_backend() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();

            // Setup message arrives first.
            let setup = ws.next().await.unwrap().unwrap();
            assert_eq!(
                setup.to_text().unwrap(),
                r#"{"type":"start","sample_rate":16000}"#
            );

            // One audio frame, base64 of [1, 2, 3].
            let audio = ws.next().await.unwrap().unwrap();
            assert_eq!(
                audio.to_text().unwrap(),
                r#"{"type":"audio","data":"AQID"}"#
            );

            ws.send(Message::Text(
                r#"{"type":"transcript","index":0,"text":"check stock","final":true}"#.into(),
            ))
            .await
            .unwrap();

            // End marker after end_audio().
            let end = ws.next().await.unwrap().unwrap();
            assert_eq!(end.to_text().unwrap(), r#"{"type":"end"}"#);
        });

        let client = WsRecognitionClient::new(&format!("ws://{}", addr), 16000).unwrap();
        let mut exchange = client.open().await.unwrap();

        exchange.send_audio(vec![1, 2, 3]).await.unwrap();

        let event = exchange.next_event().await.unwrap();
        assert_eq!(
            event,
            RecognitionEvent::Transcript(RawTranscript {
                index: 0,
                text: "check stock".to_string(),
                is_final: true,
            })
        );

        exchange.end_audio();
        server.await.unwrap();
    }
}
