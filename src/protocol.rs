//! JSON message protocol for the client duplex channel.
//!
//! Binary WebSocket frames carry raw PCM audio and have no JSON shape;
//! everything else is a tagged text frame defined here.

use crate::interpret::ParsedCommand;
use serde::{Deserialize, Serialize};

/// Control messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Approve the currently proposed command.
    Confirm {
        #[serde(rename = "commandId")]
        command_id: String,
    },
    /// Decline the currently proposed command.
    Reject {
        #[serde(rename = "commandId")]
        command_id: String,
    },
}

/// Outcome attached to a `result` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failure,
    Rejected,
    Expired,
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Incremental recognition result; may be superseded by a later
    /// partial or final for the same index.
    Partial { index: u64, text: String },
    /// Settled recognition result; closes the index.
    Final { index: u64, text: String },
    /// A parsed command awaiting confirmation.
    Proposal {
        #[serde(rename = "commandId")]
        command_id: String,
        command: ParsedCommand,
        summary: String,
    },
    /// Outcome of a dispatched or resolved command.
    Result {
        status: ResultStatus,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    /// Structured error notification.
    Error { kind: String, message: String },
}

impl ClientMessage {
    /// Deserialize a client control frame from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to JSON (used by tests and example clients).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    /// Serialize a server frame to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON (used by tests and example clients).
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpret::{ActionKind, Quantity};

    #[test]
    fn test_client_message_roundtrip() {
        let messages = vec![
            ClientMessage::Confirm {
                command_id: "a-1".to_string(),
            },
            ClientMessage::Reject {
                command_id: "b-2".to_string(),
            },
        ];

        for msg in messages {
            let json = msg.to_json().expect("should serialize");
            let deserialized = ClientMessage::from_json(&json).expect("should deserialize");
            assert_eq!(msg, deserialized, "roundtrip failed for {:?}", msg);
        }
    }

    #[test]
    fn test_client_message_uses_command_id_key() {
        let msg = ClientMessage::Confirm {
            command_id: "xyz".to_string(),
        };
        let json = msg.to_json().unwrap();
        assert_eq!(json, r#"{"type":"confirm","commandId":"xyz"}"#);
    }

    #[test]
    fn test_reject_json_format() {
        let msg = ClientMessage::Reject {
            command_id: "xyz".to_string(),
        };
        let json = msg.to_json().unwrap();
        assert_eq!(json, r#"{"type":"reject","commandId":"xyz"}"#);
    }

    #[test]
    fn test_partial_and_final_frames() {
        let partial = ServerMessage::Partial {
            index: 3,
            text: "add ten".to_string(),
        };
        let json = partial.to_json().unwrap();
        assert_eq!(json, r#"{"type":"partial","index":3,"text":"add ten"}"#);

        let fin = ServerMessage::Final {
            index: 3,
            text: "add ten bags".to_string(),
        };
        let json = fin.to_json().unwrap();
        assert_eq!(json, r#"{"type":"final","index":3,"text":"add ten bags"}"#);
    }

    #[test]
    fn test_proposal_frame_carries_command() {
        let command = ParsedCommand {
            action: ActionKind::Add,
            item: "espresso beans".to_string(),
            quantity: Some(Quantity {
                value: 10.0,
                unit: "bags".to_string(),
            }),
            notes: None,
            needs_confirmation: true,
        };
        let msg = ServerMessage::Proposal {
            command_id: "cmd-9".to_string(),
            command: command.clone(),
            summary: command.summary(),
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"proposal""#));
        assert!(json.contains(r#""commandId":"cmd-9""#));
        assert!(json.contains(r#""action":"add""#));

        let deserialized = ServerMessage::from_json(&json).unwrap();
        assert_eq!(msg, deserialized);
    }

    #[test]
    fn test_result_frame_omits_empty_payload() {
        let msg = ServerMessage::Result {
            status: ResultStatus::Success,
            message: "done".to_string(),
            payload: None,
        };
        let json = msg.to_json().unwrap();
        assert_eq!(json, r#"{"type":"result","status":"success","message":"done"}"#);
    }

    #[test]
    fn test_result_frame_with_payload() {
        let msg = ServerMessage::Result {
            status: ResultStatus::Success,
            message: "stock level".to_string(),
            payload: Some(serde_json::json!({"count": 12})),
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""payload":{"count":12}"#));
    }

    #[test]
    fn test_error_frame_format() {
        let msg = ServerMessage::Error {
            kind: "interpretation_failed".to_string(),
            message: "generation service unreachable".to_string(),
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""kind":"interpretation_failed""#));
    }

    #[test]
    fn test_invalid_client_json_returns_error() {
        assert!(ClientMessage::from_json(r#"{"type":"unknown"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"confirm"}"#).is_err());
        assert!(ClientMessage::from_json("not json at all").is_err());
    }
}
