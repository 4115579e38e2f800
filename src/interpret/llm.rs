//! Interpreter backed by an OpenAI-compatible chat-completions API.

use crate::error::{Result, StockhandError};
use crate::interpret::parser::parse_response;
use crate::interpret::{Interpreter, ParsedCommand};
use async_trait::async_trait;
use log::{debug, error};
use serde::{Deserialize, Serialize};

/// Fixed domain instruction set sent with every transcript.
const INSTRUCTIONS: &str = "\
You convert spoken coffee-shop inventory requests into structured commands.\n\
Reply with exactly these lines and nothing else:\n\
ACTION: one of add, remove, update, check, report, email, alert\n\
ITEM: the inventory item named, or none\n\
QUANTITY: amount and unit (e.g. \"10 bags\"), or none\n\
NOTES: any remaining detail, or none\n\
If the request is not an inventory command, use ACTION: unknown.";

#[derive(Serialize, Deserialize, Debug)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Command interpreter calling a chat-completions endpoint.
pub struct LlmInterpreter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl LlmInterpreter {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

fn interpretation_failed(message: impl std::fmt::Display) -> StockhandError {
    StockhandError::InterpretationFailed {
        message: message.to_string(),
    }
}

#[async_trait]
impl Interpreter for LlmInterpreter {
    async fn interpret(&self, transcript: &str) -> Result<ParsedCommand> {
        debug!("interpreting transcript ({} chars)", transcript.len());

        let request_body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: INSTRUCTIONS.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: transcript.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!("generation service unreachable: {}", e);
                interpretation_failed(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            error!("generation service error ({}): {}", status, body);
            return Err(interpretation_failed(format!(
                "generation service returned {}",
                status
            )));
        }

        let response_body: ChatResponse = response.json().await.map_err(|e| {
            error!("failed to parse generation service response: {}", e);
            interpretation_failed(e)
        })?;

        let content = response_body
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| interpretation_failed("generation service response has no choices"))?;

        let command = parse_response(content)?;
        debug!(
            "interpreted as {} (confirmation: {})",
            command.action.as_str(),
            command.needs_confirmation
        );
        Ok(command)
    }
}
