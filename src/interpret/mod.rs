//! Command interpretation: finalized transcript → structured inventory
//! command.
//!
//! The [`Interpreter`] trait is the seam; [`llm::LlmInterpreter`] sends
//! the transcript with the fixed domain instruction set to a
//! text-generation service and parses its structured reply.

pub mod command;
pub mod llm;
pub mod parser;

pub use command::{ActionKind, ParsedCommand, Quantity};
pub use llm::LlmInterpreter;

use crate::error::{Result, StockhandError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Turns one finalized transcript into a structured command.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(&self, transcript: &str) -> Result<ParsedCommand>;
}

/// Scriptable interpreter for tests.
#[derive(Default)]
pub struct MockInterpreter {
    responses: Mutex<HashMap<String, ParsedCommand>>,
    calls: AtomicUsize,
    fail: Mutex<Option<String>>,
}

impl MockInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the command returned for an exact transcript.
    pub fn with_response(self, transcript: &str, command: ParsedCommand) -> Self {
        self.responses
            .lock()
            .expect("mock lock poisoned")
            .insert(transcript.to_string(), command);
        self
    }

    /// Make every call fail with `InterpretationFailed`.
    pub fn with_failure(self, message: &str) -> Self {
        *self.fail.lock().expect("mock lock poisoned") = Some(message.to_string());
        self
    }

    /// Number of interpret calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Interpreter for MockInterpreter {
    async fn interpret(&self, transcript: &str) -> Result<ParsedCommand> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail.lock().expect("mock lock poisoned").clone() {
            return Err(StockhandError::InterpretationFailed { message });
        }
        self.responses
            .lock()
            .expect("mock lock poisoned")
            .get(transcript)
            .cloned()
            .ok_or_else(|| StockhandError::InterpretationFailed {
                message: format!("no scripted response for {:?}", transcript),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_scripted_command() {
        let command = ParsedCommand::new(ActionKind::Check, "cups");
        let mock = MockInterpreter::new().with_response("check stock on cups", command.clone());

        let parsed = mock.interpret("check stock on cups").await.unwrap();
        assert_eq!(parsed, command);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_fails_when_configured() {
        let mock = MockInterpreter::new().with_failure("service down");
        let result = mock.interpret("anything").await;
        assert!(matches!(
            result,
            Err(StockhandError::InterpretationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_unscripted_transcript_fails() {
        let mock = MockInterpreter::new();
        assert!(mock.interpret("never scripted").await.is_err());
    }
}
