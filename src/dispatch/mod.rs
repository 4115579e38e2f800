//! Action dispatch: confirmed commands → external executors.
//!
//! Each executor call is attempted exactly once; mutating actions are
//! never retried automatically (double-execution risk). Failures carry a
//! structured kind instead of being retried or swallowed.

pub mod executors;

pub use executors::{
    EmailSender, HttpEmailSender, HttpSheetClient, MockEmailSender, MockSheetClient, SheetClient,
};

use crate::error::StockhandError;
use crate::interpret::{ActionKind, ParsedCommand};
use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;

/// Why a dispatch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchErrorKind {
    AuthExpired,
    ExternalServiceError,
    InvalidCommand,
}

impl DispatchErrorKind {
    fn from_error(error: &StockhandError) -> Self {
        match error {
            StockhandError::AuthExpired => DispatchErrorKind::AuthExpired,
            StockhandError::InvalidCommand { .. } => DispatchErrorKind::InvalidCommand,
            _ => DispatchErrorKind::ExternalServiceError,
        }
    }
}

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Success {
        message: String,
        payload: Option<serde_json::Value>,
    },
    Failure {
        kind: DispatchErrorKind,
        message: String,
    },
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success { .. })
    }
}

/// Routes commands to the executor responsible for their action kind.
pub struct ActionDispatcher {
    email: Arc<dyn EmailSender>,
    sheets: Arc<dyn SheetClient>,
    email_to: String,
    inventory_range: String,
}

impl ActionDispatcher {
    pub fn new(
        email: Arc<dyn EmailSender>,
        sheets: Arc<dyn SheetClient>,
        email_to: &str,
        inventory_range: &str,
    ) -> Self {
        Self {
            email,
            sheets,
            email_to: email_to.to_string(),
            inventory_range: inventory_range.to_string(),
        }
    }

    /// Execute a command that is confirmed or never required confirmation.
    pub async fn dispatch(&self, command: &ParsedCommand) -> ActionResult {
        debug!("dispatching {} command", command.action.as_str());
        let outcome = match command.action {
            ActionKind::Email => {
                let subject = format!("Inventory: {}", command.summary());
                let body = command
                    .notes
                    .clone()
                    .unwrap_or_else(|| command.summary());
                self.email.send_email(&self.email_to, &subject, &body).await
            }
            ActionKind::Add | ActionKind::Remove | ActionKind::Update | ActionKind::Alert => {
                let row = command_row(command);
                self.sheets.update(&self.inventory_range, &[row]).await
            }
            ActionKind::Check | ActionKind::Report => self.sheets.query(&command.item).await,
            ActionKind::Unknown => {
                return ActionResult::Failure {
                    kind: DispatchErrorKind::InvalidCommand,
                    message: "could not understand that as an inventory command".to_string(),
                };
            }
        };

        match outcome {
            Ok(payload) => ActionResult::Success {
                message: format!("{} completed", command.summary()),
                payload: Some(payload),
            },
            Err(e) => {
                warn!("dispatch of {} failed: {}", command.action.as_str(), e);
                ActionResult::Failure {
                    kind: DispatchErrorKind::from_error(&e),
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Spreadsheet row for a mutating command.
fn command_row(command: &ParsedCommand) -> Vec<String> {
    let (value, unit) = command
        .quantity
        .as_ref()
        .map(|q| (q.value.to_string(), q.unit.clone()))
        .unwrap_or_default();
    vec![
        command.action.as_str().to_string(),
        command.item.clone(),
        value,
        unit,
        command.notes.clone().unwrap_or_default(),
    ]
}
