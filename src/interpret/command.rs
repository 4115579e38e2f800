//! Structured inventory command types.

use serde::{Deserialize, Serialize};

/// Closed set of actions the assistant understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Add,
    Remove,
    Update,
    Check,
    Report,
    Email,
    Alert,
    Unknown,
}

impl ActionKind {
    /// Map a verb from the generation service to an action kind.
    /// Unrecognized verbs map to `Unknown`.
    pub fn from_verb(verb: &str) -> Self {
        match verb.trim().to_lowercase().as_str() {
            "add" => ActionKind::Add,
            "remove" => ActionKind::Remove,
            "update" => ActionKind::Update,
            "check" => ActionKind::Check,
            "report" => ActionKind::Report,
            "email" => ActionKind::Email,
            "alert" => ActionKind::Alert,
            _ => ActionKind::Unknown,
        }
    }

    /// True for actions that change inventory or spreadsheet state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ActionKind::Add | ActionKind::Remove | ActionKind::Update | ActionKind::Alert
        )
    }

    /// Mutating actions and outbound email must be confirmed before
    /// dispatch.
    pub fn needs_confirmation(&self) -> bool {
        self.is_mutating() || matches!(self, ActionKind::Email)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Add => "add",
            ActionKind::Remove => "remove",
            ActionKind::Update => "update",
            ActionKind::Check => "check",
            ActionKind::Report => "report",
            ActionKind::Email => "email",
            ActionKind::Alert => "alert",
            ActionKind::Unknown => "unknown",
        }
    }
}

/// Numeric amount with a unit, e.g. 10 "bags".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

/// One interpreted inventory command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub action: ActionKind,
    pub item: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub needs_confirmation: bool,
}

impl ParsedCommand {
    /// Build a command with the confirmation flag derived from the action.
    pub fn new(action: ActionKind, item: impl Into<String>) -> Self {
        Self {
            action,
            item: item.into(),
            quantity: None,
            notes: None,
            needs_confirmation: action.needs_confirmation(),
        }
    }

    pub fn with_quantity(mut self, value: f64, unit: impl Into<String>) -> Self {
        self.quantity = Some(Quantity {
            value,
            unit: unit.into(),
        });
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Human-readable summary shown with a confirmation proposal.
    pub fn summary(&self) -> String {
        let mut summary = match (&self.quantity, self.item.is_empty()) {
            (Some(q), false) => format!(
                "{} {} {} of {}",
                capitalize(self.action.as_str()),
                trim_number(q.value),
                q.unit,
                self.item
            ),
            (None, false) => format!("{} {}", capitalize(self.action.as_str()), self.item),
            _ => capitalize(self.action.as_str()),
        };
        if let Some(notes) = &self.notes {
            summary.push_str(" (");
            summary.push_str(notes);
            summary.push(')');
        }
        summary
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Format a quantity value without a trailing ".0" for whole numbers.
fn trim_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
