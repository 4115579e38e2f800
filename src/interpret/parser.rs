//! Parser for the generation service's structured reply.
//!
//! The domain instruction set asks the model to answer in the form
//!
//! ```text
//! ACTION: add
//! ITEM: espresso beans
//! QUANTITY: 10 bags
//! NOTES: restock for the weekend
//! ```
//!
//! The model may deviate; anything without a recognizable ACTION line is
//! an interpretation failure, and unrecognized verbs map to `unknown`.

use crate::error::{Result, StockhandError};
use crate::interpret::command::{ActionKind, ParsedCommand, Quantity};

/// Parse the generation service's reply into a command.
pub fn parse_response(response: &str) -> Result<ParsedCommand> {
    let mut action: Option<ActionKind> = None;
    let mut item = String::new();
    let mut quantity: Option<Quantity> = None;
    let mut notes: Option<String> = None;

    for line in response.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_uppercase().as_str() {
            "ACTION" => action = Some(ActionKind::from_verb(value)),
            "ITEM" => {
                if !is_none_marker(value) {
                    item = value.to_string();
                }
            }
            "QUANTITY" => quantity = parse_quantity(value),
            "NOTES" => {
                if !value.is_empty() && !is_none_marker(value) {
                    notes = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    let Some(action) = action else {
        return Err(StockhandError::InterpretationFailed {
            message: "response has no ACTION line".to_string(),
        });
    };

    let mut command = ParsedCommand::new(action, item);
    command.quantity = quantity;
    command.notes = notes;
    Ok(command)
}

/// Split a quantity like "10 bags" into value and unit.
///
/// A bare number gets an empty unit; anything non-numeric is not a
/// quantity.
fn parse_quantity(value: &str) -> Option<Quantity> {
    if is_none_marker(value) {
        return None;
    }
    let mut parts = value.splitn(2, char::is_whitespace);
    let number = parts.next()?.trim();
    let parsed = number.parse::<f64>().ok()?;
    let unit = parts.next().unwrap_or("").trim().to_string();
    Some(Quantity {
        value: parsed,
        unit,
    })
}

fn is_none_marker(value: &str) -> bool {
    value.is_empty() || value.eq_ignore_ascii_case("none") || value == "-"
}
