use serde::{Deserialize, Serialize};

use crate::domain::quote::Quote;
use crate::domain::session::{DialogueMode, DialogueSession};

/// Position of a session within the manual field elicitation machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElicitationState {
    ServiceSelectionPending,
    FieldInput(usize),
    ConfirmationPending,
}

impl ElicitationState {
    pub fn of(session: &DialogueSession) -> Option<Self> {
        match session.mode {
            DialogueMode::ManualServiceSelection => Some(Self::ServiceSelectionPending),
            DialogueMode::ManualFieldCollection => Some(Self::FieldInput(session.current_field_index)),
            DialogueMode::ManualConfirmation => Some(Self::ConfirmationPending),
            _ => None,
        }
    }
}

/// Reply produced by one dialogue step; `quote` is set when a terminal quote is delivered.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnReply {
    pub message: String,
    pub quote: Option<Quote>,
}

impl TurnReply {
    pub fn message(message: impl Into<String>) -> Self {
        Self { message: message.into(), quote: None }
    }

    pub fn with_quote(message: impl Into<String>, quote: Quote) -> Self {
        Self { message: message.into(), quote: Some(quote) }
    }
}
