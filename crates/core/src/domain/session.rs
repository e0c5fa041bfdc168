use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::quote::ConfiguredService;
use crate::domain::service::ServiceDefinition;
use crate::domain::suggestion::Suggestion;
use crate::errors::DomainError;

pub type FieldValues = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueMode {
    #[default]
    Idle,
    ManualServiceSelection,
    ManualFieldCollection,
    ManualConfirmation,
    AiSuggestionGathering,
    AiSuggestionConfirmation,
}

impl DialogueMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ManualServiceSelection => "manual_service_selection",
            Self::ManualFieldCollection => "manual_field_collection",
            Self::ManualConfirmation => "manual_confirmation",
            Self::AiSuggestionGathering => "ai_suggestion_gathering",
            Self::AiSuggestionConfirmation => "ai_suggestion_confirmation",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueSession {
    pub session_id: SessionId,
    pub mode: DialogueMode,
    pub current_service: Option<String>,
    pub current_field_index: usize,
    pub collected_fields: FieldValues,
    pub configured_services: Vec<ConfiguredService>,
    pub pending_suggestion: Option<Suggestion>,
    pub turn_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DialogueSession {
    pub fn new(session_id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            mode: DialogueMode::Idle,
            current_service: None,
            current_field_index: 0,
            collected_fields: FieldValues::new(),
            configured_services: Vec::new(),
            pending_suggestion: None,
            turn_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Back to the top-level menu; everything configured so far is discarded.
    pub fn restart(&mut self) {
        self.mode = DialogueMode::Idle;
        self.current_service = None;
        self.configured_services.clear();
        self.pending_suggestion = None;
        self.reset_fields();
    }

    pub fn begin_service(&mut self, service_name: impl Into<String>) {
        self.current_service = Some(service_name.into());
        self.reset_fields();
        self.mode = DialogueMode::ManualFieldCollection;
    }

    pub fn reset_fields(&mut self) {
        self.current_field_index = 0;
        self.collected_fields.clear();
    }

    pub fn record_turn(&mut self) {
        self.turn_count = self.turn_count.saturating_add(1);
        self.updated_at = Utc::now();
    }

    /// Checks the field-collection invariants against the definition of the current service.
    pub fn check_invariants(&self, current: Option<&ServiceDefinition>) -> Result<(), DomainError> {
        let Some(definition) = current else {
            if self.mode == DialogueMode::ManualFieldCollection {
                return Err(DomainError::InvariantViolation(
                    "field collection requires a current service".to_string(),
                ));
            }
            return Ok(());
        };

        if self.mode == DialogueMode::ManualFieldCollection
            && self.current_field_index >= definition.fields.len()
        {
            return Err(DomainError::InvariantViolation(format!(
                "field index {} out of range for `{}` ({} fields)",
                self.current_field_index,
                definition.name,
                definition.fields.len()
            )));
        }

        if let Some(key) =
            self.collected_fields.keys().find(|key| definition.field(key.as_str()).is_none())
        {
            return Err(DomainError::InvariantViolation(format!(
                "collected field `{key}` is not defined by `{}`",
                definition.name
            )));
        }

        Ok(())
    }
}
