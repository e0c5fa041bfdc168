use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::{ConfiguredService, PricingBreakdown};
use crate::domain::session::FieldValues;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuggestionSource {
    Model,
    Fallback { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedService {
    pub name: String,
    pub display_name: String,
    pub reason: String,
    pub config: FieldValues,
    pub monthly_cost: Decimal,
}

impl SuggestedService {
    pub fn to_configured(&self) -> ConfiguredService {
        ConfiguredService {
            service_name: self.name.clone(),
            display_name: self.display_name.clone(),
            field_values: self.config.clone(),
            monthly_cost: self.monthly_cost,
        }
    }
}

/// A priced multi-service recommendation awaiting an accept/modify decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub analysis: String,
    pub services: Vec<SuggestedService>,
    pub pricing: PricingBreakdown,
    pub estimated_capacity: String,
    pub next_steps: Vec<String>,
    pub source: SuggestionSource,
}

impl Suggestion {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, SuggestionSource::Fallback { .. })
    }
}
