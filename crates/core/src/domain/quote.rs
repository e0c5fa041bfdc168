use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::session::FieldValues;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

impl QuoteId {
    pub fn generate() -> Self {
        Self(format!("Q-{}", Uuid::new_v4()))
    }
}

/// A fully elicited service with its pre-VAT monthly cost in local currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfiguredService {
    pub service_name: String,
    pub display_name: String,
    pub field_values: FieldValues,
    pub monthly_cost: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingBreakdown {
    pub subtotal: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: QuoteId,
    pub services: Vec<ConfiguredService>,
    pub pricing: PricingBreakdown,
    pub created_at: DateTime<Utc>,
}
