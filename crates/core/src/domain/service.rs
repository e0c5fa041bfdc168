use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a field value is entered and validated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number {
        #[serde(default)]
        min: Option<Decimal>,
        #[serde(default)]
        max: Option<Decimal>,
        #[serde(default)]
        unit: Option<String>,
    },
    #[serde(rename = "option")]
    Choice { options: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    pub prompt: String,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeRates {
    pub base_hourly_rate: Decimal,
    pub instance_type_multipliers: BTreeMap<String, Decimal>,
    pub disk_rate_per_gb: Decimal,
    pub bandwidth_hourly_rate_per_mbps: Decimal,
    pub hours_per_month: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStorageRates {
    pub storage_rate_per_gb: Decimal,
    pub redundancy_multipliers: BTreeMap<String, Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedDatabaseRates {
    pub node_hourly_rate: Decimal,
    pub performance_multipliers: BTreeMap<String, Decimal>,
    pub storage_rate_per_gb: Decimal,
    pub hours_per_month: Decimal,
}

/// Pricing class of a service together with its USD coefficients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum PricingModel {
    Compute(ComputeRates),
    ObjectStorage(ObjectStorageRates),
    ManagedDatabase(ManagedDatabaseRates),
    Unpriced,
}

impl PricingModel {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Compute(_) => "compute",
            Self::ObjectStorage(_) => "object_storage",
            Self::ManagedDatabase(_) => "managed_database",
            Self::Unpriced => "unpriced",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub fields: Vec<FieldSpec>,
    pub pricing: PricingModel,
}

impl ServiceDefinition {
    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.key == key)
    }

    pub fn field_keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.key.as_str())
    }

    /// True when `token` names this service, either directly or through an alias.
    pub fn is_named_by(&self, token: &str) -> bool {
        self.name.eq_ignore_ascii_case(token)
            || self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(token))
    }
}
