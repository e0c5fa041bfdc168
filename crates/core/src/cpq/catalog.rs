use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::service::{
    ComputeRates, FieldKind, FieldSpec, ManagedDatabaseRates, ObjectStorageRates, PricingModel,
    ServiceDefinition,
};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown service `{name}`")]
    NotFound { name: String },
    #[error("could not read catalog file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid catalog: {0}")]
    Invalid(String),
}

/// Read-only lookup of service schemas and pricing coefficients.
pub trait ServiceCatalog: Send + Sync {
    fn get(&self, name: &str) -> Result<&ServiceDefinition, CatalogError>;
    fn list(&self) -> &[ServiceDefinition];
}

#[derive(Clone, Debug)]
pub struct StaticCatalog {
    services: Vec<ServiceDefinition>,
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new(default_services())
    }
}

impl StaticCatalog {
    pub fn new(services: Vec<ServiceDefinition>) -> Self {
        Self { services }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw)?;
        validate_services(&file.services)?;
        Ok(Self::new(file.services))
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| CatalogError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }
}

impl ServiceCatalog for StaticCatalog {
    fn get(&self, name: &str) -> Result<&ServiceDefinition, CatalogError> {
        let wanted = name.trim();
        self.services
            .iter()
            .find(|service| service.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CatalogError::NotFound { name: wanted.to_string() })
    }

    fn list(&self) -> &[ServiceDefinition] {
        &self.services
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    services: Vec<ServiceDefinition>,
}

fn validate_services(services: &[ServiceDefinition]) -> Result<(), CatalogError> {
    if services.is_empty() {
        return Err(CatalogError::Invalid("catalog must define at least one service".to_string()));
    }

    let mut names = BTreeSet::new();
    for service in services {
        if !names.insert(service.name.to_ascii_lowercase()) {
            return Err(CatalogError::Invalid(format!("duplicate service `{}`", service.name)));
        }

        let mut keys = BTreeSet::new();
        for field in &service.fields {
            if !keys.insert(field.key.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "service `{}` defines field `{}` twice",
                    service.name, field.key
                )));
            }
            match &field.kind {
                FieldKind::Choice { options } if options.is_empty() => {
                    return Err(CatalogError::Invalid(format!(
                        "option field `{}.{}` has no options",
                        service.name, field.key
                    )));
                }
                FieldKind::Number { min: Some(min), max: Some(max), .. } if min > max => {
                    return Err(CatalogError::Invalid(format!(
                        "number field `{}.{}` has min greater than max",
                        service.name, field.key
                    )));
                }
                _ => {}
            }
        }
    }

    Ok(())
}

/// Built-in catalog used when no catalog file is configured.
pub fn default_services() -> Vec<ServiceDefinition> {
    vec![compute_service(), object_storage_service(), managed_database_service()]
}

fn compute_service() -> ServiceDefinition {
    ServiceDefinition {
        name: "ecs".to_string(),
        display_name: "Elastic Compute Service (ECS)".to_string(),
        description: "Virtual machines for running application servers and workers.".to_string(),
        aliases: vec!["compute".to_string(), "server".to_string(), "vm".to_string()],
        fields: vec![
            choice_field(
                "instanceType",
                "Instance type",
                "Which instance type do you need?",
                &["ecs.t6.small", "ecs.g6.large", "ecs.g6.xlarge", "ecs.c6.2xlarge", "ecs.r6.large"],
                "ecs.g6.large",
            ),
            number_field("count", "Instance count", "How many instances?", 1, 100, "instances", "1"),
            number_field(
                "diskSize",
                "System disk size",
                "How much disk per instance?",
                20,
                32_768,
                "GB",
                "40",
            ),
            number_field(
                "bandwidth",
                "Public bandwidth",
                "How much public bandwidth per instance?",
                0,
                200,
                "Mbps",
                "5",
            ),
        ],
        pricing: PricingModel::Compute(ComputeRates {
            base_hourly_rate: Decimal::new(5, 2),
            instance_type_multipliers: multipliers(&[
                ("ecs.t6.small", Decimal::new(5, 1)),
                ("ecs.g6.large", Decimal::ONE),
                ("ecs.g6.xlarge", Decimal::from(2)),
                ("ecs.c6.2xlarge", Decimal::new(36, 1)),
                ("ecs.r6.large", Decimal::new(13, 1)),
            ]),
            disk_rate_per_gb: Decimal::new(5, 2),
            bandwidth_hourly_rate_per_mbps: Decimal::new(8, 3),
            hours_per_month: Decimal::from(730),
        }),
    }
}

fn object_storage_service() -> ServiceDefinition {
    ServiceDefinition {
        name: "oss".to_string(),
        display_name: "Object Storage Service (OSS)".to_string(),
        description: "Durable storage for files, media, and backups.".to_string(),
        aliases: vec!["storage".to_string(), "bucket".to_string(), "s3".to_string()],
        fields: vec![
            number_field(
                "storage",
                "Storage capacity",
                "How much data will you store?",
                1,
                1_000_000,
                "GB",
                "100",
            ),
            choice_field(
                "redundancy",
                "Redundancy",
                "Which redundancy level do you need?",
                &["LRS", "ZRS"],
                "LRS",
            ),
            FieldSpec {
                key: "bucketPurpose".to_string(),
                label: "Bucket purpose".to_string(),
                kind: FieldKind::Text,
                prompt: "What will the bucket hold?".to_string(),
                default: Some("general assets".to_string()),
            },
        ],
        pricing: PricingModel::ObjectStorage(ObjectStorageRates {
            storage_rate_per_gb: Decimal::new(2, 2),
            redundancy_multipliers: multipliers(&[
                ("LRS", Decimal::ONE),
                ("ZRS", Decimal::new(125, 2)),
            ]),
        }),
    }
}

fn managed_database_service() -> ServiceDefinition {
    ServiceDefinition {
        name: "rds".to_string(),
        display_name: "ApsaraDB RDS".to_string(),
        description: "Managed relational database instances.".to_string(),
        aliases: vec!["database".to_string(), "db".to_string(), "mysql".to_string()],
        fields: vec![
            choice_field(
                "engine",
                "Database engine",
                "Which database engine?",
                &["MySQL", "PostgreSQL", "SQL Server"],
                "MySQL",
            ),
            choice_field(
                "tier",
                "Performance tier",
                "Which performance tier?",
                &["Basic", "Standard", "Premium"],
                "Standard",
            ),
            number_field("nodes", "Node count", "How many database nodes?", 1, 16, "nodes", "1"),
            number_field(
                "storage",
                "Database storage",
                "How much database storage?",
                20,
                6_000,
                "GB",
                "100",
            ),
        ],
        pricing: PricingModel::ManagedDatabase(ManagedDatabaseRates {
            node_hourly_rate: Decimal::new(12, 2),
            performance_multipliers: multipliers(&[
                ("Basic", Decimal::ONE),
                ("Standard", Decimal::new(15, 1)),
                ("Premium", Decimal::new(25, 1)),
            ]),
            storage_rate_per_gb: Decimal::new(115, 3),
            hours_per_month: Decimal::from(730),
        }),
    }
}

fn choice_field(key: &str, label: &str, prompt: &str, options: &[&str], default: &str) -> FieldSpec {
    FieldSpec {
        key: key.to_string(),
        label: label.to_string(),
        kind: FieldKind::Choice { options: options.iter().map(|option| option.to_string()).collect() },
        prompt: prompt.to_string(),
        default: Some(default.to_string()),
    }
}

fn number_field(
    key: &str,
    label: &str,
    prompt: &str,
    min: i64,
    max: i64,
    unit: &str,
    default: &str,
) -> FieldSpec {
    FieldSpec {
        key: key.to_string(),
        label: label.to_string(),
        kind: FieldKind::Number {
            min: Some(Decimal::from(min)),
            max: Some(Decimal::from(max)),
            unit: Some(unit.to_string()),
        },
        prompt: prompt.to_string(),
        default: Some(default.to_string()),
    }
}

fn multipliers(entries: &[(&str, Decimal)]) -> BTreeMap<String, Decimal> {
    entries.iter().map(|(name, value)| (name.to_string(), *value)).collect()
}
