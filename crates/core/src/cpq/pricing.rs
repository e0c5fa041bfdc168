use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::quote::PricingBreakdown;
use crate::domain::service::{PricingModel, ServiceDefinition};
use crate::domain::session::FieldValues;

/// Field keys read by each pricing class.
pub mod keys {
    pub const INSTANCE_TYPE: &str = "instanceType";
    pub const INSTANCE_COUNT: &str = "count";
    pub const DISK_SIZE: &str = "diskSize";
    pub const BANDWIDTH: &str = "bandwidth";
    pub const STORAGE: &str = "storage";
    pub const REDUNDANCY: &str = "redundancy";
    pub const NODES: &str = "nodes";
    pub const TIER: &str = "tier";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub regional_multiplier: Decimal,
    pub exchange_rate: Decimal,
    pub vat_rate: Decimal,
    pub currency: String,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            regional_multiplier: Decimal::new(16, 1),
            exchange_rate: Decimal::new(375, 2),
            vat_rate: Decimal::new(15, 2),
            currency: "SAR".to_string(),
        }
    }
}

/// Cost of a single service. Amounts are exact; rounding happens only when combining.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePricing {
    pub service_name: String,
    pub subtotal_usd: Decimal,
    pub subtotal_local: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub trace: Vec<PricingTraceStep>,
}

pub trait PricingEngine: Send + Sync {
    fn price(&self, definition: &ServiceDefinition, values: &FieldValues) -> ServicePricing;
    fn combine(&self, subtotals: &[Decimal]) -> PricingBreakdown;
    fn currency(&self) -> &str;
}

#[derive(Clone, Debug, Default)]
pub struct DeterministicPricingEngine {
    policy: PricingPolicy,
}

impl DeterministicPricingEngine {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }
}

impl PricingEngine for DeterministicPricingEngine {
    fn price(&self, definition: &ServiceDefinition, values: &FieldValues) -> ServicePricing {
        price_service(&self.policy, definition, values)
    }

    fn combine(&self, subtotals: &[Decimal]) -> PricingBreakdown {
        combine_subtotals(&self.policy, subtotals)
    }

    fn currency(&self) -> &str {
        &self.policy.currency
    }
}

pub fn price_service(
    policy: &PricingPolicy,
    definition: &ServiceDefinition,
    values: &FieldValues,
) -> ServicePricing {
    let (subtotal_usd, mut trace) = usd_subtotal(&definition.pricing, values);
    let subtotal_local = subtotal_usd * policy.regional_multiplier * policy.exchange_rate;
    let vat = subtotal_local * policy.vat_rate;
    let total = subtotal_local + vat;

    trace.push(PricingTraceStep {
        stage: "local_subtotal".to_string(),
        detail: format!(
            "usd * regional_multiplier({}) * exchange_rate({})",
            policy.regional_multiplier, policy.exchange_rate
        ),
        amount: subtotal_local,
    });
    trace.push(PricingTraceStep {
        stage: "vat".to_string(),
        detail: format!("local_subtotal * {}", policy.vat_rate),
        amount: vat,
    });

    ServicePricing {
        service_name: definition.name.clone(),
        subtotal_usd,
        subtotal_local,
        vat,
        total,
        currency: policy.currency.clone(),
        trace,
    }
}

/// Zero-cost result for services the catalog does not know.
pub fn unpriced(currency: &str, service_name: &str) -> ServicePricing {
    ServicePricing {
        service_name: service_name.to_string(),
        subtotal_usd: Decimal::ZERO,
        subtotal_local: Decimal::ZERO,
        vat: Decimal::ZERO,
        total: Decimal::ZERO,
        currency: currency.to_string(),
        trace: vec![PricingTraceStep {
            stage: "unpriced".to_string(),
            detail: format!("no pricing model for `{service_name}`"),
            amount: Decimal::ZERO,
        }],
    }
}

/// Sums pre-VAT local subtotals, rounds the sum to a whole unit, then applies VAT once.
pub fn combine_subtotals(policy: &PricingPolicy, subtotals: &[Decimal]) -> PricingBreakdown {
    let subtotal = subtotals
        .iter()
        .copied()
        .sum::<Decimal>()
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let vat = subtotal * policy.vat_rate;

    PricingBreakdown { subtotal, vat, total: subtotal + vat, currency: policy.currency.clone() }
}

fn usd_subtotal(model: &PricingModel, values: &FieldValues) -> (Decimal, Vec<PricingTraceStep>) {
    match model {
        PricingModel::Compute(rates) => {
            let count = quantity(values, keys::INSTANCE_COUNT);
            let multiplier =
                tier_multiplier(&rates.instance_type_multipliers, values.get(keys::INSTANCE_TYPE));
            let hourly = rates.base_hourly_rate * multiplier
                + quantity(values, keys::BANDWIDTH) * rates.bandwidth_hourly_rate_per_mbps;
            let per_instance = hourly * rates.hours_per_month
                + quantity(values, keys::DISK_SIZE) * rates.disk_rate_per_gb;
            let subtotal = count * per_instance;

            (
                subtotal,
                vec![
                    step("instance_hourly", "base_rate * type_multiplier + bandwidth * rate", hourly),
                    step("instance_monthly", "hourly * hours_per_month + disk * rate", per_instance),
                    step("usd_subtotal", "count * instance_monthly", subtotal),
                ],
            )
        }
        PricingModel::ObjectStorage(rates) => {
            let multiplier =
                tier_multiplier(&rates.redundancy_multipliers, values.get(keys::REDUNDANCY));
            let subtotal = quantity(values, keys::STORAGE) * rates.storage_rate_per_gb * multiplier;

            (subtotal, vec![step("usd_subtotal", "storage * rate * redundancy_multiplier", subtotal)])
        }
        PricingModel::ManagedDatabase(rates) => {
            let multiplier = tier_multiplier(&rates.performance_multipliers, values.get(keys::TIER));
            let nodes = quantity(values, keys::NODES)
                * rates.node_hourly_rate
                * multiplier
                * rates.hours_per_month;
            let storage = quantity(values, keys::STORAGE) * rates.storage_rate_per_gb;
            let subtotal = nodes + storage;

            (
                subtotal,
                vec![
                    step("node_monthly", "nodes * rate * tier_multiplier * hours", nodes),
                    step("storage_monthly", "storage * rate", storage),
                    step("usd_subtotal", "node_monthly + storage_monthly", subtotal),
                ],
            )
        }
        PricingModel::Unpriced => {
            (Decimal::ZERO, vec![step("usd_subtotal", "unpriced service", Decimal::ZERO)])
        }
    }
}

fn quantity(values: &FieldValues, key: &str) -> Decimal {
    values.get(key).and_then(|raw| raw.trim().parse::<Decimal>().ok()).unwrap_or(Decimal::ZERO)
}

fn tier_multiplier(table: &BTreeMap<String, Decimal>, selected: Option<&String>) -> Decimal {
    selected
        .and_then(|selected| {
            table.iter().find(|(name, _)| name.eq_ignore_ascii_case(selected.trim()))
        })
        .map(|(_, multiplier)| *multiplier)
        .unwrap_or(Decimal::ONE)
}

fn step(stage: &str, detail: &str, amount: Decimal) -> PricingTraceStep {
    PricingTraceStep { stage: stage.to_string(), detail: detail.to_string(), amount }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{combine_subtotals, price_service, PricingPolicy};
    use crate::cpq::catalog::default_services;
    use crate::domain::service::ServiceDefinition;
    use crate::domain::session::FieldValues;

    fn service(name: &str) -> ServiceDefinition {
        default_services().into_iter().find(|service| service.name == name).expect("service")
    }

    fn values(pairs: &[(&str, &str)]) -> FieldValues {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    #[test]
    fn compute_pricing_matches_golden_figures() {
        let pricing = price_service(
            &PricingPolicy::default(),
            &service("ecs"),
            &values(&[
                ("instanceType", "ecs.g6.large"),
                ("count", "2"),
                ("diskSize", "100"),
                ("bandwidth", "10"),
            ]),
        );

        assert_eq!(pricing.subtotal_usd, Decimal::new(19_980, 2));
        assert_eq!(pricing.subtotal_local, Decimal::new(119_880, 2));
        assert_eq!(pricing.vat, Decimal::new(17_982, 2));
        assert_eq!(pricing.total, Decimal::new(137_862, 2));
        assert_eq!(pricing.currency, "SAR");
    }

    #[test]
    fn object_storage_applies_redundancy_multiplier() {
        let pricing = price_service(
            &PricingPolicy::default(),
            &service("oss"),
            &values(&[("storage", "500"), ("redundancy", "zrs"), ("bucketPurpose", "media")]),
        );

        assert_eq!(pricing.subtotal_usd, Decimal::new(125, 1));
        assert_eq!(pricing.subtotal_local, Decimal::from(75));
    }

    #[test]
    fn managed_database_scales_nodes_by_hours_but_not_storage() {
        let pricing = price_service(
            &PricingPolicy::default(),
            &service("rds"),
            &values(&[("engine", "MySQL"), ("tier", "Standard"), ("nodes", "2"), ("storage", "100")]),
        );

        assert_eq!(pricing.subtotal_usd, Decimal::new(2743, 1));
        assert_eq!(pricing.subtotal_local, Decimal::new(16_458, 1));
    }

    #[test]
    fn unknown_tiers_and_missing_numbers_degrade_gracefully() {
        let pricing = price_service(
            &PricingPolicy::default(),
            &service("ecs"),
            &values(&[("instanceType", "ecs.unknown"), ("count", "1")]),
        );

        // base rate with multiplier 1, no bandwidth, no disk
        assert_eq!(pricing.subtotal_usd, Decimal::new(365, 1));
    }

    #[test]
    fn pricing_is_pure() {
        let policy = PricingPolicy::default();
        let ecs = service("ecs");
        let input = values(&[
            ("instanceType", "ecs.r6.large"),
            ("count", "3"),
            ("diskSize", "80"),
            ("bandwidth", "4"),
        ]);

        assert_eq!(price_service(&policy, &ecs, &input), price_service(&policy, &ecs, &input));
    }

    #[test]
    fn combined_vat_is_applied_once_over_rounded_subtotal() {
        let policy = PricingPolicy::default();
        let breakdown =
            combine_subtotals(&policy, &[Decimal::new(119_880, 2), Decimal::from(75)]);

        assert_eq!(breakdown.subtotal, Decimal::from(1274));
        assert_eq!(breakdown.vat, Decimal::new(19_110, 2));
        assert_eq!(breakdown.total, breakdown.subtotal + breakdown.subtotal * Decimal::new(15, 2));
    }

    #[test]
    fn combining_single_service_rounds_half_away_from_zero() {
        let breakdown = combine_subtotals(&PricingPolicy::default(), &[Decimal::new(119_880, 2)]);

        assert_eq!(breakdown.subtotal, Decimal::from(1199));
        assert_eq!(breakdown.vat, Decimal::new(17_985, 2));
        assert_eq!(breakdown.total, Decimal::new(137_885, 2));
    }
}
