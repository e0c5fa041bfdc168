pub mod catalog;
pub mod pricing;

use std::sync::Arc;

use chrono::Utc;

use crate::domain::quote::{ConfiguredService, PricingBreakdown, Quote, QuoteId};
use crate::domain::service::ServiceDefinition;
use crate::domain::session::FieldValues;

use self::{
    catalog::{ServiceCatalog, StaticCatalog},
    pricing::{DeterministicPricingEngine, PricingEngine, ServicePricing},
};

/// Catalog and pricing engine bundled for the dialogue layers.
#[derive(Clone)]
pub struct CpqRuntime {
    catalog: Arc<dyn ServiceCatalog>,
    pricing: Arc<dyn PricingEngine>,
}

impl Default for CpqRuntime {
    fn default() -> Self {
        Self::new(Arc::new(StaticCatalog::default()), Arc::new(DeterministicPricingEngine::default()))
    }
}

impl CpqRuntime {
    pub fn new(catalog: Arc<dyn ServiceCatalog>, pricing: Arc<dyn PricingEngine>) -> Self {
        Self { catalog, pricing }
    }

    pub fn catalog(&self) -> &dyn ServiceCatalog {
        self.catalog.as_ref()
    }

    pub fn currency(&self) -> &str {
        self.pricing.currency()
    }

    /// Prices a service by name. Unknown services cost nothing rather than failing the turn.
    pub fn calculate(&self, service_name: &str, values: &FieldValues) -> ServicePricing {
        match self.catalog.get(service_name) {
            Ok(definition) => self.pricing.price(definition, values),
            Err(_) => pricing::unpriced(self.currency(), service_name),
        }
    }

    pub fn configure(&self, definition: &ServiceDefinition, values: FieldValues) -> ConfiguredService {
        let pricing = self.pricing.price(definition, &values);
        ConfiguredService {
            service_name: definition.name.clone(),
            display_name: definition.display_name.clone(),
            field_values: values,
            monthly_cost: pricing.subtotal_local,
        }
    }

    /// Re-prices every service from its field values and applies VAT once to the combined subtotal.
    pub fn combine(&self, services: &[ConfiguredService]) -> PricingBreakdown {
        let subtotals = services
            .iter()
            .map(|service| self.calculate(&service.service_name, &service.field_values).subtotal_local)
            .collect::<Vec<_>>();
        self.pricing.combine(&subtotals)
    }

    pub fn quote(&self, services: &[ConfiguredService]) -> Quote {
        Quote {
            id: QuoteId::generate(),
            services: services.to_vec(),
            pricing: self.combine(services),
            created_at: Utc::now(),
        }
    }
}
