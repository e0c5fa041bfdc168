use std::collections::BTreeSet;

use cloudquote_core::cpq::catalog::ServiceCatalog;
use cloudquote_core::domain::service::ServiceDefinition;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision<'a> {
    Allow(&'a ServiceDefinition),
    Deny { reason_code: &'static str, detail: String },
}

/// Rules applied to model recommendations before anything is priced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_services: usize,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { max_services: 6 }
    }
}

impl GuardrailPolicy {
    /// Admits a recommended service name once. Names outside the catalog and repeats are denied.
    pub fn evaluate<'a>(
        &self,
        catalog: &'a dyn ServiceCatalog,
        recommended_name: &str,
        admitted: &mut BTreeSet<String>,
    ) -> GuardrailDecision<'a> {
        let Ok(definition) = catalog.get(recommended_name) else {
            return GuardrailDecision::Deny {
                reason_code: "unknown_service",
                detail: format!("`{recommended_name}` is not in the service catalog"),
            };
        };

        if admitted.contains(&definition.name) {
            return GuardrailDecision::Deny {
                reason_code: "duplicate_service",
                detail: format!("`{}` was already recommended", definition.name),
            };
        }

        if admitted.len() >= self.max_services {
            return GuardrailDecision::Deny {
                reason_code: "too_many_services",
                detail: format!("only {} services are accepted per suggestion", self.max_services),
            };
        }

        admitted.insert(definition.name.clone());
        GuardrailDecision::Allow(definition)
    }
}
