use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use cloudquote_core::cpq::CpqRuntime;
use cloudquote_core::domain::quote::ConfiguredService;
use cloudquote_core::domain::service::{FieldKind, PricingModel, ServiceDefinition};
use cloudquote_core::domain::session::FieldValues;
use cloudquote_core::domain::suggestion::{SuggestedService, Suggestion, SuggestionSource};
use cloudquote_core::flows::fields::{coerce_field_value, field_hint};
use cloudquote_core::flows::messages::{breakdown, money};
use serde::Deserialize;
use tracing::{info, warn};

use crate::decoder::{decode_untrusted, DecodeError};
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::{LlmClient, LlmError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12);

const SYSTEM_INSTRUCTIONS: &str = "You are a cloud solutions architect. Recommend services \
only from the catalog you are given. Reply with a single JSON object and nothing else, shaped as \
{\"analysis\": string, \"recommendedServices\": [{\"name\": string, \"reason\": string, \
\"config\": {fieldKey: value}}], \"estimatedCapacity\": string, \"monthlyCost\": number, \
\"nextSteps\": [string]}. Use the catalog field keys for config and stay within the listed \
options and ranges.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelRecommendation {
    #[serde(default)]
    analysis: String,
    #[serde(default, alias = "recommended_services", alias = "services")]
    recommended_services: Vec<ModelService>,
    #[serde(default, alias = "estimated_capacity")]
    estimated_capacity: String,
    #[serde(default, alias = "next_steps")]
    next_steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ModelService {
    name: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    config: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug)]
enum AttemptFailure {
    Completion(LlmError),
    Decode(DecodeError),
}

impl AttemptFailure {
    fn reason(&self) -> String {
        match self {
            Self::Completion(error) => error.to_string(),
            Self::Decode(error) => error.to_string(),
        }
    }
}

/// Turns a free-text workload description into a priced recommendation.
///
/// Never fails: transport errors are retried, then every failure path lands on a
/// deterministic recommendation built from catalog defaults.
pub struct SuggestionAdapter {
    client: Arc<dyn LlmClient>,
    cpq: CpqRuntime,
    guardrails: GuardrailPolicy,
    timeout: Duration,
    max_retries: u32,
}

impl SuggestionAdapter {
    pub fn new(client: Arc<dyn LlmClient>, cpq: CpqRuntime) -> Self {
        Self {
            client,
            cpq,
            guardrails: GuardrailPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: 1,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailPolicy) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub async fn request_suggestion(&self, free_text: &str) -> Suggestion {
        let prompt = self.prompt(free_text);

        let recommendation = match self.complete_with_retry(&prompt).await {
            Ok(recommendation) => recommendation,
            Err(failure) => {
                warn!(
                    event_name = "suggestion.model.fallback",
                    reason = %failure.reason(),
                    "suggestion model unavailable, using catalog defaults"
                );
                return self.fallback(free_text, failure.reason());
            }
        };

        match self.accept(&recommendation) {
            Some(services) => {
                info!(
                    event_name = "suggestion.model.accepted",
                    services = services.len(),
                    "model recommendation priced"
                );
                self.priced(
                    recommendation.analysis,
                    services,
                    recommendation.estimated_capacity,
                    recommendation.next_steps,
                    SuggestionSource::Model,
                )
            }
            None => {
                warn!(
                    event_name = "suggestion.guardrail.empty",
                    "no recommended service matched the catalog"
                );
                self.fallback(free_text, "no recommended service matched the catalog".to_string())
            }
        }
    }

    async fn complete_with_retry(&self, prompt: &str) -> Result<ModelRecommendation, AttemptFailure> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let completion = match tokio::time::timeout(
                self.timeout,
                self.client.complete(SYSTEM_INSTRUCTIONS, prompt),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.timeout)),
            };

            match completion {
                Ok(raw) => return decode_untrusted(&raw).map_err(AttemptFailure::Decode),
                Err(error) if error.is_retryable() && attempt <= self.max_retries => {
                    warn!(
                        event_name = "suggestion.model.retry",
                        attempt,
                        error = %error,
                        "completion failed, retrying with identical input"
                    );
                }
                Err(error) => return Err(AttemptFailure::Completion(error)),
            }
        }
    }

    fn accept(&self, recommendation: &ModelRecommendation) -> Option<Vec<SuggestedService>> {
        let catalog = self.cpq.catalog();
        let mut admitted = BTreeSet::new();
        let mut services = Vec::new();

        for recommended in &recommendation.recommended_services {
            match self.guardrails.evaluate(catalog, &recommended.name, &mut admitted) {
                GuardrailDecision::Allow(definition) => {
                    let config = coerce_config(definition, &recommended.config);
                    services.push(self.suggest(definition, recommended.reason.clone(), config));
                }
                GuardrailDecision::Deny { reason_code, detail } => {
                    warn!(
                        event_name = "suggestion.guardrail.denied",
                        reason_code,
                        detail = %detail,
                        "recommended service dropped"
                    );
                }
            }
        }

        (!services.is_empty()).then_some(services)
    }

    fn suggest(
        &self,
        definition: &ServiceDefinition,
        reason: String,
        config: FieldValues,
    ) -> SuggestedService {
        let ConfiguredService { field_values, monthly_cost, .. } =
            self.cpq.configure(definition, config);
        SuggestedService {
            name: definition.name.clone(),
            display_name: definition.display_name.clone(),
            reason,
            config: field_values,
            monthly_cost,
        }
    }

    fn priced(
        &self,
        analysis: String,
        services: Vec<SuggestedService>,
        estimated_capacity: String,
        next_steps: Vec<String>,
        source: SuggestionSource,
    ) -> Suggestion {
        let configured = services.iter().map(SuggestedService::to_configured).collect::<Vec<_>>();
        let pricing = self.cpq.combine(&configured);
        Suggestion { analysis, services, pricing, estimated_capacity, next_steps, source }
    }

    /// Deterministic recommendation: the first compute service plus any storage or
    /// database service the description hints at, all at catalog defaults.
    fn fallback(&self, free_text: &str, reason: String) -> Suggestion {
        let text = free_text.to_lowercase();
        let catalog = self.cpq.catalog();
        let mut chosen: Vec<&ServiceDefinition> = Vec::new();

        for definition in catalog.list() {
            let named = text
                .split(|character: char| !character.is_alphanumeric())
                .any(|token| !token.is_empty() && definition.is_named_by(token));
            let hinted = match definition.pricing {
                PricingModel::Compute(_) => {
                    !chosen.iter().any(|chosen| matches!(chosen.pricing, PricingModel::Compute(_)))
                }
                PricingModel::ObjectStorage(_) => mentions_any(&text, STORAGE_HINTS),
                PricingModel::ManagedDatabase(_) => mentions_any(&text, DATABASE_HINTS),
                PricingModel::Unpriced => false,
            };
            if named || hinted {
                chosen.push(definition);
            }
        }
        if chosen.is_empty() {
            chosen.extend(catalog.list().first());
        }

        let services = chosen
            .into_iter()
            .map(|definition| {
                let config = coerce_config(definition, &BTreeMap::new());
                self.suggest(
                    definition,
                    "Sized from catalog defaults for a typical starting workload.".to_string(),
                    config,
                )
            })
            .collect::<Vec<_>>();

        self.priced(
            "I couldn't reach the recommendation model, so this is a standard starting \
             configuration based on your description."
                .to_string(),
            services,
            "Suitable for a small production workload; scale up after measuring real usage."
                .to_string(),
            vec![
                "Review each service's settings.".to_string(),
                "Switch to manual configuration to fine-tune any value.".to_string(),
            ],
            SuggestionSource::Fallback { reason },
        )
    }

    fn prompt(&self, free_text: &str) -> String {
        let mut prompt = String::from("Service catalog:\n");
        for definition in self.cpq.catalog().list() {
            prompt.push_str(&format!(
                "\n- {} ({}): {}\n",
                definition.name, definition.display_name, definition.description
            ));
            for field in &definition.fields {
                let constraint = match &field.kind {
                    FieldKind::Text => "free text".to_string(),
                    _ => field_hint(field).unwrap_or_default(),
                };
                prompt.push_str(&format!("  - {} ({}): {}\n", field.key, field.label, constraint));
            }
        }
        prompt.push_str(&format!("\nCustomer description:\n{}\n", free_text.trim()));
        prompt
    }
}

const STORAGE_HINTS: &[&str] =
    &["storage", "file", "files", "image", "images", "video", "media", "backup", "upload", "assets"];
const DATABASE_HINTS: &[&str] =
    &["database", "db", "orders", "users", "customers", "transactions", "records", "inventory"];

fn mentions_any(text: &str, hints: &[&str]) -> bool {
    text.split(|character: char| !character.is_alphanumeric()).any(|token| hints.contains(&token))
}

fn coerce_config(
    definition: &ServiceDefinition,
    raw: &BTreeMap<String, serde_json::Value>,
) -> FieldValues {
    definition
        .fields
        .iter()
        .map(|field| {
            let value = raw.get(&field.key).and_then(json_scalar);
            (field.key.clone(), coerce_field_value(field, value.as_deref()))
        })
        .collect()
}

fn json_scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        serde_json::Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Chat rendering of a suggestion, ending with the accept/modify/manual choices.
pub fn render(suggestion: &Suggestion) -> String {
    let currency = &suggestion.pricing.currency;
    let mut message = String::new();
    if !suggestion.analysis.trim().is_empty() {
        message.push_str(suggestion.analysis.trim());
        message.push_str("\n\n");
    }

    message.push_str("Recommended services:");
    for service in &suggestion.services {
        message.push_str(&format!(
            "\n- {} ({}): {} before VAT",
            service.display_name,
            service.name,
            money(currency, service.monthly_cost)
        ));
        if !service.reason.trim().is_empty() {
            message.push_str(&format!("\n  {}", service.reason.trim()));
        }
        let settings = service
            .config
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        message.push_str(&format!("\n  Settings: {settings}"));
    }

    message.push_str("\n\n");
    message.push_str(&breakdown(&suggestion.pricing));

    if !suggestion.estimated_capacity.trim().is_empty() {
        message.push_str(&format!("\n\nEstimated capacity: {}", suggestion.estimated_capacity.trim()));
    }
    if !suggestion.next_steps.is_empty() {
        message.push_str("\n\nNext steps:");
        for step in &suggestion.next_steps {
            message.push_str(&format!("\n- {step}"));
        }
    }

    message.push_str(
        "\n\nReply 'accept' to use this recommendation, 'modify' to describe your needs again, \
         or 'manual' to configure services yourself.",
    );
    message
}
