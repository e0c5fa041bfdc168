pub mod audit;
pub mod config;
pub mod cpq;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod store;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use cpq::catalog::{ServiceCatalog, StaticCatalog};
pub use cpq::pricing::{DeterministicPricingEngine, PricingEngine, PricingPolicy, ServicePricing};
pub use cpq::CpqRuntime;
pub use domain::quote::{ConfiguredService, PricingBreakdown, Quote, QuoteId};
pub use domain::service::{FieldKind, FieldSpec, PricingModel, ServiceDefinition};
pub use domain::session::{DialogueMode, DialogueSession, FieldValues, SessionId};
pub use domain::suggestion::{SuggestedService, Suggestion, SuggestionSource};
pub use errors::{ApplicationError, DialogueError, DomainError, InterfaceError};
pub use store::{SessionStore, SessionStoreError};
