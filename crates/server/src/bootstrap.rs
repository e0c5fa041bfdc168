use std::sync::Arc;
use std::time::Duration;

use cloudquote_agent::{build_client, DialogueRuntime, LlmError, SuggestionAdapter};
use cloudquote_core::audit::{AuditEvent, AuditSink};
use cloudquote_core::config::{AppConfig, ConfigError, LoadOptions, SessionBackend};
use cloudquote_core::cpq::catalog::{CatalogError, ServiceCatalog, StaticCatalog};
use cloudquote_core::cpq::pricing::DeterministicPricingEngine;
use cloudquote_core::cpq::CpqRuntime;
use cloudquote_core::store::SessionStore;
use cloudquote_db::{connect_with_config, migrations, DbPool, InMemorySessionStore, SqlSessionStore};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<DialogueRuntime>,
    /// Present only for the sqlite session backend.
    pub db_pool: Option<DbPool>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("service catalog failed to load: {0}")]
    Catalog(#[from] CatalogError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("completion client setup failed: {0}")]
    Completion(#[source] LlmError),
}

/// Writes audit events into the structured log stream.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = "audit.event",
            correlation_id = %event.correlation_id,
            session_id = %event.session_id,
            event_type = %event.event_type,
            category = event.category.as_str(),
            outcome = event.outcome.as_str(),
            actor = %event.actor,
            metadata = ?event.metadata,
            "audit event"
        );
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let catalog = match &config.catalog.path {
        Some(path) => StaticCatalog::from_path(path)?,
        None => StaticCatalog::default(),
    };
    info!(
        event_name = "system.bootstrap.catalog_loaded",
        correlation_id = "bootstrap",
        services = catalog.list().len(),
        custom = config.catalog.path.is_some(),
        "service catalog loaded"
    );
    let cpq = CpqRuntime::new(Arc::new(catalog), Arc::new(DeterministicPricingEngine::default()));

    let (store, db_pool): (Arc<dyn SessionStore>, Option<DbPool>) = match config.sessions.backend {
        SessionBackend::Memory => (Arc::new(InMemorySessionStore::default()), None),
        SessionBackend::Sqlite => {
            let pool = connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
            info!(
                event_name = "system.bootstrap.database_connected",
                correlation_id = "bootstrap",
                "database connection established"
            );

            migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
            info!(
                event_name = "system.bootstrap.migrations_applied",
                correlation_id = "bootstrap",
                "database migrations applied"
            );
            (Arc::new(SqlSessionStore::new(pool.clone())), Some(pool))
        }
    };

    let client = build_client(&config.llm).map_err(BootstrapError::Completion)?;
    let suggestions = SuggestionAdapter::new(Arc::from(client), cpq.clone())
        .with_timeout(Duration::from_secs(config.llm.timeout_secs))
        .with_max_retries(config.llm.max_retries);
    info!(
        event_name = "system.bootstrap.completion_client_ready",
        correlation_id = "bootstrap",
        provider = ?config.llm.provider,
        model = %config.llm.model,
        endpoint = config.llm.endpoint(),
        "completion client configured"
    );

    let runtime = DialogueRuntime::new(cpq, store, suggestions, Arc::new(TracingAuditSink));

    Ok(Application { config, runtime: Arc::new(runtime), db_pool })
}
