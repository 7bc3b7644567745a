use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use triage_core::config::{AppConfig, ConfigError, LoadOptions};
use triage_db::{
    connect_with_settings, migrations, DbPool, SqlCategoryRepository, SqlTicketRepository,
};

use crate::llm::{client_from_config, LlmError};
use crate::runtime::TriageService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: TriageService,
}

impl Application {
    /// Shuts the service down, then closes the pool.
    pub async fn shutdown(self) {
        self.service.shutdown();
        self.db_pool.close().await;
        info!(event_name = "system.shutdown.completed", "application stopped");
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("language model client setup failed: {0}")]
    LlmClient(#[from] LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Bootstraps from an already loaded and validated configuration.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let client = client_from_config(&config.llm)?;
    let service = TriageService::new(
        Arc::new(SqlTicketRepository::new(db_pool.clone())),
        Arc::new(SqlCategoryRepository::new(db_pool.clone())),
        client,
    )
    .with_run_timeout(config.llm.run_timeout())
    .with_default_pipeline(config.triage.pipeline);

    if config.llm.warmup {
        service.warmup().await;
    }
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        model = %service.client_label(),
        pipeline = config.triage.pipeline.as_str(),
        "triage service ready"
    );

    Ok(Application { config, db_pool, service })
}
