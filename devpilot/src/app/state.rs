//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::errors::PilotError;
use crate::orchestrator::{Orchestrator, OrchestratorOptions};
use crate::projects::store::{open_store, ProjectStore};
use crate::remote::ssh::SshExecutor;
use crate::remote::RemoteExecutor;

/// Main application state
pub struct AppState {
    /// Project records
    pub store: Arc<dyn ProjectStore>,

    /// Request orchestration
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        store: Arc<dyn ProjectStore>,
        options: OrchestratorOptions,
    ) -> Self {
        let orchestrator = Orchestrator::new(executor, store.clone(), options);
        Self {
            store,
            orchestrator,
        }
    }

    /// Initialize application state from options
    pub async fn init(options: &AppOptions) -> Result<Self, PilotError> {
        info!("Initializing application state...");

        let store = open_store(
            options.storage.store_kind,
            options.storage.layout.projects_file(),
        )
        .await?;

        if options.remote.host.is_empty() {
            return Err(PilotError::ConfigError(
                "remote.host is not set in settings".to_string(),
            ));
        }
        info!(
            "Remote host: {}@{}:{}",
            options.remote.username, options.remote.host, options.remote.port
        );
        let executor: Arc<dyn RemoteExecutor> = Arc::new(SshExecutor::new(options.remote.clone()));

        Ok(Self::new(executor, store, options.orchestrator.clone()))
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), PilotError> {
        info!("Shutting down application state...");
        let projects = self.store.list().await?;
        info!("{} projects on record", projects.len());
        Ok(())
    }
}
