//! Application configuration options

use std::time::Duration;

use crate::orchestrator::OrchestratorOptions;
use crate::remote::ssh::SshOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{RemoteSettings, Settings, StoreKind};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Remote deployment host
    pub remote: SshOptions,

    /// Scripts, domain and dashboard used by the orchestrator
    pub orchestrator: OrchestratorOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions::default(),
            server: ServerOptions::default(),
            remote: SshOptions::from_settings(&RemoteSettings::default(), None),
            orchestrator: OrchestratorOptions::default(),
        }
    }
}

impl AppOptions {
    /// Options for a settings file found under `layout`
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        let exec_timeout = settings.exec_timeout_secs.map(Duration::from_secs);
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions {
                layout,
                store_kind: settings.store.kind,
            },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
                cors_origin: Some(settings.dashboard_url.clone()),
            },
            remote: SshOptions::from_settings(&settings.remote, exec_timeout),
            orchestrator: OrchestratorOptions {
                scripts: settings.scripts.clone(),
                domain: settings.domain.clone(),
                dashboard_url: settings.dashboard_url.clone(),
            },
        }
    }
}

/// Lifecycle options for the service
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Project store backend
    pub store_kind: StoreKind,
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Origin allowed to call the API from a browser
    pub cors_origin: Option<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origin: None,
        }
    }
}
