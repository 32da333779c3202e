//! Remote deployment orchestrator
//!
//! Turns requests into remote commands, relays the command output to the
//! caller and reconciles the outcome into the project store.

pub mod deployment;
pub mod locks;
pub mod operations;

use std::sync::Arc;

use tracing::warn;

use crate::errors::PilotError;
use crate::orchestrator::locks::{NameLocks, PortReservations};
use crate::projects::model::Project;
use crate::projects::store::ProjectStore;
use crate::remote::{ExitStatus, RemoteExecutor, RemoteSession, SessionEvent};
use crate::storage::settings::ScriptSettings;
use crate::stream::StreamWriter;

pub const CONNECTED_LINE: &str = "Connected to server...";

/// Identity of the user making a request, supplied by the auth layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
}

impl Caller {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub scripts: ScriptSettings,

    /// Domain deployed projects are served under
    pub domain: String,

    /// Dashboard base URL used for the post-deploy redirect
    pub dashboard_url: String,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            scripts: ScriptSettings::default(),
            domain: "devpilot.app".to_string(),
            dashboard_url: "http://localhost:5173".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    executor: Arc<dyn RemoteExecutor>,
    store: Arc<dyn ProjectStore>,
    options: Arc<OrchestratorOptions>,
    locks: Arc<NameLocks>,
    ports: Arc<PortReservations>,
}

impl Orchestrator {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        store: Arc<dyn ProjectStore>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            executor,
            store,
            options: Arc::new(options),
            locks: Arc::new(NameLocks::new()),
            ports: Arc::new(PortReservations::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ProjectStore> {
        &self.store
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Projects owned by `caller`
    pub async fn list_projects(&self, caller: &Caller) -> Result<Vec<Project>, PilotError> {
        let mut projects: Vec<Project> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|p| p.owner == caller.id)
            .collect();
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    /// Look up a project and check that `caller` owns it
    pub async fn authorize(&self, project_id: &str, caller: &Caller) -> Result<Project, PilotError> {
        let project = self
            .store
            .get(project_id)
            .await?
            .ok_or_else(|| PilotError::NotFound(format!("Project {}", project_id)))?;

        if project.owner != caller.id {
            return Err(PilotError::Forbidden(format!(
                "Project {} belongs to another user",
                project_id
            )));
        }
        Ok(project)
    }

    fn redirect_url(&self, project: &Project) -> String {
        format!(
            "{}/project/{}",
            self.options.dashboard_url.trim_end_matches('/'),
            project.id
        )
    }
}

/// How relaying a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RelayEnd {
    Closed(ExitStatus),
    ConnectFailed(String),
    DispatchFailed(String),

    /// The caller went away before the command finished
    Disconnected,
}

/// Forward session output to the caller as it arrives
pub(crate) async fn relay(session: &mut RemoteSession, writer: &StreamWriter) -> RelayEnd {
    while let Some(event) = session.next().await {
        let delivered = match event {
            SessionEvent::Connected => writer.line(CONNECTED_LINE).await,
            SessionEvent::Output(chunk) => writer.write(chunk).await,
            SessionEvent::Closed(status) => return RelayEnd::Closed(status),
            SessionEvent::ConnectFailed(message) => return RelayEnd::ConnectFailed(message),
            SessionEvent::DispatchFailed(message) => return RelayEnd::DispatchFailed(message),
        };
        if !delivered {
            warn!("Caller disconnected, abandoning remote session");
            return RelayEnd::Disconnected;
        }
    }
    RelayEnd::DispatchFailed("remote session ended without an exit status".to_string())
}
