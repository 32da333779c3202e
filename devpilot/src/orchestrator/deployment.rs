//! Deploy and redeploy flows
//!
//! A deploy stream carries the remote output followed by exactly one
//! `DEPLOY_STATUS:*` line. The project record is only written after the
//! remote command closed.

use tracing::{debug, error, info, warn};

use crate::deploy::command::build_deploy_command;
use crate::deploy::config::{DeploymentConfig, ValidConfig};
use crate::deploy::fsm::{ProjectStatus, StatusEvent, StatusFsm};
use crate::errors::PilotError;
use crate::orchestrator::{relay, Caller, Orchestrator, RelayEnd};
use crate::projects::model::Project;
use crate::projects::store::upsert_by_name;
use crate::protocol::{DeployStatus, Marker};
use crate::stream::{self, StreamBody, StreamWriter};

impl Orchestrator {
    /// Validate a deploy request and start streaming it.
    ///
    /// Everything that can be rejected is rejected here, before the stream opens.
    pub async fn start_deploy(
        &self,
        config: DeploymentConfig,
        caller: &Caller,
    ) -> Result<StreamBody, PilotError> {
        let config = config.validate()?;

        if let Some(existing) = self.store.find_by_name(&config.name).await? {
            if existing.owner != caller.id {
                return Err(PilotError::Conflict(format!(
                    "Project name {} is already taken",
                    config.name
                )));
            }
        }

        let (writer, body) = stream::channel();
        let orchestrator = self.clone();
        let owner = caller.id.clone();
        tokio::spawn(async move {
            orchestrator.deploy(config, owner, writer).await;
        });
        Ok(body)
    }

    /// Mark a project as redeploying and stream a fresh deploy of its stored configuration
    pub async fn start_redeploy(
        &self,
        project_id: &str,
        caller: &Caller,
    ) -> Result<StreamBody, PilotError> {
        let project = self.authorize(project_id, caller).await?;

        let status = StatusFsm::new(project.status)
            .process(StatusEvent::RedeployRequested)
            .map_err(PilotError::Conflict)?;
        self.store.set_status(&project.id, status).await?;
        info!("Redeploy requested for project {} ({})", project.name, project.id);

        let config = project.to_config();
        let (writer, body) = stream::channel();
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.deploy(config, project.owner, writer).await;
        });
        Ok(body)
    }

    /// Run one deploy to completion, writing the stream as it goes
    pub async fn deploy(
        &self,
        mut config: ValidConfig,
        owner: String,
        writer: StreamWriter,
    ) -> DeployStatus {
        let _guard = self.locks.acquire(&config.name).await;

        let existing = match self.store.find_by_name(&config.name).await {
            Ok(existing) => existing,
            Err(e) => return report_db_error(&writer, &config.name, e).await,
        };

        // Explicit port first, then the stored one; only new projects get a fresh port
        let mut lease = None;
        let port = match config.port.or(existing.as_ref().map(|p| p.port)) {
            Some(port) => port,
            None => match self.ports.reserve(self.store.as_ref()).await {
                Ok(reserved) => lease.insert(reserved).port(),
                Err(e) => return report_db_error(&writer, &config.name, e).await,
            },
        };
        config.port = Some(port);

        let status = self
            .deploy_on_port(config, port, &owner, existing.as_ref(), &writer)
            .await;
        if let Some(lease) = lease {
            self.ports.release(lease).await;
        }
        status
    }

    async fn deploy_on_port(
        &self,
        config: ValidConfig,
        port: u16,
        owner: &str,
        existing: Option<&Project>,
        writer: &StreamWriter,
    ) -> DeployStatus {
        let command = build_deploy_command(&config, &self.options.scripts);
        info!(
            "Deploying {} ({}) on port {}",
            config.name, config.project_type, port
        );
        debug!("Remote command: {}", command);

        let mut session = self.executor.execute(command.clone());
        let exit = match relay(&mut session, writer).await {
            RelayEnd::Closed(exit) => exit,
            RelayEnd::ConnectFailed(message) => {
                error!("Connection for deploy of {} failed: {}", config.name, message);
                self.abort_redeploy(existing).await;
                writer.line(format!("SSH error: {}", message)).await;
                writer
                    .line(Marker::Status(DeployStatus::SshError).render())
                    .await;
                return DeployStatus::SshError;
            }
            RelayEnd::DispatchFailed(message) => {
                error!("Deploy command for {} not started: {}", config.name, message);
                self.abort_redeploy(existing).await;
                writer.line(format!("Exec error: {}", message)).await;
                writer
                    .line(Marker::Status(DeployStatus::Failed).render())
                    .await;
                return DeployStatus::Failed;
            }
            RelayEnd::Disconnected => {
                self.abort_redeploy(existing).await;
                return DeployStatus::Failed;
            }
        };
        drop(session);

        writer.line(format!("Command finished ({})", exit)).await;

        let previous = existing.map(|p| p.status).unwrap_or_default();
        let status = StatusFsm::new(previous)
            .process(StatusEvent::DeployFinished {
                exit_code: exit.code,
            })
            .unwrap_or_else(|_| ProjectStatus::from_exit_code(exit.code));

        let project = Project::from_deploy(
            &config,
            port,
            owner,
            &self.options.domain,
            &command,
            status,
        );

        match upsert_by_name(self.store.as_ref(), project).await {
            Ok(project) => {
                info!(
                    "Recorded project {} ({}) as {}",
                    project.name, project.id, project.status
                );
                writer
                    .line(Marker::Status(DeployStatus::Success).render())
                    .await;
                writer
                    .line(Marker::ProjectId(project.id.clone()).render())
                    .await;
                writer
                    .line(Marker::RedirectUrl(self.redirect_url(&project)).render())
                    .await;
                DeployStatus::Success
            }
            Err(e) => {
                self.abort_redeploy(existing).await;
                report_db_error(writer, &config.name, e).await
            }
        }
    }

    /// Settle a project left in `redeploying` when its deploy never reached the close event
    async fn abort_redeploy(&self, existing: Option<&Project>) {
        let Some(project) = existing else {
            return;
        };
        if project.status != ProjectStatus::Redeploying {
            return;
        }

        let status = match StatusFsm::new(project.status).process(StatusEvent::RedeployAborted) {
            Ok(status) => status,
            Err(e) => {
                warn!("Cannot settle project {}: {}", project.id, e);
                return;
            }
        };
        if let Err(e) = self.store.set_status(&project.id, status).await {
            error!("Failed to settle status of project {}: {}", project.id, e);
        }
    }
}

async fn report_db_error(writer: &StreamWriter, name: &str, e: PilotError) -> DeployStatus {
    error!("Persisting project {} failed: {}", name, e);
    writer.line(format!("Database error: {}", e)).await;
    writer
        .line(Marker::Status(DeployStatus::DbError).render())
        .await;
    DeployStatus::DbError
}
