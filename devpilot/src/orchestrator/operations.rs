//! Lifecycle operations on deployed projects
//!
//! Plain relay of the remote output plus a close line; no completion markers.

use tracing::{error, info, warn};

use crate::deploy::command::build_lifecycle_command;
use crate::deploy::lifecycle::LifecycleOperation;
use crate::errors::PilotError;
use crate::orchestrator::{relay, Caller, Orchestrator, RelayEnd};
use crate::projects::model::Project;
use crate::remote::ExitStatus;
use crate::stream::{self, StreamBody, StreamWriter};

impl Orchestrator {
    /// Check the request and start streaming the operation
    pub async fn start_operation(
        &self,
        operation: LifecycleOperation,
        project_id: &str,
        caller: &Caller,
    ) -> Result<StreamBody, PilotError> {
        let project = self.authorize(project_id, caller).await?;
        operation.ensure_allowed(project.project_type)?;

        let command = build_lifecycle_command(operation, &project, &self.options.scripts);
        let (writer, body) = stream::channel();
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator
                .run_operation(operation, project, command, writer)
                .await;
        });
        Ok(body)
    }

    /// Relay one lifecycle command. Returns the exit status when the command closed.
    pub async fn run_operation(
        &self,
        operation: LifecycleOperation,
        project: Project,
        command: String,
        writer: StreamWriter,
    ) -> Option<ExitStatus> {
        info!("Running {} for project {} ({})", operation, project.name, project.id);

        let mut session = self.executor.execute(command);
        let exit = match relay(&mut session, &writer).await {
            RelayEnd::Closed(exit) => exit,
            RelayEnd::ConnectFailed(message) => {
                error!("Connection for {} of {} failed: {}", operation, project.name, message);
                writer.line(format!("SSH error: {}", message)).await;
                return None;
            }
            RelayEnd::DispatchFailed(message) => {
                error!("{} of {} not started: {}", operation, project.name, message);
                writer.line(format!("Exec error: {}", message)).await;
                return None;
            }
            RelayEnd::Disconnected => return None,
        };
        drop(session);

        writer.line(format!("Command finished ({})", exit)).await;

        if operation == LifecycleOperation::Delete {
            self.forget_deleted(&project, &exit, &writer).await;
        }
        Some(exit)
    }

    async fn forget_deleted(&self, project: &Project, exit: &ExitStatus, writer: &StreamWriter) {
        if !exit.success() {
            warn!(
                "Remote delete of {} did not succeed ({}), keeping record",
                project.name, exit
            );
            writer
                .line("Project record kept: remote delete did not succeed")
                .await;
            return;
        }

        match self.store.delete(&project.id).await {
            Ok(_) => {
                info!("Deleted project {} ({})", project.name, project.id);
                writer.line(format!("Project {} deleted", project.name)).await;
            }
            Err(e) => {
                error!("Failed to delete project {}: {}", project.id, e);
                writer.line(format!("Database error: {}", e)).await;
            }
        }
    }
}
