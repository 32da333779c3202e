//! Finite state machine for project status

use std::fmt;

use serde::{Deserialize, Serialize};

/// Persisted status of a project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    /// Recorded but no deploy has completed yet
    #[default]
    Pending,

    /// Last deploy command exited with status 0
    Active,

    /// Last deploy command exited non-zero, was killed, or never ran
    Failed,

    /// A redeploy was requested and is in progress
    Redeploying,
}

impl ProjectStatus {
    /// Status recorded for a finished deploy command
    pub fn from_exit_code(exit_code: Option<i32>) -> Self {
        match exit_code {
            Some(0) => ProjectStatus::Active,
            _ => ProjectStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::Active => "active",
            ProjectStatus::Failed => "failed",
            ProjectStatus::Redeploying => "redeploying",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// A deploy command closed with the given exit code
    DeployFinished { exit_code: Option<i32> },

    /// A redeploy of the stored configuration was requested
    RedeployRequested,

    /// The redeploy never reached the remote command
    RedeployAborted,
}

/// Project status FSM
#[derive(Debug, Clone)]
pub struct StatusFsm {
    state: ProjectStatus,
}

impl StatusFsm {
    pub fn new(state: ProjectStatus) -> Self {
        Self { state }
    }

    #[cfg(test)]
    fn state(&self) -> ProjectStatus {
        self.state
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: StatusEvent) -> Result<ProjectStatus, String> {
        let new_state = match (&self.state, &event) {
            // A finished deploy always settles the status, whatever came before
            (_, StatusEvent::DeployFinished { exit_code }) => {
                ProjectStatus::from_exit_code(*exit_code)
            }

            (
                ProjectStatus::Pending | ProjectStatus::Active | ProjectStatus::Failed,
                StatusEvent::RedeployRequested,
            ) => ProjectStatus::Redeploying,

            (ProjectStatus::Redeploying, StatusEvent::RedeployAborted) => ProjectStatus::Failed,

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}
