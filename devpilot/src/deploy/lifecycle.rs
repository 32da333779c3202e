//! Lifecycle operations on deployed projects

use std::fmt;

use crate::deploy::config::ProjectType;
use crate::errors::PilotError;
use crate::storage::settings::ScriptSettings;

/// Operation applied to an already deployed project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOperation {
    Start,
    Stop,
    Restart,
    Delete,
    Logs,
}

const START_ALLOWED: &[ProjectType] = &[ProjectType::Express, ProjectType::Next, ProjectType::Nest];
const STOP_ALLOWED: &[ProjectType] = &[ProjectType::Express, ProjectType::Nest];

impl LifecycleOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleOperation::Start => "start",
            LifecycleOperation::Stop => "stop",
            LifecycleOperation::Restart => "restart",
            LifecycleOperation::Delete => "delete",
            LifecycleOperation::Logs => "logs",
        }
    }

    /// Project types this operation may run against
    pub fn allowed_types(&self) -> &'static [ProjectType] {
        match self {
            LifecycleOperation::Start | LifecycleOperation::Delete | LifecycleOperation::Logs => {
                START_ALLOWED
            }
            LifecycleOperation::Stop | LifecycleOperation::Restart => STOP_ALLOWED,
        }
    }

    /// Reject project types outside the allow-list
    pub fn ensure_allowed(&self, project_type: ProjectType) -> Result<(), PilotError> {
        if self.allowed_types().contains(&project_type) {
            Ok(())
        } else {
            Err(PilotError::UnsupportedType {
                operation: self.as_str().to_string(),
                project_type: project_type.to_string(),
            })
        }
    }

    pub fn script<'a>(&self, scripts: &'a ScriptSettings) -> &'a str {
        match self {
            LifecycleOperation::Start => &scripts.start,
            LifecycleOperation::Stop => &scripts.stop,
            LifecycleOperation::Restart => &scripts.restart,
            LifecycleOperation::Delete => &scripts.delete,
            LifecycleOperation::Logs => &scripts.logs,
        }
    }
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LifecycleOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(LifecycleOperation::Start),
            "stop" => Ok(LifecycleOperation::Stop),
            "restart" => Ok(LifecycleOperation::Restart),
            "delete" => Ok(LifecycleOperation::Delete),
            "logs" => Ok(LifecycleOperation::Logs),
            _ => Err(format!("Unknown lifecycle operation: {}", s)),
        }
    }
}
