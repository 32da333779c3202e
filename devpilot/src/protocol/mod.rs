//! Completion protocol
//!
//! Control lines embedded in the plain-text deploy stream. A deploy stream
//! ends with exactly one `DEPLOY_STATUS:*` line; on success it is followed by
//! `PROJECT_ID:` and `REDIRECT_URL:` lines.

pub mod consumer;

use std::fmt;

pub const DEPLOY_STATUS: &str = "DEPLOY_STATUS:";
pub const PROJECT_ID: &str = "PROJECT_ID:";
pub const REDIRECT_URL: &str = "REDIRECT_URL:";

/// Outcome of the orchestration itself.
///
/// `Success` means the deploy ran and was recorded, even when the remote
/// command exited non-zero and the project was stored as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStatus {
    Success,
    Failed,
    SshError,
    DbError,
}

impl DeployStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Success => "SUCCESS",
            DeployStatus::Failed => "FAILED",
            DeployStatus::SshError => "SSH_ERROR",
            DeployStatus::DbError => "DB_ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(DeployStatus::Success),
            "FAILED" => Some(DeployStatus::Failed),
            "SSH_ERROR" => Some(DeployStatus::SshError),
            "DB_ERROR" => Some(DeployStatus::DbError),
            _ => None,
        }
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reserved control line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Status(DeployStatus),
    ProjectId(String),
    RedirectUrl(String),
}

impl Marker {
    /// Wire form, without the trailing newline
    pub fn render(&self) -> String {
        match self {
            Marker::Status(status) => format!("{}{}", DEPLOY_STATUS, status),
            Marker::ProjectId(id) => format!("{}{}", PROJECT_ID, id),
            Marker::RedirectUrl(url) => format!("{}{}", REDIRECT_URL, url),
        }
    }

    /// Interpret one complete line. The token must start the line.
    pub fn parse_line(line: &str) -> Option<Marker> {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix(DEPLOY_STATUS) {
            return DeployStatus::parse(rest.trim()).map(Marker::Status);
        }
        if let Some(rest) = line.strip_prefix(PROJECT_ID) {
            let id = rest.trim();
            return (!id.is_empty()).then(|| Marker::ProjectId(id.to_string()));
        }
        if let Some(rest) = line.strip_prefix(REDIRECT_URL) {
            let url = rest.trim();
            return (!url.is_empty()).then(|| Marker::RedirectUrl(url.to_string()));
        }
        None
    }
}
