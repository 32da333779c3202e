//! Project model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::config::{ProjectType, ValidConfig};
use crate::deploy::fsm::ProjectStatus;

/// Default main directory when the request does not name one
pub const DEFAULT_MAIN_DIR: &str = "./";

/// Durable record of one deployed application, keyed by `name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,

    /// Unique; a second deploy with the same name overwrites this record
    pub name: String,

    pub clone_url: String,

    #[serde(rename = "type")]
    pub project_type: ProjectType,

    #[serde(default)]
    pub pkg: Option<String>,

    pub main_dir: String,

    #[serde(default)]
    pub run_script: Option<String>,

    #[serde(default)]
    pub build_script: Option<String>,

    pub port: u16,

    #[serde(default, rename = "envVars")]
    pub env_vars: Option<String>,

    #[serde(default)]
    pub typescript: bool,

    /// Owning user identifier
    pub owner: String,

    /// Externally reachable URL
    pub url: String,

    /// Last executed command
    #[serde(default)]
    pub command: Option<String>,

    pub status: ProjectStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// URL a project is served under.
///
/// Server-capable types are exposed on an `api.` subdomain.
pub fn project_url(name: &str, project_type: ProjectType, domain: &str) -> String {
    if project_type.is_server() {
        format!("https://api.{}.{}", name, domain)
    } else {
        format!("https://{}.{}", name, domain)
    }
}

impl Project {
    /// Build a fresh record for a finished deploy
    pub fn from_deploy(
        config: &ValidConfig,
        port: u16,
        owner: &str,
        domain: &str,
        command: &str,
        status: ProjectStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: config.name.clone(),
            clone_url: config.repo.clone(),
            project_type: config.project_type,
            pkg: config.pkg.clone(),
            main_dir: config
                .main_dir
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_MAIN_DIR.to_string()),
            run_script: config.run_script.clone(),
            build_script: config.build_script.clone(),
            port,
            env_vars: config.env_vars.clone(),
            typescript: config.typescript.unwrap_or(false),
            owner: owner.to_string(),
            url: project_url(&config.name, config.project_type, domain),
            command: Some(command.to_string()),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstruct the request that produced this record, for redeploys
    pub fn to_config(&self) -> ValidConfig {
        ValidConfig {
            name: self.name.clone(),
            repo: self.clone_url.clone(),
            project_type: self.project_type,
            pkg: self.pkg.clone(),
            main_dir: Some(self.main_dir.clone()),
            run_script: self.run_script.clone(),
            build_script: self.build_script.clone(),
            port: Some(self.port),
            env_vars: self.env_vars.clone(),
            typescript: Some(self.typescript),
        }
    }
}
