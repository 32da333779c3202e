//! Deployment request model and validation

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{FieldError, PilotError};

static ENV_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env key pattern is valid")
});

/// Kind of project being deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Static,
    React,
    Express,
    Next,
    Nest,
}

impl ProjectType {
    pub const ALL: [ProjectType; 5] = [
        ProjectType::Static,
        ProjectType::React,
        ProjectType::Express,
        ProjectType::Next,
        ProjectType::Nest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Static => "static",
            ProjectType::React => "react",
            ProjectType::Express => "express",
            ProjectType::Next => "next",
            ProjectType::Nest => "nest",
        }
    }

    /// Server-capable types run a long-lived process on the remote host
    pub fn is_server(&self) -> bool {
        matches!(
            self,
            ProjectType::Express | ProjectType::Next | ProjectType::Nest
        )
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown project type: {}", s))
    }
}

/// Deployment request as submitted by the caller.
///
/// Which of the optional fields matter depends on `project_type`; combinations
/// are not checked here, the remote scripts decide what to do with them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub name: String,

    /// Source repository clone URL
    #[serde(default)]
    pub repo: String,

    #[serde(default, rename = "type")]
    pub project_type: Option<ProjectType>,

    /// Package manager (npm, pnpm, yarn, bun)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_script: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_script: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Flattened `KEY=VALUE KEY=VALUE` block
    #[serde(default, rename = "envVars", skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typescript: Option<bool>,
}

/// A deployment request that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidConfig {
    pub name: String,
    pub repo: String,
    pub project_type: ProjectType,
    pub pkg: Option<String>,
    pub main_dir: Option<String>,
    pub run_script: Option<String>,
    pub build_script: Option<String>,
    pub port: Option<u16>,
    pub env_vars: Option<String>,
    pub typescript: Option<bool>,
}

impl DeploymentConfig {
    /// Validate the request, collecting every problem instead of stopping at the first
    pub fn validate(self) -> Result<ValidConfig, PilotError> {
        let mut errors = Vec::new();

        let name = self.name.trim().to_string();
        if name.is_empty() {
            errors.push(FieldError::new("name", "must not be empty"));
        }

        let repo = self.repo.trim().to_string();
        if repo.is_empty() {
            errors.push(FieldError::new("repo", "must not be empty"));
        }

        if self.project_type.is_none() {
            errors.push(FieldError::new("type", "is required"));
        }

        if self.port == Some(0) {
            errors.push(FieldError::new("port", "must be between 1 and 65535"));
        }

        if let Some(env) = &self.env_vars {
            if let Err(message) = EnvVars::parse(env) {
                errors.push(FieldError::new("envVars", message));
            }
        }

        match (self.project_type, errors.is_empty()) {
            (Some(project_type), true) => Ok(ValidConfig {
                name,
                repo,
                project_type,
                pkg: self.pkg,
                main_dir: self.main_dir,
                run_script: self.run_script,
                build_script: self.build_script,
                port: self.port,
                env_vars: self.env_vars,
                typescript: self.typescript,
            }),
            _ => Err(PilotError::ValidationError(errors)),
        }
    }
}

/// Parsed environment variable block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    pub pairs: Vec<(String, String)>,
}

impl EnvVars {
    /// Parse a whitespace separated `KEY=VALUE` list
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut pairs = Vec::new();
        for item in raw.split_whitespace() {
            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| format!("'{}' is not a KEY=VALUE pair", item))?;
            if !ENV_KEY.is_match(key) {
                return Err(format!("'{}' is not a valid variable name", key));
            }
            pairs.push((key.to_string(), value.to_string()));
        }
        Ok(Self { pairs })
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
impl fmt::Display for EnvVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&joined)
    }
}
