//! Remote command construction
//!
//! Pure functions: the same input always yields the same command string.
//! Flag values are wrapped in double quotes verbatim and are not shell-escaped.

use crate::deploy::config::ValidConfig;
use crate::deploy::lifecycle::LifecycleOperation;
use crate::projects::model::Project;
use crate::storage::settings::ScriptSettings;

/// Build the deploy command for a validated request.
///
/// Server-capable types get a port; callers resolve it before building so the
/// `--port` flag carries a real value.
pub fn build_deploy_command(config: &ValidConfig, scripts: &ScriptSettings) -> String {
    if config.project_type.is_server() {
        build_server_command(config, &scripts.server_deploy)
    } else {
        build_client_command(config, &scripts.client_deploy)
    }
}

fn build_client_command(config: &ValidConfig, script: &str) -> String {
    let flags = [
        ("--name", Some(config.name.clone())),
        ("--repo", Some(config.repo.clone())),
        ("--type", Some(config.project_type.to_string())),
        ("--pkg", config.pkg.clone()),
        ("--main_dir", config.main_dir.clone()),
        ("--env", config.env_vars.clone()),
    ];

    join_command(&format!("sudo bash {}", script), optional_flags(&flags))
}

fn build_server_command(config: &ValidConfig, script: &str) -> String {
    let port = config.port.map(|p| p.to_string()).unwrap_or_default();

    // Required flags, always emitted in this order
    let mut parts = vec![
        quoted("--project-type", config.project_type.as_str()),
        quoted("--port", &port),
        quoted("--clone-url", &config.repo),
        quoted("--project-name", &config.name),
    ];

    let optional = [
        ("--main-dir", config.main_dir.clone()),
        ("--run-script", config.run_script.clone()),
        ("--env-vars", config.env_vars.clone()),
        ("--package-manager", config.pkg.clone()),
        ("--typescript", config.typescript.map(|t| t.to_string())),
    ];
    parts.extend(optional_flags(&optional));

    join_command(&format!("sudo bash {}", script), parts)
}

/// Build the fixed template used by lifecycle operations
pub fn build_lifecycle_command(
    operation: LifecycleOperation,
    project: &Project,
    scripts: &ScriptSettings,
) -> String {
    let mut command = format!(
        "sudo {} --project_name {} --type {}",
        operation.script(scripts),
        project.name,
        project.project_type
    );
    if operation == LifecycleOperation::Start {
        command.push_str(&format!(" --main_dir {}", project.main_dir));
    }
    command
}

fn quoted(flag: &str, value: &str) -> String {
    format!("{} \"{}\"", flag, value)
}

fn optional_flags(flags: &[(&str, Option<String>)]) -> Vec<String> {
    flags
        .iter()
        .filter_map(|(flag, value)| match value {
            Some(v) if !v.is_empty() => Some(quoted(flag, v)),
            _ => None,
        })
        .collect()
}

fn join_command(prefix: &str, parts: Vec<String>) -> String {
    if parts.is_empty() {
        return prefix.to_string();
    }
    format!("{} {}", prefix, parts.join(" "))
}
