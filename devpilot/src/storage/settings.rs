//! Settings file management

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Service settings, read from `settings.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs to a daily rolling file in the logs directory
    #[serde(default)]
    pub log_to_file: bool,

    #[serde(default)]
    pub server: ServerSettings,

    /// Remote deployment host
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Remote script locations
    #[serde(default)]
    pub scripts: ScriptSettings,

    /// Domain under which deployed projects are reachable
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Base URL of the dashboard the client is redirected to after a deploy
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,

    #[serde(default)]
    pub store: StoreSettings,

    /// Upper bound on a single remote command, unbounded when absent
    #[serde(default)]
    pub exec_timeout_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_domain() -> String {
    "devpilot.app".to_string()
}

fn default_dashboard_url() -> String {
    "http://localhost:5173".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            server: ServerSettings::default(),
            remote: RemoteSettings::default(),
            scripts: ScriptSettings::default(),
            domain: default_domain(),
            dashboard_url: default_dashboard_url(),
            store: StoreSettings::default(),
            exec_timeout_secs: None,
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    5000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// SSH endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default = "default_ssh_user")]
    pub username: String,

    /// Private key used for authentication
    #[serde(default)]
    pub identity_file: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub strict_host_key_checking: bool,

    /// ssh client executable
    #[serde(default = "default_ssh_binary")]
    pub ssh_binary: String,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_user() -> String {
    "dev-pilot".to_string()
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_ssh_port(),
            username: default_ssh_user(),
            identity_file: None,
            connect_timeout_secs: default_connect_timeout(),
            strict_host_key_checking: true,
            ssh_binary: default_ssh_binary(),
        }
    }
}

/// Paths of the scripts installed on the remote host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSettings {
    #[serde(default = "default_client_deploy")]
    pub client_deploy: String,

    #[serde(default = "default_server_deploy")]
    pub server_deploy: String,

    #[serde(default = "default_start")]
    pub start: String,

    #[serde(default = "default_stop")]
    pub stop: String,

    #[serde(default = "default_restart")]
    pub restart: String,

    #[serde(default = "default_delete")]
    pub delete: String,

    #[serde(default = "default_logs")]
    pub logs: String,
}

const SCRIPTS_DIR: &str = "/home/dev-pilot/scripts";

fn default_client_deploy() -> String {
    format!("{SCRIPTS_DIR}/deploy_client.sh")
}

fn default_server_deploy() -> String {
    format!("{SCRIPTS_DIR}/deploy_server.sh")
}

fn default_start() -> String {
    format!("{SCRIPTS_DIR}/start_server.sh")
}

fn default_stop() -> String {
    format!("{SCRIPTS_DIR}/stop_server.sh")
}

fn default_restart() -> String {
    format!("{SCRIPTS_DIR}/restart_server.sh")
}

fn default_delete() -> String {
    format!("{SCRIPTS_DIR}/delete_project.sh")
}

fn default_logs() -> String {
    format!("{SCRIPTS_DIR}/stream_logs.sh")
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            client_deploy: default_client_deploy(),
            server_deploy: default_server_deploy(),
            start: default_start(),
            stop: default_stop(),
            restart: default_restart(),
            delete: default_delete(),
            logs: default_logs(),
        }
    }
}

/// Project store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Json,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub kind: StoreKind,
}
