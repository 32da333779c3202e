//! Shared fixtures: a scripted remote host and an in-memory store

use std::sync::{Arc, Mutex};

use devpilot::deploy::config::{ProjectType, ValidConfig};
use devpilot::deploy::fsm::ProjectStatus;
use devpilot::orchestrator::{Orchestrator, OrchestratorOptions};
use devpilot::projects::model::Project;
use devpilot::projects::store::{MemoryProjectStore, ProjectStore};
use devpilot::remote::{ExitStatus, RemoteExecutor, RemoteSession, SessionEvent};
use devpilot::stream;

pub const OWNER: &str = "user-1";

/// Replays the same events for every command and records what it was asked to run
pub struct ScriptedExecutor {
    events: Vec<SessionEvent>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(events: Vec<SessionEvent>) -> Self {
        Self {
            events,
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Connects, prints `output` and exits with `code`
    pub fn exiting(output: &str, code: i32) -> Self {
        Self::new(vec![
            SessionEvent::Connected,
            SessionEvent::Output(output.as_bytes().to_vec()),
            SessionEvent::Closed(ExitStatus::code(code)),
        ])
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl RemoteExecutor for ScriptedExecutor {
    fn execute(&self, command: String) -> RemoteSession {
        self.commands.lock().unwrap().push(command);

        let (tx, session) = RemoteSession::channel(16);
        let events = self.events.clone();
        tokio::spawn(async move {
            for event in events {
                if !tx.send(event).await {
                    break;
                }
            }
        });
        session
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub executor: Arc<ScriptedExecutor>,
    pub store: Arc<MemoryProjectStore>,
}

pub fn harness(executor: ScriptedExecutor) -> Harness {
    let executor = Arc::new(executor);
    let store = Arc::new(MemoryProjectStore::new());
    let orchestrator = Orchestrator::new(
        executor.clone(),
        store.clone(),
        OrchestratorOptions::default(),
    );
    Harness {
        orchestrator,
        executor,
        store,
    }
}

pub fn config(name: &str, project_type: ProjectType) -> ValidConfig {
    ValidConfig {
        name: name.to_string(),
        repo: format!("https://example.com/{}.git", name),
        project_type,
        pkg: Some("npm".to_string()),
        main_dir: Some("./".to_string()),
        run_script: None,
        build_script: None,
        port: None,
        env_vars: None,
        typescript: None,
    }
}

pub fn project(name: &str, project_type: ProjectType, owner: &str, port: u16) -> Project {
    Project::from_deploy(
        &config(name, project_type),
        port,
        owner,
        "devpilot.app",
        "sudo bash deploy.sh",
        ProjectStatus::Active,
    )
}

/// Run a deploy to completion and return its full stream as text
pub async fn deploy_text(orchestrator: &Orchestrator, config: ValidConfig) -> String {
    let (writer, body) = stream::channel();
    let (_, bytes) = tokio::join!(
        orchestrator.deploy(config, OWNER.to_string(), writer),
        body.collect()
    );
    String::from_utf8(bytes).unwrap()
}

/// Value of the first line starting with `prefix`
pub fn line_value<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines().find_map(|line| line.strip_prefix(prefix))
}

pub async fn stored(store: &MemoryProjectStore, name: &str) -> Option<Project> {
    store.find_by_name(name).await.unwrap()
}
