use std::sync::Arc;

use devpilot::client::{ClientAction, DeployClient};
use devpilot::deploy::config::{DeploymentConfig, ProjectType};
use devpilot::deploy::lifecycle::LifecycleOperation;
use devpilot::errors::PilotError;
use devpilot::projects::store::ProjectStore;
use devpilot::protocol::consumer::ConsumerEvent;
use devpilot::protocol::DeployStatus;
use devpilot::server::serve::router;
use devpilot::server::state::ServerState;
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

use crate::support::{harness, project, Harness, ScriptedExecutor, OWNER};

/// Serve the router on an ephemeral local port
async fn spawn_server(h: &Harness) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(Arc::new(ServerState::new(h.orchestrator.clone())), None);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_client_follows_deploy_to_redirect() {
    let h = harness(ScriptedExecutor::exiting("step 1\nstep 2\n", 0));
    let base_url = spawn_server(&h).await;
    let client = assert_ok!(DeployClient::new(&base_url, OWNER));

    let config = DeploymentConfig {
        name: "demo".to_string(),
        repo: "https://example.com/demo.git".to_string(),
        project_type: Some(ProjectType::React),
        ..Default::default()
    };
    let mut lines = Vec::new();
    let outcome = assert_ok!(
        client
            .deploy(&config, |event| {
                if let ConsumerEvent::Line(line) = event {
                    lines.push(line.clone());
                }
            })
            .await
    );

    assert_eq!(
        lines,
        vec![
            "Connected to server...",
            "step 1",
            "step 2",
            "Command finished (exit=0, signal=none)",
        ]
    );
    assert_eq!(outcome.status, Some(DeployStatus::Success));
    let id = outcome.project_id.clone().unwrap();
    assert_eq!(
        outcome.redirect(),
        Some(format!("http://localhost:5173/project/{}", id).as_str())
    );
}

#[tokio::test]
async fn test_client_streams_logs() {
    let h = harness(ScriptedExecutor::exiting("GET /health 200\n", 0));
    let api = assert_ok!(
        h.store
            .insert(project("api", ProjectType::Express, OWNER, 3000))
            .await
    );
    let base_url = spawn_server(&h).await;
    let client = assert_ok!(DeployClient::new(&base_url, OWNER));

    let mut count = 0;
    let outcome = assert_ok!(
        client
            .action(
                ClientAction::Operation(LifecycleOperation::Logs),
                &api.id,
                |_| count += 1
            )
            .await
    );

    assert_eq!(count, 3);
    assert_eq!(outcome.status, None);
}

#[tokio::test]
async fn test_client_surfaces_rejections() {
    let h = harness(ScriptedExecutor::exiting("", 0));
    let site = assert_ok!(
        h.store
            .insert(project("site", ProjectType::Static, OWNER, 3000))
            .await
    );
    let base_url = spawn_server(&h).await;
    let client = assert_ok!(DeployClient::new(&base_url, OWNER));

    let err = assert_err!(
        client
            .action(
                ClientAction::Operation(LifecycleOperation::Stop),
                &site.id,
                |_| {}
            )
            .await
    );

    match err {
        PilotError::ServerError(message) => assert!(message.starts_with("400")),
        other => panic!("unexpected error: {}", other),
    }
}
