use devpilot::deploy::config::ProjectType;
use devpilot::deploy::fsm::ProjectStatus;
use devpilot::deploy::lifecycle::LifecycleOperation;
use devpilot::errors::PilotError;
use devpilot::orchestrator::Caller;
use devpilot::projects::store::ProjectStore;
use devpilot::remote::SessionEvent;
use devpilot::storage::settings::ScriptSettings;
use tokio_test::{assert_err, assert_ok};

use crate::support::{harness, project, stored, ScriptedExecutor, OWNER};

#[tokio::test]
async fn test_restart_of_static_project_is_rejected() {
    let h = harness(ScriptedExecutor::exiting("restarted\n", 0));
    let existing = assert_ok!(
        h.store
            .insert(project("site", ProjectType::Static, OWNER, 3000))
            .await
    );

    let err = assert_err!(
        h.orchestrator
            .start_operation(LifecycleOperation::Restart, &existing.id, &Caller::new(OWNER))
            .await
    );

    assert!(matches!(err, PilotError::UnsupportedType { .. }));
    assert_eq!(err.status_code(), 400);
    assert!(h.executor.commands().is_empty());
}

#[tokio::test]
async fn test_stop_of_next_project_is_rejected() {
    let h = harness(ScriptedExecutor::exiting("stopped\n", 0));
    let existing = assert_ok!(
        h.store
            .insert(project("web", ProjectType::Next, OWNER, 3000))
            .await
    );

    assert_err!(
        h.orchestrator
            .start_operation(LifecycleOperation::Stop, &existing.id, &Caller::new(OWNER))
            .await
    );
    assert!(h.executor.commands().is_empty());
}

#[tokio::test]
async fn test_start_streams_without_markers() {
    let h = harness(ScriptedExecutor::exiting("pm2 started api\n", 0));
    let existing = assert_ok!(
        h.store
            .insert(project("api", ProjectType::Express, OWNER, 3000))
            .await
    );

    let body = assert_ok!(
        h.orchestrator
            .start_operation(LifecycleOperation::Start, &existing.id, &Caller::new(OWNER))
            .await
    );
    let text = String::from_utf8(body.collect().await).unwrap();

    assert_eq!(
        text,
        "Connected to server...\npm2 started api\nCommand finished (exit=0, signal=none)\n"
    );
    assert_eq!(
        h.executor.commands(),
        vec![format!(
            "sudo {} --project_name api --type express --main_dir ./",
            ScriptSettings::default().start
        )]
    );
    // Status is left alone
    assert_eq!(
        stored(&h.store, "api").await.unwrap().status,
        ProjectStatus::Active
    );
}

#[tokio::test]
async fn test_logs_command_has_no_main_dir() {
    let h = harness(ScriptedExecutor::exiting("GET / 200\n", 0));
    let existing = assert_ok!(
        h.store
            .insert(project("web", ProjectType::Next, OWNER, 3000))
            .await
    );

    let body = assert_ok!(
        h.orchestrator
            .start_operation(LifecycleOperation::Logs, &existing.id, &Caller::new(OWNER))
            .await
    );
    body.collect().await;

    assert_eq!(
        h.executor.commands(),
        vec![format!(
            "sudo {} --project_name web --type next",
            ScriptSettings::default().logs
        )]
    );
}

#[tokio::test]
async fn test_delete_removes_record_after_success() {
    let h = harness(ScriptedExecutor::exiting("removed\n", 0));
    let existing = assert_ok!(
        h.store
            .insert(project("api", ProjectType::Nest, OWNER, 3000))
            .await
    );

    let body = assert_ok!(
        h.orchestrator
            .start_operation(LifecycleOperation::Delete, &existing.id, &Caller::new(OWNER))
            .await
    );
    let text = String::from_utf8(body.collect().await).unwrap();

    assert!(text.contains("Command finished (exit=0, signal=none)\n"));
    assert!(text.ends_with("Project api deleted\n"));
    assert!(!text.contains("DEPLOY_STATUS:"));
    assert!(stored(&h.store, "api").await.is_none());
}

#[tokio::test]
async fn test_failed_delete_keeps_record() {
    let h = harness(ScriptedExecutor::exiting("ERR: permission denied\n", 2));
    let existing = assert_ok!(
        h.store
            .insert(project("api", ProjectType::Nest, OWNER, 3000))
            .await
    );

    let body = assert_ok!(
        h.orchestrator
            .start_operation(LifecycleOperation::Delete, &existing.id, &Caller::new(OWNER))
            .await
    );
    let text = String::from_utf8(body.collect().await).unwrap();

    assert!(text.contains("Command finished (exit=2, signal=none)\n"));
    assert!(stored(&h.store, "api").await.is_some());
}

#[tokio::test]
async fn test_delete_that_cannot_connect_keeps_record() {
    let h = harness(ScriptedExecutor::new(vec![SessionEvent::ConnectFailed(
        "Host key verification failed.".to_string(),
    )]));
    let existing = assert_ok!(
        h.store
            .insert(project("api", ProjectType::Nest, OWNER, 3000))
            .await
    );

    let body = assert_ok!(
        h.orchestrator
            .start_operation(LifecycleOperation::Delete, &existing.id, &Caller::new(OWNER))
            .await
    );
    let text = String::from_utf8(body.collect().await).unwrap();

    assert_eq!(text, "SSH error: Host key verification failed.\n");
    assert!(stored(&h.store, "api").await.is_some());
}

#[tokio::test]
async fn test_unknown_project_is_not_found() {
    let h = harness(ScriptedExecutor::exiting("", 0));

    let err = assert_err!(
        h.orchestrator
            .start_operation(LifecycleOperation::Start, "missing", &Caller::new(OWNER))
            .await
    );

    assert!(matches!(err, PilotError::NotFound(_)));
}

#[tokio::test]
async fn test_project_of_another_user_is_forbidden() {
    let h = harness(ScriptedExecutor::exiting("", 0));
    let existing = assert_ok!(
        h.store
            .insert(project("api", ProjectType::Express, "someone-else", 3000))
            .await
    );

    let err = assert_err!(
        h.orchestrator
            .start_operation(LifecycleOperation::Logs, &existing.id, &Caller::new(OWNER))
            .await
    );

    assert!(matches!(err, PilotError::Forbidden(_)));
    assert!(h.executor.commands().is_empty());
}

#[tokio::test]
async fn test_list_only_shows_own_projects() {
    let h = harness(ScriptedExecutor::exiting("", 0));
    assert_ok!(h.store.insert(project("mine", ProjectType::Express, OWNER, 3000)).await);
    assert_ok!(h.store.insert(project("theirs", ProjectType::Express, "other", 3001)).await);

    let projects = assert_ok!(h.orchestrator.list_projects(&Caller::new(OWNER)).await);

    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "mine");
}
