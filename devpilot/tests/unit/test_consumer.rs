use devpilot::protocol::consumer::{ConsumerEvent, StreamConsumer};
use devpilot::protocol::{DeployStatus, Marker};

const TAIL: &[u8] = b"Command finished (exit=0, signal=none)\nDEPLOY_STATUS:SUCCESS\nPROJECT_ID:64f1c0ffee\nREDIRECT_URL:https://x/y\n";

#[test]
fn test_markers_survive_any_two_chunk_split() {
    for offset in 0..=TAIL.len() {
        let mut consumer = StreamConsumer::new();
        consumer.push(&TAIL[..offset]);
        consumer.push(&TAIL[offset..]);
        consumer.finish();

        let outcome = consumer.outcome();
        assert_eq!(outcome.status, Some(DeployStatus::Success), "offset {}", offset);
        assert_eq!(outcome.project_id.as_deref(), Some("64f1c0ffee"), "offset {}", offset);
        assert_eq!(outcome.redirect(), Some("https://x/y"), "offset {}", offset);
    }
}

#[test]
fn test_byte_at_a_time() {
    let mut consumer = StreamConsumer::new();
    let mut events = Vec::new();
    for byte in TAIL {
        events.extend(consumer.push(std::slice::from_ref(byte)));
    }

    assert_eq!(
        events,
        vec![
            ConsumerEvent::Line("Command finished (exit=0, signal=none)".to_string()),
            ConsumerEvent::Marker(Marker::Status(DeployStatus::Success)),
            ConsumerEvent::Marker(Marker::ProjectId("64f1c0ffee".to_string())),
            ConsumerEvent::Marker(Marker::RedirectUrl("https://x/y".to_string())),
        ]
    );
}

#[test]
fn test_token_inside_log_text_is_not_a_marker() {
    let mut consumer = StreamConsumer::new();
    consumer.push(b"echo DEPLOY_STATUS:SUCCESS\nERR: PROJECT_ID:nope\n");

    assert_eq!(consumer.outcome().status, None);
    assert_eq!(consumer.outcome().project_id, None);
}

#[test]
fn test_ssh_error_has_no_redirect() {
    let mut consumer = StreamConsumer::new();
    consumer.push(b"SSH error: timeout\nDEPLOY_STATUS:SSH_ERROR\n");

    assert_eq!(consumer.outcome().status, Some(DeployStatus::SshError));
    assert_eq!(consumer.outcome().redirect(), None);
}
