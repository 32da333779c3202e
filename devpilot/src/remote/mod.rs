//! Remote command execution
//!
//! One session executes exactly one command. A session is an ordered sequence
//! of [`SessionEvent`]s: optionally `Connected`, any number of `Output` chunks,
//! then exactly one terminal event.

pub mod ssh;

use std::fmt;

use tokio::sync::mpsc;

/// Prefix put in front of every stderr chunk before it joins the output stream
pub const STDERR_PREFIX: &[u8] = b"ERR: ";

/// How the remote command ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<String>,
}

impl ExitStatus {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        let signal = self.signal.as_deref().unwrap_or("none");
        write!(f, "exit={}, signal={}", code, signal)
    }
}

/// Event produced by a remote session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Authenticated connection established
    Connected,

    /// Interleaved stdout / prefixed stderr bytes, in arrival order
    Output(Vec<u8>),

    /// Terminal: the command ran and ended
    Closed(ExitStatus),

    /// Terminal: host unreachable or authentication failed; never carries an exit code
    ConnectFailed(String),

    /// Terminal: connected, but the command could not be started
    DispatchFailed(String),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::Closed(_) | SessionEvent::ConnectFailed(_) | SessionEvent::DispatchFailed(_)
        )
    }
}

/// Receiving end of a remote session
pub struct RemoteSession {
    events: mpsc::Receiver<SessionEvent>,
    finished: bool,
}

impl RemoteSession {
    /// Create a connected sender/session pair
    pub fn channel(capacity: usize) -> (SessionSender, RemoteSession) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            SessionSender { tx },
            RemoteSession {
                events: rx,
                finished: false,
            },
        )
    }

    /// Next event; `None` once the terminal event was delivered or the producer went away
    pub async fn next(&mut self) -> Option<SessionEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await;
        match &event {
            Some(e) if e.is_terminal() => self.finished = true,
            None => self.finished = true,
            _ => {}
        }
        event
    }
}

/// Producing end of a remote session
#[derive(Debug, Clone)]
pub struct SessionSender {
    tx: mpsc::Sender<SessionEvent>,
}

impl SessionSender {
    /// Returns false once the session was dropped by its consumer
    pub async fn send(&self, event: SessionEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub async fn stdout(&self, chunk: &[u8]) -> bool {
        self.send(SessionEvent::Output(chunk.to_vec())).await
    }

    pub async fn stderr(&self, chunk: &[u8]) -> bool {
        let mut prefixed = Vec::with_capacity(STDERR_PREFIX.len() + chunk.len());
        prefixed.extend_from_slice(STDERR_PREFIX);
        prefixed.extend_from_slice(chunk);
        self.send(SessionEvent::Output(prefixed)).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Completes when the consumer dropped the session
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Executes commands on the remote deployment host
pub trait RemoteExecutor: Send + Sync {
    /// Start executing `command`; progress is reported through the returned session
    fn execute(&self, command: String) -> RemoteSession;
}
