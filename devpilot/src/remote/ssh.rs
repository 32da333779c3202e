//! Remote execution through the OpenSSH client
//!
//! Each session opens its own control master (`ssh -M -N`), waits until it is
//! authenticated, runs the command through the master socket and tears the
//! master down afterwards. Connect and dispatch failures are told apart
//! because they happen on different processes; a session the master refuses
//! is recognized from the client's exit code and its stderr.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::remote::{ExitStatus, RemoteExecutor, RemoteSession, SessionEvent, SessionSender};
use crate::storage::settings::RemoteSettings;

const SESSION_BUFFER: usize = 64;
const READ_CHUNK: usize = 8192;
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// ssh executor options
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub strict_host_key_checking: bool,
    pub ssh_binary: String,

    /// Kill the command once it ran this long
    pub exec_timeout: Option<Duration>,

    /// Directory for control master sockets
    pub control_dir: PathBuf,
}

impl SshOptions {
    pub fn from_settings(remote: &RemoteSettings, exec_timeout: Option<Duration>) -> Self {
        Self {
            host: remote.host.clone(),
            port: remote.port,
            username: remote.username.clone(),
            identity_file: remote.identity_file.as_ref().map(PathBuf::from),
            connect_timeout: Duration::from_secs(remote.connect_timeout_secs),
            strict_host_key_checking: remote.strict_host_key_checking,
            ssh_binary: remote.ssh_binary.clone(),
            exec_timeout,
            control_dir: std::env::temp_dir(),
        }
    }

    fn target(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    /// Options shared by every ssh invocation of a session
    fn common_args(&self, control_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-S".to_string(),
            control_path.display().to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            format!(
                "StrictHostKeyChecking={}",
                if self.strict_host_key_checking {
                    "yes"
                } else {
                    "accept-new"
                }
            ),
        ];
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
            args.push("-o".to_string());
            args.push("IdentitiesOnly=yes".to_string());
        }
        args
    }
}

/// [`RemoteExecutor`] backed by the system `ssh` binary
pub struct SshExecutor {
    options: SshOptions,
}

impl SshExecutor {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }
}

impl RemoteExecutor for SshExecutor {
    fn execute(&self, command: String) -> RemoteSession {
        let (tx, session) = RemoteSession::channel(SESSION_BUFFER);
        let options = self.options.clone();
        tokio::spawn(async move {
            run_session(options, command, tx).await;
        });
        session
    }
}

async fn run_session(options: SshOptions, command: String, tx: SessionSender) {
    if options.host.trim().is_empty() {
        tx.send(SessionEvent::ConnectFailed(
            "remote host is not configured".to_string(),
        ))
        .await;
        return;
    }

    let control_path = options
        .control_dir
        .join(format!("devpilot-{}.sock", uuid::Uuid::new_v4().simple()));

    let mut master = match connect(&options, &control_path, &tx).await {
        Ok(Some(master)) => master,
        Ok(None) => return,
        Err(message) => {
            warn!("SSH connection to {} failed: {}", options.host, message);
            tx.send(SessionEvent::ConnectFailed(message)).await;
            return;
        }
    };

    info!("SSH connection to {} established", options.host);
    if tx.send(SessionEvent::Connected).await {
        dispatch(&options, &control_path, &command, &tx).await;
    }

    close_master(&options, &control_path, &mut master).await;
}

/// Start the control master and wait until it accepts sessions.
///
/// `Ok(None)` means the consumer went away while connecting.
async fn connect(
    options: &SshOptions,
    control_path: &Path,
    tx: &SessionSender,
) -> Result<Option<Child>, String> {
    let mut master = Command::new(&options.ssh_binary)
        .arg("-M")
        .arg("-N")
        .args(options.common_args(control_path))
        .args(["-o", "ControlPersist=no"])
        .arg(options.target())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to launch {}: {}", options.ssh_binary, e))?;

    // Allow the client's own ConnectTimeout to fire first
    let deadline = tokio::time::Instant::now() + options.connect_timeout + Duration::from_secs(2);

    loop {
        if let Some(status) = master.try_wait().map_err(|e| e.to_string())? {
            let stderr = read_all(master.stderr.take()).await;
            return Err(describe_failure(&stderr, status));
        }

        if check_master(options, control_path).await {
            return Ok(Some(master));
        }

        if tokio::time::Instant::now() >= deadline {
            let _ = master.kill().await;
            return Err(format!(
                "timed out after {:?} connecting to {}",
                options.connect_timeout, options.host
            ));
        }

        tokio::select! {
            _ = tx.closed() => {
                debug!("Session dropped while connecting to {}", options.host);
                let _ = master.kill().await;
                return Ok(None);
            }
            _ = tokio::time::sleep(READY_POLL_INTERVAL) => {}
        }
    }
}

async fn check_master(options: &SshOptions, control_path: &Path) -> bool {
    if !control_path.exists() {
        return false;
    }
    Command::new(&options.ssh_binary)
        .args(["-S", &control_path.display().to_string(), "-O", "check"])
        .arg(options.target())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Marker of the line the remote shell prints with the command's exit status
const EXIT_TRAILER: &[u8] = b"\n__devpilot_exit__:";

/// Bytes kept from the start of each pipe to explain a refused channel
const OUTPUT_HEAD_LIMIT: usize = 4096;

/// Messages OpenSSH prints when the master is up but refuses a new session
const REFUSED_SESSION: &[&str] = &[
    "mux_client_request_session",
    "session request failed",
    "Session open refused",
    "channel 0: open failed",
    "administratively prohibited",
];

/// Run `command` in the remote shell and report how it ended on stderr.
///
/// OpenSSH exits 255 when the remote command dies from a signal, so the exit
/// status is taken from the trailer line instead.
fn wrap_command(command: &str) -> String {
    let trailer = String::from_utf8_lossy(&EXIT_TRAILER[1..]);
    format!(
        "{}; __devpilot_status=$?; printf '\\n{}%d\\n' \"$__devpilot_status\" >&2; exit \"$__devpilot_status\"",
        command, trailer
    )
}

enum Outcome {
    Finished(PipeSummary, PipeSummary),
    Abandoned,
    TimedOut,
}

/// Run the command over the master connection and forward its output
async fn dispatch(options: &SshOptions, control_path: &Path, command: &str, tx: &SessionSender) {
    debug!("Dispatching remote command: {}", command);

    let spawned = Command::new(&options.ssh_binary)
        .arg("-T")
        .args(options.common_args(control_path))
        .args(["-o", "ControlMaster=no"])
        .arg(options.target())
        .arg(wrap_command(command))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            error!("Failed to dispatch remote command: {}", e);
            tx.send(SessionEvent::DispatchFailed(format!(
                "failed to start remote command: {}",
                e
            )))
            .await;
            return;
        }
    };

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.kill().await;
        tx.send(SessionEvent::DispatchFailed(
            "remote command output is unavailable".to_string(),
        ))
        .await;
        return;
    };

    let readers = async {
        tokio::join!(forward(stdout, tx, Pipe::Stdout), forward(stderr, tx, Pipe::Stderr))
    };
    let deadline = async {
        match options.exec_timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let outcome = tokio::select! {
        (out, err) = readers => {
            if tx.is_closed() { Outcome::Abandoned } else { Outcome::Finished(out, err) }
        }
        _ = tx.closed() => Outcome::Abandoned,
        _ = deadline => Outcome::TimedOut,
    };

    match outcome {
        Outcome::Finished(out, err) => {
            let event = match child.wait().await {
                Ok(status) => classify(status, &out, &err),
                Err(e) => {
                    error!("Failed to wait for remote command: {}", e);
                    SessionEvent::Closed(ExitStatus::default())
                }
            };
            debug!("Remote command ended: {:?}", event);
            tx.send(event).await;
        }
        Outcome::Abandoned => {
            warn!("Session consumer went away, killing remote command");
            let _ = child.kill().await;
        }
        Outcome::TimedOut => {
            warn!("Remote command exceeded {:?}, killing it", options.exec_timeout);
            let _ = child.kill().await;
            let limit = options.exec_timeout.unwrap_or_default();
            tx.stderr(format!("command timed out after {:?}\n", limit).as_bytes())
                .await;
            tx.send(SessionEvent::Closed(ExitStatus {
                code: None,
                signal: Some("SIGKILL".to_string()),
            }))
            .await;
        }
    }
}

/// Terminal event for an ssh client that exited on its own
fn classify(
    status: std::process::ExitStatus,
    stdout: &PipeSummary,
    stderr: &PipeSummary,
) -> SessionEvent {
    if let Some(reported) = stderr.reported {
        return SessionEvent::Closed(reported_status(reported));
    }

    // No trailer and nothing printed: the remote shell never ran
    let text = String::from_utf8_lossy(&stderr.head);
    if status.code() == Some(255)
        && stdout.bytes == 0
        && REFUSED_SESSION.iter().any(|m| text.contains(m))
    {
        return SessionEvent::DispatchFailed(text.trim().to_string());
    }

    SessionEvent::Closed(exit_status(status))
}

/// Exit status as reported by the remote shell; above 128 means killed by signal
fn reported_status(reported: i32) -> ExitStatus {
    match reported {
        129..=192 => ExitStatus {
            code: None,
            signal: Some(signal_name(reported - 128)),
        },
        code => ExitStatus::code(code),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipe {
    Stdout,
    Stderr,
}

/// What one pipe carried
#[derive(Debug, Default)]
struct PipeSummary {
    bytes: usize,
    head: Vec<u8>,
    reported: Option<i32>,
}

impl PipeSummary {
    fn record(&mut self, chunk: &[u8]) {
        self.bytes += chunk.len();
        let room = OUTPUT_HEAD_LIMIT.saturating_sub(self.head.len());
        self.head.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
}

/// Copy a pipe into the session until EOF or until the consumer is gone
async fn forward<R: AsyncRead + Unpin>(mut reader: R, tx: &SessionSender, pipe: Pipe) -> PipeSummary {
    let mut summary = PipeSummary::default();
    let mut trailer = ExitTrailer::default();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let chunk = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => match pipe {
                Pipe::Stdout => buf[..n].to_vec(),
                Pipe::Stderr => trailer.push(&buf[..n]),
            },
            Err(e) => {
                warn!("Remote output read error: {}", e);
                break;
            }
        };
        if !deliver(tx, pipe, &chunk, &mut summary).await {
            return summary;
        }
    }

    if pipe == Pipe::Stderr {
        let rest = trailer.finish();
        deliver(tx, pipe, &rest, &mut summary).await;
        summary.reported = trailer.status;
    }
    summary
}

async fn deliver(tx: &SessionSender, pipe: Pipe, chunk: &[u8], summary: &mut PipeSummary) -> bool {
    if chunk.is_empty() {
        return true;
    }
    summary.record(chunk);
    match pipe {
        Pipe::Stdout => tx.stdout(chunk).await,
        Pipe::Stderr => tx.stderr(chunk).await,
    }
}

/// Cuts the exit status line out of the stderr byte stream
#[derive(Debug, Default)]
struct ExitTrailer {
    /// Tail that may be the start of the trailer
    pending: Vec<u8>,

    /// Bytes after the trailer marker, once found
    line: Option<Vec<u8>>,

    status: Option<i32>,
}

impl ExitTrailer {
    /// Bytes of `chunk` that belong to the command's own stderr
    fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        if let Some(line) = &mut self.line {
            line.extend_from_slice(chunk);
            return Vec::new();
        }

        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(chunk);

        let found = match find(&data, EXIT_TRAILER) {
            Some(pos) => Some((pos, pos + EXIT_TRAILER.len())),
            // Read split right after the leading newline
            None if data.starts_with(&EXIT_TRAILER[1..]) => Some((0, EXIT_TRAILER.len() - 1)),
            None => None,
        };
        if let Some((start, end)) = found {
            self.line = Some(data[end..].to_vec());
            data.truncate(start);
            return data;
        }

        // A lone trailing newline is ordinary output
        let keep = (2..EXIT_TRAILER.len().min(data.len() + 1))
            .rev()
            .find(|&n| data.ends_with(&EXIT_TRAILER[..n]))
            .unwrap_or(0);
        self.pending = data.split_off(data.len() - keep);
        data
    }

    /// Flush at EOF; returns held back bytes that turned out not to be the trailer
    fn finish(&mut self) -> Vec<u8> {
        match self.line.take() {
            Some(line) => {
                self.status = String::from_utf8_lossy(&line).trim().parse().ok();
                Vec::new()
            }
            None => std::mem::take(&mut self.pending),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn close_master(options: &SshOptions, control_path: &Path, master: &mut Child) {
    let _ = Command::new(&options.ssh_binary)
        .args(["-S", &control_path.display().to_string(), "-O", "exit"])
        .arg(options.target())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    let _ = master.kill().await;
    let _ = tokio::fs::remove_file(control_path).await;
    debug!("SSH control connection to {} closed", options.host);
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut out = String::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_string(&mut out).await;
    }
    out
}

fn describe_failure(stderr: &str, status: std::process::ExitStatus) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("ssh exited with {}", status)
    } else {
        stderr.to_string()
    }
}

fn exit_status(status: std::process::ExitStatus) -> ExitStatus {
    ExitStatus {
        code: status.code(),
        signal: signal_of(&status),
    }
}

#[cfg(unix)]
fn signal_of(status: &std::process::ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(signal_name)
}

#[cfg(not(unix))]
fn signal_of(_status: &std::process::ExitStatus) -> Option<String> {
    None
}

fn signal_name(signal: i32) -> String {
    match signal {
        1 => "SIGHUP".to_string(),
        2 => "SIGINT".to_string(),
        3 => "SIGQUIT".to_string(),
        6 => "SIGABRT".to_string(),
        9 => "SIGKILL".to_string(),
        11 => "SIGSEGV".to_string(),
        13 => "SIGPIPE".to_string(),
        15 => "SIGTERM".to_string(),
        other => format!("SIG{}", other),
    }
}
